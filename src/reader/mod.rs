//! Reader boundary: `extract(path) -> string`.
//!
//! The core depends only on the [`Reader`] trait and the authoritative
//! extension allowlist. [`DefaultReader`] is a reference adapter handling
//! plain-text and source-code formats directly; binary container formats
//! (`.pdf .docx .pptx .xlsx .mp3 .wav`) are left to a real adapter and fail
//! with [`Error::ParseError`] here.

use std::path::Path;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Case-insensitive file-suffix strings the core knows how to route to a
/// Reader. Authoritative per the external interface contract.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    ".astro", ".c", ".cpp", ".css", ".csv", ".docx", ".go", ".h", ".hpp", ".html", ".java", ".js",
    ".json", ".kt", ".md", ".mdx", ".mjs", ".mp3", ".pdf", ".php", ".pptx", ".py", ".rb", ".rs",
    ".svelte", ".swift", ".ts", ".tsx", ".txt", ".vue", ".wav", ".xml", ".xlsx", ".yaml", ".yml",
];

/// True if `extension` (with or without a leading dot) is in the supported set.
pub fn is_supported_extension(extension: &str) -> bool {
    let normalized = extension.to_lowercase();
    let normalized = if normalized.starts_with('.') {
        normalized
    } else {
        format!(".{normalized}")
    };
    SUPPORTED_EXTENSIONS.contains(&normalized.as_str())
}

/// Guess a MIME type from a file extension (with or without a leading dot),
/// for `Document::metadata.contentType`. Falls back to
/// `"application/octet-stream"` for anything outside this map.
pub fn guess_mime(extension: &str) -> &'static str {
    const MIME_MAP: &[(&str, &str)] = &[
        (".html", "text/html"),
        (".htm", "text/html"),
        (".txt", "text/plain"),
        (".md", "text/markdown"),
        (".mdx", "text/markdown"),
        (".csv", "text/csv"),
        (".json", "application/json"),
        (".pdf", "application/pdf"),
        (
            ".docx",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ),
        (
            ".pptx",
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        ),
        (
            ".xlsx",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ),
        (".xml", "application/xml"),
        (".yaml", "application/yaml"),
        (".yml", "application/yaml"),
        (".js", "text/javascript"),
        (".mjs", "text/javascript"),
        (".ts", "text/plain"),
        (".tsx", "text/plain"),
        (".py", "text/x-python"),
        (".rb", "text/x-ruby"),
        (".rs", "text/rust"),
        (".go", "text/x-go"),
        (".java", "text/x-java"),
        (".kt", "text/x-kotlin"),
        (".swift", "text/x-swift"),
        (".php", "text/x-php"),
        (".c", "text/x-c"),
        (".h", "text/x-c"),
        (".cpp", "text/x-c++"),
        (".hpp", "text/x-c++"),
        (".css", "text/css"),
        (".svelte", "text/plain"),
        (".vue", "text/plain"),
        (".astro", "text/plain"),
        (".mp3", "audio/mpeg"),
        (".wav", "audio/wav"),
    ];

    let normalized = extension.to_lowercase();
    let normalized = if normalized.starts_with('.') {
        normalized
    } else {
        format!(".{normalized}")
    };
    MIME_MAP
        .iter()
        .find(|(ext, _)| *ext == normalized)
        .map(|(_, mime)| *mime)
        .unwrap_or("application/octet-stream")
}

/// Extracts plain text from a file path.
#[async_trait]
pub trait Reader: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<String>;
}

const TEXT_EXTENSIONS: &[&str] = &[
    ".astro", ".c", ".cpp", ".css", ".csv", ".go", ".h", ".hpp", ".html", ".java", ".js", ".json",
    ".kt", ".md", ".mdx", ".mjs", ".php", ".py", ".rb", ".rs", ".svelte", ".swift", ".ts", ".tsx",
    ".txt", ".vue", ".xml", ".yaml", ".yml",
];

/// Direct-decode reader for text and source-code formats; errors on the
/// binary container formats it cannot parse without an adapter.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultReader;

#[async_trait]
impl Reader for DefaultReader {
    async fn extract(&self, path: &Path) -> Result<String> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default();

        if !is_supported_extension(&extension) {
            return Err(Error::InvalidArgument(format!(
                "unsupported file extension: {extension}"
            )));
        }

        if TEXT_EXTENSIONS.contains(&extension.as_str()) {
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| Error::ParseError(format!("failed to read {path:?}: {e}")))
        } else {
            Err(Error::ParseError(format!(
                "{extension} requires a Reader adapter capable of binary extraction; \
                 DefaultReader only handles plain text"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_supported_extensions_case_insensitively() {
        assert!(is_supported_extension(".TXT"));
        assert!(is_supported_extension("md"));
        assert!(!is_supported_extension(".exe"));
    }

    #[test]
    fn guesses_known_mime_types() {
        assert_eq!(guess_mime(".txt"), "text/plain");
        assert_eq!(guess_mime("TXT"), "text/plain");
        assert_eq!(guess_mime(".md"), "text/markdown");
    }

    #[test]
    fn falls_back_to_octet_stream_for_unknown_extension() {
        assert_eq!(guess_mime(".unknownext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn default_reader_reads_text_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        tokio::fs::write(&path, "hello world").await.unwrap();

        let reader = DefaultReader;
        let content = reader.extract(&path).await.unwrap();
        assert_eq!(content, "hello world");
    }

    #[tokio::test]
    async fn default_reader_rejects_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.exe");
        tokio::fs::write(&path, "binary").await.unwrap();

        let reader = DefaultReader;
        assert!(reader.extract(&path).await.is_err());
    }

    #[tokio::test]
    async fn default_reader_errors_on_binary_formats_without_adapter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        tokio::fs::write(&path, b"%PDF-1.4").await.unwrap();

        let reader = DefaultReader;
        let err = reader.extract(&path).await.unwrap_err();
        assert!(matches!(err, Error::ParseError(_)));
    }
}
