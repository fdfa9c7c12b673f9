//! Reversible BPE-style encode/decode, used only for chunk boundary math.
//!
//! Wraps the `o200k_base` encoding, the encoding backing the gpt-4o model
//! family.

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

use crate::error::{Error, Result};

fn bpe() -> &'static CoreBPE {
    static BPE: OnceLock<CoreBPE> = OnceLock::new();
    BPE.get_or_init(|| tiktoken_rs::o200k_base().expect("o200k_base vocabulary is bundled"))
}

/// Encode text into its token stream.
pub fn encode(text: &str) -> Vec<usize> {
    bpe().encode_ordinary(text)
}

/// Decode a token window back into a string. Fails only if the tokens don't
/// form valid UTF-8 once decoded, which cannot happen for windows carved out
/// of a prior `encode` call.
pub fn decode(tokens: &[usize]) -> Result<String> {
    bpe()
        .decode(tokens.to_vec())
        .map_err(|e| Error::InvalidArgument(format!("failed to decode token window: {e}")))
}

/// Number of tokens `text` encodes to.
pub fn count(text: &str) -> usize {
    encode(text).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrips() {
        let text = "The quick brown fox jumps over the lazy dog.";
        let tokens = encode(text);
        let decoded = decode(&tokens).unwrap();
        assert_eq!(decoded, text);
    }

    #[test]
    fn count_matches_encode_length() {
        let text = "hello world, this is a test of the tokenizer";
        assert_eq!(count(text), encode(text).len());
    }

    #[test]
    fn empty_text_has_no_tokens() {
        assert_eq!(count(""), 0);
    }
}
