//! Repository layer: transactional CRUD and retrieval over the store's
//! tables.

pub mod chunk;
pub mod document;

pub use chunk::ChunkRepository;
pub use document::DocumentRepository;
