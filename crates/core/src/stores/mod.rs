pub mod memory;
pub mod qdrant;

pub use memory::{cosine_distance, MemoryStore};
pub use qdrant::QdrantStore;
