pub mod documents;
pub mod memory;
pub mod qdrant;

pub use documents::{FileDocumentStore, InMemoryDocumentStore};
pub use memory::InMemoryVectorIndex;
pub use qdrant::QdrantStore;
