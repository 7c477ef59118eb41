pub mod maintenance;
pub mod stats;
pub mod store;
pub mod types;

pub use store::MemoryStore;
pub use types::{MemoryEntry, Source};
