pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::{MongoConnector, MongoStore};
