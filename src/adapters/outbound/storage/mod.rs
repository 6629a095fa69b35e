/// Storage adapters implementing the repository ports
mod in_memory_store;

pub use in_memory_store::InMemoryStore;
