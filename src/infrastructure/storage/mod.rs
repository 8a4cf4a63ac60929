//! Object storage adapters

mod local;
mod memory;

pub use local::LocalObjectStore;
pub use memory::InMemoryObjectStore;
