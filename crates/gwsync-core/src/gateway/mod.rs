//! Built-in gateway implementations

pub mod memory;

pub use memory::MemoryGateway;
