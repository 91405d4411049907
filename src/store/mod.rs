//! Persistence layer: latest intake profile per client.

pub mod json_file;
pub mod memory;
pub mod traits;

pub use json_file::JsonFileProfileStore;
pub use memory::InMemoryProfileStore;
pub use traits::ProfileStore;
