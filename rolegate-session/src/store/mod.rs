//! Token Stores
//!
//! Bundled `TokenStore` implementations. Both renew a session by extending its
//! expiry with the configured TTL and report expired credentials as absent.

pub mod file;
pub mod memory;

pub use file::FileTokenStore;
pub use memory::MemoryTokenStore;
