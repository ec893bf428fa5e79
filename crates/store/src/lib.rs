//! Credential storage backends.
//!
//! Provides a file-backed store for production and an in-memory store for
//! testing.

pub mod file;
pub mod memory;

pub use file::FileCredentialStore;
pub use memory::InMemoryCredentialStore;
