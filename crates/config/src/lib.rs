//! Configuration loading for the copilink adapter.
//!
//! Uses figment to layer defaults, an optional YAML file, and environment
//! variables.

pub mod schema;

pub use schema::{AuthConfig, Config, CredentialsConfig, LogConfig, LogFormat, UpstreamConfig};
