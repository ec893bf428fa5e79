//! Credential lifecycle for the GitHub Copilot upstream.
//!
//! [`copilot`] holds the device-flow protocol details, [`client`] the
//! transport, [`policy`] the bounded retry loops, and [`CredentialManager`]
//! ties them to a [`copilink_types::CredentialStore`].

pub mod client;
pub mod copilot;
pub mod manager;
pub mod policy;

pub use client::{DeviceAuthClient, GithubAuthClient};
pub use copilot::{DeviceCodeResponse, PollOutcome};
pub use manager::{CredentialManager, CredentialStatus};
pub use policy::RetryPolicy;
