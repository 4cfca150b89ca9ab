//! vg-core: Core abstractions and configuration for Vigil
//!
//! This crate provides the detection-provider contracts, the shared
//! signature store, configuration structures and error types used by the
//! agent daemon and the CLI.

pub mod config;
pub mod error;
pub mod signatures;
pub mod time;
pub mod traits;

pub use error::{ConfigError, ProviderError, ScanError, SignatureError};
pub use signatures::{SignatureSet, SignatureStore};
