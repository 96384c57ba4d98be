//! secrets-core - Shared functionality for the k8s-secrets tool
//!
//! Standard locations, the on-disk configuration file, and the small
//! formatting helpers used when printing secrets to a terminal.

pub mod config;
pub mod format;
pub mod paths;

pub use config::Config;
pub use paths::{Paths, StorageRoot, ENV_DIR_VAR};
