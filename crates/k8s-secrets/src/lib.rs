//! k8s-secrets - Kubernetes Secret data organized by environment
//!
//! "One table per environment, one line per key."
//!
//! Secret values are kept base64 encoded in a plain CSV table per
//! environment, ready to be pasted into (or lifted out of) the `data:`
//! block of a Kubernetes Secret manifest.
//!
//! Commands:
//! - envs / create / drop: manage environments
//! - set / get / list / rm / update: manage secrets in one environment
//! - export: print the environment as a kubectl `data:` block
//! - import: review and commit a pasted `data:` block
//! - search: find which other environments define a key

pub mod codec;
pub mod error;
pub mod import;
pub mod record;
pub mod store;
pub mod table;

pub use codec::{DataBlock, DataEntry, DataValue, DecodeError, ParseError};
pub use error::StoreError;
pub use import::{CommitReport, ParsedImport, PastedImport, ReviewedImport};
pub use record::{EnvName, Record};
pub use store::{BatchReport, CreateOutcome, DeleteOutcome, EnvStore, UpsertOutcome};
