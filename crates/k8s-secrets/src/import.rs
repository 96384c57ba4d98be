//! Bulk import of a pasted `data:` block
//!
//! The flow is a small state machine, one type per state:
//!
//! ```text
//! PastedImport --parse--> ParsedImport --review--> ReviewedImport --commit--> CommitReport
//!      \--parse fails--> ParseError (nothing is written)
//! ```
//!
//! The parsed block is owned by each state and handed along unchanged, so
//! what gets committed is exactly the encoded text that was parsed, never
//! something re-encoded from the decoded review values.

use tracing::warn;

use crate::codec::{self, DataBlock, DataValue, ParseError};
use crate::error::StoreError;
use crate::record::EnvName;
use crate::store::EnvStore;

/// Raw text as pasted by the user
#[derive(Debug, Clone)]
pub struct PastedImport {
    text: String,
}

impl PastedImport {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn parse(self) -> Result<ParsedImport, ParseError> {
        let block = codec::import_yaml_block(&self.text)?;
        Ok(ParsedImport { block })
    }
}

/// A successfully parsed `data:` block
#[derive(Debug, Clone)]
pub struct ParsedImport {
    block: DataBlock,
}

impl ParsedImport {
    pub fn block(&self) -> &DataBlock {
        &self.block
    }

    /// Decode every value for display
    pub fn review(self) -> ReviewedImport {
        let rows = self
            .block
            .entries()
            .iter()
            .map(|entry| ReviewRow {
                key: entry.key.clone(),
                display: entry.value.display(),
                importable: matches!(entry.value, DataValue::Encoded(_)),
            })
            .collect();

        ReviewedImport {
            block: self.block,
            rows,
        }
    }
}

/// One line of the review shown before committing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRow {
    pub key: String,
    /// Decoded value or a placeholder
    pub display: String,
    /// False for values that will be dropped at commit
    pub importable: bool,
}

/// A parsed block that has been shown to the user
#[derive(Debug, Clone)]
pub struct ReviewedImport {
    block: DataBlock,
    rows: Vec<ReviewRow>,
}

impl ReviewedImport {
    pub fn rows(&self) -> &[ReviewRow] {
        &self.rows
    }

    pub fn importable_count(&self) -> usize {
        self.rows.iter().filter(|r| r.importable).count()
    }

    /// Write every string entry to `env` in document order.
    ///
    /// Non-string entries and entries the store rejects are skipped and
    /// reported; the rest are still written.
    pub fn commit(self, store: &EnvStore, env: &EnvName) -> CommitReport {
        let mut skipped = Vec::new();

        for entry in self.block.entries() {
            if let DataValue::NonString(kind) = entry.value {
                warn!("Skipping key '{}' with non-string value ({})", entry.key, kind);
                skipped.push(SkippedEntry {
                    key: entry.key.clone(),
                    reason: SkipReason::NonString(kind),
                });
            }
        }

        let report = store.replace_all(env, self.block.encoded_pairs());
        skipped.extend(report.failed.into_iter().map(|(key, e)| SkippedEntry {
            key,
            reason: SkipReason::Store(e),
        }));

        CommitReport {
            imported: report.applied,
            skipped,
        }
    }
}

/// Why an entry was not imported
#[derive(Debug)]
pub enum SkipReason {
    NonString(&'static str),
    Store(StoreError),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NonString(kind) => write!(f, "non-string value ({})", kind),
            SkipReason::Store(e) => write!(f, "{}", e),
        }
    }
}

#[derive(Debug)]
pub struct SkippedEntry {
    pub key: String,
    pub reason: SkipReason,
}

/// Outcome of a committed import
#[derive(Debug)]
pub struct CommitReport {
    pub imported: usize,
    pub skipped: Vec<SkippedEntry>,
}
