//! Environment store
//!
//! One CSV table per environment under a single root directory:
//! `<root>/<env>.csv`. The table is the only source of truth; every read goes
//! to disk and every change rewrites the whole table.
//!
//! Mutations run as read-modify-write cycles under a per-environment lock, so
//! concurrent writers inside one process never drop each other's changes.
//! Separate processes writing the same environment are last-writer-wins.

use dashmap::DashMap;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::record::{EnvName, Record};
use crate::table;

const TABLE_EXT: &str = "csv";

/// Result of creating an environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// Result of deleting an environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Result of writing one secret
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Summary of a sequence of upserts
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Number of pairs written
    pub applied: usize,
    /// Keys that could not be written, in input order
    pub failed: Vec<(String, StoreError)>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The environment store
pub struct EnvStore {
    /// Directory holding the environment tables
    root: PathBuf,
    /// Per-environment locks held across read-modify-write cycles
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl EnvStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn new(root: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            locks: DashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the table backing an environment
    pub fn table_path(&self, env: &EnvName) -> PathBuf {
        self.root.join(format!("{}.{}", env, TABLE_EXT))
    }

    pub fn environment_exists(&self, env: &EnvName) -> bool {
        self.table_path(env).is_file()
    }

    /// All environments with a table under the root, sorted by name.
    ///
    /// Never fails: a missing root is created, an unreadable one is logged
    /// and reported as empty.
    pub fn list_environments(&self) -> BTreeSet<EnvName> {
        if let Err(e) = fs::create_dir_all(&self.root) {
            warn!("Failed to create {}: {}", self.root.display(), e);
            return BTreeSet::new();
        }

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to list environments in {}: {}", self.root.display(), e);
                return BTreeSet::new();
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(TABLE_EXT))
            .filter_map(|path| {
                let stem = path.file_stem()?.to_str()?;
                match EnvName::new(stem) {
                    Ok(name) => Some(name),
                    Err(_) => {
                        debug!("Ignoring table with invalid name: {}", path.display());
                        None
                    }
                }
            })
            .collect()
    }

    /// Create an empty table for `env`. Creating an existing environment is
    /// not an error.
    pub fn create_environment(&self, env: &EnvName) -> Result<CreateOutcome, StoreError> {
        let lock = self.env_lock(env);
        let _guard = Self::hold(&lock, env);

        let path = self.table_path(env);
        if path.exists() {
            return Ok(CreateOutcome::AlreadyExists);
        }

        table::write_table(&path, &[])?;
        debug!("Created environment {}", env);
        Ok(CreateOutcome::Created)
    }

    /// Remove the table for `env`
    pub fn delete_environment(&self, env: &EnvName) -> Result<DeleteOutcome, StoreError> {
        let lock = self.env_lock(env);
        let _guard = Self::hold(&lock, env);

        match fs::remove_file(self.table_path(env)) {
            Ok(()) => {
                debug!("Deleted environment {}", env);
                Ok(DeleteOutcome::Deleted)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(DeleteOutcome::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// All records of `env` in file order.
    ///
    /// A missing, empty or unreadable table yields no records; read failures
    /// are logged rather than returned.
    pub fn list_secrets(&self, env: &EnvName) -> Vec<Record> {
        let path = self.table_path(env);
        match table::read_table(&path) {
            Ok(records) => records,
            Err(e) => {
                warn!("Failed to read secrets for environment '{}': {}", env, e);
                Vec::new()
            }
        }
    }

    /// First record with exactly this key
    pub fn get_secret(&self, env: &EnvName, key: &str) -> Option<Record> {
        self.list_secrets(env).into_iter().find(|r| r.key == key)
    }

    /// Insert a record, or replace the value of the first record with the
    /// same key. Creates the environment if it does not exist.
    pub fn upsert_secret(
        &self,
        env: &EnvName,
        key: &str,
        encoded_value: &str,
    ) -> Result<UpsertOutcome, StoreError> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }

        let lock = self.env_lock(env);
        let _guard = Self::hold(&lock, env);

        let path = self.table_path(env);
        let mut records = table::read_table(&path)?;

        let outcome = match records.iter_mut().find(|r| r.key == key) {
            Some(existing) => {
                existing.value = encoded_value.to_string();
                UpsertOutcome::Updated
            }
            None => {
                records.push(Record::new(key, encoded_value));
                UpsertOutcome::Inserted
            }
        };

        table::write_table(&path, &records)?;
        Ok(outcome)
    }

    /// Remove every record with this key, returning how many were removed.
    /// The table is left untouched when nothing matches.
    pub fn delete_secret(&self, env: &EnvName, key: &str) -> Result<usize, StoreError> {
        let lock = self.env_lock(env);
        let _guard = Self::hold(&lock, env);

        let path = self.table_path(env);
        let mut records = table::read_table(&path)?;

        let before = records.len();
        records.retain(|r| r.key != key);
        let removed = before - records.len();

        if removed > 0 {
            table::write_table(&path, &records)?;
        }
        Ok(removed)
    }

    /// Upsert each pair in order. Every pair is its own read-modify-write
    /// cycle; a failure is recorded and the remaining pairs still run.
    pub fn replace_all<I, K, V>(&self, env: &EnvName, pairs: I) -> BatchReport
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut report = BatchReport::default();

        for (key, value) in pairs {
            let key = key.as_ref();
            match self.upsert_secret(env, key, value.as_ref()) {
                Ok(_) => report.applied += 1,
                Err(e) => {
                    warn!("Failed to write secret '{}' in '{}': {}", key, env, e);
                    report.failed.push((key.to_string(), e));
                }
            }
        }

        report
    }

    /// Environments other than `exclude` holding a key that contains `term`,
    /// ignoring case. A blank term matches nothing.
    pub fn search_key(&self, term: &str, exclude: Option<&EnvName>) -> BTreeSet<EnvName> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return BTreeSet::new();
        }

        self.list_environments()
            .into_iter()
            .filter(|env| Some(env) != exclude)
            .filter(|env| {
                self.list_secrets(env)
                    .iter()
                    .any(|r| r.key.to_lowercase().contains(&needle))
            })
            .collect()
    }

    fn env_lock(&self, env: &EnvName) -> Arc<Mutex<()>> {
        self.locks
            .entry(env.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn hold<'a>(lock: &'a Mutex<()>, env: &EnvName) -> MutexGuard<'a, ()> {
        lock.lock().unwrap_or_else(|poisoned| {
            warn!("Recovering poisoned lock for environment '{}'", env);
            poisoned.into_inner()
        })
    }
}
