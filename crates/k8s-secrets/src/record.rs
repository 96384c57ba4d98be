//! Environment names and secret records

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::codec::{self, DecodeError};
use crate::error::StoreError;

/// A validated environment name (`[A-Za-z0-9_-]+`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EnvName(String);

impl EnvName {
    /// Accept a name exactly as given
    pub fn new(name: &str) -> Result<Self, StoreError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        if valid {
            Ok(Self(name.to_string()))
        } else {
            Err(StoreError::InvalidName(name.to_string()))
        }
    }

    /// Normalize user input (trim, lowercase) and validate it
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        Self::new(&raw.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for EnvName {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for EnvName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EnvName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One secret: a key and its base64 encoded value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub key: String,
    /// Base64 text, never plaintext
    pub value: String,
}

impl Record {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Build a record from a plaintext value
    pub fn from_plaintext(key: impl Into<String>, plaintext: &str) -> Self {
        Self::new(key, codec::encode(plaintext))
    }

    /// Decode the stored value
    pub fn decoded(&self) -> Result<String, DecodeError> {
        codec::decode(&self.value)
    }

    /// Decoded value, or the invalid-value placeholder
    pub fn display_value(&self) -> String {
        codec::decode_for_display(&self.value)
    }
}
