//! Value and data block codec
//!
//! Plaintext values are stored as standard base64 of their UTF-8 bytes.
//! A whole environment travels as the `data:` block of a Kubernetes Secret:
//!
//! ```text
//! data:
//!   DB_URL: cG9zdGdyZXM6Ly94
//!   API_KEY: c2stMTIz
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_yaml::{Mapping, Value};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

use crate::record::Record;

/// Shown in place of a value that cannot be decoded
pub const INVALID_VALUE: &str = "[Invalid base64 or decoding error]";

/// Emitted under `data:` when an environment has no secrets
pub const NO_SECRETS_COMMENT: &str = "  # No secrets defined for this environment";

/// Why a stored value could not be turned back into text
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("decoded bytes are not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Why a pasted document was rejected
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Error parsing YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Could not find a 'data' block: the document is a {0}, not a mapping")]
    NotAMapping(&'static str),

    #[error("Could not find a 'data' block in the document")]
    MissingData,

    #[error("The 'data' block is a {0}, not a mapping of keys to values")]
    DataNotAMapping(&'static str),

    #[error("Unsupported {0} key in the 'data' block")]
    UnsupportedKey(&'static str),
}

/// Encode a plaintext value
pub fn encode(plaintext: &str) -> String {
    STANDARD.encode(plaintext.as_bytes())
}

/// Decode a stored value. ASCII whitespace (wrapped lines) is ignored.
pub fn decode(encoded: &str) -> Result<String, DecodeError> {
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD.decode(compact)?;
    Ok(String::from_utf8(bytes)?)
}

/// Decode for display, substituting [`INVALID_VALUE`] on failure
pub fn decode_for_display(encoded: &str) -> String {
    decode(encoded).unwrap_or_else(|_| INVALID_VALUE.to_string())
}

/// Suggested file name for an exported environment
pub fn suggested_export_filename(env: &str) -> String {
    format!("{}_secrets.yaml", env)
}

/// Render records as a kubectl style `data:` block.
///
/// Each record is emitted by the YAML serializer as a one entry mapping and
/// indented under `data:`, so any key the store accepts reads back unchanged.
/// Only the first record of a repeated key is written, matching what
/// `get_secret` returns.
pub fn export_yaml_block(records: &[Record]) -> Result<String, serde_yaml::Error> {
    let mut out = String::from("data:\n");

    if records.is_empty() {
        out.push_str(NO_SECRETS_COMMENT);
        out.push('\n');
        return Ok(out);
    }

    let mut seen = HashSet::new();
    for record in records {
        if !seen.insert(record.key.as_str()) {
            debug!("Not exporting repeated key '{}'", record.key);
            continue;
        }

        let mut entry = Mapping::new();
        entry.insert(
            Value::String(record.key.clone()),
            Value::String(record.value.clone()),
        );
        for line in serde_yaml::to_string(&entry)?.split_inclusive('\n') {
            if line != "\n" {
                out.push_str("  ");
            }
            out.push_str(line);
        }
    }

    Ok(out)
}

/// Parse a pasted document and pull out its `data:` mapping
pub fn import_yaml_block(text: &str) -> Result<DataBlock, ParseError> {
    let doc: Value = serde_yaml::from_str(text)?;

    let root = match &doc {
        Value::Mapping(m) => m,
        other => return Err(ParseError::NotAMapping(type_name(other))),
    };

    let data = match root.get("data") {
        Some(Value::Mapping(m)) => m,
        Some(other) => return Err(ParseError::DataNotAMapping(type_name(other))),
        None => return Err(ParseError::MissingData),
    };

    let mut entries = Vec::with_capacity(data.len());
    for (key, value) in data {
        let value = match value {
            Value::String(s) => DataValue::Encoded(s.clone()),
            other => DataValue::NonString(type_name(other)),
        };
        entries.push(DataEntry {
            key: key_string(key)?,
            value,
        });
    }

    Ok(DataBlock { entries })
}

/// The contents of a `data:` block, in document order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataBlock {
    entries: Vec<DataEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataEntry {
    pub key: String,
    pub value: DataValue,
}

/// A value found under `data:`
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// A string, taken to be base64 already
    Encoded(String),
    /// Anything else; kept for review, never persisted
    NonString(&'static str),
}

impl DataValue {
    /// What a reviewer should see for this value
    pub fn display(&self) -> String {
        match self {
            DataValue::Encoded(encoded) => decode_for_display(encoded),
            DataValue::NonString(kind) => format!("[Non-string value: {}]", kind),
        }
    }
}

impl DataBlock {
    pub fn entries(&self) -> &[DataEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Key and encoded value of every string entry
    pub fn encoded_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().filter_map(|e| match &e.value {
            DataValue::Encoded(v) => Some((e.key.as_str(), v.as_str())),
            DataValue::NonString(_) => None,
        })
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged",
    }
}

fn key_string(key: &Value) -> Result<String, ParseError> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(ParseError::UnsupportedKey(type_name(other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        for s in ["", "bar", "postgres://x", "héllo wörld ✓", "line1\nline2", "  padded  "] {
            assert_eq!(decode(&encode(s)).unwrap(), s);
        }
        assert_eq!(encode("bar"), "YmFy");
        assert_eq!(encode("héllo wörld ✓"), "aMOpbGxvIHfDtnJsZCDinJM=");
    }

    #[test]
    fn test_decode_invalid_base64() {
        for s in ["not base64!", "YmF", "Ym=y", "@@@@", "YQ==="] {
            assert!(
                matches!(decode(s), Err(DecodeError::InvalidBase64(_))),
                "{:?} should fail",
                s
            );
        }
    }

    #[test]
    fn test_decode_invalid_utf8() {
        // 0xff 0xfe
        assert!(matches!(decode("//4="), Err(DecodeError::InvalidUtf8(_))));
    }

    #[test]
    fn test_decode_ignores_whitespace() {
        assert_eq!(decode(" cG9zdGdy\nZXM6Ly94 ").unwrap(), "postgres://x");
    }

    #[test]
    fn test_decode_for_display() {
        assert_eq!(decode_for_display("YmFy"), "bar");
        assert_eq!(decode_for_display("%%%"), INVALID_VALUE);
    }

    #[test]
    fn test_export_shape() {
        let records = vec![
            Record::new("DB_URL", "cG9zdGdyZXM6Ly94"),
            Record::new("FOO", "YmFy"),
        ];
        assert_eq!(
            export_yaml_block(&records).unwrap(),
            "data:\n  DB_URL: cG9zdGdyZXM6Ly94\n  FOO: YmFy\n"
        );
    }

    #[test]
    fn test_export_empty() {
        let text = export_yaml_block(&[]).unwrap();
        assert_eq!(text, "data:\n  # No secrets defined for this environment\n");
        // a bare `data:` holds no mapping
        assert!(matches!(
            import_yaml_block(&text),
            Err(ParseError::DataNotAMapping("null"))
        ));
    }

    #[test]
    fn test_export_quotes_when_needed() {
        let records = vec![
            Record::new("EMPTY", ""),
            Record::new("123", "YmFy"),
            Record::new("ODD", "a: b # c"),
        ];
        let text = export_yaml_block(&records).unwrap();
        assert!(!text.contains("  EMPTY: \n"));
        assert!(!text.contains("  123: "));

        let block = import_yaml_block(&text).unwrap();
        let pairs: Vec<_> = block.encoded_pairs().collect();
        assert_eq!(pairs, vec![("EMPTY", ""), ("123", "YmFy"), ("ODD", "a: b # c")]);
    }

    #[test]
    fn test_export_awkward_keys_read_back() {
        let long = "K".repeat(1100);
        let keys = [
            "a\u{2028}b",
            "x\u{fffe}",
            long.as_str(),
            "line\nbreak",
            "tab\there",
            "- dash",
            "#hash",
            "true",
            "~",
        ];

        for key in keys {
            let records = vec![Record::new(key, key), Record::new("NEXT", "YmFy")];
            let text = export_yaml_block(&records).unwrap();
            let block = import_yaml_block(&text)
                .unwrap_or_else(|e| panic!("{:?} did not read back: {}", key, e));
            assert_eq!(
                block.encoded_pairs().collect::<Vec<_>>(),
                vec![(key, key), ("NEXT", "YmFy")]
            );
        }
    }

    #[test]
    fn test_export_repeated_key_keeps_first() {
        let records = vec![
            Record::new("A", "YQ=="),
            Record::new("B", "Yg=="),
            Record::new("A", "Yw=="),
        ];
        let text = export_yaml_block(&records).unwrap();
        assert_eq!(text, "data:\n  A: YQ==\n  B: Yg==\n");
    }

    #[test]
    fn test_export_import_round_trip() {
        let records = vec![
            Record::from_plaintext("DB_URL", "postgres://x"),
            Record::from_plaintext("API_KEY", "sk-123"),
            Record::from_plaintext("MULTI", "a\nb"),
            Record::new("RAW", "not-base64"),
        ];
        let block = import_yaml_block(&export_yaml_block(&records).unwrap()).unwrap();
        let pairs: Vec<(String, String)> = block
            .encoded_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let expected: Vec<(String, String)> = records
            .iter()
            .map(|r| (r.key.clone(), r.value.clone()))
            .collect();
        assert_eq!(pairs, expected);
    }

    #[test]
    fn test_import_kubectl_output() {
        let text = r#"apiVersion: v1
data:
  password: czNjcjN0
  username: YWRtaW4=
kind: Secret
metadata:
  name: db-credentials
  namespace: default
type: Opaque
"#;
        let block = import_yaml_block(text).unwrap();
        assert_eq!(block.len(), 2);
        assert_eq!(block.entries()[0].key, "password");
        assert_eq!(block.entries()[0].value.display(), "s3cr3t");
        assert_eq!(block.entries()[1].value.display(), "admin");
    }

    #[test]
    fn test_import_non_string_values() {
        let text = "data:\n  PORT: 5432\n  ENABLED: true\n  OK: YmFy\n";
        let block = import_yaml_block(text).unwrap();
        assert_eq!(block.len(), 3);
        assert_eq!(block.entries()[0].value, DataValue::NonString("number"));
        assert_eq!(block.entries()[0].value.display(), "[Non-string value: number]");
        assert_eq!(block.entries()[1].value, DataValue::NonString("bool"));
        assert_eq!(block.encoded_pairs().collect::<Vec<_>>(), vec![("OK", "YmFy")]);
    }

    #[test]
    fn test_import_invalid_base64_is_tolerated() {
        let block = import_yaml_block("data:\n  BAD: '!!!'\n").unwrap();
        assert_eq!(block.entries()[0].value, DataValue::Encoded("!!!".to_string()));
        assert_eq!(block.entries()[0].value.display(), INVALID_VALUE);
    }

    #[test]
    fn test_import_structural_errors() {
        assert!(matches!(
            import_yaml_block("- a\n- b\n"),
            Err(ParseError::NotAMapping("sequence"))
        ));
        assert!(matches!(
            import_yaml_block("kind: Secret\n"),
            Err(ParseError::MissingData)
        ));
        assert!(matches!(
            import_yaml_block("data:\n  - a\n"),
            Err(ParseError::DataNotAMapping("sequence"))
        ));
        assert!(matches!(
            import_yaml_block("data: just-text\n"),
            Err(ParseError::DataNotAMapping("string"))
        ));
    }

    #[test]
    fn test_import_syntax_error() {
        let err = import_yaml_block("data:\n  FOO: {bar\n").unwrap_err();
        assert!(matches!(err, ParseError::Yaml(_)));
        assert!(err.to_string().starts_with("Error parsing YAML"));
    }

    #[test]
    fn test_import_repeated_key_is_rejected() {
        let err = import_yaml_block("data:\n  A: YQ==\n  A: Yg==\n").unwrap_err();
        assert!(matches!(err, ParseError::Yaml(_)));
        assert!(err.to_string().contains("duplicate entry"));
    }

    #[test]
    fn test_suggested_filename() {
        assert_eq!(suggested_export_filename("staging"), "staging_secrets.yaml");
    }
}
