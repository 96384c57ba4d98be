//! Environment tables on disk
//!
//! Each environment is a two column CSV file:
//!
//! ```text
//! key,value
//! DB_URL,cG9zdGdyZXM6Ly94
//! ```
//!
//! Writes always produce the canonical header and replace the file through a
//! temp file + fsync + rename. Reads are forgiving: a missing header, a
//! reordered header, short rows and undecodable rows are tolerated, with the
//! bad rows skipped and logged.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::record::Record;

/// Header row written at the top of every table
pub const HEADER: [&str; 2] = ["key", "value"];

/// Read a table. A missing file is an empty table.
pub fn read_table(path: &Path) -> Result<Vec<Record>, StoreError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    parse_table(file, &path.display().to_string())
}

/// Parse table rows from any reader, skipping malformed rows.
///
/// `source` only labels warnings. Read failures of the underlying reader
/// are returned as errors so a half-read table is never mistaken for a
/// complete one.
pub fn parse_table<R: Read>(reader: R, source: &str) -> Result<Vec<Record>, StoreError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut columns: Option<(usize, usize)> = None;
    let mut records = Vec::new();

    for (index, result) in rdr.records().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                warn!("Skipping unreadable row in {}: {}", source, e);
                continue;
            }
        };
        let line = row.position().map(|p| p.line()).unwrap_or(0);

        if index == 0 {
            if let Some(found) = header_columns(&row) {
                columns = Some(found);
                continue;
            }
            debug!("No header in {}, reading first row as data", source);
        }

        let (key_col, value_col) = columns.unwrap_or((0, 1));
        match (row.get(key_col), row.get(value_col)) {
            (Some(""), _) => {
                warn!("Skipping row with empty key in {} (line {})", source, line);
            }
            (Some(key), Some(value)) => records.push(Record::new(key, value)),
            _ => {
                warn!(
                    "Skipping row with {} field(s) in {} (line {})",
                    row.len(),
                    source,
                    line
                );
            }
        }
    }

    Ok(records)
}

/// Column positions of `key` and `value` when the row is a header
fn header_columns(row: &csv::StringRecord) -> Option<(usize, usize)> {
    let key = row.iter().position(|f| f == HEADER[0])?;
    let value = row.iter().position(|f| f == HEADER[1])?;
    Some((key, value))
}

/// Render a table to bytes
pub fn render_table(records: &[Record]) -> Result<Vec<u8>, StoreError> {
    let mut bytes = Vec::new();
    {
        let mut wtr = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(&mut bytes);
        wtr.write_record(HEADER)?;
        for record in records {
            wtr.write_record([record.key.as_str(), record.value.as_str()])?;
        }
        wtr.flush()?;
    }
    Ok(bytes)
}

/// Replace a table atomically
pub fn write_table(path: &Path, records: &[Record]) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let bytes = render_table(records)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;

    debug!("Wrote {} record(s) to {}", records.len(), path.display());
    Ok(())
}
