//! Atomic JSON record IO.
//!
//! Every persisted record is written to a temporary file and renamed into
//! place, so concurrent readers never observe a partial write. Reads come in
//! a strict and a lenient flavor; the lenient one treats corrupt records as
//! absent, which is how the engine favors availability over losing a session.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tokio::fs;
use tracing::warn;

use super::CoordinationError;

/// Result of a lenient read: the record, its absence, or its corruption.
#[derive(Debug)]
pub enum RecordRead<T> {
    Value(T),
    Missing,
    Corrupt,
}

/// Serialize `value` and atomically replace `path` with it.
pub async fn write_json_atomic<T: Serialize>(
    path: &Path,
    value: &T,
) -> Result<(), CoordinationError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let serialized = serde_json::to_string_pretty(value)?;
    let temp_file = format!("{}.tmp", path.display());
    fs::write(&temp_file, serialized).await?;
    fs::rename(&temp_file, path).await?;
    Ok(())
}

/// Read and parse a record, returning `Ok(None)` when the file is missing.
/// Parse failures are errors here; use [`read_json_lenient`] where corruption
/// must be tolerated.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CoordinationError> {
    let contents = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_str(&contents).map_err(|err| CoordinationError::CorruptedRecord {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    Ok(Some(value))
}

/// Read a record, classifying missing and unparseable files separately so
/// callers can discard corrupt records rather than aborting.
pub async fn read_json_lenient<T: DeserializeOwned>(path: &Path) -> RecordRead<T> {
    let contents = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return RecordRead::Missing,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Failed to read record");
            return RecordRead::Corrupt;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => RecordRead::Value(value),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Discarding corrupted record");
            RecordRead::Corrupt
        }
    }
}
