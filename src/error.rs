//! Typed errors for the two failure scopes the pipeline isolates:
//! a single row (logged and skipped) and a file's container stream (file cut short).

use serde_json::Value;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure while handling one row. Never aborts the file or the run.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("invalid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("expected a JSON object, found {found}")]
    NotAnObject { found: &'static str },

    #[error("failed to append to shard {}: {source}", shard.display())]
    Write {
        shard: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RowError {
    /// Short classification written in brackets at the head of an error log entry.
    pub fn kind(&self) -> &'static str {
        match self {
            RowError::Decode(_) => "JsonDecode",
            RowError::NotAnObject { .. } => "NotAnObject",
            RowError::Write { .. } => "ShardWrite",
        }
    }

    pub(crate) fn not_an_object(v: &Value) -> Self {
        let found = match v {
            Value::Null => "null",
            Value::Bool(_) => "a boolean",
            Value::Number(_) => "a number",
            Value::String(_) => "a string",
            Value::Array(_) => "an array",
            Value::Object(_) => "an object",
        };
        RowError::NotAnObject { found }
    }
}

/// The outer stream (zstd frame or plain file) could not be read any further.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("stream read failed after {rows_read} rows: {source}")]
    Read {
        rows_read: u64,
        #[source]
        source: io::Error,
    },
}
