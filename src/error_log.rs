//! Append-only log of rows that could not be handled.
//!
//! Entry layout:
//! ```text
//! [JsonDecode] Error in /data/RS_2023-01.zst at row 41: invalid JSON: EOF while parsing ...
//!   logged at: 2026-01-01T00:00:00Z
//!   trace:
//!     0: invalid JSON: EOF while parsing ...
//!     1: EOF while parsing ...
//! ```

use crate::error::RowError;
use crate::util::{append_with_backoff, OPEN_DELAY_MS, OPEN_TRIES};
use anyhow::{Context, Result};
use std::error::Error as StdError;
use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub struct ErrorLog {
    path: PathBuf,
    file: File,
    entries: u64,
}

impl ErrorLog {
    /// Open (create/append) the log. Failure here is fatal for the run.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = append_with_backoff(&path, OPEN_TRIES, OPEN_DELAY_MS)
            .with_context(|| format!("open error log {}", path.display()))?;
        Ok(Self { path, file, entries: 0 })
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Entries appended through this handle.
    pub fn entries(&self) -> u64 { self.entries }

    /// Append one entry. Never fails: this is the last line of defense, so a
    /// failure to write is reported through tracing and otherwise swallowed.
    pub fn record(&mut self, file: &Path, ordinal: u64, err: &RowError) {
        let entry = format_entry(file, ordinal, err);
        let res = self.file.write_all(entry.as_bytes()).and_then(|_| self.file.flush());
        match res {
            Ok(()) => self.entries += 1,
            Err(e) => tracing::error!(
                log = %self.path.display(),
                source_file = %file.display(),
                row = ordinal,
                error = %e,
                "Could not write error log entry: [{}] {}",
                err.kind(),
                err
            ),
        }
    }
}

fn format_entry(file: &Path, ordinal: u64, err: &RowError) -> String {
    let mut s = String::with_capacity(256);
    let _ = writeln!(s, "[{}] Error in {} at row {}: {}", err.kind(), file.display(), ordinal, err);
    let ts = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| "unknown".to_string());
    let _ = writeln!(s, "  logged at: {ts}");
    let _ = writeln!(s, "  trace:");
    let mut cur: Option<&dyn StdError> = Some(err as &dyn StdError);
    let mut depth = 0usize;
    while let Some(e) = cur {
        let _ = writeln!(s, "    {depth}: {e}");
        cur = e.source();
        depth += 1;
    }
    s.push('\n');
    s
}
