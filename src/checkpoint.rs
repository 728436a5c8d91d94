//! Single-record checkpoint: the last confirmed `(file, row)` resume position.
//!
//! On-disk format is one line, `{path}\t{row}\n`, or `{path}\t{row}\tdone\n` once the
//! whole file has been handled. The line is replaced atomically on every save so an
//! interrupted save leaves the previous checkpoint intact.

use crate::util::{create_with_backoff, replace_file_atomic_backoff, OPEN_DELAY_MS, OPEN_TRIES};
use anyhow::{anyhow, Context, Result};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const DONE_MARKER: &str = "done";

/// Resume position: rows of `file` with ordinal `< row` are fully handled.
/// `complete` means the file was read to its end; resume skips it unopened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    pub file: PathBuf,
    pub row: u64,
    pub complete: bool,
}

impl Checkpoint {
    pub fn new(file: impl Into<PathBuf>, row: u64) -> Self {
        Self { file: file.into(), row, complete: false }
    }

    /// End-of-file checkpoint: all `rows` rows of `file` are handled.
    pub fn completed(file: impl Into<PathBuf>, rows: u64) -> Self {
        Self { file: file.into(), row: rows, complete: true }
    }

    fn to_line(&self) -> String {
        if self.complete {
            format!("{}\t{}\t{}\n", self.file.display(), self.row, DONE_MARKER)
        } else {
            format!("{}\t{}\n", self.file.display(), self.row)
        }
    }

    /// Parse `{path}\t{row}` with an optional trailing `\tdone`. The last numeric
    /// field separates, so tabs inside paths survive. An empty line means "no checkpoint".
    pub fn parse_line(line: &str) -> Result<Option<Self>> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Ok(None);
        }
        let (line, complete) = match line.rsplit_once('\t') {
            Some((rest, DONE_MARKER)) => (rest, true),
            _ => (line, false),
        };
        let (file, row) = line
            .rsplit_once('\t')
            .ok_or_else(|| anyhow!("checkpoint line has no tab separator: {line:?}"))?;
        let row: u64 = row
            .trim()
            .parse()
            .with_context(|| format!("checkpoint row is not a number: {row:?}"))?;
        if file.is_empty() {
            return Err(anyhow!("checkpoint line has an empty file path"));
        }
        Ok(Some(Self { file: PathBuf::from(file), row, complete }))
    }
}

/// Persistent home of the single checkpoint. Injected into the driver so tests
/// can substitute an in-memory store.
pub trait CheckpointStore {
    /// Most recently saved checkpoint, or None if nothing was ever saved.
    fn load(&self) -> Result<Option<Checkpoint>>;
    /// Overwrite the checkpoint.
    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()>;
}

/// File-backed store (default `{output_dir}/progress.log`).
#[derive(Debug)]
pub struct FileCheckpointStore {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl FileCheckpointStore {
    /// Open the store, creating its directory and verifying it is writable.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create checkpoint directory {}", parent.display()))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open checkpoint {} for writing", path.display()))?;

        let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);
        Ok(Self { path, tmp_path })
    }

    pub fn path(&self) -> &Path { &self.path }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Result<Option<Checkpoint>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("read checkpoint {}", self.path.display())),
        };
        let first = text.lines().next().unwrap_or("");
        Checkpoint::parse_line(first).with_context(|| format!("parse checkpoint {}", self.path.display()))
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        let mut f = create_with_backoff(&self.tmp_path, OPEN_TRIES, OPEN_DELAY_MS)
            .with_context(|| format!("create {}", self.tmp_path.display()))?;
        f.write_all(checkpoint.to_line().as_bytes())
            .and_then(|_| f.sync_data())
            .with_context(|| format!("write {}", self.tmp_path.display()))?;
        drop(f);
        replace_file_atomic_backoff(&self.tmp_path, &self.path)?;
        tracing::debug!(
            file = %checkpoint.file.display(),
            row = checkpoint.row,
            complete = checkpoint.complete,
            "checkpoint saved"
        );
        Ok(())
    }
}

/// In-memory store; keeps every save so tests can inspect the cadence.
#[derive(Clone, Debug, Default)]
pub struct MemoryCheckpointStore {
    current: Option<Checkpoint>,
    history: Vec<Checkpoint>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self { Self::default() }

    /// A store that already holds `checkpoint`, as if a previous run saved it.
    pub fn with_checkpoint(checkpoint: Checkpoint) -> Self {
        Self { current: Some(checkpoint), history: Vec::new() }
    }

    pub fn current(&self) -> Option<&Checkpoint> { self.current.as_ref() }
    pub fn history(&self) -> &[Checkpoint] { &self.history }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self) -> Result<Option<Checkpoint>> {
        Ok(self.current.clone())
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        self.current = Some(checkpoint.clone());
        self.history.push(checkpoint.clone());
        Ok(())
    }
}
