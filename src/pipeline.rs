//! Pipeline driver: enumerate inputs, resume from the checkpoint, stream each file
//! through the category filter into rotating shards, and isolate per-row failures.

use crate::checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore};
use crate::config::FilterOptions;
use crate::error::{ContainerError, RowError};
use crate::error_log::ErrorLog;
use crate::filters::TargetSet;
use crate::paths::{classify, discover_inputs, path_key, RecordKind};
use crate::progress::FileProgress;
use crate::record_stream::{open_record_stream, Record, RecordStream};
use crate::shard::ShardWriter;
use crate::util::{init_tracing_once, open_with_backoff, OPEN_DELAY_MS, OPEN_TRIES};
use anyhow::{Context, Result};
use serde::Serialize;
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone)]
pub struct SubredditFilter {
    pub(crate) opts: FilterOptions,
}

/// What happened to one row.
#[derive(Debug)]
pub enum RowOutcome {
    Written,
    FilteredOut,
    Failed(RowError),
}

/// Counters for a whole run, printed by the binary at the end.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub files_seen: u64,
    pub files_processed: u64,
    pub files_skipped: u64,
    /// Files whose container stream failed part-way; no end-of-file checkpoint was saved.
    pub files_cut_short: u64,
    pub rows_read: u64,
    pub rows_written: u64,
    pub rows_failed: u64,
    pub checkpoint_saves: u64,
}

/// Resume state machine. `ResumingScan` skips files ordered before the
/// checkpointed one; the first file at or after it switches to `Streaming`.
enum ResumeState {
    ResumingScan { key: PathBuf, row: u64, complete: bool },
    Streaming,
}

impl ResumeState {
    /// First row to process in `path`, or None to skip the file outright.
    fn start_row(&mut self, path: &Path) -> Option<u64> {
        let (ord, row, complete) = match self {
            ResumeState::Streaming => return Some(0),
            ResumeState::ResumingScan { key, row, complete } => (path_key(path).cmp(key), *row, *complete),
        };
        match ord {
            Ordering::Less => None,
            Ordering::Equal => {
                *self = ResumeState::Streaming;
                if complete { None } else { Some(row) }
            }
            Ordering::Greater => {
                tracing::warn!(
                    path = %path.display(),
                    "Checkpointed file not found among inputs; continuing from the next file in order"
                );
                *self = ResumeState::Streaming;
                Some(0)
            }
        }
    }
}

#[derive(Default)]
struct FileCounts {
    rows_read: u64,
    written: u64,
    failed: u64,
    saves: u64,
}

impl SubredditFilter {
    pub fn new() -> Self {
        Self { opts: FilterOptions::default() }
    }

    pub fn from_options(opts: FilterOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &FilterOptions { &self.opts }

    // -------- Builder methods --------
    pub fn input(mut self, path: impl AsRef<Path>) -> Self { self.opts = self.opts.with_input(path); self }
    pub fn recursive(mut self, yes: bool) -> Self { self.opts = self.opts.with_recursive(yes); self }
    pub fn targets<I, S>(mut self, targets: I) -> Self where I: IntoIterator<Item = S>, S: AsRef<str> { self.opts = self.opts.with_targets(targets); self }
    pub fn category_field(mut self, field: impl Into<String>) -> Self { self.opts = self.opts.with_category_field(field); self }
    pub fn output_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_output_dir(dir); self }
    pub fn submissions_prefix(mut self, prefix: impl Into<String>) -> Self { self.opts = self.opts.with_submissions_prefix(prefix); self }
    pub fn comments_prefix(mut self, prefix: impl Into<String>) -> Self { self.opts = self.opts.with_comments_prefix(prefix); self }
    pub fn rows_per_shard(mut self, rows: u64) -> Self { self.opts = self.opts.with_rows_per_shard(rows); self }
    pub fn checkpoint_every(mut self, rows: u64) -> Self { self.opts = self.opts.with_checkpoint_every(rows); self }
    pub fn checkpoint_path(mut self, path: impl AsRef<Path>) -> Self { self.opts = self.opts.with_checkpoint_path(path); self }
    pub fn error_log_path(mut self, path: impl AsRef<Path>) -> Self { self.opts = self.opts.with_error_log_path(path); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn progress_label(mut self, label: impl Into<String>) -> Self { self.opts = self.opts.with_progress_label(label); self }
    pub fn io_read_buffer(mut self, bytes: usize) -> Self { self.opts = self.opts.with_io_read_buffer(bytes); self }
    pub fn io_write_buffer(mut self, bytes: usize) -> Self { self.opts = self.opts.with_io_write_buffer(bytes); self }

    // -------- Operations --------

    /// Run with the file-backed checkpoint at `checkpoint_file()`.
    pub fn run(&self) -> Result<RunSummary> {
        init_tracing_once();
        fs::create_dir_all(&self.opts.output_dir)
            .with_context(|| format!("create output dir {}", self.opts.output_dir.display()))?;
        let mut store = FileCheckpointStore::open(self.opts.checkpoint_file())?;
        self.run_with_store(&mut store)
    }

    /// Run against an injected checkpoint store.
    pub fn run_with_store(&self, store: &mut dyn CheckpointStore) -> Result<RunSummary> {
        init_tracing_once();
        self.opts.validate()?;
        fs::create_dir_all(&self.opts.output_dir)
            .with_context(|| format!("create output dir {}", self.opts.output_dir.display()))?;
        let mut errors = ErrorLog::open(self.opts.error_log_file())?;
        let targets = TargetSet::new(self.opts.category_field.clone(), &self.opts.targets);

        let mut state = match store.load().context("load checkpoint")? {
            Some(cp) => {
                tracing::info!(file = %cp.file.display(), row = cp.row, complete = cp.complete, "Resuming from checkpoint");
                ResumeState::ResumingScan { key: path_key(&cp.file), row: cp.row, complete: cp.complete }
            }
            None => ResumeState::Streaming,
        };

        let files = discover_inputs(&self.opts.input, self.opts.recursive)?;
        if files.is_empty() {
            tracing::warn!(input = %self.opts.input.display(), "No input files found");
        } else {
            tracing::info!("Planned {} files for processing.", files.len());
        }

        let mut summary = RunSummary::default();
        for path in &files {
            summary.files_seen += 1;
            let Some(start_row) = state.start_row(path) else {
                tracing::debug!(path = %path.display(), "Skipping (already done per checkpoint)");
                summary.files_skipped += 1;
                continue;
            };
            self.process_file(path, start_row, &targets, &mut errors, store, &mut summary)?;
        }

        if let ResumeState::ResumingScan { key, row, .. } = &state {
            tracing::warn!(
                file = %key.display(),
                row,
                "Checkpoint points past every input file; nothing was processed"
            );
        }

        tracing::info!(
            files = summary.files_processed,
            skipped = summary.files_skipped,
            rows = summary.rows_read,
            written = summary.rows_written,
            failed = summary.rows_failed,
            "Run complete"
        );
        Ok(summary)
    }

    fn process_file(
        &self,
        path: &Path,
        start_row: u64,
        targets: &TargetSet,
        errors: &mut ErrorLog,
        store: &mut dyn CheckpointStore,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let kind = classify(path);
        let prefix = match kind {
            RecordKind::Submission => &self.opts.submissions_prefix,
            RecordKind::Comment => &self.opts.comments_prefix,
            RecordKind::Unrecognized => {
                tracing::info!("Skipping {} (not RC_ or RS_)", path.display());
                summary.files_skipped += 1;
                return Ok(());
            }
        };

        let file = match open_with_backoff(path, OPEN_TRIES, OPEN_DELAY_MS) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable file");
                summary.files_skipped += 1;
                return Ok(());
            }
        };
        let mut records = match open_record_stream(file, path, self.opts.read_buffer_bytes) {
            RecordStream::Recognized(r) => r,
            RecordStream::Unrecognized(reason) => {
                tracing::warn!("Skipping unknown format {}: {}", path.display(), reason);
                summary.files_skipped += 1;
                return Ok(());
            }
        };

        tracing::info!(start_row, container = ?records.container(), "Processing {} [{}]", path.display(), kind.label());
        let mut writer = ShardWriter::open(
            &self.opts.output_dir,
            prefix,
            self.opts.rows_per_shard,
            self.opts.write_buffer_bytes,
        )?;
        let mut progress = FileProgress::start(
            path,
            kind,
            records.bytes_counter(),
            self.opts.progress,
            self.opts.progress_label.as_deref(),
        );
        summary.files_processed += 1;

        let mut counts = FileCounts::default();
        let mut complete = true;
        if start_row > 0 {
            match records.skip_to(start_row) {
                Ok(reached) if reached < start_row => tracing::warn!(
                    path = %path.display(),
                    rows = reached,
                    start_row,
                    "File has fewer rows than the checkpoint; nothing left to process"
                ),
                Ok(_) => {}
                Err(e) => {
                    warn_container_cut(path, &e);
                    complete = false;
                }
            }
        }

        let every = self.opts.checkpoint_every.max(1);
        for item in records.by_ref() {
            let record = match item {
                Ok(r) => r,
                Err(e) => {
                    warn_container_cut(path, &e);
                    complete = false;
                    break;
                }
            };
            progress.on_row();
            counts.rows_read += 1;
            let ordinal = record.ordinal;

            match handle_row(record, targets, &mut writer) {
                RowOutcome::Written => counts.written += 1,
                RowOutcome::FilteredOut => {}
                RowOutcome::Failed(err) => {
                    counts.failed += 1;
                    errors.record(path, ordinal, &err);
                }
            }

            if ordinal % every == 0 {
                store
                    .save(&Checkpoint::new(path, ordinal))
                    .with_context(|| format!("save checkpoint for {} at row {}", path.display(), ordinal))?;
                counts.saves += 1;
            }
        }

        writer
            .close()
            .with_context(|| format!("close shard {}", writer.current_path().display()))?;
        if complete {
            let end = records.next_ordinal();
            store
                .save(&Checkpoint::completed(path, end))
                .with_context(|| format!("save end-of-file checkpoint for {}", path.display()))?;
            counts.saves += 1;
        } else {
            summary.files_cut_short += 1;
        }
        progress.finish(counts.written, counts.failed);

        summary.rows_read += counts.rows_read;
        summary.rows_written += counts.written;
        summary.rows_failed += counts.failed;
        summary.checkpoint_saves += counts.saves;
        Ok(())
    }
}

/// Filter one record and route it to the shard writer.
pub fn handle_row(record: Record, targets: &TargetSet, writer: &mut ShardWriter) -> RowOutcome {
    let value = match record.value {
        Ok(v) => v,
        Err(e) => return RowOutcome::Failed(RowError::Decode(e)),
    };
    let Some(obj) = value.as_object() else {
        return RowOutcome::Failed(RowError::not_an_object(&value));
    };
    if !targets.matches(obj) {
        return RowOutcome::FilteredOut;
    }
    match writer.write(&value) {
        Ok(()) => RowOutcome::Written,
        Err(source) => RowOutcome::Failed(RowError::Write { shard: writer.current_path(), source }),
    }
}

fn warn_container_cut(path: &Path, e: &ContainerError) {
    let abs = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    tracing::warn!(
        "Stopping file early after container decode error\n  path : {}\n  error: {}\n\
         note : Rows already written are kept. No end-of-file checkpoint is saved, \
                so the next run resumes this file from its last checkpoint.",
        abs.display(),
        e
    );
}
