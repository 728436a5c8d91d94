use crate::filters::normalize_category;
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

pub const DEFAULT_ROWS_PER_SHARD: u64 = 100_000;
pub const DEFAULT_CHECKPOINT_EVERY: u64 = 1_000;

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct FilterOptions {
    pub input: PathBuf,                  // single file or directory
    pub recursive: bool,                 // walk sub-directories of `input`
    pub targets: Vec<String>,            // normalized lowercase, no "r/"
    pub category_field: String,          // record field compared against `targets`
    pub output_dir: PathBuf,
    pub submissions_prefix: String,
    pub comments_prefix: String,
    pub rows_per_shard: u64,
    pub checkpoint_every: u64,           // rows between checkpoint saves
    pub checkpoint_path: Option<PathBuf>, // if None, output_dir/progress.log
    pub error_log_path: Option<PathBuf>,  // if None, output_dir/errors.log
    pub progress: bool,                  // show progress bar
    pub progress_label: Option<String>,  // optional label for progress bar

    // IO tuning
    pub read_buffer_bytes: usize,        // BufReader capacity
    pub write_buffer_bytes: usize,       // BufWriter capacity
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            input: PathBuf::from("./data"),
            recursive: true,
            targets: Vec::new(),
            category_field: "subreddit".to_string(),
            output_dir: PathBuf::from("./filtered_output"),
            submissions_prefix: "filtered_submissions".to_string(),
            comments_prefix: "filtered_comments".to_string(),
            rows_per_shard: DEFAULT_ROWS_PER_SHARD,
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
            checkpoint_path: None,
            error_log_path: None,
            progress: true,
            progress_label: None,

            read_buffer_bytes: 256 * 1024,
            write_buffer_bytes: 64 * 1024,
        }
    }
}

impl FilterOptions {
    pub fn with_input(mut self, path: impl AsRef<Path>) -> Self {
        self.input = path.as_ref().to_path_buf();
        self
    }
    pub fn with_recursive(mut self, yes: bool) -> Self {
        self.recursive = yes;
        self
    }
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut v: Vec<String> = targets
            .into_iter()
            .map(|s| normalize_category(s.as_ref()))
            .filter(|s| !s.is_empty())
            .collect();
        v.sort();
        v.dedup();
        self.targets = v;
        self
    }
    pub fn with_category_field(mut self, field: impl Into<String>) -> Self {
        self.category_field = field.into();
        self
    }
    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.output_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_submissions_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.submissions_prefix = prefix.into();
        self
    }
    pub fn with_comments_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.comments_prefix = prefix.into();
        self
    }
    pub fn with_rows_per_shard(mut self, rows: u64) -> Self {
        self.rows_per_shard = rows.max(1);
        self
    }
    pub fn with_checkpoint_every(mut self, rows: u64) -> Self {
        self.checkpoint_every = rows.max(1);
        self
    }
    pub fn with_checkpoint_path(mut self, path: impl AsRef<Path>) -> Self {
        self.checkpoint_path = Some(path.as_ref().to_path_buf());
        self
    }
    pub fn with_error_log_path(mut self, path: impl AsRef<Path>) -> Self {
        self.error_log_path = Some(path.as_ref().to_path_buf());
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_progress_label(mut self, label: impl Into<String>) -> Self {
        self.progress_label = Some(label.into());
        self
    }

    // IO buffers tuning
    pub fn with_io_read_buffer(mut self, bytes: usize) -> Self {
        self.read_buffer_bytes = bytes.max(8 * 1024);
        self
    }
    pub fn with_io_write_buffer(mut self, bytes: usize) -> Self {
        self.write_buffer_bytes = bytes.max(8 * 1024);
        self
    }

    pub fn checkpoint_file(&self) -> PathBuf {
        self.checkpoint_path.clone().unwrap_or_else(|| self.output_dir.join("progress.log"))
    }
    pub fn error_log_file(&self) -> PathBuf {
        self.error_log_path.clone().unwrap_or_else(|| self.output_dir.join("errors.log"))
    }

    /// Reject configurations that would silently produce nothing or clobber output.
    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            bail!("target category set is empty; nothing would ever match");
        }
        if self.category_field.trim().is_empty() {
            bail!("category field name is empty");
        }
        if self.submissions_prefix.is_empty() || self.comments_prefix.is_empty() {
            bail!("output file prefixes must not be empty");
        }
        if self.submissions_prefix == self.comments_prefix {
            bail!(
                "submission and comment shards would share the prefix {:?}",
                self.submissions_prefix
            );
        }
        Ok(())
    }
}
