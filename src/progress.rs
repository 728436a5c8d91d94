//! Per-file progress reporting: byte-based progress bar over the compressed input,
//! row counters, and a summary line when the file is done. Purely observational.

use crate::paths::RecordKind;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

/// How often a plain log line is emitted when the bar is disabled.
const LOG_EVERY: Duration = Duration::from_secs(10);
/// Rows between refreshes of the bar position (keeps the hot loop cheap).
const REFRESH_ROWS: u64 = 1024;

fn make_file_bar(total_bytes: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(total_bytes);
    let style = ProgressStyle::with_template(
        "{spinner:.green} {msg} {bytes:>10}/{total_bytes:<10} [{bar:.cyan/blue}] {percent:>3}%  \
         {bytes_per_sec}  elapsed: {elapsed_precise}  eta: {eta_precise}"
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ");
    pb.set_style(style);
    pb.set_message(label.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub struct FileProgress {
    pb: ProgressBar,
    path: PathBuf,
    label: String,
    bytes: Arc<AtomicU64>,
    total_bytes: u64,
    rows: u64,
    show_bar: bool,
    started: Instant,
    last_log: Instant,
}

impl FileProgress {
    /// Start observing one file. `bytes` is the adapter's compressed-bytes counter.
    pub fn start(
        path: &Path,
        kind: RecordKind,
        bytes: Arc<AtomicU64>,
        show_bar: bool,
        label: Option<&str>,
    ) -> Self {
        let total_bytes = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let label = match label {
            Some(l) => format!("{l} {name} [{}]", kind.label()),
            None => format!("{name} [{}]", kind.label()),
        };
        let pb = if show_bar { make_file_bar(total_bytes, &label) } else { ProgressBar::hidden() };
        let now = Instant::now();
        Self {
            pb,
            path: path.to_path_buf(),
            label,
            bytes,
            total_bytes,
            rows: 0,
            show_bar,
            started: now,
            last_log: now,
        }
    }

    #[inline]
    pub fn on_row(&mut self) {
        self.rows += 1;
        if self.rows % REFRESH_ROWS == 0 {
            self.refresh();
        }
    }

    pub fn rows(&self) -> u64 { self.rows }

    fn refresh(&mut self) {
        let read = self.bytes.load(Ordering::Relaxed);
        if self.show_bar {
            self.pb.set_position(read);
            return;
        }
        if self.last_log.elapsed() >= LOG_EVERY {
            let pct = if self.total_bytes > 0 { read as f64 * 100.0 / self.total_bytes as f64 } else { 0.0 };
            tracing::info!(
                "{}: {} rows, {:.1}% of {} bytes, {:.0} rows/s",
                self.label,
                self.rows,
                pct,
                self.total_bytes,
                self.rows as f64 / self.started.elapsed().as_secs_f64().max(1e-3)
            );
            self.last_log = Instant::now();
        }
    }

    /// Close the bar and log the per-file summary.
    pub fn finish(&self, written: u64, failed: u64) {
        let read = self.bytes.load(Ordering::Relaxed);
        self.pb.set_position(read);
        self.pb.finish_with_message(format!("{} done", self.label));
        tracing::info!(
            path = %self.path.display(),
            rows = self.rows,
            written,
            failed,
            bytes = read,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Finished {}",
            self.label
        );
    }
}
