use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

static INIT_ONCE: std::sync::Once = std::sync::Once::new();
pub fn init_tracing_once() {
    INIT_ONCE.call_once(|| {
        let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .try_init();
    });
}

// -------- robust open/create with backoff (Windows-friendly) --------

pub(crate) const OPEN_TRIES: usize = 16;
pub(crate) const OPEN_DELAY_MS: u64 = 50;

/// Return true for transient/retriable I/O errors often seen on Windows when
/// filter drivers (AV/backup), USB/NAS volumes, or sharing violations occur.
fn is_retriable_io_error(e: &io::Error) -> bool {
    // 5 access denied (AV/share), 32 sharing violation, 33 lock violation,
    // 225 AV blocked, 433 no such device, 1006 volume altered, 1117 device I/O,
    // 1224 user-mapped section open, 21 device not ready.
    // Raw codes are Windows values; on Unix they collide with unrelated errnos.
    cfg!(windows)
        && matches!(
            e.raw_os_error(),
            Some(5) | Some(32) | Some(33) | Some(225) | Some(433) | Some(1006) | Some(1117) | Some(1224) | Some(21)
        )
}

/// Run `op` up to `tries` times, sleeping linearly longer between retriable failures.
fn with_backoff<T>(tries: usize, delay_ms: u64, what: &str, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let mut last_err: Option<io::Error> = None;
    for i in 0..tries.max(1) {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if is_retriable_io_error(&e) => {
                last_err = Some(e);
                sleep(Duration::from_millis(delay_ms.saturating_mul((i + 1) as u64)));
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, format!("{what} failed"))))
}

/// Open a file for reading with retries/backoff for transient errors.
pub fn open_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> io::Result<File> {
    with_backoff(tries, delay_ms, "open", || File::open(path))
}

/// Create (truncate) a file with retries/backoff for transient errors.
pub fn create_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> io::Result<File> {
    with_backoff(tries, delay_ms, "create", || File::create(path))
}

/// Open a file in append mode, creating it if missing, with retries/backoff.
pub fn append_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> io::Result<File> {
    with_backoff(tries, delay_ms, "append", || {
        OpenOptions::new().create(true).append(true).open(path)
    })
}

/// Replace `dest` with `tmp`.
///
/// A plain rename is tried first: it overwrites `dest` atomically on Unix, so a
/// kill at any point leaves either the old or the new content. Where rename onto
/// an existing file is refused (Windows sharing), fall back to remove + rename,
/// then copy + remove.
pub fn replace_file_atomic_backoff(tmp: &Path, dest: &Path) -> Result<()> {
    let tries = 20usize;
    let delay_ms = 50u64;
    if with_backoff(tries, delay_ms, "rename", || fs::rename(tmp, dest)).is_ok() {
        return Ok(());
    }
    match with_backoff(tries, delay_ms, "remove", || fs::remove_file(dest)) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("remove {}", dest.display())),
    }
    if with_backoff(tries, delay_ms, "rename", || fs::rename(tmp, dest)).is_ok() {
        return Ok(());
    }
    with_backoff(tries, delay_ms, "copy", || fs::copy(tmp, dest))
        .with_context(|| format!("copy {} -> {}", tmp.display(), dest.display()))?;
    with_backoff(tries, delay_ms, "remove", || fs::remove_file(tmp))
        .with_context(|| format!("remove {}", tmp.display()))?;
    Ok(())
}
