use crate::util::{append_with_backoff, open_with_backoff, OPEN_DELAY_MS, OPEN_TRIES};
use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Rotating JSONL writer for one record kind.
///
/// File layout: `<dir>/<prefix>_0000.jsonl`, `<prefix>_0001.jsonl`, ...
/// A shard holds at most `rows_per_shard` lines. Once full it is sealed and the
/// next write opens the next index. Shards are only ever appended to.
///
/// Opening resumes after whatever a previous run left behind: the highest
/// existing index is reopened in append mode if it still has room.
pub struct ShardWriter {
    dir: PathBuf,
    prefix: String,
    rows_per_shard: u64,
    write_buf: usize,
    index: u32,
    rows_in_shard: u64,
    out: Option<BufWriter<File>>,
    recount: bool,
    line: Vec<u8>,
}

impl ShardWriter {
    pub fn open(dir: &Path, prefix: &str, rows_per_shard: u64, write_buf: usize) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("create output dir {}", dir.display()))?;
        let rows_per_shard = rows_per_shard.max(1);

        let (index, rows_in_shard) = match last_shard(dir, prefix)? {
            None => (0, 0),
            Some((idx, path)) => {
                let rows = repair_and_count_rows(&path)
                    .with_context(|| format!("inspect existing shard {}", path.display()))?;
                if rows >= rows_per_shard { (idx + 1, 0) } else { (idx, rows) }
            }
        };
        if index > 0 || rows_in_shard > 0 {
            tracing::info!(prefix, index, rows_in_shard, "Resuming output shards");
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            prefix: prefix.to_string(),
            rows_per_shard,
            write_buf: write_buf.max(8 * 1024),
            index,
            rows_in_shard,
            out: None,
            recount: false,
            line: Vec::with_capacity(16 * 1024),
        })
    }

    pub fn shard_path(&self, index: u32) -> PathBuf {
        self.dir.join(format!("{}_{:04}.jsonl", self.prefix, index))
    }

    /// Path of the shard the next write lands in.
    pub fn current_path(&self) -> PathBuf { self.shard_path(self.index) }
    pub fn current_index(&self) -> u32 { self.index }
    pub fn rows_in_current(&self) -> u64 { self.rows_in_shard }

    /// Append one record as a canonical JSON line and flush it to the OS.
    /// Rotates after the append when the shard reaches capacity.
    pub fn write(&mut self, record: &Value) -> io::Result<()> {
        self.line.clear();
        serde_json::to_writer(&mut self.line, record)?;
        self.line.push(b'\n');

        if self.out.is_none() {
            self.open_current()?;
        }
        let res = match &mut self.out {
            Some(w) => w.write_all(&self.line).and_then(|_| w.flush()),
            None => Ok(()),
        };
        if let Err(e) = res {
            // Part of the line may be on disk; recount before the next append.
            self.out = None;
            self.recount = true;
            return Err(e);
        }

        self.rows_in_shard += 1;
        if self.rows_in_shard >= self.rows_per_shard {
            // Already flushed above, so dropping the handle cannot lose the row.
            self.out = None;
            self.index += 1;
            self.rows_in_shard = 0;
        }
        Ok(())
    }

    fn open_current(&mut self) -> io::Result<()> {
        if self.recount {
            let path = self.current_path();
            if path.exists() {
                self.rows_in_shard = repair_and_count_rows(&path)?;
                if self.rows_in_shard >= self.rows_per_shard {
                    self.index += 1;
                    self.rows_in_shard = 0;
                }
            }
            self.recount = false;
        }
        let f = append_with_backoff(&self.current_path(), OPEN_TRIES, OPEN_DELAY_MS)?;
        self.out = Some(BufWriter::with_capacity(self.write_buf, f));
        Ok(())
    }

    fn seal(&mut self) -> io::Result<()> {
        if let Some(mut w) = self.out.take() {
            w.flush()?;
        }
        Ok(())
    }

    /// Seal the open shard. Safe to call repeatedly.
    pub fn close(&mut self) -> io::Result<()> {
        self.seal()
    }
}

impl Drop for ShardWriter {
    fn drop(&mut self) {
        let _ = self.seal();
    }
}

/// Highest-indexed existing shard for `prefix` in `dir`, if any.
fn last_shard(dir: &Path, prefix: &str) -> Result<Option<(u32, PathBuf)>> {
    let re = Regex::new(&format!(r"^{}_(\d{{4,}})\.jsonl$", regex::escape(prefix)))
        .with_context(|| format!("build shard name pattern for prefix {prefix:?}"))?;
    let mut best: Option<(u32, PathBuf)> = None;
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let ent = entry.with_context(|| format!("scan output dir {}", dir.display()))?;
        if !ent.file_type().is_file() {
            continue;
        }
        let Some(name) = ent.file_name().to_str() else { continue };
        let Some(caps) = re.captures(name) else { continue };
        let Ok(idx) = caps[1].parse::<u32>() else { continue };
        if best.as_ref().map_or(true, |(b, _)| idx > *b) {
            best = Some((idx, ent.into_path()));
        }
    }
    Ok(best)
}

/// Count complete rows in an existing shard. A torn last line (crash or failed
/// write mid-append) is cut off so the shard stays valid JSONL; that row was
/// never confirmed and gets written again.
fn repair_and_count_rows(path: &Path) -> io::Result<u64> {
    let f = open_with_backoff(path, OPEN_TRIES, OPEN_DELAY_MS)?;
    let mut r = BufReader::with_capacity(256 * 1024, f);
    let mut rows = 0u64;
    let mut len = 0u64;
    let mut keep = 0u64; // byte just past the last '\n'
    loop {
        let chunk = r.fill_buf()?;
        if chunk.is_empty() {
            break;
        }
        rows += chunk.iter().filter(|&&b| b == b'\n').count() as u64;
        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            keep = len + pos as u64 + 1;
        }
        let n = chunk.len();
        len += n as u64;
        r.consume(n);
    }

    if keep < len {
        tracing::warn!(path = %path.display(), bytes = len - keep, "Dropping torn last line of shard");
        let f = OpenOptions::new().write(true).open(path)?;
        f.set_len(keep)?;
        f.sync_data()?;
    }
    Ok(rows)
}
