#![allow(dead_code)]

use serde_json::json;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use subfilter::SubredditFilter;

/// Write a compressed `.zst` file containing the provided JSONL lines.
/// This mirrors the corpus's RC_/RS_ monthly files but with tiny content.
pub fn write_zst_lines(path: &Path, lines: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let f = File::create(path).unwrap();
    let mut enc = zstd::stream::write::Encoder::new(f, 3).unwrap();
    for l in lines {
        writeln!(&mut enc, "{}", l).unwrap();
    }
    enc.finish().unwrap();
}

/// Write an uncompressed JSONL file, one entry per line, exactly as given.
pub fn write_plain_lines(path: &Path, lines: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut f = File::create(path).unwrap();
    for l in lines {
        writeln!(&mut f, "{}", l).unwrap();
    }
}

/// Read a JSONL file into a vector of `serde_json::Value` (skips empty lines).
pub fn read_jsonl_values(path: &Path) -> Vec<serde_json::Value> {
    read_lines(path)
        .into_iter()
        .map(|s| serde_json::from_str(&s).unwrap())
        .collect()
}

/// Read a text file line-by-line into strings (skips empty lines).
pub fn read_lines(path: &Path) -> Vec<String> {
    let f = File::open(path).unwrap();
    let r = BufReader::new(f);
    r.lines().map(|l| l.unwrap()).filter(|s| !s.is_empty()).collect()
}

/// A submission-like row.
pub fn post(id: &str, subreddit: &str) -> String {
    json!({
        "id": id, "author": "bob", "created_utc": 1672531200,
        "subreddit": subreddit, "title": format!("post {id}"), "score": 1
    })
    .to_string()
}

/// A comment-like row.
pub fn comment(id: &str, subreddit: &str) -> String {
    json!({
        "id": id, "author": "alice", "body": "nice rack", "parent_id": "t3_x",
        "subreddit": subreddit, "created_utc": 1672531300
    })
    .to_string()
}

/// `n` submission rows with ids `r0..r{n-1}`, all in r/HomeLab.
pub fn homelab_posts(n: usize) -> Vec<String> {
    (0..n).map(|i| post(&format!("r{i}"), "HomeLab")).collect()
}

/// Sorted shard files for `prefix` in `dir`.
pub fn shard_files(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let mut v: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            let name = p.file_name().unwrap().to_string_lossy().into_owned();
            name.starts_with(&format!("{prefix}_")) && name.ends_with(".jsonl")
        })
        .collect();
    v.sort();
    v
}

/// All `id` values written across the shards of `prefix`, in shard order.
pub fn written_ids(dir: &Path, prefix: &str) -> Vec<String> {
    shard_files(dir, prefix)
        .iter()
        .flat_map(|p| read_jsonl_values(p))
        .map(|v| v["id"].as_str().unwrap().to_string())
        .collect()
}

/// Error-log entries are the lines that start with `[`.
pub fn error_entries(log: &Path) -> Vec<String> {
    if !log.exists() {
        return Vec::new();
    }
    fs::read_to_string(log)
        .unwrap()
        .lines()
        .filter(|l| l.starts_with('['))
        .map(|l| l.to_string())
        .collect()
}

/// Filter targeting the self-hosting family, with progress bars off.
pub fn quiet_filter(input: &Path, out: &Path) -> SubredditFilter {
    SubredditFilter::new()
        .input(input)
        .output_dir(out)
        .targets(["selfhosting", "selfhosted", "homelab", "homeserver", "homenetworking"])
        .progress(false)
}
