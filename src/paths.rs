use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Kind of records held by an input file, decided from its name alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Submission,   // RS_YYYY-MM.*
    Comment,      // RC_YYYY-MM.*
    Unrecognized,
}

impl RecordKind {
    pub fn label(self) -> &'static str {
        match self {
            RecordKind::Submission => "submission",
            RecordKind::Comment => "comment",
            RecordKind::Unrecognized => "unknown",
        }
    }
}

/// Classify by case-insensitive substring of the base name: `rs_` wins over `rc_`.
/// Pure: no filesystem access.
pub fn classify(path: &Path) -> RecordKind {
    let Some(base) = path.file_name().and_then(|n| n.to_str()) else {
        return RecordKind::Unrecognized;
    };
    let base = base.to_lowercase();
    if base.contains("rs_") {
        RecordKind::Submission
    } else if base.contains("rc_") {
        RecordKind::Comment
    } else {
        RecordKind::Unrecognized
    }
}

/// Canonical form used to compare an enumerated file against a checkpointed one.
/// Falls back to the given path when it no longer exists.
pub fn path_key(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// List regular files under `root` (or `root` itself when it is a file), sorted.
///
/// The root is canonicalized first so the returned paths are absolute and stable
/// across runs; sorting makes enumeration order independent of the platform's
/// directory order, which the resume protocol relies on.
pub fn discover_inputs(root: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let root = fs::canonicalize(root)
        .with_context(|| format!("input path {} is not accessible", root.display()))?;
    if root.is_file() {
        return Ok(vec![root]);
    }

    let mut walker = WalkDir::new(&root).min_depth(1);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        match entry {
            Ok(ent) if ent.file_type().is_file() => files.push(ent.into_path()),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Skipping unreadable directory entry"),
        }
    }
    files.sort();
    Ok(files)
}
