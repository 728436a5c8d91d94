#[path = "common/mod.rs"]
mod common;

use common::*;
use std::collections::BTreeMap;
use std::fs;
use subfilter::{Checkpoint, CheckpointStore, MemoryCheckpointStore};

/// Store that behaves like a process killed right after the last cadence save:
/// the end-of-file save fails the run.
struct KillAtEof {
    inner: MemoryCheckpointStore,
}

impl CheckpointStore for KillAtEof {
    fn load(&self) -> anyhow::Result<Option<Checkpoint>> {
        self.inner.load()
    }

    fn save(&mut self, cp: &Checkpoint) -> anyhow::Result<()> {
        if cp.complete {
            anyhow::bail!("killed before saving row {}", cp.row);
        }
        self.inner.save(cp)
    }
}

/// Crash scenario:
/// - run 1 sees 1500 rows, cadence 1000, and dies before the end-of-file save
/// - the file is then completed to 3000 rows and run 2 resumes
/// Expectation: every id appears, ids 1000..1499 appear exactly twice and no
/// others repeat, and shard capacity holds across both runs.
#[test]
fn crash_after_cadence_save_resumes_with_bounded_duplicates() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("RS_2023-01.jsonl");
    let out = tmp.path().join("out");

    write_plain_lines(&input, &homelab_posts(1500));
    let mut store = KillAtEof { inner: MemoryCheckpointStore::new() };
    let filter = quiet_filter(&input, &out).checkpoint_every(1000).rows_per_shard(700);

    let err = filter.run_with_store(&mut store).unwrap_err();
    assert!(format!("{err:#}").contains("killed before saving row 1500"), "got: {err:#}");
    let cp = store.inner.current().unwrap();
    assert_eq!(cp.row, 1000);
    assert_eq!(cp.file, fs::canonicalize(&input).unwrap());

    write_plain_lines(&input, &homelab_posts(3000));
    let summary = filter.run_with_store(&mut store.inner).unwrap();
    assert_eq!(summary.rows_read, 2000);
    let done = store.inner.current().unwrap();
    assert_eq!((done.row, done.complete), (3000, true));

    let mut seen: BTreeMap<u64, u32> = BTreeMap::new();
    for id in written_ids(&out, "filtered_submissions") {
        let n: u64 = id.trim_start_matches('r').parse().unwrap();
        *seen.entry(n).or_default() += 1;
    }
    assert_eq!(seen.len(), 3000, "no gaps");
    for (n, count) in &seen {
        let expected = if (1000..1500).contains(n) { 2 } else { 1 };
        assert_eq!(*count, expected, "id r{n}");
    }

    let shards = shard_files(&out, "filtered_submissions");
    assert_eq!(shards.len(), 5);
    let (last, full) = shards.split_last().unwrap();
    for s in full {
        assert_eq!(read_lines(s).len(), 700, "{}", s.display());
    }
    assert!(read_lines(last).len() <= 700);
}

/// A hand-written checkpoint skips earlier files and the first rows of its own file.
#[test]
fn resume_skips_files_and_rows_before_checkpoint() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in");
    let out = tmp.path().join("out");
    let posts = |p: &str, n: usize| (0..n).map(|i| post(&format!("{p}{i}"), "homelab")).collect::<Vec<_>>();
    write_plain_lines(&input.join("RS_2023-01.jsonl"), &posts("j", 3));
    write_plain_lines(&input.join("RS_2023-02.jsonl"), &posts("f", 4));
    write_plain_lines(&input.join("RS_2023-03.jsonl"), &posts("m", 2));

    let feb = fs::canonicalize(input.join("RS_2023-02.jsonl")).unwrap();
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("progress.log"), format!("{}\t2\n", feb.display())).unwrap();

    let summary = quiet_filter(&input, &out).run().unwrap();

    assert_eq!(written_ids(&out, "filtered_submissions"), vec!["f2", "f3", "m0", "m1"]);
    assert_eq!(summary.files_skipped, 1);
    assert_eq!(summary.files_processed, 2);

    let mar = fs::canonicalize(input.join("RS_2023-03.jsonl")).unwrap();
    let saved = fs::read_to_string(out.join("progress.log")).unwrap();
    assert_eq!(saved, format!("{}\t2\tdone\n", mar.display()));
}

/// A second run over finished input reads and writes nothing, and does not
/// even open the last finished file.
#[test]
fn rerun_after_completion_is_a_no_op() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in");
    let out = tmp.path().join("out");
    write_plain_lines(&input.join("RC_2023-01.jsonl"), &[comment("c1", "homelab")]);
    write_plain_lines(&input.join("RS_2023-01.jsonl"), &homelab_posts(3));

    let first = quiet_filter(&input, &out).run().unwrap();
    assert_eq!(first.rows_written, 4);
    let before = fs::read_to_string(out.join("filtered_submissions_0000.jsonl")).unwrap();
    // Rows appended after completion would be read if the file were reopened.
    write_plain_lines(&input.join("RS_2023-01.jsonl"), &homelab_posts(6));

    let second = quiet_filter(&input, &out).run().unwrap();
    assert_eq!(second.rows_read, 0);
    assert_eq!(second.rows_written, 0);
    assert_eq!(second.files_skipped, 2);
    assert_eq!(second.files_processed, 0);
    assert_eq!(fs::read_to_string(out.join("filtered_submissions_0000.jsonl")).unwrap(), before);
    assert_eq!(written_ids(&out, "filtered_comments"), vec!["c1"]);
}

/// Cadence saves land on every multiple of `checkpoint_every`, plus one at end of file.
#[test]
fn checkpoint_cadence_and_end_of_file_save() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("RS_2023-01.jsonl");
    let out = tmp.path().join("out");
    let mut lines = homelab_posts(25);
    lines[10] = "{broken".to_string();
    lines[11] = post("r11", "funny");
    write_plain_lines(&input, &lines);

    let mut store = MemoryCheckpointStore::new();
    let summary = quiet_filter(&input, &out)
        .checkpoint_every(10)
        .run_with_store(&mut store)
        .unwrap();

    // Row 10 failed and still counts toward the cadence.
    let rows: Vec<(u64, bool)> = store.history().iter().map(|c| (c.row, c.complete)).collect();
    assert_eq!(rows, vec![(0, false), (10, false), (20, false), (25, true)]);
    assert_eq!(summary.checkpoint_saves, 4);
    let canon = fs::canonicalize(&input).unwrap();
    assert!(store.history().iter().all(|c| c.file == canon));
}

/// A checkpoint naming a file that no longer exists resumes at the next file in order.
#[test]
fn missing_checkpoint_file_continues_with_next_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in");
    let out = tmp.path().join("out");
    write_plain_lines(&input.join("RS_2023-01.jsonl"), &[post("jan", "homelab")]);
    write_plain_lines(&input.join("RS_2023-03.jsonl"), &[post("mar", "homelab")]);

    let gone = fs::canonicalize(&input).unwrap().join("RS_2023-02.jsonl");
    let mut store = MemoryCheckpointStore::with_checkpoint(Checkpoint::new(&gone, 7));
    let summary = quiet_filter(&input, &out).run_with_store(&mut store).unwrap();

    assert_eq!(written_ids(&out, "filtered_submissions"), vec!["mar"]);
    assert_eq!(summary.files_skipped, 1);
}

/// A checkpoint ordered after every input file processes nothing.
#[test]
fn checkpoint_past_all_inputs_processes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in");
    let out = tmp.path().join("out");
    write_plain_lines(&input.join("RS_2023-01.jsonl"), &[post("jan", "homelab")]);

    let later = fs::canonicalize(&input).unwrap().join("RS_2099-12.jsonl");
    let mut store = MemoryCheckpointStore::with_checkpoint(Checkpoint::new(&later, 1));
    let summary = quiet_filter(&input, &out).run_with_store(&mut store).unwrap();

    assert_eq!(summary.rows_read, 0);
    assert_eq!(summary.files_skipped, 1);
    assert!(shard_files(&out, "filtered_submissions").is_empty());
    assert!(store.history().is_empty());
}

/// A torn trailing line left by a crash is cut off before new rows are
/// appended, so every shard line stays valid JSON.
#[test]
fn torn_shard_line_is_dropped_on_resume() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("RS_2023-01.jsonl");
    let out = tmp.path().join("out");
    write_plain_lines(&input, &homelab_posts(3));
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("filtered_submissions_0000.jsonl"), "{\"id\":\"old\"}\n{\"id\":\"to").unwrap();

    quiet_filter(&input, &out).rows_per_shard(3).run().unwrap();

    for shard in shard_files(&out, "filtered_submissions") {
        let bad: Vec<String> = read_lines(&shard)
            .into_iter()
            .filter(|l| serde_json::from_str::<serde_json::Value>(l).is_err())
            .collect();
        assert!(bad.is_empty(), "invalid lines in {}: {bad:?}", shard.display());
    }
    assert_eq!(written_ids(&out, "filtered_submissions"), vec!["old", "r0", "r1", "r2"]);
    assert_eq!(read_lines(&out.join("filtered_submissions_0000.jsonl")).len(), 3);
}

/// Shard numbering continues across runs instead of restarting at 0000.
#[test]
fn shard_numbering_continues_across_runs() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    let jan = tmp.path().join("RS_2023-01.jsonl");
    let feb = tmp.path().join("RS_2023-02.jsonl");
    write_plain_lines(&jan, &homelab_posts(3));
    write_plain_lines(&feb, &(3..6).map(|i| post(&format!("r{i}"), "homelab")).collect::<Vec<_>>());

    quiet_filter(&jan, &out).rows_per_shard(2).run().unwrap();
    quiet_filter(&feb, &out).rows_per_shard(2).run().unwrap();

    let shards = shard_files(&out, "filtered_submissions");
    assert_eq!(shards.len(), 3);
    for s in &shards {
        assert_eq!(read_lines(s).len(), 2);
    }
    assert_eq!(
        written_ids(&out, "filtered_submissions"),
        vec!["r0", "r1", "r2", "r3", "r4", "r5"]
    );
}
