use anyhow::Result;
use subfilter::{init_tracing_once, SubredditFilter};

const INPUT_ROOT: &str = "./testdata";
const OUTPUT_DIR: &str = "./filtered_output";
const RECURSIVE: bool = true;

const TARGET_SUBREDDITS: &[&str] = &[
    "selfhosting", "selfhosted", "homelab", "homeserver", "homenetworking",
];

fn main() -> Result<()> {
    init_tracing_once();

    let summary = SubredditFilter::new()
        .input(INPUT_ROOT)
        .recursive(RECURSIVE)
        .targets(TARGET_SUBREDDITS)
        .output_dir(OUTPUT_DIR)
        .submissions_prefix("filtered_submissions")
        .comments_prefix("filtered_comments")
        .rows_per_shard(100_000)
        .checkpoint_every(1_000)
        .progress(true)
        .run()?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    println!("Done :>");
    Ok(())
}
