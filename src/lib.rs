mod config;
mod paths;
mod record_stream;
mod filters;
mod shard;
mod checkpoint;
mod error;
mod error_log;
mod progress;
mod util;
mod pipeline;

pub use crate::config::{FilterOptions, DEFAULT_CHECKPOINT_EVERY, DEFAULT_ROWS_PER_SHARD};
pub use crate::pipeline::{handle_row, RowOutcome, RunSummary, SubredditFilter};

// Component building blocks, usable on their own.
pub use crate::paths::{classify, discover_inputs, RecordKind};
pub use crate::record_stream::{open_record_stream, Container, Record, RecordStream, Records};
pub use crate::filters::{category_lower, normalize_category, TargetSet};
pub use crate::shard::ShardWriter;
pub use crate::checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use crate::error::{ContainerError, RowError};
pub use crate::error_log::ErrorLog;
pub use crate::progress::FileProgress;

// Robust file ops and tracing setup, so binaries can import from crate root.
pub use crate::util::{init_tracing_once, open_with_backoff, create_with_backoff, append_with_backoff, replace_file_atomic_backoff};
