// file: src/sync/mod.rs
// description: incremental synchronization module exports
// reference: internal module structure

pub mod engine;
pub mod lock;
pub mod planner;
pub mod progress;

pub use engine::{RepositoryOutcome, SyncEngine, SyncOptions};
pub use lock::{SyncGuard, SyncLocks};
pub use planner::{ChangeKind, SyncDiff, plan};
pub use progress::{FetchStats, ProgressTracker};
