mod engine;
mod manifest;
mod materialize;
mod models;
mod preview;
mod record;
mod shard;
mod storage;

pub use crate::engine::{CoreEngine, CoreOptions};
pub use crate::models::{
  DatasetManifest, FieldFormat, FieldMeta, FieldPreview, RecordMeta, ShardSummary,
};
pub use crate::storage::{RecentManifest, Storage, StorageOptions};

pub use crate::engine::CoreError;
