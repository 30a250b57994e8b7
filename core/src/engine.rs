use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::Arc,
};

use parking_lot::Mutex;
use thiserror::Error;

use crate::{
  manifest,
  materialize::{self, LeafIdentity},
  models::{DatasetManifest, FieldPreview, RecordMeta},
  preview::{self, PreviewLimits},
  record,
  shard::{self, ShardCache, ShardHandle},
  storage::{Storage, StorageOptions},
};

#[derive(Debug, Error)]
pub enum CoreError {
  #[error("not found: {0}")]
  NotFound(String),
  #[error("malformed manifest: {0}")]
  Malformed(String),
  #[error("corrupt shard: {0}")]
  CorruptShard(String),
  #[error("index out of range: {0}")]
  IndexOutOfRange(String),
  #[error("unsupported compression: {0}")]
  UnsupportedCompression(String),
  #[error("resource limit: {0}")]
  ResourceLimit(String),
  #[error("unknown manifest: {0}")]
  UnknownManifest(String),
  #[error("storage error: {0}")]
  Storage(String),
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct CoreOptions {
  /// Char budget for textual field previews.
  pub preview_max_chars: usize,
  /// Leading bytes sampled for binary/text classification.
  pub classify_sample_bytes: usize,
  /// Leading bytes rendered into the hex snippet.
  pub hex_snippet_bytes: usize,
  /// Safety ceiling for a decompressed shard data region.
  pub max_decompressed_bytes: usize,
  pub storage: StorageOptions,
}

impl Default for CoreOptions {
  fn default() -> Self {
    Self {
      preview_max_chars: 400,
      classify_sample_bytes: 4096,
      hex_snippet_bytes: 256,
      max_decompressed_bytes: 512 * 1024 * 1024,
      storage: StorageOptions::default(),
    }
  }
}

/// The manifest-and-shard reading engine.
///
/// Each operation is an independent short-lived request; the only shared
/// mutable state is the single-slot decompressed-shard cache, which readers
/// use through reference-counted views. The engine is `Clone` and all methods
/// take `&self`, so a shell can run requests for different shards in parallel.
/// Decompression is CPU-bound and belongs on a blocking worker, not the
/// interactive thread; that dispatch is the caller's job.
#[derive(Clone)]
pub struct CoreEngine {
  options: CoreOptions,
  manifests: Arc<Mutex<HashMap<String, DatasetManifest>>>,
  cache: ShardCache,
  storage: Storage,
}

impl CoreEngine {
  pub fn new(options: CoreOptions) -> Result<Self, CoreError> {
    let storage = Storage::new(options.storage.clone()).map_err(CoreError::Storage)?;
    Ok(Self {
      options,
      manifests: Arc::new(Mutex::new(HashMap::new())),
      cache: ShardCache::default(),
      storage,
    })
  }

  /// IPC API: load_manifest(path) -> DatasetManifest
  pub fn load_manifest(&self, path: impl AsRef<Path>) -> Result<DatasetManifest, CoreError> {
    let summary = manifest::load(path.as_ref())?;
    self.remember_opened(&summary);
    self
      .manifests
      .lock()
      .insert(summary.manifest_id.clone(), summary.clone());
    Ok(summary)
  }

  /// IPC API: load_from_raw_shards(paths) -> DatasetManifest
  ///
  /// For shard files with no accompanying manifest document.
  pub fn load_from_raw_shards(&self, paths: &[PathBuf]) -> Result<DatasetManifest, CoreError> {
    let summary = manifest::load_from_raw_shards(paths)?;
    self.remember_opened(&summary);
    self
      .manifests
      .lock()
      .insert(summary.manifest_id.clone(), summary.clone());
    Ok(summary)
  }

  pub fn get_manifest(&self, manifest_id: &str) -> Result<DatasetManifest, CoreError> {
    self.manifest_snapshot(manifest_id)
  }

  /// IPC API: list_records(manifest_id, shard_filename) -> Vec<RecordMeta>
  pub fn list_records(
    &self,
    manifest_id: &str,
    shard_filename: &str,
  ) -> Result<Vec<RecordMeta>, CoreError> {
    let m = self.manifest_snapshot(manifest_id)?;
    let handle = self.open_shard(&m, shard_filename)?;
    record::list_records(&handle, &m.field_formats)
  }

  /// IPC API: preview_field(manifest_id, shard_filename, record_index, field_index) -> FieldPreview
  pub fn preview_field(
    &self,
    manifest_id: &str,
    shard_filename: &str,
    record_index: u32,
    field_index: usize,
  ) -> Result<FieldPreview, CoreError> {
    let m = self.manifest_snapshot(manifest_id)?;
    let handle = self.open_shard(&m, shard_filename)?;
    let bytes = record::read_field(&handle, &m.field_formats, record_index, field_index)?;
    let limits = PreviewLimits {
      text_max_chars: self.options.preview_max_chars,
      sample_bytes: self.options.classify_sample_bytes,
      hex_bytes: self.options.hex_snippet_bytes,
    };
    Ok(preview::preview(&bytes, m.field_formats.get(field_index), &limits))
  }

  /// IPC API: materialize_field(manifest_id, shard_filename, record_index, field_index) -> path
  ///
  /// Writes the field to a deterministic temp path; launching a viewer on it
  /// is the shell's responsibility.
  pub fn materialize_field(
    &self,
    manifest_id: &str,
    shard_filename: &str,
    record_index: u32,
    field_index: usize,
  ) -> Result<PathBuf, CoreError> {
    let m = self.manifest_snapshot(manifest_id)?;
    let handle = self.open_shard(&m, shard_filename)?;
    let bytes = record::read_field(&handle, &m.field_formats, record_index, field_index)?;
    let extension = preview::guess_extension(m.field_formats.get(field_index), &bytes);
    materialize::materialize(
      &bytes,
      extension.as_deref(),
      &LeafIdentity {
        manifest_path: &m.manifest_path,
        shard_filename,
        record_index,
        field_index,
      },
    )
  }

  pub fn storage(&self) -> &Storage {
    &self.storage
  }

  fn manifest_snapshot(&self, manifest_id: &str) -> Result<DatasetManifest, CoreError> {
    self
      .manifests
      .lock()
      .get(manifest_id)
      .cloned()
      .ok_or_else(|| CoreError::UnknownManifest(manifest_id.to_string()))
  }

  fn open_shard(&self, m: &DatasetManifest, shard_filename: &str) -> Result<ShardHandle, CoreError> {
    let summary = m
      .shards
      .iter()
      .find(|s| s.filename == shard_filename)
      .ok_or_else(|| CoreError::NotFound(format!("{shard_filename} not in manifest")))?;
    shard::open_shard(
      Path::new(&summary.absolute_path),
      m.compression.as_deref(),
      &self.cache,
      self.options.max_decompressed_bytes,
    )
  }

  /// Best-effort persistence; a broken recents store never fails a load.
  fn remember_opened(&self, summary: &DatasetManifest) {
    let _ = self.storage.touch_recent(summary);
    let _ = self.storage.set_last_opened(&summary.manifest_path);
  }
}
