use std::{
  collections::HashSet,
  fs,
  io::Read,
  path::{Path, PathBuf},
};

use serde::Deserialize;
use uuid::Uuid;

use crate::{
  engine::CoreError,
  models::{DatasetManifest, FieldFormat, ShardSummary},
  shard,
};

/// On-disk manifest document. Field names follow the dataset's wire format.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestDoc {
  shards: Vec<ManifestShard>,
  field_formats: Vec<String>,
  compression: Option<String>,
  nominal_records_per_shard: Option<u32>,
  nominal_shard_bytes: Option<u64>,
  #[serde(default)]
  raw_config: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestShard {
  filename: String,
  record_count: u32,
  byte_size: u64,
  fixed_dim: Option<u32>,
}

/// Parse the manifest at (or inside) `path` into an immutable summary.
///
/// A shard file handed in directly resolves to the manifest sitting next to
/// it; a shard with no neighboring manifest is summarized on its own.
pub(crate) fn load(path: &Path) -> Result<DatasetManifest, CoreError> {
  if path.is_file() && is_shard_path(path) {
    if let Some(neighbor) = find_neighbor_manifest(path) {
      return from_document(&neighbor, None);
    }
    let only = [path.to_path_buf()];
    return synthesize_from_shards(&only);
  }
  let resolved = resolve_manifest_path(path)?;
  from_document(&resolved, None)
}

/// Summarize a bare list of shard files.
///
/// When a manifest document sits next to the first shard its configuration
/// (field layout, compression) is adopted and the shard list is narrowed to
/// the selected files; otherwise the summary is synthesized from the shard
/// headers alone.
pub(crate) fn load_from_raw_shards(paths: &[PathBuf]) -> Result<DatasetManifest, CoreError> {
  if let Some(first) = paths.first() {
    if let Some(neighbor) = find_neighbor_manifest(first) {
      return from_document(&neighbor, Some(paths));
    }
  }
  synthesize_from_shards(paths)
}

/// Parse a resolved manifest document. With `selection` set, the shard list is
/// narrowed to the selected filenames; selected files the document does not
/// name are probed directly and listed under the same configuration.
fn from_document(
  resolved: &Path,
  selection: Option<&[PathBuf]>,
) -> Result<DatasetManifest, CoreError> {
  let content = read_manifest_text(resolved)?;
  let doc: ManifestDoc = serde_json::from_str(&content)
    .map_err(|e| CoreError::Malformed(format!("{}: {e}", resolved.display())))?;
  if doc.field_formats.is_empty() {
    return Err(CoreError::Malformed(format!(
      "{}: fieldFormats names no fields",
      resolved.display()
    )));
  }

  let root_dir = parent_dir(resolved);
  let selected: Option<HashSet<String>> = selection.map(|paths| {
    paths
      .iter()
      .filter_map(|p| p.file_name().and_then(|f| f.to_str()).map(str::to_string))
      .collect()
  });

  let mut shards = Vec::with_capacity(doc.shards.len());
  for s in doc.shards {
    if let Some(sel) = &selected {
      if !sel.contains(&s.filename) {
        continue;
      }
    }
    let absolute = root_dir.join(&s.filename);
    let exists_on_disk = probe_exists(&absolute)?;
    shards.push(ShardSummary {
      filename: s.filename,
      absolute_path: absolute.display().to_string(),
      record_count: s.record_count,
      byte_size: s.byte_size,
      fixed_dim: s.fixed_dim,
      exists_on_disk,
    });
  }

  if let Some(paths) = selection {
    let covered: HashSet<String> = shards.iter().map(|s| s.filename.clone()).collect();
    for p in paths {
      let filename = p
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("shard.bin")
        .to_string();
      if covered.contains(&filename) {
        continue;
      }
      if !probe_exists(p)? {
        return Err(CoreError::NotFound(p.display().to_string()));
      }
      let (record_count, byte_size) = shard::read_raw_header(p)?;
      shards.push(ShardSummary {
        filename,
        absolute_path: p.display().to_string(),
        record_count,
        byte_size,
        fixed_dim: None,
        exists_on_disk: true,
      });
    }
  }

  Ok(DatasetManifest {
    manifest_id: Uuid::new_v4().to_string(),
    manifest_path: resolved.display().to_string(),
    root_dir: root_dir.display().to_string(),
    field_formats: doc.field_formats.iter().map(|s| FieldFormat::from_label(s)).collect(),
    compression: doc.compression,
    nominal_records_per_shard: doc.nominal_records_per_shard,
    nominal_shard_bytes: doc.nominal_shard_bytes,
    raw_config: doc.raw_config,
    shards,
  })
}

/// Synthesize a manifest from shard headers alone.
///
/// The field layout is unknown here, so the summary carries a single `Unknown`
/// placeholder format and every record is treated as one opaque field.
fn synthesize_from_shards(paths: &[PathBuf]) -> Result<DatasetManifest, CoreError> {
  let first = paths
    .first()
    .ok_or_else(|| CoreError::Malformed("no shard paths provided".into()))?;
  let root_dir = parent_dir(first);

  let mut shards = Vec::with_capacity(paths.len());
  for p in paths {
    if !probe_exists(p)? {
      return Err(CoreError::NotFound(p.display().to_string()));
    }
    let (record_count, byte_size) = shard::read_raw_header(p)?;
    let filename = p
      .file_name()
      .and_then(|f| f.to_str())
      .unwrap_or("shard.bin")
      .to_string();
    shards.push(ShardSummary {
      filename,
      absolute_path: p.display().to_string(),
      record_count,
      byte_size,
      fixed_dim: None,
      exists_on_disk: true,
    });
  }

  Ok(DatasetManifest {
    manifest_id: Uuid::new_v4().to_string(),
    manifest_path: first.display().to_string(),
    root_dir: root_dir.display().to_string(),
    field_formats: vec![FieldFormat::Unknown("unknown".into())],
    compression: None,
    nominal_records_per_shard: None,
    nominal_shard_bytes: None,
    raw_config: serde_json::json!({ "source": "raw-shards" }),
    shards,
  })
}

/// Stat a path; a clean "does not exist" becomes `false`, any other stat
/// failure is surfaced to the caller rather than masked.
fn probe_exists(path: &Path) -> Result<bool, CoreError> {
  match fs::metadata(path) {
    Ok(_) => Ok(true),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
    Err(e) => Err(CoreError::Io(e)),
  }
}

fn parent_dir(path: &Path) -> PathBuf {
  path
    .parent()
    .map(|p| p.to_path_buf())
    .unwrap_or_else(|| PathBuf::from("."))
}

const MANIFEST_CANDIDATES: [&str; 6] = [
  "index.json",
  "index.json.zstd",
  "index.json.zst",
  "0.index.json",
  "0.index.json.zstd",
  "0.index.json.zst",
];

/// Manifest documents also carry shard-like extensions (`index.json.zst`), so
/// the name is checked before the extension.
fn is_shard_path(path: &Path) -> bool {
  let name = match path.file_name().and_then(|f| f.to_str()) {
    Some(n) => n,
    None => return false,
  };
  if name.contains("index.json") {
    return false;
  }
  let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
  ext.eq_ignore_ascii_case("bin") || ext.eq_ignore_ascii_case("zst") || name.contains(".bin")
}

/// Look for a manifest document in the shard's directory: the well-known
/// candidate names first, then any `*.index.json` (or compressed variant),
/// lowest sorted name winning.
fn find_neighbor_manifest(shard_path: &Path) -> Option<PathBuf> {
  let parent = shard_path.parent()?;
  for name in MANIFEST_CANDIDATES {
    let candidate = parent.join(name);
    if candidate.is_file() {
      return Some(candidate);
    }
  }

  let mut found: Vec<PathBuf> = fs::read_dir(parent)
    .ok()?
    .filter_map(|entry| entry.ok().map(|e| e.path()))
    .filter(|p| {
      p.is_file()
        && p
          .file_name()
          .and_then(|f| f.to_str())
          .map(|n| n.ends_with(".index.json") || n.contains(".index.json."))
          .unwrap_or(false)
    })
    .collect();
  found.sort();
  found.into_iter().next()
}

fn resolve_manifest_path(path: &Path) -> Result<PathBuf, CoreError> {
  if path.is_file() {
    return Ok(path.to_path_buf());
  }
  if path.is_dir() {
    for name in MANIFEST_CANDIDATES {
      let candidate = path.join(name);
      if candidate.is_file() {
        return Ok(candidate);
      }
    }
  }
  Err(CoreError::NotFound(path.display().to_string()))
}

fn read_manifest_text(path: &Path) -> Result<String, CoreError> {
  let ext = path
    .extension()
    .and_then(|e| e.to_str())
    .unwrap_or("")
    .to_ascii_lowercase();
  if ext.contains("zst") {
    let file = fs::File::open(path)?;
    let mut decoder = zstd::stream::Decoder::new(file)?;
    let mut s = String::new();
    decoder.read_to_string(&mut s)?;
    Ok(s)
  } else {
    Ok(fs::read_to_string(path)?)
  }
}
