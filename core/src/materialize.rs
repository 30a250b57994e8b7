use std::{
  collections::hash_map::DefaultHasher,
  fs,
  hash::{Hash, Hasher},
  io::Write,
  path::PathBuf,
};

use crate::engine::CoreError;

/// Stable coordinates of one field, used to derive the materialized path.
pub(crate) struct LeafIdentity<'a> {
  pub manifest_path: &'a str,
  pub shard_filename: &'a str,
  pub record_index: u32,
  pub field_index: usize,
}

/// Write field bytes to a deterministic temporary path.
///
/// The path is a pure function of the identity tuple plus the extension, so
/// re-materializing the same field overwrites in place instead of piling up
/// files. The handle is flushed and closed before the path is returned.
pub(crate) fn materialize(
  bytes: &[u8],
  extension: Option<&str>,
  identity: &LeafIdentity<'_>,
) -> Result<PathBuf, CoreError> {
  let dir = std::env::temp_dir().join("shardview");
  fs::create_dir_all(&dir)?;

  let ext = extension.unwrap_or("bin");
  let out = dir.join(format!(
    "{}-{:08x}-r{}-f{}.{}",
    sanitize(identity.shard_filename),
    manifest_tag(identity.manifest_path),
    identity.record_index,
    identity.field_index,
    ext
  ));

  let mut file = fs::File::create(&out)?;
  file.write_all(bytes)?;
  file.sync_all()?;
  drop(file);
  Ok(out)
}

/// Short stable tag so leaves from different manifests never collide even
/// when their shard filenames match.
fn manifest_tag(manifest_path: &str) -> u64 {
  let mut hasher = DefaultHasher::new();
  manifest_path.hash(&mut hasher);
  hasher.finish() & 0xFFFF_FFFF
}

fn sanitize(input: &str) -> String {
  input
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
    .collect()
}
