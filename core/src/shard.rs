use std::{
  fs::File,
  io::{Read, Seek, SeekFrom},
  path::{Path, PathBuf},
  sync::Arc,
};

use parking_lot::Mutex;

use crate::engine::CoreError;

/// Single-slot cache for the decompressed data region of the most recently
/// opened compressed shard. Installing a different shard evicts the previous
/// buffer; readers keep an `Arc` view, so eviction only frees memory once the
/// last in-flight reader drops its clone. The slot swap itself is the only
/// critical section.
#[derive(Clone, Default)]
pub(crate) struct ShardCache {
  slot: Arc<Mutex<Option<CacheSlot>>>,
}

struct CacheSlot {
  key: PathBuf,
  data: Arc<Vec<u8>>,
}

impl ShardCache {
  fn lookup(&self, key: &Path) -> Option<Arc<Vec<u8>>> {
    let slot = self.slot.lock();
    slot.as_ref().filter(|s| s.key == key).map(|s| s.data.clone())
  }

  fn install(&self, key: &Path, data: Arc<Vec<u8>>) {
    let mut slot = self.slot.lock();
    *slot = Some(CacheSlot {
      key: key.to_path_buf(),
      data,
    });
  }
}

enum DataRegion {
  /// Uncompressed shard: slices are read from the file on demand.
  File { path: PathBuf, start: u64 },
  /// Decompressed shard resident in memory, shared with the cache slot.
  Memory(Arc<Vec<u8>>),
}

impl DataRegion {
  fn read_exact_at(&self, offset: u64, len: usize) -> Result<Vec<u8>, CoreError> {
    match self {
      DataRegion::File { path, start } => {
        let mut f = File::open(path)?;
        f.seek(SeekFrom::Start(start + offset))?;
        let mut buf = vec![0u8; len];
        f.read_exact(&mut buf)?;
        Ok(buf)
      }
      DataRegion::Memory(buf) => {
        let end = offset
          .checked_add(len as u64)
          .filter(|e| *e <= buf.len() as u64)
          .ok_or_else(|| CoreError::CorruptShard("slice beyond data region".into()))?;
        Ok(buf[offset as usize..end as usize].to_vec())
      }
    }
  }
}

/// One opened shard: a validated record offset table over a data region.
pub(crate) struct ShardHandle {
  record_count: u32,
  offsets: Vec<u32>,
  data: DataRegion,
}

impl ShardHandle {
  pub(crate) fn record_count(&self) -> u32 {
    self.record_count
  }

  fn record_span(&self, record_index: u32) -> Result<(u64, u64), CoreError> {
    if record_index >= self.record_count {
      return Err(CoreError::IndexOutOfRange(format!(
        "record {} of {}",
        record_index, self.record_count
      )));
    }
    let start = self.offsets[record_index as usize] as u64;
    let end = self.offsets[record_index as usize + 1] as u64;
    Ok((start, end - start))
  }

  pub(crate) fn record_len(&self, record_index: u32) -> Result<u64, CoreError> {
    self.record_span(record_index).map(|(_, len)| len)
  }

  pub(crate) fn slice_record(&self, record_index: u32) -> Result<Vec<u8>, CoreError> {
    let (start, len) = self.record_span(record_index)?;
    self.data.read_exact_at(start, len as usize)
  }

  /// Read the leading `len` bytes of a record (enough for its field sub-table)
  /// without pulling the whole payload into memory.
  pub(crate) fn read_record_prefix(&self, record_index: u32, len: usize) -> Result<Vec<u8>, CoreError> {
    let (start, record_len) = self.record_span(record_index)?;
    if (len as u64) > record_len {
      return Err(CoreError::CorruptShard(format!(
        "record {} is {} bytes, shorter than its {}-byte field table",
        record_index, record_len, len
      )));
    }
    self.data.read_exact_at(start, len)
  }
}

/// Open one shard file and validate its record offset table.
///
/// With `compression` set the entire data region is decoded up front (bounded
/// by `max_decompressed_bytes`) and parked in the single-slot `cache`.
pub(crate) fn open_shard(
  path: &Path,
  compression: Option<&str>,
  cache: &ShardCache,
  max_decompressed_bytes: usize,
) -> Result<ShardHandle, CoreError> {
  let mut file = match File::open(path) {
    Ok(f) => f,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      return Err(CoreError::NotFound(path.display().to_string()));
    }
    Err(e) => return Err(CoreError::Io(e)),
  };
  let file_len = file.metadata()?.len();

  let (record_count, offsets) = read_offset_table(&mut file, path)?;
  let table_end = 4 + (offsets.len() as u64) * 4;
  let declared_region = *offsets.last().unwrap_or(&0) as u64;

  let data = match compression {
    None => {
      let actual = file_len.saturating_sub(table_end);
      if actual != declared_region {
        return Err(CoreError::CorruptShard(format!(
          "{}: data region is {} bytes, offset table declares {}",
          path.display(),
          actual,
          declared_region
        )));
      }
      DataRegion::File {
        path: path.to_path_buf(),
        start: table_end,
      }
    }
    Some(codec) if codec.eq_ignore_ascii_case("zstd") => {
      let buf = match cache.lookup(path) {
        Some(buf) => buf,
        None => {
          // `file` is positioned just past the offset table. The decoded
          // region must match the declared length before it may occupy the
          // cache slot.
          let decoded = decompress_bounded(&mut file, max_decompressed_bytes)?;
          if decoded.len() as u64 != declared_region {
            return Err(CoreError::CorruptShard(format!(
              "{}: decompressed region is {} bytes, offset table declares {}",
              path.display(),
              decoded.len(),
              declared_region
            )));
          }
          let decoded = Arc::new(decoded);
          cache.install(path, decoded.clone());
          decoded
        }
      };
      // A cached buffer is re-checked in case the file changed on disk.
      if buf.len() as u64 != declared_region {
        return Err(CoreError::CorruptShard(format!(
          "{}: decompressed region is {} bytes, offset table declares {}",
          path.display(),
          buf.len(),
          declared_region
        )));
      }
      DataRegion::Memory(buf)
    }
    Some(other) => return Err(CoreError::UnsupportedCompression(other.to_string())),
  };

  Ok(ShardHandle {
    record_count,
    offsets,
    data,
  })
}

/// Read a shard header (record count + byte size) for raw-shard synthesis.
pub(crate) fn read_raw_header(path: &Path) -> Result<(u32, u64), CoreError> {
  let mut file = File::open(path)?;
  let file_len = file.metadata()?.len();
  let mut count_buf = [0u8; 4];
  file
    .read_exact(&mut count_buf)
    .map_err(|_| CoreError::CorruptShard(format!("{}: truncated header", path.display())))?;
  let record_count = u32::from_le_bytes(count_buf);
  let table_end = 4u64 + (record_count as u64 + 1) * 4;
  if file_len < table_end {
    return Err(CoreError::CorruptShard(format!(
      "{}: file too short for {}-record offset table",
      path.display(),
      record_count
    )));
  }
  Ok((record_count, file_len))
}

fn read_offset_table(file: &mut File, path: &Path) -> Result<(u32, Vec<u32>), CoreError> {
  let mut count_buf = [0u8; 4];
  file
    .read_exact(&mut count_buf)
    .map_err(|_| CoreError::CorruptShard(format!("{}: truncated header", path.display())))?;
  let record_count = u32::from_le_bytes(count_buf);

  let table_len = (record_count as usize + 1) * 4;
  let mut table = vec![0u8; table_len];
  file
    .read_exact(&mut table)
    .map_err(|_| CoreError::CorruptShard(format!("{}: truncated offset table", path.display())))?;

  let mut offsets = Vec::with_capacity(record_count as usize + 1);
  for chunk in table.chunks_exact(4) {
    offsets.push(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
  }
  validate_offsets(&offsets)
    .map_err(|msg| CoreError::CorruptShard(format!("{}: {msg}", path.display())))?;
  Ok((record_count, offsets))
}

/// Shared invariants for record offset tables and field sub-tables: the first
/// offset is zero and the sequence never decreases. The final-offset check is
/// scope specific and done by the caller.
pub(crate) fn validate_offsets(offsets: &[u32]) -> Result<(), String> {
  match offsets.first() {
    Some(0) => {}
    Some(first) => return Err(format!("first offset is {first}, expected 0")),
    None => return Err("empty offset table".into()),
  }
  for (i, pair) in offsets.windows(2).enumerate() {
    if pair[1] < pair[0] {
      return Err(format!("offset {} decreases: {} -> {}", i + 1, pair[0], pair[1]));
    }
  }
  Ok(())
}

/// Decode a zstd stream, refusing to allocate past `ceiling` bytes. On failure
/// nothing is retained: the partially decoded buffer is dropped here.
fn decompress_bounded(src: &mut File, ceiling: usize) -> Result<Vec<u8>, CoreError> {
  let mut decoder = zstd::stream::Decoder::new(src)?;
  let mut out = Vec::new();
  let mut chunk = [0u8; 64 * 1024];
  loop {
    let n = decoder
      .read(&mut chunk)
      .map_err(|e| CoreError::CorruptShard(format!("zstd decode: {e}")))?;
    if n == 0 {
      break;
    }
    if out.len() + n > ceiling {
      return Err(CoreError::ResourceLimit(format!(
        "decompressed shard exceeds {ceiling} byte ceiling"
      )));
    }
    out.extend_from_slice(&chunk[..n]);
  }
  Ok(out)
}
