use crate::{
  engine::CoreError,
  models::{FieldFormat, FieldMeta, RecordMeta},
  shard::{self, ShardHandle},
};

/// Decode a multi-field record's sub-offset table: `field_count + 1` LE u32
/// offsets relative to the payload region that starts right after the table.
fn read_field_offsets(
  handle: &ShardHandle,
  record_index: u32,
  field_count: usize,
) -> Result<Vec<u32>, CoreError> {
  let table_len = (field_count + 1) * 4;
  let record_len = handle.record_len(record_index)?;
  let table = handle.read_record_prefix(record_index, table_len)?;

  let mut offsets = Vec::with_capacity(field_count + 1);
  for chunk in table.chunks_exact(4) {
    offsets.push(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
  }
  shard::validate_offsets(&offsets)
    .map_err(|msg| CoreError::CorruptShard(format!("record {record_index}: {msg}")))?;

  let payload_len = record_len - table_len as u64;
  let declared = *offsets.last().unwrap_or(&0) as u64;
  if declared != payload_len {
    return Err(CoreError::CorruptShard(format!(
      "record {record_index}: payload is {payload_len} bytes, field table declares {declared}"
    )));
  }
  Ok(offsets)
}

fn field_metas(
  handle: &ShardHandle,
  record_index: u32,
  field_count: usize,
) -> Result<Vec<FieldMeta>, CoreError> {
  if field_count <= 1 {
    // Single-field records carry no sub-table: the record bytes are the field.
    let len = handle.record_len(record_index)?;
    return Ok(vec![FieldMeta {
      field_index: 0,
      byte_size: len as u32,
    }]);
  }
  let offsets = read_field_offsets(handle, record_index, field_count)?;
  Ok(
    offsets
      .windows(2)
      .enumerate()
      .map(|(j, pair)| FieldMeta {
        field_index: j,
        byte_size: pair[1] - pair[0],
      })
      .collect(),
  )
}

/// Enumerate every record in the shard with its per-field sizes.
///
/// Pure offset arithmetic over the already-opened handle; repeated calls on
/// the same shard return identical results.
pub(crate) fn list_records(
  handle: &ShardHandle,
  field_formats: &[FieldFormat],
) -> Result<Vec<RecordMeta>, CoreError> {
  let field_count = field_formats.len().max(1);
  let mut records = Vec::with_capacity(handle.record_count() as usize);
  for record_index in 0..handle.record_count() {
    records.push(RecordMeta {
      record_index,
      total_bytes: handle.record_len(record_index)?,
      fields: field_metas(handle, record_index, field_count)?,
    });
  }
  Ok(records)
}

/// Slice one field's payload bytes out of a record.
pub(crate) fn read_field(
  handle: &ShardHandle,
  field_formats: &[FieldFormat],
  record_index: u32,
  field_index: usize,
) -> Result<Vec<u8>, CoreError> {
  let field_count = field_formats.len().max(1);
  if field_index >= field_count {
    return Err(CoreError::IndexOutOfRange(format!(
      "field {field_index} of {field_count}"
    )));
  }

  if field_count == 1 {
    return handle.slice_record(record_index);
  }

  let offsets = read_field_offsets(handle, record_index, field_count)?;
  let table_len = (field_count + 1) * 4;
  let record = handle.slice_record(record_index)?;
  let start = table_len + offsets[field_index] as usize;
  let end = table_len + offsets[field_index + 1] as usize;
  Ok(record[start..end].to_vec())
}
