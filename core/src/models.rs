use serde::{Deserialize, Serialize};

/// Per-field serializer label declared by the manifest.
///
/// The manifest stores these as free-form strings; we fold the known ones into
/// a closed set and keep the original text for everything else so the preview
/// logic never has to string-match in more than one place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldFormat {
  Bytes,
  Str,
  Int,
  Float,
  Bool,
  Jpeg,
  Png,
  Pil,
  Tiff,
  Wav,
  Mp3,
  Flac,
  Unknown(String),
}

impl FieldFormat {
  pub fn from_label(label: &str) -> Self {
    match label.to_ascii_lowercase().as_str() {
      "bytes" | "bin" => FieldFormat::Bytes,
      "str" | "string" => FieldFormat::Str,
      "int" => FieldFormat::Int,
      "float" => FieldFormat::Float,
      "bool" => FieldFormat::Bool,
      "jpeg" | "jpg" => FieldFormat::Jpeg,
      "png" => FieldFormat::Png,
      "pil" => FieldFormat::Pil,
      "tiff" => FieldFormat::Tiff,
      "wav" => FieldFormat::Wav,
      "mp3" => FieldFormat::Mp3,
      "flac" => FieldFormat::Flac,
      _ => FieldFormat::Unknown(label.to_string()),
    }
  }

  pub fn label(&self) -> &str {
    match self {
      FieldFormat::Bytes => "bytes",
      FieldFormat::Str => "str",
      FieldFormat::Int => "int",
      FieldFormat::Float => "float",
      FieldFormat::Bool => "bool",
      FieldFormat::Jpeg => "jpeg",
      FieldFormat::Png => "png",
      FieldFormat::Pil => "pil",
      FieldFormat::Tiff => "tiff",
      FieldFormat::Wav => "wav",
      FieldFormat::Mp3 => "mp3",
      FieldFormat::Flac => "flac",
      FieldFormat::Unknown(s) => s.as_str(),
    }
  }
}

impl From<String> for FieldFormat {
  fn from(s: String) -> Self {
    FieldFormat::from_label(&s)
  }
}

impl From<FieldFormat> for String {
  fn from(f: FieldFormat) -> Self {
    f.label().to_string()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardSummary {
  pub filename: String,
  pub absolute_path: String,
  pub record_count: u32,
  pub byte_size: u64,
  /// Only meaningful for fixed-width vector payloads.
  pub fixed_dim: Option<u32>,
  /// Resolved at manifest-load time; may go stale afterwards.
  pub exists_on_disk: bool,
}

/// Immutable snapshot of a loaded dataset manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetManifest {
  pub manifest_id: String,
  pub manifest_path: String,
  pub root_dir: String,
  pub field_formats: Vec<FieldFormat>,
  pub compression: Option<String>,
  pub nominal_records_per_shard: Option<u32>,
  pub nominal_shard_bytes: Option<u64>,
  /// Opaque passthrough of the manifest's config block.
  pub raw_config: serde_json::Value,
  pub shards: Vec<ShardSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMeta {
  pub field_index: usize,
  pub byte_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMeta {
  pub record_index: u32,
  /// Full record length including any field sub-header.
  pub total_bytes: u64,
  pub fields: Vec<FieldMeta>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldPreview {
  pub preview_text: Option<String>,
  pub hex_snippet: String,
  pub guessed_extension: Option<String>,
  pub is_binary: bool,
  /// True field length, independent of preview truncation.
  pub byte_size: u32,
}
