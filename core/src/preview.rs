use crate::models::{FieldFormat, FieldPreview};

#[derive(Debug, Clone)]
pub(crate) struct PreviewLimits {
  /// Char budget for the text preview.
  pub text_max_chars: usize,
  /// Leading sample inspected for binary/text classification.
  pub sample_bytes: usize,
  /// Leading sample rendered into the hex snippet.
  pub hex_bytes: usize,
}

/// Fraction of non-printable, non-whitespace bytes above which a sample is
/// treated as binary even when it happens to be valid UTF-8.
const BINARY_RATIO: f64 = 0.30;

/// Build a bounded preview of arbitrary field bytes.
///
/// Never fails: unparseable content degrades to a binary classification with
/// a hex snippet.
pub(crate) fn preview(bytes: &[u8], hint: Option<&FieldFormat>, limits: &PreviewLimits) -> FieldPreview {
  let guessed_extension = guess_extension(hint, bytes);
  let is_binary = classify_binary(bytes, limits.sample_bytes);
  let preview_text = if is_binary {
    None
  } else {
    let text = String::from_utf8_lossy(bytes);
    Some(truncate_chars(&text, limits.text_max_chars))
  };
  FieldPreview {
    preview_text,
    hex_snippet: hex_snippet(bytes, limits.hex_bytes),
    guessed_extension,
    is_binary,
    byte_size: bytes.len() as u32,
  }
}

/// Map a declared format label to a canonical extension, falling back to
/// magic-byte sniffing when the label is absent or does not pin one down.
pub(crate) fn guess_extension(hint: Option<&FieldFormat>, bytes: &[u8]) -> Option<String> {
  match hint {
    Some(FieldFormat::Jpeg) => return Some("jpg".into()),
    Some(FieldFormat::Png) | Some(FieldFormat::Pil) => return Some("png".into()),
    Some(FieldFormat::Tiff) => return Some("tiff".into()),
    Some(FieldFormat::Wav) => return Some("wav".into()),
    Some(FieldFormat::Mp3) => return Some("mp3".into()),
    Some(FieldFormat::Flac) => return Some("flac".into()),
    Some(FieldFormat::Str) | Some(FieldFormat::Int) | Some(FieldFormat::Float) | Some(FieldFormat::Bool) => {
      return Some("txt".into());
    }
    Some(FieldFormat::Bytes) => {
      // Declared opaque: let the content speak, default to .bin.
      return Some(sniff_magic(bytes).unwrap_or_else(|| "bin".into()));
    }
    Some(FieldFormat::Unknown(label)) => {
      // Labels like "no_header_tensor:f32" or "image.webp" carry their own
      // extension hint.
      if let Some((_, subtype)) = label.split_once(':') {
        let subtype = subtype.trim().trim_start_matches('.');
        if !subtype.is_empty() {
          return Some(subtype.to_string());
        }
      }
      if let Some((_, ext)) = label.rsplit_once('.') {
        if !ext.is_empty() {
          return Some(ext.to_string());
        }
      }
    }
    None => {}
  }

  if let Some(ext) = sniff_magic(bytes) {
    return Some(ext);
  }
  if looks_like_text(bytes) {
    return Some("txt".into());
  }
  infer::get(bytes).map(|t| t.extension().to_string())
}

/// Small signature table for the payloads this format commonly carries.
fn sniff_magic(bytes: &[u8]) -> Option<String> {
  let ext = if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
    "jpg"
  } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
    "png"
  } else if bytes.starts_with(b"GIF8") {
    "gif"
  } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
    "tiff"
  } else if bytes.starts_with(b"BM") && bytes.len() >= 14 {
    "bmp"
  } else if bytes.starts_with(b"%PDF") {
    "pdf"
  } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
    "wav"
  } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
    "webp"
  } else if bytes.starts_with(b"fLaC") {
    "flac"
  } else if bytes.starts_with(b"ID3") {
    "mp3"
  } else if bytes.len() >= 2 && bytes[0] == 0xFF && (bytes[1] & 0xE0) == 0xE0 {
    "mp3"
  } else if bytes.starts_with(&[b'P', b'K', 0x03, 0x04]) {
    "zip"
  } else if bytes.starts_with(&[0x1F, 0x8B]) {
    "gz"
  } else if bytes.starts_with(&[0x28, 0xB5, 0x2F, 0xFD]) {
    "zst"
  } else {
    return None;
  };
  Some(ext.to_string())
}

fn classify_binary(bytes: &[u8], sample_bytes: usize) -> bool {
  let sample = &bytes[..bytes.len().min(sample_bytes)];
  if sample.contains(&0) {
    return true;
  }
  if !utf8_valid_allowing_clipped_tail(sample) {
    return true;
  }
  let suspicious = sample
    .iter()
    .filter(|b| (**b < 0x20 && !matches!(**b, b'\t' | b'\n' | b'\r')) || **b == 0x7F)
    .count();
  !sample.is_empty() && (suspicious as f64 / sample.len() as f64) > BINARY_RATIO
}

/// UTF-8 check that tolerates one multi-byte sequence clipped by the sample
/// boundary, so sampling never misclassifies well-formed text as binary.
fn utf8_valid_allowing_clipped_tail(sample: &[u8]) -> bool {
  match std::str::from_utf8(sample) {
    Ok(_) => true,
    Err(e) => e.error_len().is_none() && sample.len() - e.valid_up_to() < 4,
  }
}

fn looks_like_text(bytes: &[u8]) -> bool {
  std::str::from_utf8(bytes)
    .map(|s| !s.trim().is_empty())
    .unwrap_or(false)
}

fn hex_snippet(bytes: &[u8], hex_bytes: usize) -> String {
  let shown = &bytes[..bytes.len().min(hex_bytes)];
  let mut out = String::with_capacity(shown.len() * 3);
  for (i, b) in shown.iter().enumerate() {
    if i > 0 {
      out.push(' ');
    }
    out.push_str(&format!("{b:02X}"));
  }
  if bytes.len() > shown.len() {
    out.push_str(" …");
  }
  out
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
  if max == 0 {
    return String::new();
  }
  let mut out = String::new();
  for (i, ch) in s.chars().enumerate() {
    if i >= max {
      out.push('…');
      break;
    }
    out.push(ch);
  }
  out
}
