//! Small helpers shared by the tools: MIME types, data URLs and
//! timestamp-qualified output names.

use std::path::{Path, PathBuf};

use base64::{Engine as _, engine::general_purpose::STANDARD};

/// MIME type for an image file, derived from its extension only.
pub fn image_mime_type(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "" => "application/octet-stream".into(),
        "jpg" => "image/jpeg".into(),
        other => format!("image/{other}"),
    }
}

pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// An image pulled out of a `data:image/<ext>;base64,<payload>` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// File extension to save under; `jpeg` is shortened to `jpg`.
    pub ext: String,
    pub data: Vec<u8>,
}

pub fn decode_image_data_url(url: &str) -> Option<DecodedImage> {
    let rest = url.strip_prefix("data:image/")?;
    let (subtype, payload) = rest.split_once(";base64,")?;
    if subtype.is_empty()
        || payload.is_empty()
        || !subtype.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return None;
    }

    let data = STANDARD.decode(payload.trim()).ok()?;
    let ext = if subtype == "jpeg" { "jpg" } else { subtype };
    Some(DecodedImage {
        ext: ext.to_string(),
        data,
    })
}

pub fn timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// `<dir>/<prefix>_<timestamp>.<ext>`
pub fn timestamped_path(dir: &Path, prefix: &str, timestamp: i64, ext: &str) -> PathBuf {
    dir.join(format!("{prefix}_{timestamp}.{ext}"))
}
