//! Content types for the files a built site ships
//!
//! The document, script, stylesheet, icon and data types a bundler emits are
//! pinned; everything else comes from the `mime_guess` table.

use std::borrow::Cow;
use std::path::Path;

pub const HTML: &str = "text/html";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Content type derived from the file extension (case-insensitive)
pub fn content_type(path: &Path) -> Cow<'static, str> {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => ext.to_ascii_lowercase(),
        None => return Cow::Borrowed(OCTET_STREAM),
    };
    let pinned = match ext.as_str() {
        "html" | "htm" => HTML,
        "js" | "mjs" => "application/javascript",
        "css" => "text/css",
        "svg" => "image/svg+xml",
        "json" | "map" => "application/json",
        _ => return Cow::Owned(mime_guess::from_ext(&ext).first_or_octet_stream().to_string()),
    };
    Cow::Borrowed(pinned)
}
