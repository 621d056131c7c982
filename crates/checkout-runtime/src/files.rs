//! Local File Selection

use std::path::Path;

use checkout_core::codec::DEFAULT_CONTENT_TYPE;
use checkout_core::{Result, StagingFile};

/// Guess a content type from the file extension
pub fn content_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("heic") => "image/heic",
        Some("pdf") => "application/pdf",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

/// Read a file from disk into a staging candidate
pub async fn read_staging_file(path: &Path) -> Result<StagingFile> {
    let bytes = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

    Ok(StagingFile::new(name, content_type_for_path(path), bytes))
}
