//! Unpacking of the checkout zip archive.

use std::io::{Cursor, Read};

use thiserror::Error;
use zip::ZipArchive;

/// First eight bytes of every PNG file.
const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Errors that can occur while unpacking an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The bytes are not a readable zip archive.
    #[error("invalid archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// An entry could not be read.
    #[error("failed to read archive entry: {0}")]
    Io(#[from] std::io::Error),

    /// A `.png` entry does not hold PNG data.
    #[error("archive entry {0} is not a PNG image")]
    NotPng(String),
}

/// Extract the PNG images from an archive, in archive order.
///
/// Entries that do not end in `.png` (manifests, shipping lists) are skipped.
///
/// # Errors
///
/// Returns `ArchiveError` if the archive is unreadable or a `.png` entry does
/// not start with the PNG signature.
pub fn unpack_postmarks(bytes: &[u8]) -> Result<Vec<Vec<u8>>, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut images = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if !entry.is_file() || !entry.name().to_lowercase().ends_with(".png") {
            continue;
        }

        let mut image = Vec::new();
        entry.read_to_end(&mut image)?;
        if !image.starts_with(PNG_SIGNATURE) {
            return Err(ArchiveError::NotPng(entry.name().to_owned()));
        }
        tracing::debug!(name = entry.name(), size = image.len(), "Unpacked postmark");
        images.push(image);
    }

    Ok(images)
}
