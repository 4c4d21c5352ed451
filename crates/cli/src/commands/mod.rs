pub mod address;
pub mod postmarks;
pub mod status;

use std::path::Path;

use crate::error::CliError;

/// Read a label text file.
pub async fn read_label(path: &Path) -> Result<String, CliError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CliError::file(path, e))
}
