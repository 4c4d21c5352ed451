use std::path::PathBuf;

use stampdesk_core::{CountryCode, ProductError, SlotError};
use stampdesk_postage::{ConfigError, ResolveError};
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// An input or output file could not be accessed.
    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration is missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unknown product code.
    #[error(transparent)]
    Product(#[from] ProductError),

    /// More receiver files than label slots.
    #[error(transparent)]
    Slot(#[from] SlotError),

    /// No product given and none preselected for the receiver's country.
    #[error("no default product for country '{0}', pass --product")]
    NoDefaultProduct(CountryCode),

    /// Postmark resolution failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Login for the status check failed.
    #[error(transparent)]
    Api(#[from] stampdesk_postage::InternetmarkeError),

    /// The background job ended without reporting a result.
    #[error("postmark job ended without a result")]
    JobLost,
}

impl CliError {
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }
}
