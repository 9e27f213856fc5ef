use std::path::PathBuf;

use thiserror::Error;

/// Failure to fetch or decode an asset.
///
/// A failed load never yields a partially decoded value.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bytes do not form a valid encoded value.
    #[error("decode failed: {0}")]
    Decode(String),

    /// The bytes decoded, but not into the required layout.
    #[error("unsupported format: {0}")]
    Format(String),
}
