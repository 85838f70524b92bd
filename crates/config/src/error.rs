use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("unsupported config format: .{extension}")]
    UnsupportedFormat { extension: String },
    #[error("could not determine the user home directory")]
    NoHomeDir,
}

pub type Result<T> = std::result::Result<T, Error>;
