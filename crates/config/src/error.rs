use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("unsupported config format: .{0}")]
    UnsupportedFormat(String),
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
