#![forbid(unsafe_code)]

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to write config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to extract config: {0}")]
    Extract(#[from] Box<figment::Error>),

    #[error("failed to serialize TOML: {0}")]
    TomlSer(#[from] toml_edit::ser::Error),

    #[error("invalid path: {0}")]
    InvalidPath(PathBuf),
}
