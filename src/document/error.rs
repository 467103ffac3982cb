use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0:?}")]
    NotFound(PathBuf),
    #[error("malformed configuration in {path:?}: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("'extends' cycle detected at {0:?}")]
    ExtendsCycle(PathBuf),
}

impl ConfigError {
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ConfigError::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ConfigError::NotFound(_))
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
