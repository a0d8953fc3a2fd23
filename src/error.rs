//! Error taxonomy shared by the scanner, the reference person manager and
//! the search pipeline.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FinderError {
    /// Caller supplied input that cannot be acted on.
    #[error("invalid input: {0}")]
    Validation(String),

    /// A remote face or vision call failed.
    #[error("{operation} failed: {message}")]
    Service {
        operation: &'static str,
        message: String,
    },

    #[error("cannot access {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("training of {group_id} did not finish within {waited:?}")]
    TrainingTimeout { group_id: String, waited: Duration },

    #[error("configuration error: {0}")]
    Config(String),
}

impl FinderError {
    pub fn service(operation: &'static str, message: impl ToString) -> Self {
        FinderError::Service {
            operation,
            message: message.to_string(),
        }
    }

    pub fn filesystem(path: &Path, source: std::io::Error) -> Self {
        FinderError::Filesystem {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Name of the remote operation that failed, if this is a service error.
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            FinderError::Service { operation, .. } => Some(*operation),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FinderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_message() {
        let err = FinderError::service("detect", "HTTP 429: rate limited");
        assert_eq!(err.to_string(), "detect failed: HTTP 429: rate limited");
        assert_eq!(err.operation(), Some("detect"));
    }

    #[test]
    fn test_filesystem_error_names_path() {
        let err = FinderError::filesystem(
            Path::new("/photos/a.jpg"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/photos/a.jpg"));
        assert_eq!(err.operation(), None);
    }
}
