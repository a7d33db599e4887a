//! Error types and handling for ResizeProbe

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ResizeProbe operations
pub type Result<T> = std::result::Result<T, ProbeError>;

/// Main error type for ResizeProbe operations
#[derive(Debug, Error)]
pub enum ProbeError {
    /// I/O related errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decode/encode errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Invalid resize or chart parameters
    #[error("Invalid parameters: {message}")]
    InvalidParameters { message: String },

    /// A single file could not be processed
    #[error("Processing failed: {message} (file: {file:?})")]
    Processing {
        message: String,
        file: Option<PathBuf>,
    },

    /// Chart rendering errors
    #[error("Chart error: {message}")]
    Chart { message: String },

    /// Worker pool errors
    #[error("Worker error: {message}")]
    Worker { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serde(String),
}

impl ProbeError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new invalid parameters error
    pub fn invalid_parameters<S: Into<String>>(message: S) -> Self {
        Self::InvalidParameters {
            message: message.into(),
        }
    }

    /// Create a new per-file processing error
    pub fn processing<S: Into<String>>(message: S, file: Option<PathBuf>) -> Self {
        Self::Processing {
            message: message.into(),
            file,
        }
    }

    /// Create a new chart error
    pub fn chart<S: Into<String>>(message: S) -> Self {
        Self::Chart {
            message: message.into(),
        }
    }

    /// Create a new worker pool error
    pub fn worker<S: Into<String>>(message: S) -> Self {
        Self::Worker {
            message: message.into(),
        }
    }

    /// Check if this error only affects one file (the run can continue)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(_) | Self::Image(_) | Self::Processing { .. } => true,

            Self::Config { .. }
            | Self::InvalidParameters { .. }
            | Self::Chart { .. }
            | Self::Worker { .. }
            | Self::Serde(_) => false,
        }
    }

    /// Get the associated file path if available
    pub fn file_path(&self) -> Option<&PathBuf> {
        match self {
            Self::Processing { file, .. } => file.as_ref(),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for ProbeError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serde(format!("TOML parsing error: {}", err))
    }
}

impl From<serde_yaml::Error> for ProbeError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serde(format!("YAML error: {}", err))
    }
}

impl From<serde_json::Error> for ProbeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(format!("JSON error: {}", err))
    }
}

/// Error context extension for adding file path information
pub trait ErrorContext<T> {
    /// Turn a file-level failure into a `Processing` error naming the file
    fn with_file_context(self, file: PathBuf) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<ProbeError>,
{
    fn with_file_context(self, file: PathBuf) -> Result<T> {
        self.map_err(|e| match e.into() {
            ProbeError::Processing { message, file: None } => ProbeError::Processing {
                message,
                file: Some(file),
            },
            err @ (ProbeError::Io(_) | ProbeError::Image(_)) => ProbeError::Processing {
                message: err.to_string(),
                file: Some(file),
            },
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = ProbeError::config("test message");
        assert!(matches!(err, ProbeError::Config { .. }));
        assert_eq!(err.to_string(), "Configuration error: test message");
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(ProbeError::processing("bad file", None).is_recoverable());
        assert!(!ProbeError::chart("no data").is_recoverable());
        assert!(!ProbeError::config("bad").is_recoverable());
    }

    #[test]
    fn test_file_context_wraps_io() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let err = result
            .with_file_context(Path::new("a.jpg").to_path_buf())
            .unwrap_err();

        assert!(err.is_recoverable());
        assert_eq!(err.file_path(), Some(&PathBuf::from("a.jpg")));
    }

    #[test]
    fn test_file_context_keeps_existing_file() {
        let result: Result<()> = Err(ProbeError::processing("x", Some(PathBuf::from("first.png"))));
        let err = result
            .with_file_context(PathBuf::from("second.png"))
            .unwrap_err();
        assert_eq!(err.file_path(), Some(&PathBuf::from("first.png")));
    }

    #[test]
    fn test_file_context_leaves_run_errors() {
        let result: Result<()> = Err(ProbeError::config("test"));
        let err = result.with_file_context(PathBuf::from("a.jpg")).unwrap_err();
        assert!(matches!(err, ProbeError::Config { .. }));
    }
}
