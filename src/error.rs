//! Error types for brdnet-rs.

use thiserror::Error;

/// Result type alias for brdnet-rs operations.
pub type Result<T> = std::result::Result<T, BrdnetError>;

/// Errors that can occur in brdnet-rs.
///
/// # Example
///
/// ```rust
/// use brdnet_rs::{BrdnetError, Result};
///
/// fn validate_path(path: &str) -> Result<()> {
///     if path.is_empty() {
///         return Err(BrdnetError::Config("path cannot be empty".to_string()));
///     }
///     Ok(())
/// }
///
/// assert!(validate_path("").is_err());
/// assert!(validate_path("data/train.txt").is_ok());
/// ```
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BrdnetError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid configuration file.
    #[error("invalid config file: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Model error.
    #[error("model error: {0}")]
    Model(String),

    /// Dataset error.
    #[error("dataset error: {0}")]
    Dataset(String),

    /// Training error.
    #[error("training error: {0}")]
    Training(String),

    /// Checkpoint error.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Candle error.
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),

    /// Image decoding/encoding error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Training state serialization error.
    #[error("state error: {0}")]
    State(#[from] serde_json::Error),

    /// Progress bar template error.
    #[error("template error: {0}")]
    Template(String),
}

impl From<indicatif::style::TemplateError> for BrdnetError {
    fn from(err: indicatif::style::TemplateError) -> Self {
        BrdnetError::Template(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_error_display() {
        let error = BrdnetError::Config("save_dir is required".to_string());
        assert_eq!(
            error.to_string(),
            "configuration error: save_dir is required"
        );
    }

    #[test]
    fn test_dataset_error_display() {
        let error = BrdnetError::Dataset("index not found".to_string());
        assert_eq!(error.to_string(), "dataset error: index not found");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: BrdnetError = io_error.into();
        assert!(matches!(error, BrdnetError::Io(_)));
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_candle_error_conversion() {
        use candle_core::{DType, Device, Tensor};

        let a = Tensor::zeros((2, 3), DType::F32, &Device::Cpu).unwrap();
        let b = Tensor::zeros((4, 5), DType::F32, &Device::Cpu).unwrap();
        let candle_error = a.broadcast_add(&b).unwrap_err();
        let error: BrdnetError = candle_error.into();
        assert!(error.to_string().contains("candle error"));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("a: [b: }").unwrap_err();
        let error: BrdnetError = yaml_error.into();
        assert!(error.to_string().contains("invalid config file"));
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;

        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let error: BrdnetError = io_error.into();
        assert!(error.source().is_some());
    }
}
