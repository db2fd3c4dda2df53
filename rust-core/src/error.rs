//! Error types for the compressor and the streaming harness

use std::time::Duration;
use thiserror::Error;

/// Errors raised while configuring or running a [`crate::BandCompressor`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompressorError {
    #[error("Sample rate must be positive and finite (got {0} Hz)")]
    InvalidSampleRate(f64),

    #[error("Unsupported analysis size {size} (only {supported} is supported)")]
    UnsupportedAnalysisSize { size: usize, supported: usize },

    #[error("Hop size {hop} must divide the analysis size {analysis_size} and leave frames overlapping enough to reconstruct")]
    InvalidHop { hop: usize, analysis_size: usize },

    #[error("Invalid value for {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("Bin index {bin} out of range (compressor has {bins} bins)")]
    BinOutOfRange { bin: usize, bins: usize },

    #[error("FFT processing failed: {0}")]
    Transform(String),
}

/// Errors surfaced by the streaming harness
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    #[error("Invalid stream configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to spawn producer thread: {0}")]
    Spawn(String),

    #[error("Processor failed: {0}")]
    Processor(String),

    #[error("Processor panicked: {0}")]
    ProcessorPanicked(String),

    #[error("Producer thread did not stop within {0:?}")]
    JoinTimeout(Duration),
}

/// Failure reported by a block processor
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ProcessError {
    message: String,
}

impl ProcessError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<CompressorError> for ProcessError {
    fn from(err: CompressorError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<String> for ProcessError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ProcessError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CompressorError::BinOutOfRange { bin: 5000, bins: 2049 };
        assert_eq!(
            err.to_string(),
            "Bin index 5000 out of range (compressor has 2049 bins)"
        );

        let err = StreamError::JoinTimeout(Duration::from_millis(250));
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn test_process_error_conversions() {
        let from_compressor: ProcessError = CompressorError::InvalidSampleRate(0.0).into();
        assert!(from_compressor.message().contains("Sample rate"));

        let from_str: ProcessError = "boom".into();
        assert_eq!(from_str.to_string(), "boom");
    }
}
