use std::error::Error;
use std::fmt;

use crate::error::CompressError;

/// Message-style request: plain optional strings, validated on use.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompressRequest {
    /// Filesystem path, `file://` URI or `content://` URI
    pub source_locator: Option<String>,
    /// `low`, `medium` or `high`; the configured default when absent
    pub quality: Option<String>,
}

impl CompressRequest {
    pub fn new(source_locator: impl Into<String>) -> Self {
        Self {
            source_locator: Some(source_locator.into()),
            quality: None,
        }
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = Some(quality.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompressResponse {
    pub output_path: String,
    pub size_bytes: u64,
    pub duration_seconds: f64,
}

/// What a finished compression produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranscodeResult {
    pub output_byte_size: u64,
    pub duration_seconds: f64,
}

/// Failure reported to the caller: a readable message plus the cause.
#[derive(Debug)]
pub struct CompressFailure {
    pub message: String,
    pub source: CompressError,
}

impl CompressFailure {
    pub fn missing_path() -> Self {
        Self {
            message: "Path is required".to_string(),
            source: CompressError::InvalidRequest("Path is required".to_string()),
        }
    }
}

impl From<CompressError> for CompressFailure {
    fn from(source: CompressError) -> Self {
        let message = match &source {
            CompressError::InvalidRequest(reason) if reason == "Path is required" => {
                reason.clone()
            }
            other => format!("Compression failed: {}", other),
        };
        Self { message, source }
    }
}

impl fmt::Display for CompressFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for CompressFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}
