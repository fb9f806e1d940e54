use std::fmt;
use std::path::{Path, PathBuf};

use url::Url;

use crate::error::{CompressError, Result};

const CONTENT_SCHEME: &str = "content";
const FILE_SCHEME: &str = "file";

/// Locator of the input media for one compression run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// Plain filesystem path (or a `file://` URI resolved to one)
    File(PathBuf),
    /// Opaque content URI resolved by the host
    Content(Url),
}

impl SourceDescriptor {
    /// Parses a request locator. `content://` and `file://` are treated as
    /// URIs, anything else as a filesystem path.
    pub fn parse(locator: &str) -> Result<Self> {
        if locator.is_empty() {
            return Err(CompressError::InvalidRequest("Path is required".into()));
        }

        if locator.starts_with("content://") {
            let url = Url::parse(locator)?;
            return Ok(SourceDescriptor::Content(url));
        }

        if locator.starts_with("file://") {
            let url = Url::parse(locator)?;
            let path = url.to_file_path().map_err(|_| {
                CompressError::InvalidRequest(format!("Not a local file URI: {}", locator))
            })?;
            return Ok(SourceDescriptor::File(path));
        }

        Ok(SourceDescriptor::File(PathBuf::from(locator)))
    }

    /// Filesystem path, if the source is a local file.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            SourceDescriptor::File(path) => Some(path),
            SourceDescriptor::Content(_) => None,
        }
    }

    pub fn scheme(&self) -> &str {
        match self {
            SourceDescriptor::File(_) => FILE_SCHEME,
            SourceDescriptor::Content(url) => url.scheme(),
        }
    }

    /// Returns the path or fails with a descriptive error for content URIs.
    pub fn require_path(&self) -> Result<&Path> {
        self.as_path().ok_or_else(|| {
            CompressError::InvalidRequest(format!(
                "{} URIs need a host resolver: {}",
                CONTENT_SCHEME, self
            ))
        })
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::File(path) => write!(f, "{}", path.display()),
            SourceDescriptor::Content(url) => write!(f, "{}", url),
        }
    }
}
