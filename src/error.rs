use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: i64, height: i64 },

    #[error("No {0} track found")]
    MissingTrack(&'static str),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("muxer error: {0}")]
    Muxer(String),

    #[error("container error: {0}")]
    Container(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("worker error: {0}")]
    Worker(String),

    #[error("url error: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, CompressError>;
