#![doc(html_root_url = "https://docs.rs/vcompress/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::missing_crate_level_docs)]

//! # vcompress - Video Compression Pipeline
//!
//! `vcompress` shrinks video files for sharing and storage. It reads the
//! source's container metadata, fits the picture into a quality preset,
//! re-encodes the video track to H.264 at the preset's bit rate, copies the
//! audio track unchanged, and writes an MP4 file.
//!
//! ## Features
//!
//! - Metadata probing (size, duration, rotation) without decoding
//! - Aspect-preserving, even-sided downscaling that never upscales
//! - Slot-based codec interfaces with a zero-copy decoder to encoder surface
//! - Audio passthrough with original timestamps and flags
//! - MP4 demuxing and muxing, orientation carried as a rotation hint
//! - Release of every codec and container handle on all exit paths
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! vcompress = "0.1.0"
//! ```
//!
//! Encoding is done by a [`codec::CodecFactory`] supplied by the platform;
//! the bundled loopback codecs copy the source stream and only exercise the
//! pipeline.
//!
//! ```rust,no_run
//! use vcompress::av::FileBackend;
//! use vcompress::codec::CodecFactory;
//! use vcompress::compressor::{CompressRequest, CompressService, VideoCompressor};
//!
//! async fn shrink<C: CodecFactory + 'static>(codecs: C) -> Result<(), Box<dyn std::error::Error>> {
//!     let compressor = VideoCompressor::new(FileBackend::new(codecs));
//!     let response = compressor
//!         .compress_video(CompressRequest::new("/videos/holiday.mp4").with_quality("medium"))
//!         .await?;
//!     println!(
//!         "{}: {} bytes, {:.1} s",
//!         response.output_path, response.size_bytes, response.duration_seconds
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `av`: media formats, samples, demuxer/muxer traits, probing and the
//!   transcode pipeline
//! - `codec`: decoder/encoder slot interfaces, the frame surface, stream-copy
//!   loopback codecs, H.264 and AAC bitstream helpers
//! - `format`: MP4 and in-memory containers
//! - `compressor`: quality presets, request handling and the async facade
//! - `config`: process-wide settings from environment and config file
//! - `error`: error type and `Result` alias
//! - `utils`: bit reader

/// Audio/Video base types and the transcode pipeline
pub mod av;

/// Codec interfaces and bitstream helpers
pub mod codec;

/// Request-level compression entry point
pub mod compressor;

/// Error types and utilities
pub mod error;

/// Container formats (MP4, in-memory)
pub mod format;

/// Common utilities and helper functions
pub mod utils;

/// Configuration module
pub mod config;

pub use compressor::{
    CompressFailure, CompressRequest, CompressResponse, CompressService, Quality, VideoCompressor,
};
pub use error::{CompressError, Result};

// Re-export transcode module for convenience
pub use av::transcode;
