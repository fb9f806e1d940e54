//! # Video Compressor
//!
//! Entry point tying the pipeline together: probe the source, fit its
//! display size into the quality preset, transcode, and report the output
//! file's size and the source duration.
//!
//! ```rust,no_run
//! use vcompress::av::FileBackend;
//! use vcompress::codec::CodecFactory;
//! use vcompress::compressor::{CompressRequest, CompressService, VideoCompressor};
//!
//! async fn shrink<C: CodecFactory + 'static>(codecs: C) -> Result<(), Box<dyn std::error::Error>> {
//!     let compressor = VideoCompressor::new(FileBackend::new(codecs));
//!     let request = CompressRequest::new("/videos/input.mp4").with_quality("low");
//!     let response = compressor.compress_video(request).await?;
//!     println!("{} ({} bytes)", response.output_path, response.size_bytes);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::av::probe::{probe, VideoMetadata};
use crate::av::transcode::{compute_output_dimensions, transcode, Lease, TranscodeJob, TranscodeOptions};
use crate::av::{MediaBackend, SourceDescriptor};
use crate::config;
use crate::error::{CompressError, Result};

mod output;
mod quality;
mod request;

pub use output::allocate_output_path;
pub use quality::{CompressionSettings, Quality};
pub use request::{CompressFailure, CompressRequest, CompressResponse, TranscodeResult};

/// Asynchronous request/response facade.
#[async_trait]
pub trait CompressService {
    /// Compresses `request.source_locator` into a fresh file under the cache
    /// directory. The work runs on a dedicated blocking worker.
    async fn compress_video(
        &self,
        request: CompressRequest,
    ) -> std::result::Result<CompressResponse, CompressFailure>;
}

/// Runs compressions against one [`MediaBackend`].
pub struct VideoCompressor<B: MediaBackend> {
    backend: Arc<B>,
    options: TranscodeOptions,
    output_dir: Option<PathBuf>,
}

impl<B: MediaBackend> Clone for VideoCompressor<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            options: self.options.clone(),
            output_dir: self.output_dir.clone(),
        }
    }
}

impl<B: MediaBackend> VideoCompressor<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
            options: TranscodeOptions::default(),
            output_dir: None,
        }
    }

    pub fn with_options(mut self, options: TranscodeOptions) -> Self {
        self.options = options;
        self
    }

    /// Writes outputs to `dir` instead of the configured cache directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(config::get_cache_dir)
    }

    /// Compresses `source` into `output` on the calling thread.
    pub fn compress(
        &self,
        source: &SourceDescriptor,
        output: &Path,
        settings: &CompressionSettings,
    ) -> Result<TranscodeResult> {
        info!(
            "Compressing {} (max {}x{}, {} bps video)",
            source, settings.max_width, settings.max_height, settings.video_bitrate
        );
        self.run(source, output, settings).map_err(|e| {
            error!("Compression of {} failed: {}", source, e);
            e
        })
    }

    fn run(
        &self,
        source: &SourceDescriptor,
        output: &Path,
        settings: &CompressionSettings,
    ) -> Result<TranscodeResult> {
        let metadata = self.probe_source(source)?;
        info!(
            "Source {}x{}, {} ms, rotation {}",
            metadata.width,
            metadata.height,
            metadata.duration_ms,
            metadata.rotation.degrees()
        );

        let dimensions = compute_output_dimensions(
            metadata.width,
            metadata.height,
            settings.max_width,
            settings.max_height,
        )?;
        info!("Output dimensions {}x{}", dimensions.width, dimensions.height);
        debug!(
            "Audio bit rate {} not applied, audio is copied",
            settings.audio_bitrate
        );

        let job = TranscodeJob {
            source: source.clone(),
            output: output.to_path_buf(),
            dimensions,
            rotation: metadata.rotation,
            video_bit_rate: settings.video_bitrate,
        };
        transcode(&*self.backend, &job, &self.options)?;

        let output_byte_size = match fs::metadata(output) {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!("Cannot stat {}: {}", output.display(), e);
                0
            }
        };
        let result = TranscodeResult {
            output_byte_size,
            duration_seconds: metadata.duration_seconds(),
        };
        info!(
            "Compressed {} to {} ({} bytes, {:.3} s)",
            source,
            output.display(),
            result.output_byte_size,
            result.duration_seconds
        );
        Ok(result)
    }

    fn probe_source(&self, source: &SourceDescriptor) -> Result<VideoMetadata> {
        let mut metadata_source = Lease::new("metadata source", self.backend.open_metadata(source)?);
        let metadata = probe(&mut *metadata_source);
        metadata_source.release()?;
        Ok(metadata)
    }

    /// Validates `request`, picks the quality preset and an output path,
    /// and compresses on the calling thread.
    pub fn compress_request(
        &self,
        request: &CompressRequest,
    ) -> std::result::Result<CompressResponse, CompressFailure> {
        let locator = request
            .source_locator
            .as_deref()
            .filter(|locator| !locator.is_empty())
            .ok_or_else(CompressFailure::missing_path)?;
        let source = SourceDescriptor::parse(locator)?;

        let quality = match request.quality.as_deref() {
            Some(keyword) => Quality::from_keyword(keyword),
            None => Quality::from_keyword(&config::get_default_quality()),
        };
        debug!("Request for {} at {} quality", source, quality);

        let output = allocate_output_path(&self.output_dir())?;
        let result = self.compress(&source, &output, &quality.settings())?;

        Ok(CompressResponse {
            output_path: output.to_string_lossy().into_owned(),
            size_bytes: result.output_byte_size,
            duration_seconds: result.duration_seconds,
        })
    }
}

#[async_trait]
impl<B: MediaBackend> CompressService for VideoCompressor<B> {
    async fn compress_video(
        &self,
        request: CompressRequest,
    ) -> std::result::Result<CompressResponse, CompressFailure> {
        if request.source_locator.as_deref().map_or(true, str::is_empty) {
            return Err(CompressFailure::missing_path());
        }

        let worker = self.clone();
        tokio::task::spawn_blocking(move || worker.compress_request(&request))
            .await
            .map_err(|e| CompressFailure::from(CompressError::Worker(e.to_string())))?
    }
}
