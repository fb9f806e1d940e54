//! Video re-encode with audio passthrough.
//!
//! [`transcode`] decodes the first video track of a source, re-encodes it at
//! the requested size and bit rate, and writes it to a new container. The
//! first audio track, if any, is copied across without re-encoding after the
//! video is done. Every acquired codec, demuxer and muxer is released on all
//! exit paths through [`TranscodeResources`].
//!
//! ```rust,no_run
//! use vcompress::av::transcode::{compute_output_dimensions, transcode, TranscodeJob, TranscodeOptions};
//! use vcompress::av::probe::Rotation;
//! use vcompress::av::{FileBackend, SourceDescriptor};
//! use vcompress::codec::CodecFactory;
//!
//! fn shrink<C: CodecFactory + 'static>(codecs: C) -> vcompress::Result<()> {
//!     let job = TranscodeJob {
//!         source: SourceDescriptor::parse("/videos/input.mp4")?,
//!         output: "/tmp/output.mp4".into(),
//!         dimensions: compute_output_dimensions(3840, 2160, 1280, 720)?,
//!         rotation: Rotation::None,
//!         video_bit_rate: 2_500_000,
//!     };
//!     let stats = transcode(&FileBackend::new(codecs), &job, &TranscodeOptions::default())?;
//!     println!("{} video samples", stats.video_samples);
//!     Ok(())
//! }
//! ```

use log::{debug, info};
use std::path::PathBuf;
use std::time::Duration;

use super::probe::Rotation;
use super::{ColorFormat, MediaBackend, MediaFormat, MediaType, SourceDescriptor};
use crate::codec::MIME_VIDEO_AVC;
use crate::config;
use crate::error::{CompressError, Result};

mod dimensions;
mod driver;
mod passthrough;
mod resources;
mod tracks;

pub use dimensions::{compute_output_dimensions, OutputDimensions};
pub use driver::{DriveSummary, VideoDriver};
pub use passthrough::copy_audio;
pub use resources::{Lease, TranscodeResources};
pub use tracks::{find_track, MuxState, TrackMapping, TrackMappings};

pub const DEFAULT_FRAME_RATE: u32 = 30;
pub const DEFAULT_I_FRAME_INTERVAL: u32 = 1;

/// Encoder parameters that do not depend on the quality preset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeOptions {
    /// Upper bound for each codec poll
    pub poll_timeout: Duration,
    pub frame_rate: u32,
    /// Seconds between key frames
    pub i_frame_interval: u32,
    pub video_mime: String,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            poll_timeout: config::get_poll_timeout(),
            frame_rate: DEFAULT_FRAME_RATE,
            i_frame_interval: DEFAULT_I_FRAME_INTERVAL,
            video_mime: MIME_VIDEO_AVC.to_string(),
        }
    }
}

/// One source-to-output transcode.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeJob {
    pub source: SourceDescriptor,
    pub output: PathBuf,
    pub dimensions: OutputDimensions,
    /// Recorded as the output's orientation hint; pixels are not rotated
    pub rotation: Rotation,
    pub video_bit_rate: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranscodeStats {
    pub video_samples: u64,
    pub audio_samples: u64,
    pub iterations: u64,
}

/// Runs `job` to completion on the calling thread.
///
/// Fails with [`CompressError::MissingTrack`] if the source has no video
/// track. A muxer that fails to stop after a successful run is logged and
/// does not fail the transcode. Partial output is left on disk on error.
pub fn transcode(
    backend: &dyn MediaBackend,
    job: &TranscodeJob,
    options: &TranscodeOptions,
) -> Result<TranscodeStats> {
    let mut resources = TranscodeResources::new();

    // independent read positions for video and audio
    let video_demuxer = resources
        .video_demuxer
        .insert(Lease::new("video demuxer", backend.open_demuxer(&job.source)?));
    let audio_demuxer = resources
        .audio_demuxer
        .insert(Lease::new("audio demuxer", backend.open_demuxer(&job.source)?));

    let video_track = find_track(&**video_demuxer, MediaType::Video)?
        .ok_or(CompressError::MissingTrack("video"))?;
    let audio_track = find_track(&**audio_demuxer, MediaType::Audio)?;
    debug!(
        "Video track {} ({}), audio track {:?}",
        video_track.index,
        video_track.format.mime,
        audio_track.as_ref().map(|t| t.index)
    );
    video_demuxer.select_track(video_track.index)?;

    let encoder_format = MediaFormat::video(
        options.video_mime.as_str(),
        job.dimensions.width,
        job.dimensions.height,
    )
    .with_bit_rate(job.video_bit_rate)
    .with_frame_rate(options.frame_rate)
    .with_i_frame_interval(options.i_frame_interval)
    .with_color_format(ColorFormat::Surface);

    let encoder = resources
        .encoder
        .insert(Lease::new("encoder", backend.create_encoder(&options.video_mime)?));
    encoder.configure(&encoder_format)?;
    let surface = encoder.create_input_surface()?;
    encoder.start()?;
    encoder.mark_started();

    let decoder = resources
        .decoder
        .insert(Lease::new("decoder", backend.create_decoder(&video_track.format.mime)?));
    decoder.configure(&video_track.format, surface)?;
    decoder.start()?;
    decoder.mark_started();

    let muxer = resources
        .muxer
        .insert(Lease::new("muxer", backend.create_muxer(&job.output)?));
    if job.rotation != Rotation::None {
        muxer.set_orientation_hint(job.rotation.degrees())?;
    }

    let summary = VideoDriver::new(
        &mut **video_demuxer,
        &mut **decoder,
        &mut **encoder,
        muxer,
        video_track.index,
        options.poll_timeout,
    )
    .with_audio_track(audio_track.as_ref())
    .run()?;

    let mut audio_samples = 0;
    if let (Some(track), Some(mappings)) = (&audio_track, summary.mux_state.mappings()) {
        if let Some(audio) = mappings.audio {
            audio_demuxer.select_track(track.index)?;
            audio_samples = copy_audio(&mut **audio_demuxer, &mut **muxer, audio.destination_index)?;
        }
    }

    resources.release_all();
    info!(
        "Transcoded {} to {}: {} video samples, {} audio samples",
        job.source,
        job.output.display(),
        summary.video_samples,
        audio_samples
    );

    Ok(TranscodeStats {
        video_samples: summary.video_samples,
        audio_samples,
        iterations: summary.iterations,
    })
}
