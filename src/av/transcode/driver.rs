use log::{debug, info, trace};
use std::time::Duration;

use super::resources::Lease;
use super::tracks::{MuxState, TrackMapping, TrackMappings};
use crate::av::{Demuxer, MediaFormat, Muxer, SampleFlags, SampleInfo, TrackDescriptor};
use crate::codec::{OutputEvent, VideoDecoder, VideoEncoder};
use crate::error::{CompressError, Result};

/// Counters reported once the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveSummary {
    pub mux_state: MuxState,
    pub video_samples: u64,
    pub iterations: u64,
}

/// Polls demuxer, decoder and encoder in turn until the encoder reports end
/// of stream.
///
/// Each stage has its own exhaustion flag, set at most once and in causal
/// order: demuxer end, then decoder end, then encoder end. The muxer is
/// started when the encoder announces its output format, after the video
/// and (optional) audio destination tracks are registered.
pub struct VideoDriver<'a> {
    demuxer: &'a mut dyn Demuxer,
    decoder: &'a mut dyn VideoDecoder,
    encoder: &'a mut dyn VideoEncoder,
    muxer: &'a mut Lease<dyn Muxer>,
    video_source: usize,
    audio_track: Option<&'a TrackDescriptor>,
    timeout: Duration,
    input_exhausted: bool,
    decode_exhausted: bool,
    encode_exhausted: bool,
    mux_state: MuxState,
    video_samples: u64,
    iterations: u64,
}

impl<'a> VideoDriver<'a> {
    pub fn new(
        demuxer: &'a mut dyn Demuxer,
        decoder: &'a mut dyn VideoDecoder,
        encoder: &'a mut dyn VideoEncoder,
        muxer: &'a mut Lease<dyn Muxer>,
        video_source: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            demuxer,
            decoder,
            encoder,
            muxer,
            video_source,
            audio_track: None,
            timeout,
            input_exhausted: false,
            decode_exhausted: false,
            encode_exhausted: false,
            mux_state: MuxState::Pending,
            video_samples: 0,
            iterations: 0,
        }
    }

    /// Registers `track` on the destination next to video. Its format is
    /// passed to the muxer unchanged.
    pub fn with_audio_track(mut self, track: Option<&'a TrackDescriptor>) -> Self {
        self.audio_track = track;
        self
    }

    pub fn run(mut self) -> Result<DriveSummary> {
        while !self.encode_exhausted {
            self.iterations += 1;
            if !self.input_exhausted {
                self.feed_decoder()?;
            }
            if !self.decode_exhausted {
                self.drain_decoder()?;
            }
            self.drain_encoder()?;
        }

        debug!(
            "Video loop finished after {} iterations, {} samples written",
            self.iterations, self.video_samples
        );
        Ok(DriveSummary {
            mux_state: self.mux_state,
            video_samples: self.video_samples,
            iterations: self.iterations,
        })
    }

    fn feed_decoder(&mut self) -> Result<()> {
        let Some(index) = self.decoder.dequeue_input_buffer(self.timeout)? else {
            return Ok(());
        };

        let buffer = self.decoder.input_buffer(index)?;
        match self.demuxer.read_sample(buffer)? {
            Some(sample) => {
                let mut flags = sample.flags;
                flags.remove(SampleFlags::END_OF_STREAM);
                let info = SampleInfo::new(sample.size, sample.presentation_time_us)
                    .with_offset(sample.offset)
                    .with_flags(flags);
                self.decoder.queue_input_buffer(index, info)?;
                self.demuxer.advance();
            }
            None => {
                debug!("Video track {} exhausted", self.video_source);
                self.input_exhausted = true;
                self.decoder
                    .queue_input_buffer(index, SampleInfo::end_of_stream(0))?;
            }
        }
        Ok(())
    }

    fn drain_decoder(&mut self) -> Result<()> {
        match self.decoder.dequeue_output_buffer(self.timeout)? {
            OutputEvent::TryAgainLater => {}
            OutputEvent::FormatChanged(format) => {
                debug!("Decoder output format: {}", format.mime);
            }
            OutputEvent::Buffer { index, info } => {
                // rendering pushes the frame onto the encoder's surface
                self.decoder.release_output_buffer(index, info.size != 0)?;
                if info.is_end_of_stream() {
                    debug!("Decoder reached end of stream");
                    self.decode_exhausted = true;
                    self.encoder.signal_end_of_input_stream()?;
                }
            }
        }
        Ok(())
    }

    fn drain_encoder(&mut self) -> Result<()> {
        match self.encoder.dequeue_output_buffer(self.timeout)? {
            OutputEvent::TryAgainLater => {}
            OutputEvent::FormatChanged(format) => self.start_muxer(format)?,
            OutputEvent::Buffer { index, info } => {
                match self.mux_state {
                    MuxState::Started(mappings) if info.size > 0 => {
                        let data = self.encoder.output_buffer(index)?;
                        self.muxer
                            .write_sample(mappings.video.destination_index, data, &info)?;
                        self.video_samples += 1;
                    }
                    MuxState::Pending if info.size > 0 => {
                        trace!("Dropping encoder output at {} before muxer start", info.presentation_time_us);
                    }
                    _ => {}
                }
                self.encoder.release_output_buffer(index)?;
                if info.is_end_of_stream() {
                    debug!("Encoder reached end of stream");
                    self.encode_exhausted = true;
                }
            }
        }
        Ok(())
    }

    fn start_muxer(&mut self, format: MediaFormat) -> Result<()> {
        if self.mux_state.is_started() {
            return Err(CompressError::Codec(
                "encoder output format changed after muxer start".into(),
            ));
        }

        let video = TrackMapping {
            source_index: self.video_source,
            destination_index: self.muxer.add_track(&format)?,
        };
        let audio = match self.audio_track {
            Some(track) => Some(TrackMapping {
                source_index: track.index,
                destination_index: self.muxer.add_track(&track.format)?,
            }),
            None => None,
        };

        self.muxer.start()?;
        self.muxer.mark_started();
        info!(
            "Muxer started: video {}x{} on track {}{}",
            format.width.unwrap_or(0),
            format.height.unwrap_or(0),
            video.destination_index,
            audio
                .map(|a| format!(", audio on track {}", a.destination_index))
                .unwrap_or_default()
        );
        self.mux_state = MuxState::Started(TrackMappings { video, audio });
        Ok(())
    }
}
