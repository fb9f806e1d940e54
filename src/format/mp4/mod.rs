//! # MP4 (ISO-BMFF) Container
//!
//! Reading and writing of progressive MP4 files with H.264 video and AAC
//! audio tracks.
//!
//! ## Write then read back
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use vcompress::av::{Demuxer, MediaFormat, Muxer, Releasable, SampleFlags, SampleInfo};
//! use vcompress::format::mp4::{Mp4Demuxer, Mp4Muxer};
//!
//! # fn main() -> vcompress::Result<()> {
//! let mut muxer = Mp4Muxer::create("/tmp/out.mp4")?;
//! let video = MediaFormat::video("video/avc", 640, 360)
//!     .with_csd(Bytes::from_static(&[0, 0, 0, 1, 0x67, 0x42, 0xC0, 0x1F]))
//!     .with_csd(Bytes::from_static(&[0, 0, 0, 1, 0x68, 0xCE, 0x3C, 0x80]));
//! let track = muxer.add_track(&video)?;
//! muxer.set_orientation_hint(90)?;
//! muxer.start()?;
//!
//! let frame = [0u8, 0, 0, 1, 0x65, 0x88];
//! let info = SampleInfo::new(frame.len(), 0).with_flags(SampleFlags::KEY_FRAME);
//! muxer.write_sample(track, &frame, &info)?;
//! muxer.stop()?;
//! muxer.release();
//!
//! let demuxer = Mp4Demuxer::open("/tmp/out.mp4")?;
//! assert_eq!(demuxer.track_count(), 1);
//! # Ok(())
//! # }
//! ```

mod boxes;
mod demuxer;
mod metadata;
mod movie;
mod muxer;

pub use demuxer::Mp4Demuxer;
pub use metadata::Mp4Metadata;
pub use muxer::Mp4Muxer;
