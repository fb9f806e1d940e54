//! # H.264/AVC Bitstream Helpers
//!
//! Conversions between the two H.264 sample layouts found in this crate:
//! Annex-B (start-code delimited, produced by encoders and handed to
//! decoders) and length-prefixed NAL units as stored in MP4 files, plus the
//! `avcC` decoder configuration record.
//!
//! ```rust
//! use bytes::BytesMut;
//! use vcompress::codec::h264::{annex_b_to_avcc, split_annex_b};
//!
//! let access_unit = [0u8, 0, 0, 1, 0x65, 0x88, 0x84];
//! assert_eq!(split_annex_b(&access_unit).len(), 1);
//!
//! let mut stored = BytesMut::new();
//! annex_b_to_avcc(&access_unit, &mut stored);
//! assert_eq!(&stored[..4], &[0, 0, 0, 3]);
//! ```

/// Annex-B splitting and layout conversion
pub mod parser;
/// NAL unit types and the `avcC` record
pub mod types;

#[doc(inline)]
pub use parser::*;
#[doc(inline)]
pub use types::*;
