//! # Utility Types
//!
//! Bit-level reading shared by the codec configuration parsers.

/// MSB-first bitstream reader
pub mod bits;

pub use bits::BitReader;
