use bytes::BytesMut;
use log::debug;

use crate::av::{Demuxer, Muxer, SeekMode};
use crate::error::Result;

const AUDIO_BUFFER_CAPACITY: usize = 1024 * 1024;

/// Copies every sample of the demuxer's selected track to `destination`
/// untouched: same payload, timestamp and flags, in source order.
///
/// The demuxer is first rewound to the sync point closest to zero. Returns
/// the number of samples written.
pub fn copy_audio(demuxer: &mut dyn Demuxer, muxer: &mut dyn Muxer, destination: usize) -> Result<u64> {
    demuxer.seek_to(0, SeekMode::ClosestSync)?;

    let mut buffer = BytesMut::with_capacity(AUDIO_BUFFER_CAPACITY);
    let mut copied = 0u64;
    while let Some(info) = demuxer.read_sample(&mut buffer)? {
        muxer.write_sample(destination, &buffer, &info)?;
        copied += 1;
        if !demuxer.advance() {
            break;
        }
    }

    debug!("Copied {} audio samples to track {}", copied, destination);
    Ok(copied)
}
