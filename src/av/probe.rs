//! Reads container-level video metadata without decoding.
//!
//! Each field is read independently; a field that cannot be read falls back to
//! a fixed default so probing never fails once a metadata source is open.

use log::{debug, warn};

use super::Releasable;
use crate::error::Result;

pub const DEFAULT_WIDTH: i64 = 1920;
pub const DEFAULT_HEIGHT: i64 = 1080;
pub const DEFAULT_DURATION_MS: i64 = 0;

/// Metadata fields a source can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKey {
    VideoWidth,
    VideoHeight,
    DurationMillis,
    VideoRotation,
}

/// Read-only access to container metadata.
pub trait MetadataSource: Releasable + Send {
    /// Returns `Ok(None)` when the container does not carry the field.
    fn extract(&mut self, key: MetadataKey) -> Result<Option<i64>>;
}

/// Playback rotation recorded in the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    Clockwise90,
    Rotate180,
    Clockwise270,
}

impl Rotation {
    /// Normalizes into [0, 360) and maps multiples of 90 to a rotation.
    pub fn from_degrees(degrees: i64) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Clockwise90),
            180 => Some(Rotation::Rotate180),
            270 => Some(Rotation::Clockwise270),
            _ => None,
        }
    }

    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Clockwise90 => 90,
            Rotation::Rotate180 => 180,
            Rotation::Clockwise270 => 270,
        }
    }

    /// Quarter turns display the stored frame with width and height exchanged.
    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, Rotation::Clockwise90 | Rotation::Clockwise270)
    }
}

/// Probed metadata. `width`/`height` are already in display orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoMetadata {
    pub width: i64,
    pub height: i64,
    pub duration_ms: i64,
    pub rotation: Rotation,
}

impl VideoMetadata {
    pub fn duration_seconds(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }
}

/// Probes `source`, defaulting unreadable fields and swapping dimensions for
/// quarter-turn rotations.
pub fn probe(source: &mut dyn MetadataSource) -> VideoMetadata {
    let stored_width = read_or(source, MetadataKey::VideoWidth, DEFAULT_WIDTH);
    let stored_height = read_or(source, MetadataKey::VideoHeight, DEFAULT_HEIGHT);
    let duration_ms = read_or(source, MetadataKey::DurationMillis, DEFAULT_DURATION_MS);
    let raw_rotation = read_or(source, MetadataKey::VideoRotation, 0);

    let rotation = Rotation::from_degrees(raw_rotation).unwrap_or_else(|| {
        warn!("Unsupported rotation {}, treating as 0", raw_rotation);
        Rotation::None
    });

    let (width, height) = if rotation.swaps_dimensions() {
        (stored_height, stored_width)
    } else {
        (stored_width, stored_height)
    };

    VideoMetadata {
        width,
        height,
        duration_ms,
        rotation,
    }
}

fn read_or(source: &mut dyn MetadataSource, key: MetadataKey, default: i64) -> i64 {
    match source.extract(key) {
        Ok(Some(value)) => value,
        Ok(None) => {
            debug!("Metadata {:?} unavailable, using {}", key, default);
            default
        }
        Err(e) => {
            warn!("Failed to read metadata {:?}: {}, using {}", key, e, default);
            default
        }
    }
}
