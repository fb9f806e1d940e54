use std::fs::File;
use std::path::Path;

use super::movie::Movie;
use crate::av::probe::{MetadataKey, MetadataSource};
use crate::av::Releasable;
use crate::error::Result;

/// Container metadata of an MP4 file, read from `moov` alone.
///
/// Width and height are the stored (unrotated) frame size of the first video
/// track; rotation comes from that track's matrix.
pub struct Mp4Metadata {
    movie: Option<Movie>,
}

impl Mp4Metadata {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)?;
        let movie = Movie::read(&mut file)?;
        Ok(Self { movie: Some(movie) })
    }
}

impl Releasable for Mp4Metadata {
    fn release(&mut self) {
        self.movie = None;
    }
}

impl MetadataSource for Mp4Metadata {
    fn extract(&mut self, key: MetadataKey) -> Result<Option<i64>> {
        let Some(movie) = self.movie.as_ref() else {
            return Ok(None);
        };
        if key == MetadataKey::DurationMillis {
            return Ok(movie.duration_ms);
        }

        let Some(video) = movie.first_video() else {
            return Ok(None);
        };
        let value = match key {
            MetadataKey::VideoWidth => video
                .format
                .width
                .or(video.display_size.map(|(w, _)| w))
                .map(i64::from),
            MetadataKey::VideoHeight => video
                .format
                .height
                .or(video.display_size.map(|(_, h)| h))
                .map(i64::from),
            MetadataKey::VideoRotation => Some(i64::from(video.rotation)),
            MetadataKey::DurationMillis => movie.duration_ms,
        };
        Ok(value)
    }
}
