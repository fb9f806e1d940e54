use bytes::Bytes;

/// Broad class of an elementary stream, derived from its mime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Video,
    Audio,
    Other,
}

impl MediaType {
    /// Mime prefix used when locating tracks of this type.
    pub fn mime_prefix(&self) -> &'static str {
        match self {
            MediaType::Video => "video/",
            MediaType::Audio => "audio/",
            MediaType::Other => "",
        }
    }

    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with(MediaType::Video.mime_prefix()) {
            MediaType::Video
        } else if mime.starts_with(MediaType::Audio.mime_prefix()) {
            MediaType::Audio
        } else {
            MediaType::Other
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Other => "other",
        }
    }
}

/// Pixel source an encoder is fed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorFormat {
    /// Frames arrive through an input [`Surface`](crate::codec::Surface)
    Surface,
    /// Planar YUV 4:2:0 byte buffers
    Yuv420Planar,
}

/// Format record of one elementary stream: mime plus codec parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MediaFormat {
    pub mime: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bit_rate: Option<u32>,
    pub frame_rate: Option<u32>,
    /// Seconds between sync frames
    pub i_frame_interval: Option<u32>,
    pub color_format: Option<ColorFormat>,
    pub sample_rate: Option<u32>,
    pub channel_count: Option<u32>,
    pub rotation_degrees: Option<u32>,
    pub duration_us: Option<i64>,
    /// Codec-specific data (`csd-0`, `csd-1`, ...)
    pub csd: Vec<Bytes>,
}

impl MediaFormat {
    pub fn new(mime: impl Into<String>) -> Self {
        Self {
            mime: mime.into(),
            ..Default::default()
        }
    }

    pub fn video(mime: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Self::new(mime)
        }
    }

    pub fn audio(mime: impl Into<String>, sample_rate: u32, channel_count: u32) -> Self {
        Self {
            sample_rate: Some(sample_rate),
            channel_count: Some(channel_count),
            ..Self::new(mime)
        }
    }

    pub fn with_bit_rate(mut self, bit_rate: u32) -> Self {
        self.bit_rate = Some(bit_rate);
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = Some(frame_rate);
        self
    }

    pub fn with_i_frame_interval(mut self, seconds: u32) -> Self {
        self.i_frame_interval = Some(seconds);
        self
    }

    pub fn with_color_format(mut self, color_format: ColorFormat) -> Self {
        self.color_format = Some(color_format);
        self
    }

    pub fn with_rotation(mut self, degrees: u32) -> Self {
        self.rotation_degrees = Some(degrees);
        self
    }

    pub fn with_duration_us(mut self, duration_us: i64) -> Self {
        self.duration_us = Some(duration_us);
        self
    }

    pub fn with_csd(mut self, csd: impl Into<Bytes>) -> Self {
        self.csd.push(csd.into());
        self
    }

    pub fn media_type(&self) -> MediaType {
        MediaType::from_mime(&self.mime)
    }

    pub fn csd(&self, index: usize) -> Option<&Bytes> {
        self.csd.get(index)
    }
}

/// One elementary stream as found in a demuxer's track list.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackDescriptor {
    pub index: usize,
    pub media_type: MediaType,
    pub format: MediaFormat,
}

impl TrackDescriptor {
    pub fn new(index: usize, format: MediaFormat) -> Self {
        Self {
            index,
            media_type: format.media_type(),
            format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_from_mime() {
        assert_eq!(MediaType::from_mime("video/avc"), MediaType::Video);
        assert_eq!(MediaType::from_mime("audio/mp4a-latm"), MediaType::Audio);
        assert_eq!(MediaType::from_mime("text/vtt"), MediaType::Other);
        assert_eq!(MediaType::from_mime("videoish"), MediaType::Other);
    }

    #[test]
    fn test_builder() {
        let format = MediaFormat::video("video/avc", 1280, 720)
            .with_bit_rate(2_500_000)
            .with_frame_rate(30)
            .with_i_frame_interval(1)
            .with_color_format(ColorFormat::Surface)
            .with_csd(vec![0u8, 0, 0, 1, 0x67]);

        assert_eq!(format.media_type(), MediaType::Video);
        assert_eq!(format.width, Some(1280));
        assert_eq!(format.height, Some(720));
        assert_eq!(format.bit_rate, Some(2_500_000));
        assert_eq!(format.csd(0).map(|c| c.len()), Some(5));
        assert!(format.csd(1).is_none());
    }
}
