use bitflags::bitflags;
use bytes::Bytes;

bitflags! {
    /// Per-sample flag bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct SampleFlags: u32 {
        /// Sync sample; decoding can start here
        const KEY_FRAME = 0x0001;
        /// Codec initialization data rather than media
        const CODEC_CONFIG = 0x0002;
        /// Last buffer of the stream
        const END_OF_STREAM = 0x0004;
    }
}

/// Describes the valid region of a sample buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleInfo {
    pub offset: usize,
    pub size: usize,
    pub presentation_time_us: i64,
    pub flags: SampleFlags,
}

impl SampleInfo {
    pub fn new(size: usize, presentation_time_us: i64) -> Self {
        Self {
            offset: 0,
            size,
            presentation_time_us,
            flags: SampleFlags::empty(),
        }
    }

    /// Zero-length end-of-stream marker.
    pub fn end_of_stream(presentation_time_us: i64) -> Self {
        Self::new(0, presentation_time_us).with_flags(SampleFlags::END_OF_STREAM)
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_flags(mut self, flags: SampleFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.flags.contains(SampleFlags::END_OF_STREAM)
    }

    pub fn is_key_frame(&self) -> bool {
        self.flags.contains(SampleFlags::KEY_FRAME)
    }

    pub fn is_codec_config(&self) -> bool {
        self.flags.contains(SampleFlags::CODEC_CONFIG)
    }

    /// End of the valid region, or `None` on overflow.
    pub fn end(&self) -> Option<usize> {
        self.offset.checked_add(self.size)
    }
}

/// A compressed sample together with its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub data: Bytes,
    pub presentation_time_us: i64,
    pub flags: SampleFlags,
}

impl Sample {
    pub fn new(data: impl Into<Bytes>, presentation_time_us: i64) -> Self {
        Self {
            data: data.into(),
            presentation_time_us,
            flags: SampleFlags::empty(),
        }
    }

    pub fn with_key_flag(mut self, is_key: bool) -> Self {
        if is_key {
            self.flags.insert(SampleFlags::KEY_FRAME);
        } else {
            self.flags.remove(SampleFlags::KEY_FRAME);
        }
        self
    }

    pub fn with_flags(mut self, flags: SampleFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn is_key_frame(&self) -> bool {
        self.flags.contains(SampleFlags::KEY_FRAME)
    }

    /// Buffer description for the whole payload.
    pub fn info(&self) -> SampleInfo {
        SampleInfo::new(self.data.len(), self.presentation_time_us).with_flags(self.flags)
    }
}
