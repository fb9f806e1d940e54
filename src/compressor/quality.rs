use std::fmt;

/// Quality preset selected by keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Quality {
    Low,
    #[default]
    Medium,
    High,
}

/// Encoder targets for one preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionSettings {
    pub max_width: u32,
    pub max_height: u32,
    pub video_bitrate: u32,
    /// Not applied: audio is copied without re-encoding
    pub audio_bitrate: u32,
}

impl Quality {
    /// Parses `low`, `medium` or `high`, ignoring case. Anything else is
    /// treated as medium.
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword.trim().to_ascii_lowercase().as_str() {
            "low" => Quality::Low,
            "high" => Quality::High,
            _ => Quality::Medium,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
        }
    }

    pub fn settings(&self) -> CompressionSettings {
        match self {
            Quality::Low => CompressionSettings {
                max_width: 640,
                max_height: 360,
                video_bitrate: 1_000_000,
                audio_bitrate: 64_000,
            },
            Quality::Medium => CompressionSettings {
                max_width: 1280,
                max_height: 720,
                video_bitrate: 2_500_000,
                audio_bitrate: 128_000,
            },
            Quality::High => CompressionSettings {
                max_width: 1920,
                max_height: 1080,
                video_bitrate: 5_000_000,
                audio_bitrate: 192_000,
            },
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}
