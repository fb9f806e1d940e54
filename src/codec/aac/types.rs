const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioObjectType {
    Main,
    LC,
    SSR,
    LTP,
    HeAac,
    Other(u8),
}

impl From<u8> for AudioObjectType {
    fn from(value: u8) -> Self {
        match value {
            1 => AudioObjectType::Main,
            2 => AudioObjectType::LC,
            3 => AudioObjectType::SSR,
            4 => AudioObjectType::LTP,
            5 => AudioObjectType::HeAac,
            other => AudioObjectType::Other(other),
        }
    }
}

impl AudioObjectType {
    pub fn id(&self) -> u8 {
        match self {
            AudioObjectType::Main => 1,
            AudioObjectType::LC => 2,
            AudioObjectType::SSR => 3,
            AudioObjectType::LTP => 4,
            AudioObjectType::HeAac => 5,
            AudioObjectType::Other(id) => *id,
        }
    }
}

/// Decoder configuration carried in `csd-0` of an AAC track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    pub object_type: AudioObjectType,
    pub sample_rate: u32,
    pub channel_configuration: u8,
}

impl AudioSpecificConfig {
    pub fn new(object_type: AudioObjectType, sample_rate: u32, channel_configuration: u8) -> Self {
        Self {
            object_type,
            sample_rate,
            channel_configuration,
        }
    }

    /// Sample rate index for the table form, `None` for explicit rates.
    pub fn sample_rate_index(&self) -> Option<u8> {
        sample_rate_index(self.sample_rate)
    }
}

pub fn sample_rate_from_index(index: u8) -> Option<u32> {
    SAMPLE_RATES.get(index as usize).copied()
}

pub fn sample_rate_index(rate: u32) -> Option<u8> {
    SAMPLE_RATES
        .iter()
        .position(|r| *r == rate)
        .map(|i| i as u8)
}
