use bytes::{BufMut, Bytes, BytesMut};

use super::types::{sample_rate_from_index, AudioObjectType, AudioSpecificConfig};
use crate::error::{CompressError, Result};
use crate::utils::BitReader;

const EXPLICIT_RATE_INDEX: u32 = 0xF;
const ESCAPE_OBJECT_TYPE: u32 = 31;

/// Parses the leading fields of an AudioSpecificConfig.
pub fn parse_audio_specific_config(data: &[u8]) -> Result<AudioSpecificConfig> {
    if data.len() < 2 {
        return Err(CompressError::InvalidData(
            "AudioSpecificConfig too short".into(),
        ));
    }

    let mut reader = BitReader::new(data);
    let mut object_type = reader.read_bits(5)?;
    if object_type == ESCAPE_OBJECT_TYPE {
        object_type = 32 + reader.read_bits(6)?;
    }

    let rate_index = reader.read_bits(4)?;
    let sample_rate = if rate_index == EXPLICIT_RATE_INDEX {
        reader.read_bits(24)?
    } else {
        sample_rate_from_index(rate_index as u8).ok_or_else(|| {
            CompressError::InvalidData(format!("reserved sample rate index {}", rate_index))
        })?
    };
    let channel_configuration = reader.read_bits(4)? as u8;

    Ok(AudioSpecificConfig {
        object_type: AudioObjectType::from(object_type as u8),
        sample_rate,
        channel_configuration,
    })
}

/// Serializes the two-byte table form (or five-byte explicit-rate form).
pub fn write_audio_specific_config(config: &AudioSpecificConfig) -> Bytes {
    let object_type = u32::from(config.object_type.id() & 0x1F);
    let channels = u32::from(config.channel_configuration & 0x0F);
    let mut out = BytesMut::new();

    match config.sample_rate_index() {
        Some(index) => {
            let bits = (object_type << 11) | (u32::from(index) << 7) | (channels << 3);
            out.put_u16(bits as u16);
        }
        None => {
            // 5 + 4 + 24 + 4 bits, padded to 40
            let bits: u64 = (u64::from(object_type) << 35)
                | (u64::from(EXPLICIT_RATE_INDEX) << 31)
                | (u64::from(config.sample_rate & 0xFF_FFFF) << 7)
                | (u64::from(channels) << 3);
            out.put_slice(&bits.to_be_bytes()[3..]);
        }
    }
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lc_stereo_44100() {
        let config = parse_audio_specific_config(&[0x12, 0x10]).unwrap();
        assert_eq!(config.object_type, AudioObjectType::LC);
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.channel_configuration, 2);
    }

    #[test]
    fn test_write_table_form() {
        let config = AudioSpecificConfig::new(AudioObjectType::LC, 48000, 2);
        let bytes = write_audio_specific_config(&config);
        assert_eq!(&bytes[..], &[0x11, 0x90]);
        assert_eq!(parse_audio_specific_config(&bytes).unwrap(), config);
    }

    #[test]
    fn test_explicit_sample_rate() {
        let config = AudioSpecificConfig::new(AudioObjectType::LC, 37800, 1);
        let bytes = write_audio_specific_config(&config);
        assert_eq!(bytes.len(), 5);
        assert_eq!(parse_audio_specific_config(&bytes).unwrap(), config);
    }

    #[test]
    fn test_reserved_index_rejected() {
        // object type 2, rate index 13
        assert!(parse_audio_specific_config(&[0x16, 0x90]).is_err());
        assert!(parse_audio_specific_config(&[0x12]).is_err());
    }
}
