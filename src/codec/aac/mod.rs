//! AAC decoder configuration (`AudioSpecificConfig`) as stored in `esds`.

pub mod parser;
pub mod types;

pub use parser::{parse_audio_specific_config, write_audio_specific_config};
pub use types::{sample_rate_from_index, sample_rate_index, AudioObjectType, AudioSpecificConfig};
