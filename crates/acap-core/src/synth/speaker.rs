//! Target voice selection for the pitch shifter

use serde::{Deserialize, Serialize};

use crate::config::VoiceConfig;

/// Vocal register a line is sung in after shifting back to its octave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceRegister {
    Soprano,
    Alto,
    Tenor,
    Bass,
}

impl VoiceRegister {
    /// Register for a target octave (≥5 soprano, ≥4 alto, ≥3 tenor, else bass)
    pub fn for_octave(octave: i32) -> Self {
        match octave {
            o if o >= 5 => Self::Soprano,
            4 => Self::Alto,
            3 => Self::Tenor,
            _ => Self::Bass,
        }
    }

    /// Configured speaker identity for this register
    pub fn speaker_id<'a>(&self, voices: &'a VoiceConfig) -> &'a str {
        match self {
            Self::Soprano => &voices.soprano,
            Self::Alto => &voices.alto,
            Self::Tenor => &voices.tenor,
            Self::Bass => &voices.bass,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_bands() {
        assert_eq!(VoiceRegister::for_octave(7), VoiceRegister::Soprano);
        assert_eq!(VoiceRegister::for_octave(5), VoiceRegister::Soprano);
        assert_eq!(VoiceRegister::for_octave(4), VoiceRegister::Alto);
        assert_eq!(VoiceRegister::for_octave(3), VoiceRegister::Tenor);
        assert_eq!(VoiceRegister::for_octave(2), VoiceRegister::Bass);
        assert_eq!(VoiceRegister::for_octave(-1), VoiceRegister::Bass);
    }

    #[test]
    fn test_speaker_ids_from_config() {
        let voices = VoiceConfig::default();
        assert_eq!(VoiceRegister::for_octave(5).speaker_id(&voices), "M4Singer-Soprano-1");
        assert_eq!(VoiceRegister::for_octave(1).speaker_id(&voices), "M4Singer-Bass-1");
    }
}
