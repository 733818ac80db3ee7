//! Shared constants and small conversions

/// Sample rate of every mix and of the final stitched output
pub const OUTPUT_SAMPLE_RATE: u32 = 44100;

/// Channel count of every mix and of the final stitched output
pub const OUTPUT_CHANNELS: u16 = 2;

/// Pitch of A0, the lowest note kept from transcription
pub const LOWEST_PITCH_A0: i32 = 21;

/// Convert decibels to a linear gain factor
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert a linear gain factor to decibels
#[inline]
pub fn linear_to_db(gain: f32) -> f32 {
    if gain <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * gain.log10()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_conversions() {
        assert!((db_to_linear(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_linear(-6.0) - 0.501).abs() < 0.001);
        assert!((linear_to_db(db_to_linear(-9.0)) + 9.0).abs() < 1e-4);
        assert_eq!(linear_to_db(0.0), f32::NEG_INFINITY);
    }
}
