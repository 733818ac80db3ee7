//! Loudness measurement using the EBU R128 algorithm
//!
//! Integrated loudness is measured with the `ebur128` crate. Normalization
//! then applies one static gain that reaches the target without pushing the
//! sample peak above the configured ceiling.

use ebur128::{EbuR128, Mode};

use super::AudioBuffer;
use crate::config::NormalizationConfig;
use crate::error::{AcappellaError, Result};
use crate::types::{db_to_linear, linear_to_db};

/// Outcome of a normalization pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationReport {
    /// Integrated loudness before normalization
    pub measured_lufs: Option<f32>,
    /// Gain that was applied
    pub applied_gain_db: f32,
    /// Whether the peak ceiling limited the gain
    pub peak_limited: bool,
}

/// Integrated loudness in LUFS.
///
/// Returns `None` for silence and for clips shorter than one gating block,
/// which EBU R128 reports as negative infinity.
pub fn integrated_lufs(buffer: &AudioBuffer) -> Result<Option<f32>> {
    let loudness_err = |e: ebur128::Error| AcappellaError::Loudness(format!("{:?}", e));

    if buffer.is_empty() {
        return Ok(None);
    }

    let mut meter = EbuR128::new(buffer.channels() as u32, buffer.sample_rate(), Mode::I)
        .map_err(loudness_err)?;
    meter.add_frames_f32(buffer.samples()).map_err(loudness_err)?;
    let lufs = meter.loudness_global().map_err(loudness_err)?;

    log::debug!(
        "integrated_lufs: {:.2} LUFS over {:.1}s",
        lufs,
        buffer.duration_secs()
    );

    Ok(lufs.is_finite().then_some(lufs as f32))
}

/// Normalize a buffer to the configured integrated loudness without letting
/// its sample peak exceed the configured ceiling.
///
/// The loudness range target is honoured only by the ffmpeg mixdown; this
/// pass applies a single static gain.
pub fn normalize(buffer: &AudioBuffer, config: &NormalizationConfig) -> Result<(AudioBuffer, NormalizationReport)> {
    let Some(measured_lufs) = integrated_lufs(buffer)? else {
        log::debug!("normalize: Buffer is silent or too short to measure, leaving unchanged");
        return Ok((
            buffer.clone(),
            NormalizationReport {
                measured_lufs: None,
                applied_gain_db: 0.0,
                peak_limited: false,
            },
        ));
    };

    let mut gain_db = config.target_lufs - measured_lufs;
    let mut peak_limited = false;
    let peak = buffer.peak();
    if peak > 0.0 {
        let ceiling_gain_db = config.peak_db - linear_to_db(peak);
        if gain_db > ceiling_gain_db {
            gain_db = ceiling_gain_db;
            peak_limited = true;
        }
    }

    log::info!(
        "normalize: {:.2} LUFS -> target {:.1} LUFS, gain {:+.2} dB{}",
        measured_lufs,
        config.target_lufs,
        gain_db,
        if peak_limited { " (peak limited)" } else { "" }
    );

    let gain = db_to_linear(gain_db);
    let samples = buffer.samples().iter().map(|&s| s * gain).collect();
    Ok((
        AudioBuffer::new(samples, buffer.sample_rate(), buffer.channels()),
        NormalizationReport {
            measured_lufs: Some(measured_lufs),
            applied_gain_db: gain_db,
            peak_limited,
        },
    ))
}
