//! Sample rate conversion
//!
//! Synthesizer renders and separated stems rarely share a sample rate with
//! the mix output, so every buffer entering a mix passes through here.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::AudioBuffer;
use crate::error::{AcappellaError, Result};

/// Resample a buffer to `target_rate`.
///
/// The output is trimmed for the resampler's delay and padded or truncated
/// so its length is exactly the input length scaled by the rate ratio.
pub fn resample(buffer: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
    if buffer.sample_rate() == target_rate {
        return Ok(buffer.clone());
    }
    let channels = buffer.channels() as usize;
    let ratio = target_rate as f64 / buffer.sample_rate() as f64;
    let expected_frames = (buffer.frames() as f64 * ratio).round() as usize;

    if buffer.is_empty() {
        return Ok(AudioBuffer::silent_frames(0, target_rate, buffer.channels()));
    }

    // Deinterleave
    let mut planar: Vec<Vec<f32>> = vec![Vec::with_capacity(buffer.frames()); channels];
    for frame in buffer.samples().chunks_exact(channels) {
        for (c, &s) in frame.iter().enumerate() {
            planar[c].push(s);
        }
    }

    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, buffer.frames(), channels)
        .map_err(|e| AcappellaError::Resample(e.to_string()))?;
    let delay = resampler.output_delay();

    let mut output = resampler
        .process(&planar, None)
        .map_err(|e| AcappellaError::Resample(e.to_string()))?;
    // Flush the tail still held in the filter
    let tail = resampler
        .process_partial(None::<&[Vec<f32>]>, None)
        .map_err(|e| AcappellaError::Resample(e.to_string()))?;
    for (out, rest) in output.iter_mut().zip(tail) {
        out.extend(rest);
    }

    let mut samples = Vec::with_capacity(expected_frames * channels);
    for i in 0..expected_frames {
        for channel in &output {
            samples.push(channel.get(i + delay).copied().unwrap_or(0.0));
        }
    }

    log::debug!(
        "resample: {} Hz -> {} Hz, {} -> {} frames",
        buffer.sample_rate(),
        target_rate,
        buffer.frames(),
        expected_frames
    );

    Ok(AudioBuffer::new(samples, target_rate, buffer.channels()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_rate_is_identity() {
        let buf = AudioBuffer::new(vec![0.1, 0.2, 0.3], 44100, 1);
        assert_eq!(resample(&buf, 44100).unwrap(), buf);
    }

    #[test]
    fn test_length_scales_with_ratio() {
        let buf = AudioBuffer::silent(500, 24000, 1);
        let out = resample(&buf, 44100).unwrap();
        assert_eq!(out.sample_rate(), 44100);
        assert_eq!(out.frames(), 22050);
        assert_eq!(out.duration_ms(), 500);
    }

    #[test]
    fn test_stereo_is_preserved() {
        let buf = AudioBuffer::silent(100, 48000, 2);
        let out = resample(&buf, 44100).unwrap();
        assert_eq!(out.channels(), 2);
        assert_eq!(out.frames(), 4410);
    }

    #[test]
    fn test_sine_keeps_energy() {
        let sr = 24000;
        let samples: Vec<f32> = (0..sr)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sr as f32).sin() * 0.5)
            .collect();
        let buf = AudioBuffer::new(samples, sr as u32, 1);
        let out = resample(&buf, 44100).unwrap();
        let mid = &out.samples()[10000..30000];
        let peak = mid.iter().fold(0.0_f32, |a, &s| a.max(s.abs()));
        assert!(peak > 0.4 && peak < 0.6, "peak was {}", peak);
    }
}
