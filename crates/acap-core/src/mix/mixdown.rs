//! Summing gain-staged lines into one normalized buffer
//!
//! Both backends follow the same rules: every input is brought to the mix
//! format, scaled by its gain, and summed with shorter inputs padded with
//! silence (longest duration wins). Like ffmpeg's `amix`, the sum is
//! divided by the number of inputs. The result is loudness-normalized.

use std::time::Duration;

use super::MixLine;
use crate::audio::io::{read_audio, write_wav};
use crate::audio::loudness::normalize;
use crate::audio::AudioBuffer;
use crate::config::{MixingConfig, NormalizationConfig};
use crate::error::{AcappellaError, Result};
use crate::process::run_command;

/// Mixdown implementation
pub trait Mixdown: Send + Sync {
    /// Sum `lines` into one normalized buffer in the mix format
    fn mix(&self, lines: &[MixLine]) -> Result<AudioBuffer>;

    /// Name for logs
    fn name(&self) -> &'static str;
}

/// In-process mixdown
pub struct NativeMixdown {
    sample_rate: u32,
    channels: u16,
    normalization: NormalizationConfig,
}

impl NativeMixdown {
    pub fn new(config: &MixingConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            channels: config.channels,
            normalization: config.normalization,
        }
    }
}

impl Mixdown for NativeMixdown {
    fn mix(&self, lines: &[MixLine]) -> Result<AudioBuffer> {
        let conformed = lines
            .iter()
            .map(|line| {
                Ok(line
                    .audio
                    .conformed(self.sample_rate, self.channels)?
                    .with_gain_db(line.gain_db))
            })
            .collect::<Result<Vec<_>>>()?;

        let longest = conformed.iter().map(|b| b.samples().len()).max().unwrap_or(0);
        let mut sum = vec![0.0_f32; longest];
        for buffer in &conformed {
            for (acc, &s) in sum.iter_mut().zip(buffer.samples()) {
                *acc += s;
            }
        }
        if !conformed.is_empty() {
            let scale = 1.0 / conformed.len() as f32;
            sum.iter_mut().for_each(|s| *s *= scale);
        }

        let mixed = AudioBuffer::new(sum, self.sample_rate, self.channels);
        let (normalized, report) = normalize(&mixed, &self.normalization)?;
        log::debug!("NativeMixdown: {:?}", report);
        Ok(normalized)
    }

    fn name(&self) -> &'static str {
        "native"
    }
}

/// Mixdown through ffmpeg's `amix` and `loudnorm` filters
pub struct FfmpegMixdown {
    ffmpeg: String,
    sample_rate: u32,
    channels: u16,
    normalization: NormalizationConfig,
    timeout: Option<Duration>,
}

impl FfmpegMixdown {
    pub fn new(ffmpeg: String, config: &MixingConfig, timeout: Option<Duration>) -> Self {
        Self {
            ffmpeg,
            sample_rate: config.sample_rate,
            channels: config.channels,
            normalization: config.normalization,
            timeout,
        }
    }

    /// `-filter_complex` graph: per-input volume, amix, then loudnorm
    pub fn filter_graph(&self, gains_db: &[f32]) -> String {
        let volumes: Vec<String> = gains_db
            .iter()
            .enumerate()
            .map(|(i, gain)| format!("[{i}:a]volume={gain}dB[a{i}]"))
            .collect();
        let inputs: String = (0..gains_db.len()).map(|i| format!("[a{i}]")).collect();
        let n = self.normalization;
        format!(
            "{};{}amix=inputs={}:duration=longest:dropout_transition=2,loudnorm=I={}:LRA={}:TP={}",
            volumes.join(";"),
            inputs,
            gains_db.len(),
            n.target_lufs,
            n.loudness_range,
            n.peak_db
        )
    }
}

impl Mixdown for FfmpegMixdown {
    fn mix(&self, lines: &[MixLine]) -> Result<AudioBuffer> {
        if lines.is_empty() {
            return Ok(AudioBuffer::silent(0, self.sample_rate, self.channels));
        }

        let scratch = tempfile::Builder::new()
            .prefix("acap_mix_")
            .tempdir()
            .map_err(|e| AcappellaError::io(std::env::temp_dir(), e))?;

        let mut args = vec!["-y".to_string(), "-hide_banner".to_string()];
        for (i, line) in lines.iter().enumerate() {
            let path = scratch.path().join(format!("input{}.wav", i));
            write_wav(&line.audio, &path)?;
            args.push("-i".to_string());
            args.push(path.to_string_lossy().into_owned());
        }

        let gains: Vec<f32> = lines.iter().map(|l| l.gain_db).collect();
        let output = scratch.path().join("mix.wav");
        args.extend([
            "-filter_complex".to_string(),
            self.filter_graph(&gains),
            "-ac".to_string(),
            self.channels.to_string(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-f".to_string(),
            "wav".to_string(),
            output.to_string_lossy().into_owned(),
        ]);

        run_command(&self.ffmpeg, &args, self.timeout)?;
        read_audio(&output)
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}
