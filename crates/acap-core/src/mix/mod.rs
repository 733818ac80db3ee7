//! Line rendering, gain staging and mixing
//!
//! A monophonic line is rendered batch by batch. Each clip is fitted to the
//! span its batch occupies in the line's timeline, so the concatenated
//! clips line up with the notes they were rendered from. Finished lines
//! plus the separated vocal stem are then mixed per window, and window
//! mixes are stitched with a crossfade.

mod mixdown;

pub use mixdown::{FfmpegMixdown, Mixdown, NativeMixdown};

use std::time::Duration;

use crate::audio::{ms_to_frames, secs_to_ms, AudioBuffer};
use crate::config::{Config, MixdownBackend, MixingConfig};
use crate::error::Result;
use crate::synth::SynthBatch;

/// One contribution to a mix
#[derive(Debug, Clone)]
pub struct MixLine {
    pub audio: AudioBuffer,
    /// Register the line was sung in; `None` for the vocal stem
    pub octave: Option<i32>,
    pub gain_db: f32,
}

/// Fit a rendered clip to `expected_ms`.
///
/// Longer clips fade to silence over the last `fade_ms` before the expected
/// end and are cut there. Shorter clips are padded with silence.
pub fn align_clip(clip: &AudioBuffer, expected_ms: u64, fade_ms: u64) -> AudioBuffer {
    let expected = ms_to_frames(expected_ms, clip.sample_rate());
    if clip.frames() > expected {
        let fade = ms_to_frames(fade_ms, clip.sample_rate());
        clip.faded_out(expected, fade).truncated(expected)
    } else {
        clip.padded_to(expected)
    }
}

/// Span of each batch in milliseconds: from its offset to the next batch's
/// offset, the last one ending at `line_end_secs`.
///
/// The terminal rest of the last batch is not part of the line.
pub fn batch_spans_ms(batches: &[SynthBatch], line_end_secs: f64) -> Vec<u64> {
    batches
        .iter()
        .enumerate()
        .map(|(i, batch)| {
            let next = batches.get(i + 1).map_or(line_end_secs, |b| b.offset);
            secs_to_ms((next - batch.offset).max(0.0))
        })
        .collect()
}

/// Combines rendered lines into window mixes
pub struct Mixer {
    config: MixingConfig,
    fade_ms: u64,
    backend: Box<dyn Mixdown>,
}

impl Mixer {
    pub fn new(mut config: MixingConfig, fade_secs: f64, backend: Box<dyn Mixdown>) -> Self {
        config.validate();
        Self {
            config,
            fade_ms: secs_to_ms(fade_secs),
            backend,
        }
    }

    /// Mixer using the configured mixdown backend
    pub fn from_config(config: &Config) -> Self {
        let mixing = config.mixing.clone();
        let backend: Box<dyn Mixdown> = match mixing.backend {
            MixdownBackend::Native => Box::new(NativeMixdown::new(&mixing)),
            MixdownBackend::Ffmpeg => Box::new(FfmpegMixdown::new(
                config.commands.ffmpeg.clone(),
                &mixing,
                config.pipeline.mixdown_timeout_secs.map(Duration::from_secs),
            )),
        };
        Self::new(mixing, config.synthesis.fade_secs, backend)
    }

    pub fn config(&self) -> &MixingConfig {
        &self.config
    }

    /// Gain for a line sung in `octave`; lower registers are attenuated more
    pub fn gain_for_octave(&self, octave: i32) -> f32 {
        self.config
            .octave_gains
            .iter()
            .find(|band| octave >= band.min_octave)
            .map_or(self.config.fallback_gain_db, |band| band.gain_db)
    }

    /// Mix line for a rendered register
    pub fn line(&self, audio: AudioBuffer, octave: i32) -> MixLine {
        MixLine {
            audio,
            octave: Some(octave),
            gain_db: self.gain_for_octave(octave),
        }
    }

    /// Mix line for the separated vocal stem
    pub fn vocal_line(&self, audio: AudioBuffer) -> MixLine {
        MixLine {
            audio,
            octave: None,
            gain_db: self.config.vocal_stem_gain_db,
        }
    }

    /// Render every batch with `synthesize` and assemble a timeline-aligned
    /// line ending at `line_end_secs`.
    ///
    /// The line starts with silence up to the first batch's offset. An empty
    /// batch list yields an empty buffer in the mix format.
    pub fn render_line(
        &self,
        batches: &[SynthBatch],
        line_end_secs: f64,
        mut synthesize: impl FnMut(&SynthBatch) -> Result<AudioBuffer>,
    ) -> Result<AudioBuffer> {
        let clips = batches.iter().map(|batch| synthesize(batch)).collect::<Result<Vec<_>>>()?;
        let Some(first) = clips.first() else {
            return Ok(AudioBuffer::silent(0, self.config.sample_rate, self.config.channels));
        };

        let spans = batch_spans_ms(batches, line_end_secs);
        let leading_ms = secs_to_ms(batches[0].offset);
        let mut line = AudioBuffer::silent(leading_ms, first.sample_rate(), first.channels());
        for (clip, span_ms) in clips.iter().zip(spans) {
            log::debug!(
                "render_line: Clip {} ms -> span {} ms",
                clip.duration_ms(),
                span_ms
            );
            line = line.concat(&align_clip(clip, span_ms, self.fade_ms))?;
        }
        Ok(line)
    }

    /// Combine all lines of one window. Every line must be complete; the
    /// result is as long as the longest line.
    pub fn mix(&self, lines: &[MixLine]) -> Result<AudioBuffer> {
        log::info!(
            "mix: {} lines via {} ({} Hz, {} ch)",
            lines.len(),
            self.backend.name(),
            self.config.sample_rate,
            self.config.channels
        );
        self.backend.mix(lines)
    }
}

/// Join window outputs in order, crossfading each boundary by `crossfade_ms`.
///
/// Returns `None` when there is nothing to stitch.
pub fn stitch(windows: &[AudioBuffer], crossfade_ms: u64) -> Result<Option<AudioBuffer>> {
    let mut iter = windows.iter();
    let Some(first) = iter.next() else {
        return Ok(None);
    };
    let mut stitched = first.clone();
    for next in iter {
        stitched = stitched.append_crossfade(next, crossfade_ms)?;
    }
    Ok(Some(stitched))
}
