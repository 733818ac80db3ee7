//! Audio buffer value type and audio utilities
//!
//! An [`AudioBuffer`] is created once (decoding, slicing, synthesis, mixing)
//! and every transformation returns a new buffer. Samples are interleaved f32.
//!
//! Durations are measured in whole milliseconds the same way everywhere, so
//! that window boundaries, batch lengths and crossfades line up exactly.

pub mod io;
pub mod loudness;
pub mod resample;

use crate::error::Result;

/// Gain floor used when fading to silence (-120 dB)
const SILENCE_FLOOR: f32 = 1e-6;

/// Immutable interleaved PCM audio
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    /// Wrap interleaved samples. Trailing samples that do not form a whole
    /// frame are dropped.
    pub fn new(mut samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels as usize;
        samples.truncate(whole);
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Silence of the given number of frames
    pub fn silent_frames(frames: usize, sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        Self {
            samples: vec![0.0; frames * channels as usize],
            sample_rate,
            channels,
        }
    }

    /// Silence of the given duration
    pub fn silent(duration_ms: u64, sample_rate: u32, channels: u16) -> Self {
        Self::silent_frames(ms_to_frames(duration_ms, sample_rate), sample_rate, channels)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration rounded to whole milliseconds
    pub fn duration_ms(&self) -> u64 {
        frames_to_ms(self.frames(), self.sample_rate)
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Absolute peak sample value
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0_f32, |acc, &s| acc.max(s.abs()))
    }

    /// Frame index for a millisecond position, clamped to the buffer
    pub fn frame_at_ms(&self, ms: u64) -> usize {
        ms_to_frames(ms, self.sample_rate).min(self.frames())
    }

    /// Copy of the frames in `[start, end)`, clamped to the buffer
    pub fn slice_frames(&self, start: usize, end: usize) -> Self {
        let frames = self.frames();
        let start = start.min(frames);
        let end = end.clamp(start, frames);
        let ch = self.channels as usize;
        Self {
            samples: self.samples[start * ch..end * ch].to_vec(),
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    /// Copy of `[start_ms, end_ms)`, clamped to the buffer
    pub fn slice_ms(&self, start_ms: u64, end_ms: u64) -> Self {
        self.slice_frames(self.frame_at_ms(start_ms), self.frame_at_ms(end_ms))
    }

    /// First `frames` frames
    pub fn truncated(&self, frames: usize) -> Self {
        self.slice_frames(0, frames)
    }

    /// Buffer extended with trailing silence up to `frames` frames.
    /// Longer buffers are returned unchanged.
    pub fn padded_to(&self, frames: usize) -> Self {
        let mut samples = self.samples.clone();
        let target = frames * self.channels as usize;
        if samples.len() < target {
            samples.resize(target, 0.0);
        }
        Self {
            samples,
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    /// Linear fade from unity to silence over `[end - fade_frames, end)`.
    /// Frames from `end` onward are left untouched; callers truncate them.
    pub fn faded_out(&self, end: usize, fade_frames: usize) -> Self {
        let end = end.min(self.frames());
        let fade_frames = fade_frames.min(end);
        let start = end - fade_frames;
        let ch = self.channels as usize;
        let mut samples = self.samples.clone();
        if fade_frames > 0 {
            for frame in start..end {
                let progress = (frame - start + 1) as f32 / fade_frames as f32;
                let gain = (1.0 - progress).max(0.0);
                let gain = if gain < SILENCE_FLOOR { 0.0 } else { gain };
                for s in &mut samples[frame * ch..(frame + 1) * ch] {
                    *s *= gain;
                }
            }
        }
        Self {
            samples,
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    /// Buffer scaled by a gain in decibels
    pub fn with_gain_db(&self, gain_db: f32) -> Self {
        let gain = crate::types::db_to_linear(gain_db);
        Self {
            samples: self.samples.iter().map(|&s| s * gain).collect(),
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    /// Buffer with a different channel count.
    ///
    /// Mono is duplicated into every output channel; anything else is
    /// downmixed to mono first.
    pub fn with_channels(&self, channels: u16) -> Self {
        let channels = channels.max(1);
        if channels == self.channels {
            return self.clone();
        }
        let ch = self.channels as usize;
        let mono: Vec<f32> = if ch == 1 {
            self.samples.clone()
        } else {
            self.samples
                .chunks_exact(ch)
                .map(|frame| frame.iter().sum::<f32>() / ch as f32)
                .collect()
        };
        let samples = if channels == 1 {
            mono
        } else {
            mono.iter()
                .flat_map(|&s| std::iter::repeat(s).take(channels as usize))
                .collect()
        };
        Self {
            samples,
            sample_rate: self.sample_rate,
            channels,
        }
    }

    /// Buffer converted to the given format (resampled and rechannelled)
    pub fn conformed(&self, sample_rate: u32, channels: u16) -> Result<Self> {
        let resampled = if self.sample_rate == sample_rate {
            self.clone()
        } else {
            resample::resample(self, sample_rate)?
        };
        Ok(resampled.with_channels(channels))
    }

    /// Concatenation of `self` followed by `other`, in `self`'s format
    pub fn concat(&self, other: &AudioBuffer) -> Result<Self> {
        let other = other.conformed(self.sample_rate, self.channels)?;
        let mut samples = Vec::with_capacity(self.samples.len() + other.samples.len());
        samples.extend_from_slice(&self.samples);
        samples.extend_from_slice(&other.samples);
        Ok(Self {
            samples,
            sample_rate: self.sample_rate,
            channels: self.channels,
        })
    }

    /// Append `other` overlapping the last `crossfade_ms` of `self`.
    ///
    /// The tail of `self` fades out while the head of `other` fades in. The
    /// result is `crossfade_ms` shorter than a plain concatenation. The
    /// crossfade is clamped to the shorter of the two buffers.
    pub fn append_crossfade(&self, other: &AudioBuffer, crossfade_ms: u64) -> Result<Self> {
        let other = other.conformed(self.sample_rate, self.channels)?;
        let xf = ms_to_frames(crossfade_ms, self.sample_rate)
            .min(self.frames())
            .min(other.frames());
        let ch = self.channels as usize;
        let head_end = (self.frames() - xf) * ch;

        let mut samples = Vec::with_capacity(self.samples.len() + other.samples.len() - xf * ch);
        samples.extend_from_slice(&self.samples[..head_end]);
        for i in 0..xf {
            let t = (i as f32 + 0.5) / xf as f32;
            for c in 0..ch {
                let a = self.samples[head_end + i * ch + c];
                let b = other.samples[i * ch + c];
                samples.push(a * (1.0 - t) + b * t);
            }
        }
        samples.extend_from_slice(&other.samples[xf * ch..]);

        Ok(Self {
            samples,
            sample_rate: self.sample_rate,
            channels: self.channels,
        })
    }
}

/// Frames covering `ms` milliseconds at `sample_rate`, rounded to nearest
pub fn ms_to_frames(ms: u64, sample_rate: u32) -> usize {
    ((ms as u128 * sample_rate as u128 + 500) / 1000) as usize
}

/// Milliseconds covered by `frames` at `sample_rate`, rounded to nearest
pub fn frames_to_ms(frames: usize, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    ((frames as u128 * 1000 + sample_rate as u128 / 2) / sample_rate as u128) as u64
}

/// Seconds to whole milliseconds, rounded to nearest
pub fn secs_to_ms(secs: f64) -> u64 {
    (secs.max(0.0) * 1000.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize, sample_rate: u32) -> AudioBuffer {
        let samples = (0..frames).map(|i| i as f32 / frames as f32).collect();
        AudioBuffer::new(samples, sample_rate, 1)
    }

    #[test]
    fn test_silent_duration() {
        let buf = AudioBuffer::silent(1500, 44100, 2);
        assert_eq!(buf.frames(), 66150);
        assert_eq!(buf.duration_ms(), 1500);
        assert_eq!(buf.samples().len(), 132300);
    }

    #[test]
    fn test_new_drops_partial_frame() {
        let buf = AudioBuffer::new(vec![0.1, 0.2, 0.3], 1000, 2);
        assert_eq!(buf.frames(), 1);
    }

    #[test]
    fn test_slice_ms_is_clamped() {
        let buf = AudioBuffer::silent(1000, 1000, 1);
        assert_eq!(buf.slice_ms(200, 700).duration_ms(), 500);
        assert_eq!(buf.slice_ms(900, 5000).duration_ms(), 100);
        assert!(buf.slice_ms(2000, 3000).is_empty());
    }

    #[test]
    fn test_padded_and_truncated() {
        let buf = ramp(100, 1000);
        assert_eq!(buf.padded_to(250).frames(), 250);
        assert_eq!(buf.padded_to(50).frames(), 100);
        assert_eq!(buf.truncated(40).frames(), 40);
        assert_eq!(buf.padded_to(250).samples()[200], 0.0);
    }

    #[test]
    fn test_fade_out_reaches_silence() {
        let buf = AudioBuffer::new(vec![1.0; 100], 1000, 1);
        let faded = buf.faded_out(80, 20);
        assert_eq!(faded.samples()[59], 1.0);
        assert!(faded.samples()[70] < 1.0);
        assert_eq!(faded.samples()[79], 0.0);
        // Past the fade end is untouched
        assert_eq!(faded.samples()[90], 1.0);
    }

    #[test]
    fn test_channel_conversion() {
        let mono = AudioBuffer::new(vec![0.5, -0.5], 1000, 1);
        let stereo = mono.with_channels(2);
        assert_eq!(stereo.samples(), &[0.5, 0.5, -0.5, -0.5]);
        let back = stereo.with_channels(1);
        assert_eq!(back.samples(), mono.samples());
    }

    #[test]
    fn test_append_crossfade_length() {
        let a = AudioBuffer::new(vec![1.0; 3000], 1000, 1);
        let b = AudioBuffer::new(vec![1.0; 2000], 1000, 1);
        let joined = a.append_crossfade(&b, 1000).unwrap();
        assert_eq!(joined.duration_ms(), 4000);
        // Equal-level inputs stay at unity through the crossfade
        assert!(joined.samples().iter().all(|&s| (s - 1.0).abs() < 1e-5));
    }

    #[test]
    fn test_append_crossfade_clamps_to_shorter_buffer() {
        let a = AudioBuffer::new(vec![1.0; 3000], 1000, 1);
        let b = AudioBuffer::new(vec![0.0; 500], 1000, 1);
        let joined = a.append_crossfade(&b, 1000).unwrap();
        assert_eq!(joined.duration_ms(), 3000);
    }

    #[test]
    fn test_concat() {
        let a = AudioBuffer::silent(300, 1000, 1);
        let b = ramp(200, 1000);
        let joined = a.concat(&b).unwrap();
        assert_eq!(joined.duration_ms(), 500);
        assert_eq!(&joined.samples()[300..], b.samples());
    }

    #[test]
    fn test_ms_frame_conversions_round() {
        assert_eq!(ms_to_frames(1, 44100), 44);
        assert_eq!(ms_to_frames(1000, 24000), 24000);
        assert_eq!(frames_to_ms(24000, 24000), 1000);
        assert_eq!(secs_to_ms(0.6), 600);
        assert_eq!(secs_to_ms(-1.0), 0);
    }
}
