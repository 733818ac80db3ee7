//! Time-window slicing of long input audio
//!
//! Downstream models only accept a few seconds of audio, so the song is cut
//! into overlapping windows. The overlap exists solely so that window
//! outputs can be crossfaded when stitched back together.

use crate::audio::AudioBuffer;
use crate::config::SegmentationConfig;

/// One time-bounded slice `[start_ms, end_ms)` of the source song
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub index: usize,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl Window {
    pub fn len_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }
}

/// Computes window boundaries from the configured lengths
#[derive(Debug, Clone)]
pub struct Segmenter {
    config: SegmentationConfig,
}

impl Segmenter {
    pub fn new(mut config: SegmentationConfig) -> Self {
        config.validate();
        Self { config }
    }

    /// Clamp a window end to the total length, swallowing a tail that would
    /// be shorter than the minimum last window
    fn window_end(&self, potential_end_ms: u64, total_ms: u64) -> u64 {
        let end = potential_end_ms.min(total_ms);
        if total_ms - end < self.config.min_last_window_ms {
            total_ms
        } else {
            end
        }
    }

    /// Window boundaries covering `[0, total_ms)`.
    ///
    /// Empty for a zero-length input, otherwise non-empty with consecutive
    /// windows overlapping by the configured amount.
    pub fn windows(&self, total_ms: u64) -> Vec<Window> {
        if total_ms == 0 {
            return Vec::new();
        }

        let mut windows = Vec::new();
        let end = self.window_end(self.config.first_window_ms, total_ms);
        windows.push(Window {
            index: 0,
            start_ms: 0,
            end_ms: end,
        });

        let mut last_end = end;
        while last_end < total_ms {
            let start = last_end.saturating_sub(self.config.overlap_ms);
            let end = self.window_end(start + self.config.window_ms, total_ms);
            windows.push(Window {
                index: windows.len(),
                start_ms: start,
                end_ms: end,
            });
            last_end = end;
        }

        log::info!(
            "windows: {} ms -> {} window(s) {:?}",
            total_ms,
            windows.len(),
            windows.iter().map(|w| (w.start_ms, w.end_ms)).collect::<Vec<_>>()
        );

        windows
    }

    /// Slice audio into its windows
    pub fn slice(&self, audio: &AudioBuffer) -> Vec<(Window, AudioBuffer)> {
        self.windows(audio.duration_ms())
            .into_iter()
            .map(|w| (w, audio.slice_ms(w.start_ms, w.end_ms)))
            .collect()
    }
}
