//! Progress events emitted while a song is processed

use std::path::PathBuf;

/// Processing stage of one window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStage {
    Separating,
    Transcribing,
    Synthesizing,
    Mixing,
}

/// Progress update sent from the coordinator.
///
/// Windows may run in parallel, so events of different windows interleave.
#[derive(Debug, Clone)]
pub enum PipelineProgress {
    /// Song decoded and sliced
    Started { song: PathBuf, windows: usize },
    /// A window entered a new stage
    Stage { window: usize, stage: WindowStage },
    /// One monophonic line was rendered
    LineRendered {
        window: usize,
        stem: String,
        octave: i32,
        line: usize,
        /// The pitch shifter failed and the unshifted render was kept
        fallback: bool,
    },
    /// An attempt at a window failed; it may be retried
    WindowFailed { window: usize, attempt: u32, error: String },
    WindowCompleted { window: usize, total: usize },
    /// Final output written
    Complete { output: PathBuf, duration_secs: f64 },
}
