//! External model collaborators
//!
//! The neural models are opaque to the pipeline. Each is reached through a
//! trait with a fixed input/output contract so the coordinator can be driven
//! by command-line tools in production and by in-memory fakes in tests.
//!
//! - [`StemSeparator`]: one audio file in, named stem files out
//! - [`Transcriber`]: one stem in, a polyphonic [`NoteTrack`] out
//! - [`VoiceSynthesizer`]: one [`SynthBatch`] in, sung audio out
//! - [`VoicePitchShifter`]: re-pitches and re-voices a rendered line; may
//!   fail, in which case the caller keeps the unshifted audio
//!
//! [`command`] holds the command-line-backed implementations.

pub mod command;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};

use crate::audio::AudioBuffer;
use crate::config::TranscriptionConfig;
use crate::error::Result;
use crate::notes::NoteTrack;
use crate::synth::SynthBatch;

pub use command::{CommandSeparator, CommandSynthesizer, CommandTranscriber, CommandVoiceConverter};

/// Splits one audio file into named stems
pub trait StemSeparator: Send + Sync {
    /// Separate `input` into stems written below `output_dir`.
    ///
    /// Returns stem name → audio file. A failing invocation is fatal for the
    /// enclosing window.
    fn separate(&self, input: &Path, output_dir: &Path) -> Result<BTreeMap<String, PathBuf>>;

    /// Name for logs
    fn name(&self) -> &'static str;
}

/// Converts one stem into note events
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, input: &Path, config: &TranscriptionConfig) -> Result<NoteTrack>;

    fn name(&self) -> &'static str;
}

/// Renders one batch into a sung waveform
pub trait VoiceSynthesizer: Send + Sync {
    fn synthesize(&self, batch: &SynthBatch) -> Result<AudioBuffer>;

    fn name(&self) -> &'static str;
}

/// Re-pitches a rendered waveform for a target speaker
pub trait VoicePitchShifter: Send + Sync {
    fn shift(&self, audio: &AudioBuffer, speaker: &str, semitones: i32) -> Result<AudioBuffer>;

    fn name(&self) -> &'static str;
}

/// The four collaborators a coordinator is built from
#[derive(Clone)]
pub struct Collaborators {
    pub separator: Arc<dyn StemSeparator>,
    pub transcriber: Arc<dyn Transcriber>,
    pub synthesizer: Arc<dyn VoiceSynthesizer>,
    pub pitch_shifter: Arc<dyn VoicePitchShifter>,
}

/// Result of a pitch-shift attempt
#[derive(Debug, Clone)]
pub enum ShiftOutcome {
    Shifted(AudioBuffer),
    /// The shifter failed or timed out; `original` is the unshifted render
    Fallback { original: AudioBuffer, reason: String },
}

impl ShiftOutcome {
    /// Run `shifter` and absorb any failure into [`ShiftOutcome::Fallback`]
    pub fn attempt(shifter: &dyn VoicePitchShifter, audio: &AudioBuffer, speaker: &str, semitones: i32) -> Self {
        match shifter.shift(audio, speaker, semitones) {
            Ok(shifted) => ShiftOutcome::Shifted(shifted),
            Err(e) => ShiftOutcome::Fallback {
                original: audio.clone(),
                reason: e.to_string(),
            },
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ShiftOutcome::Fallback { .. })
    }

    /// The audio to mix, shifted or not
    pub fn into_audio(self) -> AudioBuffer {
        match self {
            ShiftOutcome::Shifted(audio) => audio,
            ShiftOutcome::Fallback { original, .. } => original,
        }
    }
}

/// Fixed set of model replicas handed out one caller at a time.
///
/// With a single replica every call is serialized; with `n` replicas at most
/// `n` calls run concurrently.
pub struct ReplicaPool<T> {
    replicas: Vec<T>,
    free: Mutex<Vec<usize>>,
    available: Condvar,
}

/// Returns a replica to the pool on drop, even if the call panicked
struct Lease<'a, T> {
    pool: &'a ReplicaPool<T>,
    index: usize,
}

impl<T> Drop for Lease<'_, T> {
    fn drop(&mut self) {
        let mut free = self.pool.free.lock().unwrap_or_else(|e| e.into_inner());
        free.push(self.index);
        self.pool.available.notify_one();
    }
}

impl<T> ReplicaPool<T> {
    /// Pool over the given replicas (at least one is required)
    pub fn new(replicas: Vec<T>) -> Self {
        assert!(!replicas.is_empty(), "ReplicaPool needs at least one replica");
        let free = (0..replicas.len()).rev().collect();
        Self {
            replicas,
            free: Mutex::new(free),
            available: Condvar::new(),
        }
    }

    fn acquire(&self) -> Lease<'_, T> {
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(index) = free.pop() {
                return Lease { pool: self, index };
            }
            free = self.available.wait(free).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Run `f` against a free replica, blocking until one is available
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let lease = self.acquire();
        f(&self.replicas[lease.index])
    }
}

impl<T: Clone> ReplicaPool<T> {
    /// Pool of `count` clones of one replica
    pub fn replicated(replica: T, count: usize) -> Self {
        Self::new(vec![replica; count.max(1)])
    }
}
