//! Acappella Core - turns recorded songs into all-vocal renditions
//!
//! The song is sliced into overlapping windows. Each window is separated
//! into stems, its melodic stems are transcribed to notes, the notes are
//! split into monophonic lines per octave, and every line is sung by a
//! voice synthesizer and shifted back to its register. Lines and the
//! original vocal stem are mixed per window, and window mixes are stitched
//! into the final result.

pub mod audio;
pub mod config;
pub mod error;
pub mod mix;
pub mod notes;
pub mod pipeline;
pub mod process;
pub mod segment;
pub mod services;
pub mod synth;
pub mod types;

pub use audio::AudioBuffer;
pub use config::Config;
pub use error::{AcappellaError, Result};
pub use notes::{NoteEvent, NoteTrack, Pitch};
pub use pipeline::{Acappellifier, PipelineProgress};
pub use services::{Collaborators, ShiftOutcome};
pub use types::*;
