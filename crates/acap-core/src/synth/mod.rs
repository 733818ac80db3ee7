//! Preparing monophonic lines for the singing voice synthesizer
//!
//! - [`batch`]: splits a line into synthesizer-sized batches at rests
//! - [`speaker`]: picks the converter voice for a register

pub mod batch;
pub mod speaker;

pub use batch::{NoteBatcher, SynthBatch, SynthNote, SynthRequest};
pub use speaker::VoiceRegister;
