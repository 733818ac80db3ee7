//! Semitone transposition of note data
//!
//! This moves symbolic pitches only. Moving rendered audio back to the
//! original register is a different operation, done by the voice pitch
//! shifter after synthesis.

use super::{NoteTrack, Pitch};

/// Add `semitones` to every tonal pitch; sentinels are untouched.
///
/// Exactly invertible: `shift(&shift(t, s), -s) == t`.
pub fn shift(track: &NoteTrack, semitones: i32) -> NoteTrack {
    let events = track
        .events()
        .iter()
        .map(|e| match e.pitch {
            Pitch::Tone(p) => e.with_pitch(Pitch::Tone(p + semitones)),
            _ => *e,
        })
        .collect();
    NoteTrack::from_valid(events)
}

/// Semitones that move `from_octave` onto `to_octave`
pub fn octave_delta(from_octave: i32, to_octave: i32) -> i32 {
    12 * (to_octave - from_octave)
}
