//! Symbolic note data
//!
//! A [`NoteTrack`] is an ordered sequence of [`NoteEvent`]s. Polyphonic
//! tracks may overlap; monophonic tracks never do. Tracks are values: every
//! operation in the submodules returns a new track.

pub mod mono;
pub mod octave;
pub mod transpose;

use serde::{Deserialize, Serialize};

use crate::error::{AcappellaError, Result};

/// Raw value encoding a breath event
pub const BREATH_VALUE: i32 = -1;
/// Raw value encoding a silence (rest) event
pub const SILENCE_VALUE: i32 = -2;

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Pitch of a note event: a semitone index or a non-tonal sentinel.
///
/// Serialized as a plain integer: semitone indices are non-negative, breath
/// is `-1` and silence is `-2`. Any other negative value is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Pitch {
    /// Semitone index (MIDI note number, 60 = C4)
    Tone(i32),
    Breath,
    Silence,
}

impl Pitch {
    pub fn is_tonal(&self) -> bool {
        matches!(self, Pitch::Tone(_))
    }

    /// Octave of a tonal pitch (60 → 4, 21 → 0)
    pub fn octave(&self) -> Result<i32> {
        match *self {
            Pitch::Tone(p) if (0..=127).contains(&p) => Ok(p.div_euclid(12) - 1),
            Pitch::Tone(p) => Err(AcappellaError::DataIntegrity(format!(
                "pitch {} is outside the MIDI range",
                p
            ))),
            other => Err(AcappellaError::DataIntegrity(format!(
                "cannot derive an octave from {:?}",
                other
            ))),
        }
    }

    /// Note symbol such as `C#4`
    pub fn symbol(&self) -> Result<String> {
        let octave = self.octave()?;
        self.symbol_in_octave(octave)
    }

    /// Note symbol with the octave digit replaced by `octave`
    pub fn symbol_in_octave(&self, octave: i32) -> Result<String> {
        match *self {
            Pitch::Tone(p) => {
                // Validates the range
                self.octave()?;
                Ok(format!("{}{}", NOTE_NAMES[p.rem_euclid(12) as usize], octave))
            }
            other => Err(AcappellaError::DataIntegrity(format!(
                "{:?} has no note symbol",
                other
            ))),
        }
    }
}

impl TryFrom<i32> for Pitch {
    type Error = AcappellaError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            v if v >= 0 => Ok(Pitch::Tone(v)),
            BREATH_VALUE => Ok(Pitch::Breath),
            SILENCE_VALUE => Ok(Pitch::Silence),
            v => Err(AcappellaError::DataIntegrity(format!("unknown pitch value {}", v))),
        }
    }
}

impl From<Pitch> for i32 {
    fn from(pitch: Pitch) -> i32 {
        match pitch {
            Pitch::Tone(p) => p,
            Pitch::Breath => BREATH_VALUE,
            Pitch::Silence => SILENCE_VALUE,
        }
    }
}

/// One note, breath or rest with absolute start/end times in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub pitch: Pitch,
    #[serde(default = "default_velocity")]
    pub velocity: u8,
    pub start: f64,
    pub end: f64,
}

fn default_velocity() -> u8 {
    100
}

impl NoteEvent {
    /// Create an event, checking `0 <= start < end`
    pub fn new(pitch: Pitch, velocity: u8, start: f64, end: f64) -> Result<Self> {
        let event = Self {
            pitch,
            velocity,
            start,
            end,
        };
        event.check()?;
        Ok(event)
    }

    /// Shorthand for a tonal note
    pub fn tone(pitch: i32, start: f64, end: f64) -> Result<Self> {
        Self::new(Pitch::Tone(pitch), default_velocity(), start, end)
    }

    fn check(&self) -> Result<()> {
        if !(self.start >= 0.0 && self.end > self.start && self.end.is_finite()) {
            return Err(AcappellaError::DataIntegrity(format!(
                "invalid note timing [{}, {})",
                self.start, self.end
            )));
        }
        Ok(())
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Whether the half-open intervals of two events intersect
    pub fn overlaps(&self, other: &NoteEvent) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Same event with a different pitch
    pub fn with_pitch(&self, pitch: Pitch) -> Self {
        Self { pitch, ..*self }
    }
}

/// Ordered sequence of note events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteTrack {
    events: Vec<NoteEvent>,
}

impl NoteTrack {
    /// Build a track, validating every event's timing
    pub fn new(events: Vec<NoteEvent>) -> Result<Self> {
        for event in &events {
            event.check()?;
        }
        Ok(Self { events })
    }

    /// Build a track from events already known to be valid
    pub(crate) fn from_valid(events: Vec<NoteEvent>) -> Self {
        Self { events }
    }

    /// Parse a JSON note list, validating pitch values and timing
    pub fn from_json(json: &str) -> Result<Self> {
        let events: Vec<NoteEvent> = serde_json::from_str(json)?;
        Self::new(events)
    }

    pub fn events(&self) -> &[NoteEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Latest end time of any event (0 for an empty track)
    pub fn end(&self) -> f64 {
        self.events.iter().fold(0.0, |acc, e| acc.max(e.end))
    }

    /// Whether no two events overlap
    pub fn is_monophonic(&self) -> bool {
        let mut sorted: Vec<&NoteEvent> = self.events.iter().collect();
        sorted.sort_by(|a, b| a.start.total_cmp(&b.start));
        sorted.windows(2).all(|w| w[0].end <= w[1].start)
    }

    /// Events ordered by start time; ties keep their original order
    pub fn sorted_by_start(&self) -> Vec<NoteEvent> {
        let mut events = self.events.clone();
        events.sort_by(|a, b| a.start.total_cmp(&b.start));
        events
    }

    /// Keep only events matching `predicate`
    pub fn filtered(&self, predicate: impl Fn(&NoteEvent) -> bool) -> Self {
        Self {
            events: self.events.iter().filter(|e| predicate(e)).copied().collect(),
        }
    }

    /// Apply a pitch mapping to every event
    pub fn map_pitches(&self, f: impl Fn(Pitch) -> Result<Pitch>) -> Result<Self> {
        let events = self
            .events
            .iter()
            .map(|e| Ok(e.with_pitch(f(e.pitch)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { events })
    }
}
