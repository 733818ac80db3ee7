//! Note batching for the singing voice synthesizer
//!
//! A monophonic line becomes a flat list of `(symbol, duration, phonemes)`
//! notes that tiles the line's timeline from 0:
//!
//! - a line that starts late gets a leading silence
//! - a gap shorter than the minimum silence is absorbed by lengthening the
//!   note before it (legato)
//! - a longer gap becomes an explicit silence
//! - a terminal silence of the minimum length is always appended
//!
//! The list is then cut after every silence, so each batch ends in exactly
//! one rest and knows its absolute offset in the line.

use serde::{Deserialize, Serialize};

use crate::config::SynthesisConfig;
use crate::error::{AcappellaError, Result};
use crate::notes::{NoteTrack, Pitch};

/// One synthesizer note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthNote {
    pub pitch: Pitch,
    pub symbol: String,
    /// Seconds
    pub duration: f64,
    pub phonemes: Vec<String>,
}

impl SynthNote {
    pub fn is_silence(&self) -> bool {
        self.pitch == Pitch::Silence
    }
}

/// Contiguous run of notes ending in a rest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthBatch {
    pub notes: Vec<SynthNote>,
    /// Start of the batch in the line's timeline, seconds
    pub offset: f64,
}

/// Phoneme-level synthesizer request
///
/// Every sequence has one space-separated entry per phoneme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthRequest {
    pub input_type: String,
    pub text: String,
    pub ph_seq: String,
    pub note_seq: String,
    pub note_dur_seq: String,
    pub is_slur_seq: String,
}

impl SynthBatch {
    /// Total duration in seconds
    pub fn duration(&self) -> f64 {
        self.notes.iter().map(|n| n.duration).sum()
    }

    pub fn end(&self) -> f64 {
        self.offset + self.duration()
    }

    pub fn to_request(&self) -> SynthRequest {
        let expanded: Vec<(&str, f64, &str)> = self
            .notes
            .iter()
            .flat_map(|n| {
                n.phonemes
                    .iter()
                    .map(move |ph| (n.symbol.as_str(), n.duration, ph.as_str()))
            })
            .collect();

        SynthRequest {
            input_type: String::from("phoneme"),
            text: String::new(),
            ph_seq: join(expanded.iter().map(|(_, _, ph)| ph.to_string())),
            note_seq: join(expanded.iter().map(|(sym, _, _)| sym.to_string())),
            note_dur_seq: join(expanded.iter().map(|(_, dur, _)| dur.to_string())),
            is_slur_seq: join(expanded.iter().map(|_| String::from("0"))),
        }
    }
}

fn join(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join(" ")
}

/// Converts monophonic lines into synthesis batches
#[derive(Debug, Clone)]
pub struct NoteBatcher {
    config: SynthesisConfig,
}

impl NoteBatcher {
    pub fn new(mut config: SynthesisConfig) -> Self {
        config.validate();
        Self { config }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    fn note(&self, pitch: Pitch, duration: f64) -> Result<SynthNote> {
        let (symbol, phonemes) = match pitch {
            Pitch::Tone(_) => {
                let symbol = match self.config.symbol_octave {
                    Some(octave) => pitch.symbol_in_octave(octave)?,
                    None => pitch.symbol()?,
                };
                (symbol, self.config.tone_phonemes.clone())
            }
            Pitch::Breath => (
                self.config.rest_symbol.clone(),
                vec![self.config.breath_phoneme.clone()],
            ),
            Pitch::Silence => (
                self.config.rest_symbol.clone(),
                vec![self.config.silence_phoneme.clone()],
            ),
        };
        Ok(SynthNote {
            pitch,
            symbol,
            duration,
            phonemes,
        })
    }

    /// Flat note list tiling `[0, line end + min silence]`
    pub fn notes(&self, track: &NoteTrack) -> Result<Vec<SynthNote>> {
        let events = track.sorted_by_start();
        let (first, last) = match (events.first(), events.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Ok(Vec::new()),
        };

        let min_silence = self.config.min_silence_secs;
        let mut notes = Vec::with_capacity(events.len() * 2 + 2);

        if first.start > 0.0 {
            notes.push(self.note(Pitch::Silence, first.start)?);
        }

        for pair in events.windows(2) {
            let (current, next) = (pair[0], pair[1]);
            let gap = next.start - current.end;
            if gap < 0.0 {
                return Err(AcappellaError::DataIntegrity(format!(
                    "line is not monophonic: note at {:.3}s overlaps note at {:.3}s",
                    current.start, next.start
                )));
            }
            if gap < min_silence {
                notes.push(self.note(current.pitch, next.start - current.start)?);
            } else {
                notes.push(self.note(current.pitch, current.duration())?);
                notes.push(self.note(Pitch::Silence, gap)?);
            }
        }

        notes.push(self.note(last.pitch, last.duration())?);
        notes.push(self.note(Pitch::Silence, min_silence)?);

        Ok(notes)
    }

    /// Split a monophonic line into batches, each ending in one silence
    pub fn batch(&self, track: &NoteTrack) -> Result<Vec<SynthBatch>> {
        let notes = self.notes(track)?;

        let mut batches = Vec::new();
        let mut current = Vec::new();
        let mut offset = 0.0;
        let mut batch_offset = 0.0;
        for note in notes {
            offset += note.duration;
            let closes = note.is_silence();
            current.push(note);
            if closes {
                batches.push(SynthBatch {
                    notes: std::mem::take(&mut current),
                    offset: batch_offset,
                });
                batch_offset = offset;
            }
        }

        log::debug!(
            "batch: {} notes -> {} batches over {:.3}s",
            track.len(),
            batches.len(),
            batch_offset
        );

        Ok(batches)
    }
}
