//! Octave banding
//!
//! Octave assignment is a pure function of pitch ([`Pitch::octave`]). A
//! stem keeps only notes inside its configured band, and the surviving
//! notes are grouped per octave so each register is sung separately.

use std::collections::BTreeMap;

use super::{NoteEvent, NoteTrack, Pitch};
use crate::error::Result;

/// Drop events whose octave falls outside `[min_octave, max_octave]`.
///
/// Every event must be tonal; a sentinel here means the transcription is
/// corrupt and yields a data integrity error.
pub fn band(track: &NoteTrack, min_octave: i32, max_octave: i32) -> Result<NoteTrack> {
    let mut kept = Vec::with_capacity(track.len());
    for event in track.events() {
        let octave = event.pitch.octave()?;
        if (min_octave..=max_octave).contains(&octave) {
            kept.push(*event);
        }
    }
    log::debug!(
        "band: Kept {}/{} notes in octaves {}..={}",
        kept.len(),
        track.len(),
        min_octave,
        max_octave
    );
    Ok(NoteTrack::from_valid(kept))
}

/// Contiguous runs of same-octave events, in track order.
///
/// Notes below `lowest_pitch` are discarded first. Two runs in the same
/// octave separated by a run in another octave stay separate here.
pub fn octave_runs(track: &NoteTrack, lowest_pitch: i32) -> Result<Vec<(i32, NoteTrack)>> {
    let audible = track
        .events()
        .iter()
        .filter(|e| matches!(e.pitch, Pitch::Tone(p) if p >= lowest_pitch));

    let mut runs: Vec<(i32, Vec<NoteEvent>)> = Vec::new();
    for event in audible {
        let octave = event.pitch.octave()?;
        match runs.last_mut() {
            Some((last, events)) if *last == octave => events.push(*event),
            _ => runs.push((octave, vec![*event])),
        }
    }

    Ok(runs
        .into_iter()
        .map(|(octave, events)| (octave, NoteTrack::from_valid(events)))
        .collect())
}

/// Group a track by octave.
///
/// Built from [`octave_runs`]: each octave's track is the concatenation of
/// its runs in their original order.
pub fn split_by_octave(track: &NoteTrack, lowest_pitch: i32) -> Result<BTreeMap<i32, NoteTrack>> {
    let runs = octave_runs(track, lowest_pitch)?;
    let grouped = runs.into_iter().fold(
        BTreeMap::<i32, Vec<NoteEvent>>::new(),
        |mut acc, (octave, run)| {
            acc.entry(octave).or_default().extend_from_slice(run.events());
            acc
        },
    );
    Ok(grouped
        .into_iter()
        .map(|(octave, events)| (octave, NoteTrack::from_valid(events)))
        .collect())
}

/// Move every tonal event to the same pitch class in `octave`.
/// Sentinels are kept as they are.
pub fn to_octave(track: &NoteTrack, octave: i32) -> Result<NoteTrack> {
    track.map_pitches(|pitch| match pitch {
        Pitch::Tone(p) => {
            let current = pitch.octave()?;
            Ok(Pitch::Tone(p + 12 * (octave - current)))
        }
        other => Ok(other),
    })
}
