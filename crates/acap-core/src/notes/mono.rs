//! Polyphonic to monophonic decomposition
//!
//! Events are visited in start order and each goes to the first open line
//! whose last event has already ended (first-fit). This always yields a
//! valid non-overlapping partition, but it is a greedy heuristic: it does
//! not guarantee the smallest possible number of lines.
//!
//! Events with equal start times keep their input order.

use super::{NoteEvent, NoteTrack};

/// Split a track into monophonic lines.
///
/// Every input event ends up in exactly one output line, and lines are
/// returned in the order they were opened.
pub fn decompose(track: &NoteTrack) -> Vec<NoteTrack> {
    let mut lines: Vec<Vec<NoteEvent>> = Vec::new();

    for event in track.sorted_by_start() {
        match lines
            .iter_mut()
            .find(|line| line.last().is_some_and(|last| last.end <= event.start))
        {
            Some(line) => line.push(event),
            None => lines.push(vec![event]),
        }
    }

    log::debug!(
        "decompose: {} notes -> {} monophonic lines",
        track.len(),
        lines.len()
    );

    lines.into_iter().map(NoteTrack::from_valid).collect()
}
