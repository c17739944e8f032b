//! On/off decomposition of sounding events, its inverse, and chord splitting.

use std::collections::VecDeque;

use tracing::debug;

use super::Transformer;
use crate::error::Result;
use crate::event::{ChordEvent, EventKind, MusicBuffer, MusicEvent, NoteEvent};

/// Splits notes and chords into instantaneous on/off pairs.
///
/// Offs wait in a buffer and are released ahead of any later event, so the
/// output stays ordered.
#[derive(Debug, Default)]
pub struct DecomposeNotes {
    pending_offs: MusicBuffer,
}

impl DecomposeNotes {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transformer for DecomposeNotes {
    fn push(&mut self, event: MusicEvent, out: &mut VecDeque<MusicEvent>) -> Result<()> {
        out.extend(self.pending_offs.collect(event.timestamp));

        let (on, off) = match &event.kind {
            EventKind::Note(note) => (
                EventKind::NoteOn(note.clone()),
                EventKind::NoteOff(note.clone()),
            ),
            EventKind::Chord(chord) => (
                EventKind::ChordOn(chord.clone()),
                EventKind::ChordOff(chord.clone()),
            ),
            _ => {
                out.push_back(event);
                return Ok(());
            }
        };
        let end = event.end_timestamp();
        self.pending_offs.append(MusicEvent {
            timestamp: end,
            kind: off,
            ..event.clone()
        });
        out.push_back(MusicEvent { kind: on, ..event });
        Ok(())
    }

    fn finish(&mut self, out: &mut VecDeque<MusicEvent>) -> Result<()> {
        out.extend(self.pending_offs.collect_all());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PairKey {
    voice: Option<String>,
    chord: bool,
    pitches: Vec<i32>,
    staff: Option<u32>,
}

impl PairKey {
    fn of(event: &MusicEvent, chord: bool) -> Self {
        Self {
            voice: event.voice_name().map(str::to_string),
            chord,
            pitches: event.pitches().iter().map(|p| p.midi()).collect(),
            staff: event.staff,
        }
    }
}

#[derive(Debug)]
struct Slot {
    event: MusicEvent,
    /// Set while an on is waiting for its off.
    open: Option<PairKey>,
}

/// Joins on/off pairs back into notes and chords.
///
/// Output follows the order of the ons. Anything arriving after an open on
/// waits behind it. An on that never sees its off is emitted unchanged at
/// end of stream; an off with no open on is dropped.
#[derive(Debug, Default)]
pub struct ComposeNotes {
    slots: VecDeque<Slot>,
}

impl ComposeNotes {
    pub fn new() -> Self {
        Self::default()
    }

    fn release(&mut self, out: &mut VecDeque<MusicEvent>) {
        while self.slots.front().is_some_and(|slot| slot.open.is_none()) {
            if let Some(slot) = self.slots.pop_front() {
                out.push_back(slot.event);
            }
        }
    }

    fn close(&mut self, off: &MusicEvent, chord: bool) {
        let key = PairKey::of(off, chord);
        let Some(slot) = self
            .slots
            .iter_mut()
            .find(|slot| slot.open.as_ref() == Some(&key))
        else {
            debug!(at = off.timestamp, "dropping note off without a matching on");
            return;
        };
        let on = &slot.event;
        let kind = match &on.kind {
            EventKind::NoteOn(note) => EventKind::Note(note.clone()),
            EventKind::ChordOn(chord) => EventKind::Chord(chord.clone()),
            _ => return,
        };
        let duration = off.timestamp - on.timestamp;
        slot.event = MusicEvent { kind, ..on.clone() }.with_duration(duration);
        slot.open = None;
    }
}

impl Transformer for ComposeNotes {
    fn push(&mut self, event: MusicEvent, out: &mut VecDeque<MusicEvent>) -> Result<()> {
        match &event.kind {
            EventKind::NoteOn(_) | EventKind::ChordOn(_) => {
                let key = PairKey::of(&event, matches!(event.kind, EventKind::ChordOn(_)));
                self.slots.push_back(Slot {
                    event,
                    open: Some(key),
                });
            }
            EventKind::NoteOff(_) => self.close(&event, false),
            EventKind::ChordOff(_) => self.close(&event, true),
            _ => self.slots.push_back(Slot { event, open: None }),
        }
        self.release(out);
        Ok(())
    }

    fn finish(&mut self, out: &mut VecDeque<MusicEvent>) -> Result<()> {
        out.extend(self.slots.drain(..).map(|slot| slot.event));
        Ok(())
    }
}

/// Splits each chord into simultaneous notes, one per pitch.
#[derive(Debug, Default)]
pub struct DecomposeChords;

impl DecomposeChords {
    pub fn new() -> Self {
        Self
    }
}

fn chord_notes(chord: &ChordEvent) -> impl Iterator<Item = NoteEvent> + '_ {
    chord.pitches.iter().map(|&pitch| NoteEvent {
        pitch,
        value: chord.value,
        duration: chord.duration,
        velocity: chord.velocity,
        tied: false,
    })
}

impl Transformer for DecomposeChords {
    fn push(&mut self, event: MusicEvent, out: &mut VecDeque<MusicEvent>) -> Result<()> {
        let (chord, wrap): (&ChordEvent, fn(NoteEvent) -> EventKind) = match &event.kind {
            EventKind::Chord(chord) => (chord, EventKind::Note),
            EventKind::ChordOn(chord) => (chord, EventKind::NoteOn),
            EventKind::ChordOff(chord) => (chord, EventKind::NoteOff),
            _ => {
                out.push_back(event);
                return Ok(());
            }
        };
        for note in chord_notes(chord) {
            out.push_back(MusicEvent {
                kind: wrap(note),
                ..event.clone()
            });
        }
        Ok(())
    }
}
