//! Event data model — the unit of musical information flowing through the core.
//!
//! A [`MusicEvent`] is an immutable value: an absolute timestamp, the voice and
//! staff it belongs to, and an [`EventKind`] payload. The only way to "change"
//! an event is to clone it with some fields overridden (`with_*` methods).

use std::rc::Rc;

use fraction::Fraction;
use serde::{Serialize, Serializer};

use super::pitch::Pitch;
use super::time::{fraction_string, value_from_ticks, Tick, DEFAULT_TICKS_PER_BEAT};
use crate::voice::Voice;

/// A single pitched note with a sounding duration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteEvent {
    pub pitch: Pitch,
    #[serde(with = "fraction_string")]
    pub value: Fraction,
    pub duration: Tick,
    pub velocity: u8,
    pub tied: bool,
}

/// Several pitches sounding together for one duration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChordEvent {
    pub pitches: Vec<Pitch>,
    #[serde(with = "fraction_string")]
    pub value: Fraction,
    pub duration: Tick,
    pub velocity: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestEvent {
    #[serde(with = "fraction_string")]
    pub value: Fraction,
    pub duration: Tick,
    /// Invisible rests pad a line in notation without being printed.
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramChangeEvent {
    pub program: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlChangeEvent {
    pub control: u8,
    pub value: u8,
}

/// A change of a named voice/context property (tempo, octave, signature...).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextChangeEvent {
    pub property: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaffNotationEvent {
    pub staff: u32,
}

/// The tagged payload of an event.
///
/// `Note` and `Chord` carry a duration; their `On`/`Off` halves are
/// instantaneous and only exist after decomposition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Note(NoteEvent),
    NoteOn(NoteEvent),
    NoteOff(NoteEvent),
    Chord(ChordEvent),
    ChordOn(ChordEvent),
    ChordOff(ChordEvent),
    Rest(RestEvent),
    ProgramChange(ProgramChangeEvent),
    ControlChange(ControlChangeEvent),
    ContextChange(ContextChangeEvent),
    BarNotation,
    StaffNotation(StaffNotationEvent),
}

/// An event at an absolute position on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MusicEvent {
    pub timestamp: Tick,
    #[serde(serialize_with = "voice_name", skip_serializing_if = "Option::is_none")]
    pub voice: Option<Rc<Voice>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staff: Option<u32>,
    #[serde(flatten)]
    pub kind: EventKind,
}

fn voice_name<S: Serializer>(voice: &Option<Rc<Voice>>, serializer: S) -> Result<S::Ok, S::Error> {
    match voice {
        Some(v) => serializer.serialize_str(&v.name),
        None => serializer.serialize_none(),
    }
}

impl MusicEvent {
    pub fn new(timestamp: Tick, kind: EventKind) -> Self {
        Self {
            timestamp,
            voice: None,
            staff: None,
            kind,
        }
    }

    /// A note whose tick duration is derived from its value at the default resolution.
    pub fn note(timestamp: Tick, pitch: Pitch, value: Fraction) -> Self {
        let duration = super::time::ticks_from_value(value, DEFAULT_TICKS_PER_BEAT);
        Self::note_ticks(timestamp, pitch, value, duration)
    }

    pub fn note_ticks(timestamp: Tick, pitch: Pitch, value: Fraction, duration: Tick) -> Self {
        Self::new(
            timestamp,
            EventKind::Note(NoteEvent {
                pitch,
                value,
                duration,
                velocity: 127,
                tied: false,
            }),
        )
    }

    pub fn chord(timestamp: Tick, pitches: Vec<Pitch>, value: Fraction) -> Self {
        let duration = super::time::ticks_from_value(value, DEFAULT_TICKS_PER_BEAT);
        Self::new(
            timestamp,
            EventKind::Chord(ChordEvent {
                pitches,
                value,
                duration,
                velocity: 127,
                name: None,
            }),
        )
    }

    pub fn rest(timestamp: Tick, duration: Tick, visible: bool) -> Self {
        Self::new(
            timestamp,
            EventKind::Rest(RestEvent {
                value: value_from_ticks(duration, DEFAULT_TICKS_PER_BEAT),
                duration,
                visible,
            }),
        )
    }

    pub fn program_change(timestamp: Tick, program: u8) -> Self {
        Self::new(
            timestamp,
            EventKind::ProgramChange(ProgramChangeEvent {
                program,
                bank: None,
            }),
        )
    }

    pub fn control_change(timestamp: Tick, control: u8, value: u8) -> Self {
        Self::new(
            timestamp,
            EventKind::ControlChange(ControlChangeEvent { control, value }),
        )
    }

    pub fn context_change(timestamp: Tick, property: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(
            timestamp,
            EventKind::ContextChange(ContextChangeEvent {
                property: property.into(),
                value: value.into(),
            }),
        )
    }

    pub fn bar(timestamp: Tick) -> Self {
        Self::new(timestamp, EventKind::BarNotation)
    }

    pub fn staff_marker(timestamp: Tick, staff: u32) -> Self {
        Self::new(
            timestamp,
            EventKind::StaffNotation(StaffNotationEvent { staff }),
        )
    }

    /// Sounding duration in ticks; zero for instantaneous events.
    pub fn duration(&self) -> Tick {
        match &self.kind {
            EventKind::Note(n) => n.duration,
            EventKind::Chord(c) => c.duration,
            EventKind::Rest(r) => r.duration,
            _ => 0,
        }
    }

    /// Note value of duration-bearing events.
    pub fn value(&self) -> Option<Fraction> {
        match &self.kind {
            EventKind::Note(n) => Some(n.value),
            EventKind::Chord(c) => Some(c.value),
            EventKind::Rest(r) => Some(r.value),
            _ => None,
        }
    }

    pub fn end_timestamp(&self) -> Tick {
        self.timestamp + self.duration()
    }

    pub fn is_duration_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::Note(_) | EventKind::Chord(_) | EventKind::Rest(_)
        )
    }

    /// Notes and chords, the events that actually sound.
    pub fn is_sounding(&self) -> bool {
        matches!(self.kind, EventKind::Note(_) | EventKind::Chord(_))
    }

    pub fn is_note(&self) -> bool {
        matches!(self.kind, EventKind::Note(_))
    }

    pub fn is_rest(&self) -> bool {
        matches!(self.kind, EventKind::Rest(_))
    }

    pub fn pitches(&self) -> Vec<Pitch> {
        match &self.kind {
            EventKind::Note(n) | EventKind::NoteOn(n) | EventKind::NoteOff(n) => vec![n.pitch],
            EventKind::Chord(c) | EventKind::ChordOn(c) | EventKind::ChordOff(c) => {
                c.pitches.clone()
            }
            _ => Vec::new(),
        }
    }

    /// Mean MIDI pitch of a note or chord.
    pub fn mean_pitch(&self) -> Option<f64> {
        let pitches = self.pitches();
        if pitches.is_empty() {
            return None;
        }
        let sum: i32 = pitches.iter().map(|p| p.midi()).sum();
        Some(sum as f64 / pitches.len() as f64)
    }

    pub fn voice_name(&self) -> Option<&str> {
        self.voice.as_deref().map(|v| v.name.as_str())
    }

    pub fn with_timestamp(&self, timestamp: Tick) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }

    pub fn shifted(&self, offset: Tick) -> Self {
        self.with_timestamp(self.timestamp + offset)
    }

    pub fn with_voice(&self, voice: Rc<Voice>) -> Self {
        Self {
            voice: Some(voice),
            ..self.clone()
        }
    }

    pub fn with_staff(&self, staff: Option<u32>) -> Self {
        Self {
            staff,
            ..self.clone()
        }
    }

    /// Override the tick duration; the note value follows from the event's voice.
    pub fn with_duration(&self, duration: Tick) -> Self {
        let value = match &self.voice {
            Some(v) => v.from_duration_absolute(duration),
            None => value_from_ticks(duration, DEFAULT_TICKS_PER_BEAT),
        };
        self.with_timing(value, duration)
    }

    /// Override the note value; the tick duration follows from the event's voice.
    pub fn with_value(&self, value: Fraction) -> Self {
        let duration = match &self.voice {
            Some(v) => v.get_duration_absolute(value),
            None => super::time::ticks_from_value(value, DEFAULT_TICKS_PER_BEAT),
        };
        self.with_timing(value, duration)
    }

    /// Override both value and duration of a duration-bearing event.
    pub fn with_timing(&self, value: Fraction, duration: Tick) -> Self {
        let mut event = self.clone();
        match &mut event.kind {
            EventKind::Note(n) => {
                n.value = value;
                n.duration = duration;
            }
            EventKind::Chord(c) => {
                c.value = value;
                c.duration = duration;
            }
            EventKind::Rest(r) => {
                r.value = value;
                r.duration = duration;
            }
            _ => {}
        }
        event
    }

    pub fn with_velocity(&self, velocity: u8) -> Self {
        let mut event = self.clone();
        match &mut event.kind {
            EventKind::Note(n) | EventKind::NoteOn(n) | EventKind::NoteOff(n) => {
                n.velocity = velocity
            }
            EventKind::Chord(c) | EventKind::ChordOn(c) | EventKind::ChordOff(c) => {
                c.velocity = velocity
            }
            _ => {}
        }
        event
    }

    /// Bind to `voice` and recompute tick durations from the note value.
    pub fn revoice(&self, voice: &Rc<Voice>) -> Self {
        let event = self.with_voice(Rc::clone(voice));
        match event.value() {
            Some(value) => event.with_timing(value, voice.get_duration_absolute(value)),
            None => event,
        }
    }

    /// Shift every pitch by a number of semitones. Non-pitched events are unchanged.
    pub fn transpose(&self, semitones: i32) -> Self {
        let mut event = self.clone();
        match &mut event.kind {
            EventKind::Note(n) | EventKind::NoteOn(n) | EventKind::NoteOff(n) => {
                n.pitch = n.pitch.transpose(semitones)
            }
            EventKind::Chord(c) | EventKind::ChordOn(c) | EventKind::ChordOff(c) => {
                for p in &mut c.pitches {
                    *p = p.transpose(semitones);
                }
            }
            _ => {}
        }
        event
    }

    /// Build a note from an archetype (pitch source) and a pattern note
    /// (timing source). The pattern's octave shifts the archetype relative to
    /// octave 4. Returns `None` unless both are notes.
    pub fn from_pattern(archetype: &MusicEvent, pattern: &MusicEvent) -> Option<MusicEvent> {
        let (EventKind::Note(arch), EventKind::Note(pat)) = (&archetype.kind, &pattern.kind) else {
            return None;
        };
        let pitch = arch.pitch.shift_octaves(pat.pitch.octave - 4);
        Some(MusicEvent {
            timestamp: pattern.timestamp,
            voice: archetype.voice.clone().or_else(|| pattern.voice.clone()),
            staff: archetype.staff.or(pattern.staff),
            kind: EventKind::Note(NoteEvent {
                pitch,
                value: pat.value,
                duration: pat.duration,
                velocity: pat.velocity,
                tied: pat.tied,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c4() -> Pitch {
        Pitch::parse("C4").unwrap()
    }

    fn quarter() -> Fraction {
        Fraction::new(1u64, 4u64)
    }

    #[test]
    fn note_constructor_derives_duration() {
        let e = MusicEvent::note(100, c4(), quarter());
        assert_eq!(e.duration(), 960);
        assert_eq!(e.end_timestamp(), 1060);
        assert!(e.is_duration_event());
        assert!(e.is_sounding());
    }

    #[test]
    fn instantaneous_events_have_no_duration() {
        let cc = MusicEvent::control_change(50, 7, 100);
        assert_eq!(cc.duration(), 0);
        assert_eq!(cc.end_timestamp(), 50);
        assert!(!cc.is_duration_event());
        assert_eq!(MusicEvent::bar(10).end_timestamp(), 10);
    }

    #[test]
    fn clone_with_override_leaves_original() {
        let e = MusicEvent::note(0, c4(), quarter());
        let moved = e.with_timestamp(480);
        assert_eq!(e.timestamp, 0);
        assert_eq!(moved.timestamp, 480);
        assert_eq!(moved.duration(), e.duration());
    }

    #[test]
    fn with_duration_recomputes_value() {
        let e = MusicEvent::note(0, c4(), quarter()).with_duration(480);
        assert_eq!(e.value(), Some(Fraction::new(1u64, 8u64)));
    }

    #[test]
    fn revoice_uses_voice_resolution() {
        let voice = Rc::new(Voice::new("lead").with_ticks_per_beat(96));
        let e = MusicEvent::note(0, c4(), quarter()).revoice(&voice);
        assert_eq!(e.duration(), 96);
        assert_eq!(e.voice_name(), Some("lead"));
    }

    #[test]
    fn transpose_chord() {
        let chord = MusicEvent::chord(0, vec![c4(), Pitch::parse("E4").unwrap()], quarter());
        let up = chord.transpose(2);
        let midis: Vec<i32> = up.pitches().iter().map(|p| p.midi()).collect();
        assert_eq!(midis, vec![62, 66]);
    }

    #[test]
    fn mean_pitch_of_chord() {
        let chord = MusicEvent::chord(0, vec![c4(), Pitch::parse("G4").unwrap()], quarter());
        assert_eq!(chord.mean_pitch(), Some(63.5));
        assert_eq!(MusicEvent::rest(0, 10, true).mean_pitch(), None);
    }

    #[test]
    fn from_pattern_takes_timing_from_pattern() {
        let arch = MusicEvent::note(0, Pitch::parse("E3").unwrap(), quarter());
        let pattern = MusicEvent::note(960, Pitch::parse("C5").unwrap(), Fraction::new(1u64, 8u64))
            .with_velocity(90);
        let e = MusicEvent::from_pattern(&arch, &pattern).unwrap();
        assert_eq!(e.timestamp, 960);
        assert_eq!(e.duration(), 480);
        assert_eq!(e.pitches()[0].to_string(), "E4");
        assert!(MusicEvent::from_pattern(&MusicEvent::bar(0), &pattern).is_none());
    }

    #[test]
    fn serializes_with_voice_name_and_tag() {
        let voice = Rc::new(Voice::new("piano"));
        let e = MusicEvent::note(0, c4(), quarter()).with_voice(voice);
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "note");
        assert_eq!(json["voice"], "piano");
        assert_eq!(json["value"], "1/4");
        assert_eq!(json["duration"], 960);
    }
}
