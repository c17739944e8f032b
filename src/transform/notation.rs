//! Notation building: group an event stream by voice and staff, and render
//! the accumulated groups through a pluggable [`NotationFormat`].

use std::collections::HashMap;

use fraction::Fraction;

use crate::error::Result;
use crate::event::{EventKind, MusicEvent, Pitch};

/// Events of one `(voice, staff)` pair, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct NotationGroup {
    pub voice: Option<String>,
    pub staff: Option<u32>,
    pub events: Vec<MusicEvent>,
}

impl NotationGroup {
    /// Display name: the voice name, with the staff appended when set.
    pub fn name(&self) -> String {
        let voice = self.voice.as_deref().unwrap_or("default");
        match self.staff {
            Some(staff) => format!("{voice}.{staff}"),
            None => voice.to_string(),
        }
    }
}

/// The groups accumulated so far, in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Notation {
    groups: Vec<NotationGroup>,
    index: HashMap<(Option<String>, Option<u32>), usize>,
}

impl Notation {
    pub fn groups(&self) -> &[NotationGroup] {
        &self.groups
    }

    pub fn add(&mut self, event: MusicEvent) {
        let key = (event.voice_name().map(str::to_string), event.staff);
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                self.groups.push(NotationGroup {
                    voice: key.0.clone(),
                    staff: key.1,
                    events: Vec::new(),
                });
                self.index.insert(key, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        self.groups[slot].events.push(event);
    }
}

pub trait NotationFormat {
    fn render(&self, notation: &Notation) -> String;
}

/// Accumulates events and renders snapshots.
///
/// With `only_final`, a single rendering is produced at end of stream;
/// otherwise one is produced after every event.
#[derive(Debug)]
pub struct NotationBuilder<F> {
    format: F,
    only_final: bool,
    notation: Notation,
}

impl<F: NotationFormat> NotationBuilder<F> {
    pub fn new(format: F, only_final: bool) -> Self {
        Self {
            format,
            only_final,
            notation: Notation::default(),
        }
    }

    pub fn notation(&self) -> &Notation {
        &self.notation
    }

    pub fn push(&mut self, event: MusicEvent) -> Option<String> {
        self.notation.add(event);
        (!self.only_final).then(|| self.format.render(&self.notation))
    }

    pub fn finish(&mut self) -> Option<String> {
        self.only_final.then(|| self.format.render(&self.notation))
    }

    /// Render a whole stream, yielding each snapshot as it is produced.
    pub fn render<I>(self, events: I) -> NotationStream<I, F>
    where
        I: Iterator<Item = Result<MusicEvent>>,
    {
        NotationStream {
            events,
            builder: self,
            done: false,
        }
    }
}

pub struct NotationStream<I, F> {
    events: I,
    builder: NotationBuilder<F>,
    done: bool,
}

impl<I, F> Iterator for NotationStream<I, F>
where
    I: Iterator<Item = Result<MusicEvent>>,
    F: NotationFormat,
{
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.events.next() {
                Some(Ok(event)) => {
                    if let Some(text) = self.builder.push(event) {
                        return Some(Ok(text));
                    }
                }
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    self.done = true;
                    return self.builder.finish().map(Ok);
                }
            }
        }
        None
    }
}

/// ABC notation with a unit length of one quarter and one `V:` line per group.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbcFormat;

impl AbcFormat {
    fn pitch(pitch: &Pitch) -> String {
        let mut out = String::new();
        match pitch.accidental {
            0 => {}
            n if n > 0 => out.push_str(&"^".repeat(n as usize)),
            n => out.push_str(&"_".repeat(n.unsigned_abs() as usize)),
        }
        let letter = pitch.class.letter();
        if pitch.octave >= 5 {
            out.push(letter.to_ascii_lowercase());
            out.push_str(&"'".repeat((pitch.octave - 5) as usize));
        } else {
            out.push(letter);
            out.push_str(&",".repeat((4 - pitch.octave) as usize));
        }
        out
    }

    /// Length relative to the unit note `1/4`; empty for exactly one unit.
    fn length(value: Fraction) -> String {
        let units = value * Fraction::new(4u64, 1u64);
        match (units.numer(), units.denom()) {
            (Some(1), Some(1)) => String::new(),
            (Some(n), Some(1)) => n.to_string(),
            (Some(1), Some(d)) => format!("/{d}"),
            (Some(n), Some(d)) => format!("{n}/{d}"),
            _ => String::new(),
        }
    }

    fn token(event: &MusicEvent) -> Option<String> {
        Some(match &event.kind {
            EventKind::Note(note) => format!("{}{}", Self::pitch(&note.pitch), Self::length(note.value)),
            EventKind::Chord(chord) => {
                let pitches: String = chord.pitches.iter().map(Self::pitch).collect();
                format!("[{pitches}]{}", Self::length(chord.value))
            }
            EventKind::Rest(rest) => {
                let symbol = if rest.visible { 'z' } else { 'x' };
                format!("{symbol}{}", Self::length(rest.value))
            }
            EventKind::BarNotation => "|".to_string(),
            _ => return None,
        })
    }
}

impl NotationFormat for AbcFormat {
    fn render(&self, notation: &Notation) -> String {
        let mut out = String::from("X:1\nL:1/4\nK:C\n");
        for group in notation.groups() {
            let body: Vec<String> = group.events.iter().filter_map(Self::token).collect();
            out.push_str(&format!("V:{}\n{}\n", group.name(), body.join(" ")));
        }
        out
    }
}

/// Plain listing of every group and event, for debugging.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFormat;

impl NotationFormat for TextFormat {
    fn render(&self, notation: &Notation) -> String {
        let mut out = String::new();
        for group in notation.groups() {
            out.push_str(&format!("[{}]\n", group.name()));
            for event in &group.events {
                out.push_str(&format!("  {:>8} {:?}\n", event.timestamp, event.kind));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::voice::Voice;

    fn note(ts: i64, name: &str, value: Fraction) -> MusicEvent {
        MusicEvent::note(ts, Pitch::parse(name).unwrap(), value)
    }

    fn quarter() -> Fraction {
        Fraction::new(1u64, 4u64)
    }

    #[test]
    fn abc_pitch_spelling() {
        let spell = |name| AbcFormat::pitch(&Pitch::parse(name).unwrap());
        assert_eq!(spell("C4"), "C");
        assert_eq!(spell("C5"), "c");
        assert_eq!(spell("C6"), "c'");
        assert_eq!(spell("C3"), "C,");
        assert_eq!(spell("F#4"), "^F");
        assert_eq!(spell("Bb2"), "_B,,");
    }

    #[test]
    fn abc_lengths_relative_to_quarter() {
        assert_eq!(AbcFormat::length(quarter()), "");
        assert_eq!(AbcFormat::length(Fraction::new(1u64, 2u64)), "2");
        assert_eq!(AbcFormat::length(Fraction::new(1u64, 8u64)), "/2");
        assert_eq!(AbcFormat::length(Fraction::new(3u64, 8u64)), "3/2");
    }

    #[test]
    fn groups_by_voice_and_staff_in_first_seen_order() {
        let bass = Rc::new(Voice::new("bass"));
        let lead = Rc::new(Voice::new("lead"));
        let mut builder = NotationBuilder::new(AbcFormat, true);
        assert!(builder.push(note(0, "C3", quarter()).with_voice(Rc::clone(&bass))).is_none());
        builder.push(note(0, "E5", quarter()).with_voice(Rc::clone(&lead)));
        builder.push(MusicEvent::bar(960).with_voice(Rc::clone(&bass)));
        builder.push(MusicEvent::rest(960, 960, false).with_voice(Rc::clone(&lead)));

        let names: Vec<String> = builder.notation().groups().iter().map(|g| g.name()).collect();
        assert_eq!(names, vec!["bass", "lead"]);
        assert_eq!(
            builder.finish().unwrap(),
            "X:1\nL:1/4\nK:C\nV:bass\nC, |\nV:lead\ne x\n"
        );
    }

    #[test]
    fn chords_render_in_brackets() {
        let chord = MusicEvent::chord(
            0,
            vec![Pitch::parse("C4").unwrap(), Pitch::parse("E4").unwrap()],
            Fraction::new(1u64, 2u64),
        );
        assert_eq!(AbcFormat::token(&chord).unwrap(), "[CE]2");
        assert!(AbcFormat::token(&MusicEvent::control_change(0, 1, 1)).is_none());
    }

    #[test]
    fn snapshot_after_every_event_unless_only_final() {
        let events = vec![Ok(note(0, "C4", quarter())), Ok(note(960, "D4", quarter()))];
        let snapshots: Vec<String> = NotationBuilder::new(TextFormat, false)
            .render(events.clone().into_iter())
            .map(|s| s.unwrap())
            .collect();
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots[1].starts_with("[default]\n"));

        let finals: Vec<String> = NotationBuilder::new(AbcFormat, true)
            .render(events.into_iter())
            .map(|s| s.unwrap())
            .collect();
        assert_eq!(finals, vec!["X:1\nL:1/4\nK:C\nV:default\nC D\n".to_string()]);
    }

    #[test]
    fn text_listing_is_one_line_per_event() {
        let mut notation = Notation::default();
        notation.add(MusicEvent::bar(0));
        notation.add(MusicEvent::bar(960));
        assert_eq!(
            TextFormat.render(&notation),
            "[default]\n         0 BarNotation\n       960 BarNotation\n"
        );
    }

    #[test]
    fn staff_splits_groups() {
        let mut notation = Notation::default();
        notation.add(note(0, "C4", quarter()).with_staff(Some(1)));
        notation.add(note(0, "C4", quarter()).with_staff(Some(2)));
        notation.add(note(960, "C4", quarter()).with_staff(Some(1)));
        let sizes: Vec<(String, usize)> = notation
            .groups()
            .iter()
            .map(|g| (g.name(), g.events.len()))
            .collect();
        assert_eq!(sizes, vec![("default.1".to_string(), 2), ("default.2".to_string(), 1)]);
    }
}
