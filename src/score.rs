//! Score files — a plain YAML or JSON list of voices and timed events, the
//! input format of the `musikla` binary.
//!
//! ```yaml
//! voices:
//!   - name: piano
//!     ticks_per_beat: 480
//! events:
//!   - { at: 0, voice: piano, note: C4, value: 1/4 }
//!   - { at: 480, voice: piano, chord: [C4, E4, G4], value: 1/2 }
//!   - { at: 1440, rest: 1/4 }
//!   - { at: 1920, bar: true }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use fraction::Fraction;
use serde::Deserialize;
use thiserror::Error;

use crate::event::time::parse_fraction;
use crate::event::{MusicEvent, Pitch, Tick};
use crate::music::Music;
use crate::voice::Voice;

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML score: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid JSON score: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event {index}: unknown voice '{voice}'")]
    UnknownVoice { index: usize, voice: String },
    #[error("event {index}: invalid pitch '{pitch}'")]
    Pitch { index: usize, pitch: String },
    #[error("event {index}: invalid note value '{value}'")]
    Value { index: usize, value: String },
    #[error("event {index}: expected exactly one of note, chord, rest, cc, program, bar, staff_marker")]
    Kind { index: usize },
}

/// One entry of the `events` list. Exactly one of the payload fields is set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventSpec {
    #[serde(default)]
    pub at: Tick,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub staff: Option<u32>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub chord: Option<Vec<String>>,
    /// Rest length as a note value.
    #[serde(default)]
    pub rest: Option<String>,
    #[serde(default = "EventSpec::default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub cc: Option<(u8, u8)>,
    #[serde(default)]
    pub program: Option<u8>,
    #[serde(default)]
    pub bar: bool,
    #[serde(default)]
    pub staff_marker: Option<u32>,
    /// Note value of a note or chord; the voice's default when absent.
    #[serde(default)]
    pub value: Option<String>,
    /// Tick duration overriding the one derived from the value.
    #[serde(default)]
    pub duration: Option<Tick>,
    #[serde(default)]
    pub velocity: Option<u8>,
}

impl EventSpec {
    fn default_visible() -> bool {
        true
    }

    fn to_event(&self, index: usize, voice: &Rc<Voice>) -> Result<MusicEvent, ScoreError> {
        let payloads = [
            self.note.is_some(),
            self.chord.is_some(),
            self.rest.is_some(),
            self.cc.is_some(),
            self.program.is_some(),
            self.bar,
            self.staff_marker.is_some(),
        ];
        if payloads.iter().filter(|&&set| set).count() != 1 {
            return Err(ScoreError::Kind { index });
        }

        let pitch = |name: &str| {
            Pitch::parse(name).ok_or_else(|| ScoreError::Pitch {
                index,
                pitch: name.to_string(),
            })
        };
        let fraction = |text: &str| {
            parse_fraction(text).ok_or_else(|| ScoreError::Value {
                index,
                value: text.to_string(),
            })
        };
        let value = match &self.value {
            Some(text) => fraction(text.as_str())?,
            None => voice.value,
        };

        let event = if let Some(name) = &self.note {
            self.timed(MusicEvent::note(self.at, pitch(name.as_str())?, value), voice, value)
        } else if let Some(names) = &self.chord {
            let pitches = names.iter().map(|n| pitch(n.as_str())).collect::<Result<Vec<_>, _>>()?;
            self.timed(MusicEvent::chord(self.at, pitches, value), voice, value)
        } else if let Some(text) = &self.rest {
            let value = fraction(text.as_str())?;
            let rest = MusicEvent::rest(self.at, 0, self.visible);
            self.timed(rest, voice, value)
        } else if let Some((control, cc_value)) = self.cc {
            MusicEvent::control_change(self.at, control, cc_value)
        } else if let Some(program) = self.program {
            MusicEvent::program_change(self.at, program)
        } else if let Some(staff) = self.staff_marker {
            MusicEvent::staff_marker(self.at, staff)
        } else {
            MusicEvent::bar(self.at)
        };

        let event = event.with_voice(Rc::clone(voice)).with_staff(self.staff);
        Ok(match self.velocity {
            Some(velocity) => event.with_velocity(velocity),
            None => event,
        })
    }

    fn timed(&self, event: MusicEvent, voice: &Voice, value: Fraction) -> MusicEvent {
        let duration = self
            .duration
            .unwrap_or_else(|| voice.get_duration_absolute(value));
        event.with_timing(value, duration)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Score {
    #[serde(default)]
    pub voices: Vec<Voice>,
    #[serde(default)]
    pub events: Vec<EventSpec>,
}

impl Score {
    /// Load a score, parsing `.json` files as JSON and anything else as YAML.
    pub fn load(path: &Path) -> Result<Self, ScoreError> {
        let content = std::fs::read_to_string(path).map_err(|source| ScoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
    }

    pub fn from_yaml(text: &str) -> Result<Self, ScoreError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ScoreError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Build the events, in file order. Events naming no voice use `default`.
    pub fn events(&self, default: &Rc<Voice>) -> Result<Vec<MusicEvent>, ScoreError> {
        let voices: HashMap<&str, Rc<Voice>> = self
            .voices
            .iter()
            .map(|v| (v.name.as_str(), Rc::new(v.clone())))
            .collect();
        self.events
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                let voice = match &spec.voice {
                    Some(name) => voices.get(name.as_str()).ok_or_else(|| {
                        ScoreError::UnknownVoice {
                            index,
                            voice: name.clone(),
                        }
                    })?,
                    None => default,
                };
                spec.to_event(index, voice)
            })
            .collect()
    }

    pub fn to_music(&self, default: &Rc<Voice>) -> Result<Music, ScoreError> {
        Ok(Music::from_events(self.events(default)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    fn default_voice() -> Rc<Voice> {
        Rc::new(Voice::default())
    }

    #[test]
    fn yaml_score_builds_events() {
        let score = Score::from_yaml(
            r#"
voices:
  - name: piano
    ticks_per_beat: 480
events:
  - { at: 0, voice: piano, note: C4, value: 1/4 }
  - { at: 480, voice: piano, chord: [C4, E4, G4], value: 1/2, velocity: 90 }
  - { at: 1440, rest: 1/4, visible: false }
  - { at: 1920, bar: true }
  - { at: 1920, cc: [7, 100] }
"#,
        )
        .unwrap();
        let events = score.events(&default_voice()).unwrap();
        assert_eq!(events.len(), 5);

        assert_eq!(events[0].duration(), 480);
        assert_eq!(events[0].voice_name(), Some("piano"));
        assert_eq!(events[1].duration(), 960);
        match &events[1].kind {
            EventKind::Chord(chord) => {
                assert_eq!(chord.pitches.len(), 3);
                assert_eq!(chord.velocity, 90);
            }
            other => panic!("expected chord, got {other:?}"),
        }

        assert_eq!(events[2].voice_name(), Some("default"));
        assert_eq!(events[2].duration(), 960);
        assert!(matches!(&events[2].kind, EventKind::Rest(r) if !r.visible));
        assert!(matches!(events[3].kind, EventKind::BarNotation));
        assert!(matches!(events[4].kind, EventKind::ControlChange(_)));
    }

    #[test]
    fn value_defaults_to_voice_and_duration_overrides() {
        let score = Score::from_yaml(
            "events:\n  - { note: D4 }\n  - { at: 960, note: E4, duration: 100 }\n",
        )
        .unwrap();
        let events = score.events(&default_voice()).unwrap();
        assert_eq!(events[0].value(), Some(Fraction::new(1u64, 4u64)));
        assert_eq!(events[0].duration(), 960);
        assert_eq!(events[1].duration(), 100);
    }

    #[test]
    fn json_score() {
        let score = Score::from_json(r#"{"events": [{"at": 5, "program": 12, "staff": 2}]}"#).unwrap();
        let events = score.events(&default_voice()).unwrap();
        assert_eq!(events[0].timestamp, 5);
        assert_eq!(events[0].staff, Some(2));
        assert!(matches!(events[0].kind, EventKind::ProgramChange(_)));
    }

    #[test]
    fn rejects_bad_entries() {
        let voice = default_voice();
        let unknown = Score::from_yaml("events:\n  - { voice: organ, note: C4 }\n").unwrap();
        assert!(matches!(
            unknown.events(&voice),
            Err(ScoreError::UnknownVoice { index: 0, .. })
        ));

        let pitch = Score::from_yaml("events:\n  - { note: H9 }\n").unwrap();
        assert!(matches!(pitch.events(&voice), Err(ScoreError::Pitch { .. })));

        let two = Score::from_yaml("events:\n  - { note: C4, bar: true }\n").unwrap();
        assert!(matches!(two.events(&voice), Err(ScoreError::Kind { index: 0 })));

        let none = Score::from_yaml("events:\n  - { at: 3 }\n").unwrap();
        assert!(matches!(none.events(&voice), Err(ScoreError::Kind { index: 0 })));

        assert!(Score::from_yaml("events:\n  - { tempo: 3 }\n").is_err());
    }
}
