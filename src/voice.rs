//! Voices — the instrument/notation identity attached to events.
//!
//! The core only queries a voice: its name and channel for identity, and its
//! resolution for converting between note values and ticks. Instruments and
//! playback backends own everything else.

use std::rc::Rc;

use fraction::Fraction;
use serde::{Deserialize, Serialize};

use crate::event::time::{
    fraction_string, ticks_from_value, value_from_ticks, Tick, DEFAULT_BEATS_PER_BAR,
    DEFAULT_TICKS_PER_BEAT,
};
use crate::event::MusicEvent;

/// A voice: named, channel-addressed, with its own time resolution and defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    #[serde(default)]
    pub channel: u8,
    #[serde(default = "Voice::default_ticks_per_beat")]
    pub ticks_per_beat: u32,
    #[serde(default = "Voice::default_tempo")]
    pub tempo: u32,
    #[serde(default = "Voice::default_time_signature")]
    pub time_signature: (u32, u32),
    /// Note value used when a note does not state one.
    #[serde(default = "Voice::default_value", with = "fraction_string")]
    pub value: Fraction,
    #[serde(default = "Voice::default_octave")]
    pub octave: i8,
    #[serde(default = "Voice::default_velocity")]
    pub velocity: u8,
}

impl Voice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channel: 0,
            ticks_per_beat: Self::default_ticks_per_beat(),
            tempo: Self::default_tempo(),
            time_signature: Self::default_time_signature(),
            value: Self::default_value(),
            octave: Self::default_octave(),
            velocity: Self::default_velocity(),
        }
    }

    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_ticks_per_beat(mut self, ticks_per_beat: u32) -> Self {
        self.ticks_per_beat = ticks_per_beat.max(1);
        self
    }

    /// Ticks spanned by a note value in this voice.
    pub fn get_duration_absolute(&self, value: Fraction) -> Tick {
        ticks_from_value(value, self.ticks_per_beat)
    }

    /// Note value spanned by a number of ticks in this voice.
    pub fn from_duration_absolute(&self, ticks: Tick) -> Fraction {
        value_from_ticks(ticks, self.ticks_per_beat)
    }

    /// Length of one bar in ticks under the current time signature.
    pub fn bar_length(&self) -> Tick {
        let (beats, unit) = self.time_signature;
        let beat = ticks_from_value(Fraction::new(1u64, unit.max(1) as u64), self.ticks_per_beat);
        beats as Tick * beat
    }

    /// A derived voice for the `index`-th polyphonic line split out of this one.
    pub fn sub_voice(&self, index: usize) -> Voice {
        Voice {
            name: format!("{}#{}", self.name, index),
            ..self.clone()
        }
    }

    /// Rebind an event to this voice, recomputing tick durations from the
    /// event's note value under this voice's resolution.
    pub fn revoice(voice: &Rc<Voice>, event: &MusicEvent) -> MusicEvent {
        event.revoice(voice)
    }

    fn default_ticks_per_beat() -> u32 {
        DEFAULT_TICKS_PER_BEAT
    }

    fn default_tempo() -> u32 {
        120
    }

    fn default_time_signature() -> (u32, u32) {
        (DEFAULT_BEATS_PER_BAR, 4)
    }

    fn default_value() -> Fraction {
        Fraction::new(1u64, 4u64)
    }

    fn default_octave() -> i8 {
        4
    }

    fn default_velocity() -> u8 {
        127
    }
}

impl Default for Voice {
    fn default() -> Self {
        Self::new("default")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarter_note_duration() {
        let voice = Voice::default();
        assert_eq!(voice.get_duration_absolute(Fraction::new(1u64, 4u64)), 960);
        assert_eq!(voice.from_duration_absolute(480), Fraction::new(1u64, 8u64));
    }

    #[test]
    fn custom_resolution() {
        let voice = Voice::new("lead").with_ticks_per_beat(96);
        assert_eq!(voice.get_duration_absolute(Fraction::new(1u64, 1u64)), 384);
    }

    #[test]
    fn bar_length_follows_time_signature() {
        let mut voice = Voice::default();
        assert_eq!(voice.bar_length(), 3840);
        voice.time_signature = (6, 8);
        assert_eq!(voice.bar_length(), 6 * 480);
    }

    #[test]
    fn sub_voice_keeps_settings() {
        let voice = Voice::new("piano").with_channel(3);
        let sub = voice.sub_voice(2);
        assert_eq!(sub.name, "piano#2");
        assert_eq!(sub.channel, 3);
        assert_eq!(sub.ticks_per_beat, voice.ticks_per_beat);
    }

    #[test]
    fn deserialize_with_defaults() {
        let voice: Voice = serde_yaml::from_str("name: bass\nvalue: 1/8\n").unwrap();
        assert_eq!(voice.name, "bass");
        assert_eq!(voice.value, Fraction::new(1u64, 8u64));
        assert_eq!(voice.ticks_per_beat, DEFAULT_TICKS_PER_BEAT);
        assert_eq!(voice.octave, 4);
    }
}
