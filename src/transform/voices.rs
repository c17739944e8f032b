//! Polyphonic voice separation.
//!
//! [`VoiceIdentifier`] splits an ordered stream into monophonic sub-voices.
//! Each parent `(voice, staff)` line gets as many sub-voices as it needs so
//! that no sub-voice ever sounds two events at once. Sub-voices are named
//! after their parent voice (`piano#0`, `piano#1`, ...).
//!
//! Output is held back until no sub-voice can still produce an earlier
//! event: a gap rest or a clipped note can start at a sub-voice's last end,
//! so events are released only up to the earliest such end. A sub-voice
//! left idle for `max_hold` ticks has its gap committed as a rest right
//! away, which keeps the delay bounded on endless input.

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::Transformer;
use crate::error::{Error, Result};
use crate::event::{EventKind, MusicBuffer, MusicEvent, Tick};
use crate::voice::Voice;

/// Tunable policy for [`VoiceIdentifier`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceIdentifierConfig {
    /// Overlap allowed before a sub-voice counts as busy, as a fraction of
    /// the incoming event's duration. Allowed overlaps are clipped away.
    pub overlap_tolerance: f64,
    /// Fill gaps inside a sub-voice with visible rests.
    pub auto_rests: bool,
    /// Pad every sub-voice with an invisible rest up to the longest one.
    pub end_rests: bool,
    /// How many recent pitches make up a sub-voice's running average.
    pub average_capacity: usize,
    /// How far (in ticks) a rest may start from a sub-voice's end and still join it.
    pub rest_tolerance: Tick,
    /// How long (in ticks) an idle sub-voice may hold back output before its
    /// gap is committed as a rest.
    pub max_hold: Tick,
}

impl Default for VoiceIdentifierConfig {
    fn default() -> Self {
        Self {
            overlap_tolerance: 0.1,
            auto_rests: true,
            end_rests: true,
            average_capacity: 6,
            rest_tolerance: 1,
            max_hold: 3840,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LineKey {
    voice: Option<String>,
    staff: Option<u32>,
}

impl LineKey {
    fn of(event: &MusicEvent) -> Self {
        Self {
            voice: event.voice_name().map(str::to_string),
            staff: event.staff,
        }
    }
}

#[derive(Debug)]
struct SubVoice {
    line: LineKey,
    voice: Rc<Voice>,
    last_end: Tick,
    recent: VecDeque<f64>,
}

impl SubVoice {
    fn average(&self) -> Option<f64> {
        if self.recent.is_empty() {
            None
        } else {
            Some(self.recent.iter().sum::<f64>() / self.recent.len() as f64)
        }
    }

    fn distance(&self, pitch: Option<f64>) -> f64 {
        match (self.average(), pitch) {
            (Some(average), Some(pitch)) => (average - pitch).abs(),
            _ => f64::MAX,
        }
    }

    fn is_busy(&self, event: &MusicEvent, tolerance: f64) -> bool {
        let overlap = self.last_end - event.timestamp;
        let duration = event.duration();
        overlap > 0 && (overlap as f64 > tolerance * duration as f64 || overlap >= duration)
    }

    fn remember(&mut self, pitch: Option<f64>, capacity: usize) {
        if let Some(pitch) = pitch {
            if self.recent.len() >= capacity {
                self.recent.pop_front();
            }
            self.recent.push_back(pitch);
        }
    }
}

/// Splits overlapping sounds into monophonic sub-voices.
#[derive(Debug, Default)]
pub struct VoiceIdentifier {
    config: VoiceIdentifierConfig,
    voices: Vec<SubVoice>,
    counters: HashMap<String, usize>,
    pending: MusicBuffer,
    last_input: Option<Tick>,
}

impl VoiceIdentifier {
    pub fn new(config: VoiceIdentifierConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &VoiceIdentifierConfig {
        &self.config
    }

    /// Names of the sub-voices created so far, in creation order.
    pub fn sub_voices(&self) -> Vec<&str> {
        self.voices.iter().map(|v| v.voice.name.as_str()).collect()
    }

    fn open(&mut self, event: &MusicEvent, start: Tick) -> usize {
        let parent = event.voice.as_deref().cloned().unwrap_or_default();
        let counter = self.counters.entry(parent.name.clone()).or_insert(0);
        let voice = Rc::new(parent.sub_voice(*counter));
        *counter += 1;
        debug!(voice = %voice.name, at = start, "sub-voice created");
        self.voices.push(SubVoice {
            line: LineKey::of(event),
            voice,
            last_end: start,
            recent: VecDeque::new(),
        });
        self.voices.len() - 1
    }

    fn emit(&mut self, index: usize, event: MusicEvent) {
        let sub = &mut self.voices[index];
        sub.last_end = sub.last_end.max(event.end_timestamp());
        self.pending.append(event.with_voice(Rc::clone(&sub.voice)));
    }

    fn choose(&self, event: &MusicEvent, pitch: Option<f64>) -> Option<usize> {
        let line = LineKey::of(event);
        let mut candidates = self
            .voices
            .iter()
            .enumerate()
            .filter(|(_, sub)| sub.line == line && !sub.is_busy(event, self.config.overlap_tolerance));

        if event.staff.is_some() {
            return candidates.next().map(|(index, _)| index);
        }
        let mut best: Option<(usize, f64)> = None;
        for (index, sub) in candidates {
            let distance = sub.distance(pitch);
            if best.map_or(true, |(_, closest)| distance < closest) {
                best = Some((index, distance));
            }
        }
        best.map(|(index, _)| index)
    }

    fn place_sounding(&mut self, event: MusicEvent) {
        let pitch = event.mean_pitch();
        let index = match self.choose(&event, pitch) {
            Some(index) => index,
            None => self.open(&event, event.timestamp),
        };

        let last_end = self.voices[index].last_end;
        let event = if last_end > event.timestamp {
            let end = event.end_timestamp();
            trace!(from = event.timestamp, to = last_end, "clipping overlapping event");
            event.with_timestamp(last_end).with_duration(end - last_end)
        } else {
            if self.config.auto_rests && last_end < event.timestamp {
                trace!(at = last_end, until = event.timestamp, "gap rest inserted");
                let rest = MusicEvent::rest(last_end, event.timestamp - last_end, true)
                    .with_staff(event.staff);
                self.emit(index, rest);
            }
            event
        };
        self.emit(index, event);
        self.voices[index].remember(pitch, self.config.average_capacity.max(1));
    }

    fn place_rest(&mut self, event: MusicEvent) {
        let line = LineKey::of(&event);
        let tolerance = self.config.rest_tolerance;
        let closest = self
            .voices
            .iter()
            .enumerate()
            .filter(|(_, sub)| sub.line == line)
            .map(|(index, sub)| (index, (sub.last_end - event.timestamp).abs()))
            .filter(|&(_, gap)| gap <= tolerance)
            .min_by_key(|&(_, gap)| gap)
            .map(|(index, _)| index);

        match closest {
            Some(index) => {
                let start = self.voices[index].last_end;
                self.emit(index, event.with_timestamp(start));
            }
            None => {
                let index = self.open(&event, event.timestamp);
                self.emit(index, event);
            }
        }
    }

    /// Commit the gap of every sub-voice idle for at least `max_hold` ticks
    /// up to `upto`, so it no longer holds the release watermark back.
    fn settle_idle(&mut self, upto: Tick) {
        let hold = self.config.max_hold.max(1);
        for index in 0..self.voices.len() {
            let last_end = self.voices[index].last_end;
            if upto - last_end < hold {
                continue;
            }
            if self.config.auto_rests || self.config.end_rests {
                trace!(voice = %self.voices[index].voice.name, at = last_end, until = upto, "idle gap committed");
                let rest = MusicEvent::rest(last_end, upto - last_end, self.config.auto_rests)
                    .with_staff(self.voices[index].line.staff);
                self.emit(index, rest);
            } else {
                self.voices[index].last_end = upto;
            }
        }
    }

    fn release(&mut self, upto: Tick, out: &mut VecDeque<MusicEvent>) {
        let watermark = self
            .voices
            .iter()
            .map(|sub| sub.last_end)
            .fold(upto, Tick::min);
        out.extend(self.pending.collect(watermark));
    }
}

impl Transformer for VoiceIdentifier {
    fn push(&mut self, event: MusicEvent, out: &mut VecDeque<MusicEvent>) -> Result<()> {
        let timestamp = event.timestamp;
        if let Some(last) = self.last_input {
            if timestamp < last {
                return Err(Error::invariant(format!(
                    "voice identification needs ordered input: {timestamp} arrived after {last}"
                )));
            }
        }
        self.last_input = Some(timestamp);

        match event.kind {
            EventKind::Note(_) | EventKind::Chord(_) => self.place_sounding(event),
            EventKind::Rest(_) => self.place_rest(event),
            _ => self.pending.append(event),
        }
        self.settle_idle(timestamp);
        self.release(timestamp, out);
        Ok(())
    }

    fn finish(&mut self, out: &mut VecDeque<MusicEvent>) -> Result<()> {
        if self.config.end_rests {
            if let Some(end) = self.voices.iter().map(|sub| sub.last_end).max() {
                for index in 0..self.voices.len() {
                    let last_end = self.voices[index].last_end;
                    if last_end < end {
                        trace!(voice = %self.voices[index].voice.name, at = last_end, "end rest inserted");
                        let rest = MusicEvent::rest(last_end, end - last_end, false)
                            .with_staff(self.voices[index].line.staff);
                        self.emit(index, rest);
                    }
                }
            }
        }
        out.extend(self.pending.collect_all());
        Ok(())
    }
}
