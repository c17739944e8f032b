//! Derived music: slicing, repetition, arpeggios, stretching and measurement.

use std::ops::{Add, Mul, Sub};
use std::rc::Rc;

use fraction::Fraction;

use super::stream::{deferred, MapStream};
use super::{EventStream, Music, SharedMusic};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::event::time::{scale_ticks, zero};
use crate::event::{EventKind, MusicEvent, Tick};
use crate::transform::DecomposeChords;

/// How many times [`Music::repeat`] plays its base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Times(usize),
    Forever,
}

impl From<usize> for Repeat {
    fn from(count: usize) -> Self {
        Repeat::Times(count)
    }
}

impl From<u32> for Repeat {
    fn from(count: u32) -> Self {
        Repeat::Times(count as usize)
    }
}

impl From<bool> for Repeat {
    fn from(forever: bool) -> Self {
        if forever {
            Repeat::Forever
        } else {
            Repeat::Times(0)
        }
    }
}

/// First start and furthest end of a stream, draining it.
fn span(events: EventStream) -> Result<Option<(Tick, Tick)>> {
    let mut range: Option<(Tick, Tick)> = None;
    for event in events {
        let event = event?;
        range = Some(match range {
            None => (event.timestamp, event.end_timestamp()),
            Some((start, end)) => (start, end.max(event.end_timestamp())),
        });
    }
    Ok(range)
}

impl Music {
    /// Length as a note value under `ctx`'s voice; zero for empty music.
    ///
    /// Expands in a fork, so `ctx`'s cursor does not move.
    pub fn len(&self, ctx: &Context) -> Result<Fraction> {
        Ok(match span(self.shared().expand(&ctx.fork()))? {
            Some((start, end)) => ctx.voice().from_duration_absolute(end - start),
            None => zero(),
        })
    }

    /// Span in ticks from the first event to the furthest end; zero when empty.
    ///
    /// Expands in a fork, so `ctx`'s cursor does not move.
    pub fn duration(&self, ctx: &Context) -> Result<Tick> {
        Ok(span(self.shared().expand(&ctx.fork()))?.map_or(0, |(start, end)| end - start))
    }

    pub fn first_note(&self, ctx: &Context) -> Result<Option<MusicEvent>> {
        for event in self.expand(ctx) {
            let event = event?;
            if event.is_note() {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    pub fn last_note(&self, ctx: &Context) -> Result<Option<MusicEvent>> {
        let mut last = None;
        for event in self.expand(ctx) {
            let event = event?;
            if event.is_note() {
                last = Some(event);
            }
        }
        Ok(last)
    }

    /// Select part of the music.
    ///
    /// With `time`, bounds are absolute timestamps: without `cut` only events
    /// lying wholly inside are kept; with `cut` overlapping events are kept
    /// and clipped to the bounds. Without `time`, bounds are item indices.
    pub fn slice(&self, start: Option<Tick>, end: Option<Tick>, time: bool, cut: bool) -> Music {
        if !time {
            return match (start, end) {
                (None, None) => self.clone(),
                (start, end) => {
                    let skip = start.unwrap_or(0).max(0) as usize;
                    let take = end.map(|end| (end.max(0) as usize).saturating_sub(skip));
                    self.pipe(move |events| match take {
                        Some(take) => Box::new(events.skip(skip).take(take)),
                        None => Box::new(events.skip(skip)),
                    })
                }
            };
        }

        match (start, end, cut) {
            (None, None, _) => self.clone(),
            (Some(start), Some(end), false) => self.filter(move |event, _, _| {
                event.timestamp >= start && event.end_timestamp() <= end
            }),
            (Some(start), None, false) => self.filter(move |event, _, _| event.timestamp >= start),
            (None, Some(end), false) => self.filter(move |event, _, _| event.end_timestamp() <= end),
            (Some(start), Some(end), true) => self
                .filter(move |event, _, _| overlaps_start(event, start) && event.timestamp < end)
                .map(move |event, _, _| {
                    if event.timestamp >= start && event.end_timestamp() <= end {
                        return event.clone();
                    }
                    let timestamp = event.timestamp.max(start);
                    let trimmed = event.duration() - (timestamp - event.timestamp);
                    event
                        .with_timestamp(timestamp)
                        .with_duration(trimmed.min(end - timestamp))
                }),
            (Some(start), None, true) => self
                .filter(move |event, _, _| overlaps_start(event, start))
                .map(move |event, _, _| {
                    if event.timestamp >= start {
                        return event.clone();
                    }
                    event
                        .with_timestamp(start)
                        .with_duration(event.duration() - (start - event.timestamp))
                }),
            (None, Some(end), true) => self
                .filter(move |event, _, _| event.timestamp < end)
                .map(move |event, _, _| {
                    if event.end_timestamp() <= end {
                        return event.clone();
                    }
                    event.with_duration(end - event.timestamp)
                }),
        }
    }

    /// Play the music `count` times back to back, or forever.
    ///
    /// Each pass replays the shared expansion at the current cursor. Repeating
    /// forever stops if a pass produces nothing.
    pub fn repeat(&self, count: impl Into<Repeat>) -> Music {
        let shared = self.shared();
        let count = count.into();
        Music::generate(move |ctx| {
            Box::new(RepeatStream {
                shared: shared.clone(),
                ctx: ctx.clone(),
                remaining: count,
                current: None,
                produced: false,
            })
        })
    }

    /// Arpeggiate the notes of this music.
    ///
    /// With a pattern, every pattern note is replaced by the pool note at the
    /// index of its pitch class (C picks the first pool note, D the second and
    /// so on) with the pattern's timing; pattern notes past the pool are
    /// dropped and non-note events pass through. Without a pattern, the notes
    /// are played one after another.
    pub fn arp(&self, pattern: Option<&Music>) -> Music {
        let chord = self.shared().into_music().transform(DecomposeChords::default);
        let pattern = pattern.map(|pattern| pattern.shared().into_music());
        Music::generate(move |ctx| {
            let (chord, pattern, ctx) = (chord.clone(), pattern.clone(), ctx.clone());
            deferred(move || match pattern {
                Some(pattern) => arpeggiate(&chord, &pattern, ctx),
                None => Ok(sequence(&chord, ctx)),
            })
        })
    }

    /// Stretch to span `length` ticks.
    ///
    /// Timestamps are scaled around the first event and note values by the
    /// same factor. Empty music and music spanning no time are unchanged.
    pub fn stretch_to(&self, length: Tick) -> Music {
        self.stretch_with(Rc::new(move |_: &Context| -> Result<Tick> { Ok(length) }))
    }

    /// Stretch to span as long as `other` does in the expanding context.
    pub fn stretch_to_music(&self, other: &Music) -> Music {
        let other = other.clone();
        self.stretch_with(Rc::new(move |ctx: &Context| other.duration(ctx)))
    }

    fn stretch_with(&self, target: Rc<dyn Fn(&Context) -> Result<Tick>>) -> Music {
        let shared = self.shared();
        Music::generate(move |ctx| {
            let (shared, target, ctx) = (shared.clone(), Rc::clone(&target), ctx.clone());
            deferred(move || stretch(&shared, target(&ctx)?, ctx))
        })
    }

    pub fn transpose(&self, semitones: i32) -> Music {
        self.map(move |event, _, _| event.transpose(semitones))
    }
}

fn overlaps_start(event: &MusicEvent, start: Tick) -> bool {
    event.timestamp >= start || event.end_timestamp() > start
}

struct RepeatStream {
    shared: SharedMusic,
    ctx: Context,
    remaining: Repeat,
    current: Option<EventStream>,
    produced: bool,
}

impl Iterator for RepeatStream {
    type Item = Result<MusicEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(current) = &mut self.current {
                match current.next() {
                    Some(event) => {
                        self.produced = true;
                        return Some(event);
                    }
                    None => {
                        self.current = None;
                        if !self.produced {
                            return None;
                        }
                    }
                }
            }
            match self.remaining {
                Repeat::Times(0) => return None,
                Repeat::Times(n) => self.remaining = Repeat::Times(n - 1),
                Repeat::Forever => {}
            }
            self.produced = false;
            self.current = Some(self.shared.expand(&self.ctx));
        }
    }
}

fn arpeggiate(chord: &Music, pattern: &Music, ctx: Context) -> Result<EventStream> {
    let mut pool = Vec::new();
    for event in chord.expand(&ctx.fork()) {
        let event = event?;
        if event.is_note() {
            pool.push(event);
        }
    }
    let events = pattern
        .transform(DecomposeChords::default)
        .expand(&ctx.fork());
    Ok(Box::new(events.filter_map(move |event| {
        let event = match event {
            Ok(event) => event,
            Err(e) => return Some(Err(e)),
        };
        let EventKind::Note(note) = &event.kind else {
            ctx.join(event.end_timestamp());
            return Some(Ok(event));
        };
        let archetype = pool.get(note.pitch.class.index())?;
        let event = MusicEvent::from_pattern(archetype, &event)?;
        ctx.join(event.end_timestamp());
        Some(Ok(event))
    })))
}

fn sequence(chord: &Music, ctx: Context) -> EventStream {
    let events = chord.expand(&ctx.fork());
    let mut next_start: Option<Tick> = None;
    Box::new(events.map(move |event| {
        let event = event?;
        let event = match next_start {
            Some(start) => event.with_timestamp(start),
            None => event,
        };
        if event.is_duration_event() {
            next_start = Some(event.end_timestamp());
        }
        ctx.join(event.end_timestamp());
        Ok(event)
    }))
}

fn stretch(shared: &SharedMusic, target: Tick, ctx: Context) -> Result<EventStream> {
    if target < 0 {
        return Err(Error::runtime(format!(
            "cannot stretch music to a negative length ({target} ticks)"
        )));
    }
    let length = span(shared.expand(&ctx.fork()))?.map_or(0, |(start, end)| end - start);
    let fork = ctx.fork();
    if length <= 0 {
        return Ok(Box::new(shared.expand(&fork).map(move |event| {
            let event = event?;
            ctx.join(event.end_timestamp());
            Ok(event)
        })));
    }
    let factor = Fraction::new(target as u64, length as u64);
    let mapper = Rc::new(move |event: &MusicEvent, _: usize, start: Tick| -> Result<MusicEvent> {
        let timestamp = start + scale_ticks(event.timestamp - start, factor);
        let event = event.with_timestamp(timestamp);
        Ok(match event.value() {
            Some(value) => event.with_value(value * factor),
            None => event,
        })
    });
    Ok(Box::new(MapStream::new(shared.expand(&fork), mapper, ctx)))
}

impl Add<i32> for Music {
    type Output = Music;

    fn add(self, semitones: i32) -> Music {
        self.transpose(semitones)
    }
}

impl Sub<i32> for Music {
    type Output = Music;

    fn sub(self, semitones: i32) -> Music {
        self.transpose(-semitones)
    }
}

impl Mul<u32> for Music {
    type Output = Music;

    fn mul(self, count: u32) -> Music {
        self.repeat(count)
    }
}

impl Mul<Music> for Music {
    type Output = Music;

    fn mul(self, pattern: Music) -> Music {
        self.arp(Some(&pattern))
    }
}
