//! Iterator adaptors behind [`Music::expand`](super::Music::expand).

use std::iter::Fuse;

use super::{EventStream, ItemStream, Mapper, Music, MusicItem, Predicate};
use crate::context::Context;
use crate::error::Result;
use crate::event::{MusicEvent, Tick};

/// Items emitted where they stand; nested music expands in the same context.
pub(crate) struct PlainExpansion {
    items: ItemStream,
    ctx: Context,
    nested: Option<EventStream>,
}

impl PlainExpansion {
    pub(crate) fn new(items: ItemStream, ctx: Context) -> Self {
        Self {
            items,
            ctx,
            nested: None,
        }
    }
}

impl Iterator for PlainExpansion {
    type Item = Result<MusicEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(nested) = &mut self.nested {
                match nested.next() {
                    Some(item) => return Some(item),
                    None => self.nested = None,
                }
            }
            match self.items.next()? {
                Ok(MusicItem::Event(event)) => {
                    self.ctx.join(event.end_timestamp());
                    return Some(Ok(event));
                }
                Ok(MusicItem::Music(music)) => self.nested = Some(music.expand(&self.ctx)),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

type Init = Box<dyn FnOnce() -> Result<EventStream>>;

enum DeferredState {
    Pending(Init),
    Running(EventStream),
    Done,
}

struct Deferred {
    state: DeferredState,
}

impl Iterator for Deferred {
    type Item = Result<MusicEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match std::mem::replace(&mut self.state, DeferredState::Done) {
                DeferredState::Pending(init) => match init() {
                    Ok(stream) => self.state = DeferredState::Running(stream),
                    Err(e) => return Some(Err(e)),
                },
                DeferredState::Running(mut stream) => {
                    let next = stream.next();
                    if next.is_some() {
                        self.state = DeferredState::Running(stream);
                    }
                    return next;
                }
                DeferredState::Done => return None,
            }
        }
    }
}

/// A stream whose construction waits for the first pull.
///
/// Whatever `init` reads from a context (cursor, voice, scope) is read when
/// the consumer starts pulling, not when the stream is built. An error from
/// `init` is yielded once and ends the stream.
pub fn deferred(init: impl FnOnce() -> Result<EventStream> + 'static) -> EventStream {
    Box::new(Deferred {
        state: DeferredState::Pending(Box::new(init)),
    })
}

pub(crate) struct MapStream {
    base: EventStream,
    mapper: Mapper,
    ctx: Context,
    index: usize,
    start: Tick,
}

impl MapStream {
    pub(crate) fn new(base: EventStream, mapper: Mapper, ctx: Context) -> Self {
        Self {
            base,
            mapper,
            ctx,
            index: 0,
            start: 0,
        }
    }
}

impl Iterator for MapStream {
    type Item = Result<MusicEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        let event = match self.base.next()? {
            Ok(event) => event,
            Err(e) => return Some(Err(e)),
        };
        if self.index == 0 {
            self.start = event.timestamp;
        }
        let mapped = (self.mapper)(&event, self.index, self.start);
        self.index += 1;
        if let Ok(mapped) = &mapped {
            self.ctx.join(mapped.end_timestamp());
        }
        Some(mapped)
    }
}

pub(crate) struct FilterStream {
    base: EventStream,
    predicate: Predicate,
    index: usize,
    start: Tick,
}

impl FilterStream {
    pub(crate) fn new(base: EventStream, predicate: Predicate) -> Self {
        Self {
            base,
            predicate,
            index: 0,
            start: 0,
        }
    }
}

impl Iterator for FilterStream {
    type Item = Result<MusicEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let event = match self.base.next()? {
                Ok(event) => event,
                Err(e) => return Some(Err(e)),
            };
            if self.index == 0 {
                self.start = event.timestamp;
            }
            let keep = (self.predicate)(&event, self.index, self.start);
            self.index += 1;
            match keep {
                Ok(true) => return Some(Ok(event)),
                Ok(false) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// K-way merge of tracks that all start at the same cursor.
///
/// Each track runs in its own fork; equal timestamps go to the lower track
/// index first.
pub(crate) struct ParallelMerge {
    ctx: Context,
    tracks: Vec<Fuse<EventStream>>,
    heads: Vec<Option<MusicEvent>>,
}

impl ParallelMerge {
    pub(crate) fn new(tracks: &[Music], ctx: &Context) -> Self {
        let tracks: Vec<Fuse<EventStream>> = tracks
            .iter()
            .map(|track| track.expand(&ctx.fork()).fuse())
            .collect();
        let heads = vec![None; tracks.len()];
        Self {
            ctx: ctx.clone(),
            tracks,
            heads,
        }
    }
}

impl Iterator for ParallelMerge {
    type Item = Result<MusicEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        for (head, track) in self.heads.iter_mut().zip(self.tracks.iter_mut()) {
            if head.is_none() {
                match track.next() {
                    Some(Ok(event)) => *head = Some(event),
                    Some(Err(e)) => return Some(Err(e)),
                    None => {}
                }
            }
        }

        let mut earliest: Option<(usize, Tick)> = None;
        for (index, head) in self.heads.iter().enumerate() {
            if let Some(event) = head {
                if earliest.map_or(true, |(_, ts)| event.timestamp < ts) {
                    earliest = Some((index, event.timestamp));
                }
            }
        }

        let (index, _) = earliest?;
        let event = self.heads[index].take()?;
        self.ctx.join(event.end_timestamp());
        Some(Ok(event))
    }
}

