//! Shared music — one underlying expansion, replayed to any number of readers.
//!
//! [`SharedIterator`] drives its source at most once per item and appends
//! what it gets to a buffer; every reader walks the buffer with its own index
//! and only the reader that runs past the end pulls the source forward.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use super::{EventStream, ItemStream, Music, MusicItem};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::event::{MusicEvent, Tick};

struct SharedState<T> {
    buffer: Vec<T>,
    source: Option<Box<dyn Iterator<Item = T>>>,
    exhausted: bool,
}

/// Append-only buffer in front of a single-pass iterator.
pub struct SharedIterator<T> {
    state: RefCell<SharedState<T>>,
}

impl<T: Clone + 'static> SharedIterator<T> {
    pub fn new(source: impl Iterator<Item = T> + 'static) -> Self {
        Self {
            state: RefCell::new(SharedState {
                buffer: Vec::new(),
                source: Some(Box::new(source)),
                exhausted: false,
            }),
        }
    }

    /// The item at `index`, pulling the source forward as far as needed.
    ///
    /// Reading past the buffered prefix while the source is already being
    /// pulled (a source that reads its own output) is an invariant error.
    pub fn get(&self, index: usize) -> Result<Option<T>> {
        loop {
            let mut source = {
                let mut state = self.state.borrow_mut();
                if let Some(item) = state.buffer.get(index) {
                    return Ok(Some(item.clone()));
                }
                if state.exhausted {
                    return Ok(None);
                }
                match state.source.take() {
                    Some(source) => source,
                    None => {
                        return Err(Error::invariant(
                            "shared music read its own unfinished output",
                        ))
                    }
                }
            };

            let next = source.next();
            let mut state = self.state.borrow_mut();
            match next {
                Some(item) => {
                    state.buffer.push(item);
                    state.source = Some(source);
                    trace!(buffered = state.buffer.len(), "shared source advanced");
                }
                None => {
                    state.exhausted = true;
                    drop(state);
                    drop(source);
                    trace!("shared source exhausted");
                }
            }
        }
    }

    /// Number of items pulled from the source so far.
    pub fn buffered(&self) -> usize {
        self.state.borrow().buffer.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.state.borrow().exhausted
    }
}

/// One reader's position over a [`SharedIterator`].
pub struct SharedReader<T> {
    shared: Rc<SharedIterator<T>>,
    index: usize,
    done: bool,
}

impl<T> SharedReader<T> {
    pub fn new(shared: Rc<SharedIterator<T>>, start: usize) -> Self {
        Self {
            shared,
            index: start,
            done: false,
        }
    }
}

impl<T: Clone + 'static> Iterator for SharedReader<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.shared.get(self.index) {
            Ok(Some(item)) => {
                self.index += 1;
                Some(Ok(item))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Music whose underlying items are produced once and replayed from a buffer.
///
/// Expanding retimes the items so the first one lands on the context's
/// cursor; the same offset is applied to everything after it.
#[derive(Clone)]
pub struct SharedMusic {
    items: Rc<SharedIterator<Result<MusicItem>>>,
}

impl SharedMusic {
    pub fn from_items(items: ItemStream) -> Self {
        Self {
            items: Rc::new(SharedIterator::new(items)),
        }
    }

    /// Raw items, from the start of the buffer.
    pub fn items(&self) -> ItemStream {
        Box::new(SharedReader::new(Rc::clone(&self.items), 0).map(|item| item.and_then(|i| i)))
    }

    /// Random access into the raw items.
    pub fn get(&self, index: usize) -> Result<Option<MusicItem>> {
        self.items.get(index)?.transpose()
    }

    pub fn peek(&self) -> Result<Option<MusicItem>> {
        self.get(0)
    }

    pub fn peek_many(&self, count: usize) -> Result<Vec<MusicItem>> {
        self.items().take(count).collect()
    }

    /// How many raw items have been produced so far.
    pub fn buffered(&self) -> usize {
        self.items.buffered()
    }

    pub fn expand(&self, ctx: &Context) -> EventStream {
        Box::new(SharedExpansion {
            items: self.items(),
            ctx: ctx.clone(),
            offset: None,
            nested: None,
        })
    }

    pub fn into_music(self) -> Music {
        Music::from_shared(self)
    }

    pub fn same(&self, other: &SharedMusic) -> bool {
        Rc::ptr_eq(&self.items, &other.items)
    }
}

impl fmt::Debug for SharedMusic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedMusic")
            .field("buffered", &self.items.buffered())
            .field("exhausted", &self.items.is_exhausted())
            .finish()
    }
}

struct SharedExpansion {
    items: ItemStream,
    ctx: Context,
    offset: Option<Tick>,
    nested: Option<EventStream>,
}

impl SharedExpansion {
    fn retime(&mut self, event: MusicEvent) -> MusicEvent {
        let cursor = self.ctx.cursor();
        let offset = *self.offset.get_or_insert(cursor - event.timestamp);
        let event = if offset == 0 { event } else { event.shifted(offset) };
        self.ctx.join(event.end_timestamp());
        event
    }

    /// Nested music is expanded on the source timeline (cursor minus the
    /// offset) so the shared offset can be applied to it like any other item.
    fn nested_context(&self) -> Context {
        let position = match self.offset {
            Some(offset) => self.ctx.cursor() - offset,
            None => self.ctx.cursor(),
        };
        self.ctx.fork_at(position)
    }
}

impl Iterator for SharedExpansion {
    type Item = Result<MusicEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(nested) = &mut self.nested {
                match nested.next() {
                    Some(Ok(event)) => return Some(Ok(self.retime(event))),
                    Some(Err(e)) => return Some(Err(e)),
                    None => self.nested = None,
                }
            }
            match self.items.next()? {
                Ok(MusicItem::Event(event)) => return Some(Ok(self.retime(event))),
                Ok(MusicItem::Music(music)) => {
                    let ctx = self.nested_context();
                    self.nested = Some(music.expand(&ctx));
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn readers_share_one_pass() {
        let pulls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&pulls);
        let shared = Rc::new(SharedIterator::new((0..5).inspect(move |_| {
            counter.set(counter.get() + 1);
        })));

        let a: Vec<i32> = SharedReader::new(Rc::clone(&shared), 0)
            .map(|r| r.unwrap())
            .collect();
        let b: Vec<i32> = SharedReader::new(Rc::clone(&shared), 0)
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(a, vec![0, 1, 2, 3, 4]);
        assert_eq!(a, b);
        assert_eq!(pulls.get(), 5);
        assert!(shared.is_exhausted());
    }

    #[test]
    fn interleaved_readers_and_late_joiner() {
        let shared = Rc::new(SharedIterator::new(0..4));
        let mut a = SharedReader::new(Rc::clone(&shared), 0);
        let mut b = SharedReader::new(Rc::clone(&shared), 0);
        assert_eq!(a.next(), Some(Ok(0)));
        assert_eq!(a.next(), Some(Ok(1)));
        assert_eq!(b.next(), Some(Ok(0)));
        assert_eq!(shared.buffered(), 2);
        let late: Vec<i32> = SharedReader::new(Rc::clone(&shared), 0)
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(late, vec![0, 1, 2, 3]);
        assert_eq!(b.next(), Some(Ok(1)));
    }

    #[test]
    fn random_access() {
        let shared = SharedIterator::new("abc".chars());
        assert_eq!(shared.get(2), Ok(Some('c')));
        assert_eq!(shared.get(0), Ok(Some('a')));
        assert_eq!(shared.get(3), Ok(None));
    }

    #[test]
    fn peek_does_not_consume() {
        let music = SharedMusic::from_items(Box::new(
            vec![
                Ok(MusicItem::Event(MusicEvent::rest(0, 10, true))),
                Ok(MusicItem::Event(MusicEvent::rest(10, 10, true))),
            ]
            .into_iter(),
        ));
        assert!(music.peek().unwrap().is_some());
        assert_eq!(music.peek_many(5).unwrap().len(), 2);
        assert_eq!(music.items().count(), 2);
    }

    #[test]
    fn expansion_retimes_to_cursor() {
        let music = SharedMusic::from_items(Box::new(
            vec![
                Ok(MusicItem::Event(MusicEvent::rest(100, 10, true))),
                Ok(MusicItem::Event(MusicEvent::rest(110, 20, true))),
            ]
            .into_iter(),
        ));
        let ctx = Context::new();
        ctx.join(1000);
        let stamps: Vec<Tick> = music.expand(&ctx).map(|e| e.unwrap().timestamp).collect();
        assert_eq!(stamps, vec![1000, 1010]);
        assert_eq!(ctx.cursor(), 1030);
    }

    #[test]
    fn errors_are_replayed() {
        let music = SharedMusic::from_items(Box::new(
            vec![
                Ok(MusicItem::Event(MusicEvent::rest(0, 10, true))),
                Err(Error::runtime("boom")),
            ]
            .into_iter(),
        ));
        for _ in 0..2 {
            let results: Vec<Result<MusicEvent>> = music.expand(&Context::new()).collect();
            assert_eq!(results.len(), 2);
            assert_eq!(results[1], Err(Error::runtime("boom")));
        }
    }
}
