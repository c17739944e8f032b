//! Music — the lazily expanded, composable event-stream value.
//!
//! A [`Music`] is a description, not a buffer: nothing runs until
//! [`Music::expand`] turns it into an ordered stream of events for a given
//! [`Context`]. Expansion reads the context's cursor and voice and moves the
//! cursor forward (`join`) past every event it emits.
//!
//! Replaying the same underlying computation to several consumers goes
//! through [`Music::shared`], which drives the expansion once and buffers
//! what it produced.

mod ops;
mod shared;
mod stream;
mod template;

use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::debug;

pub use ops::Repeat;
pub use shared::{SharedIterator, SharedMusic, SharedReader};
pub use stream::deferred;

use crate::context::Context;
use crate::error::Result;
use crate::event::{MusicEvent, Tick};
use crate::syntax::NodeRef;
use crate::transform::{TransformExt, Transformer};
use stream::{FilterStream, MapStream, ParallelMerge, PlainExpansion};
use template::TemplateState;

/// An expanded, ordered event stream. Failures are yielded in place.
pub type EventStream = Box<dyn Iterator<Item = Result<MusicEvent>>>;

/// Raw music content before expansion.
pub type ItemStream = Box<dyn Iterator<Item = Result<MusicItem>>>;

pub(crate) type Mapper = Rc<dyn Fn(&MusicEvent, usize, Tick) -> Result<MusicEvent>>;
pub(crate) type Predicate = Rc<dyn Fn(&MusicEvent, usize, Tick) -> Result<bool>>;
type StreamFactory = Rc<dyn Fn(EventStream) -> EventStream>;
type Generator = Rc<dyn Fn(&Context) -> EventStream>;

/// One element of music content: an event, or music nested inside.
#[derive(Debug, Clone)]
pub enum MusicItem {
    Event(MusicEvent),
    Music(Music),
}

impl From<MusicEvent> for MusicItem {
    fn from(event: MusicEvent) -> Self {
        MusicItem::Event(event)
    }
}

impl From<Music> for MusicItem {
    fn from(music: Music) -> Self {
        MusicItem::Music(music)
    }
}

enum MusicKind {
    Items(Rc<[MusicItem]>),
    /// A one-shot source, replayed from the shared buffer once pulled.
    Lazy(RefCell<Option<ItemStream>>),
    Parallel(Rc<[Music]>),
    Transform {
        base: Music,
        factory: StreamFactory,
    },
    Generate(Generator),
    Map {
        base: Music,
        mapper: Mapper,
    },
    Filter {
        base: Music,
        predicate: Predicate,
    },
    Shared(SharedMusic),
    Template(Rc<TemplateState>),
}

struct MusicInner {
    kind: MusicKind,
    shared: OnceCell<SharedMusic>,
}

/// A lazily expanded music value. Clones are cheap and share state.
#[derive(Clone)]
pub struct Music {
    inner: Rc<MusicInner>,
}

fn slice_items(items: Rc<[MusicItem]>) -> ItemStream {
    Box::new((0..items.len()).map(move |index| Ok(items[index].clone())))
}

fn no_items() -> ItemStream {
    Box::new(std::iter::empty())
}

impl Music {
    fn from_kind(kind: MusicKind) -> Self {
        Self {
            inner: Rc::new(MusicInner {
                kind,
                shared: OnceCell::new(),
            }),
        }
    }

    pub fn empty() -> Self {
        Self::from_items(Vec::new())
    }

    /// Music holding a single event or a single nested music.
    pub fn of(item: impl Into<MusicItem>) -> Self {
        Self::from_items(vec![item.into()])
    }

    pub fn from_events(events: Vec<MusicEvent>) -> Self {
        Self::from_items(events.into_iter().map(MusicItem::Event).collect())
    }

    pub fn from_items(items: Vec<MusicItem>) -> Self {
        Self::from_kind(MusicKind::Items(Rc::from(items)))
    }

    /// Music over a single-pass iterator. The iterator is pulled at most once
    /// per item; later expansions replay what it produced.
    pub fn from_source(source: impl Iterator<Item = Result<MusicItem>> + 'static) -> Self {
        Self::from_kind(MusicKind::Lazy(RefCell::new(Some(Box::new(source)))))
    }

    /// Tracks played simultaneously from the same start cursor.
    pub fn parallel(tracks: Vec<Music>) -> Self {
        Self::from_kind(MusicKind::Parallel(Rc::from(tracks)))
    }

    /// Music produced by a generator function of the expanding context.
    pub fn generate(generator: impl Fn(&Context) -> EventStream + 'static) -> Self {
        Self::from_kind(MusicKind::Generate(Rc::new(generator)))
    }

    /// Music produced by evaluating `node` on first expansion.
    pub fn template(node: NodeRef) -> Self {
        Self::from_kind(MusicKind::Template(TemplateState::new(node)))
    }

    fn from_shared(shared: SharedMusic) -> Self {
        Self::from_kind(MusicKind::Shared(shared))
    }

    /// Expand into an ordered event stream for `ctx`.
    pub fn expand(&self, ctx: &Context) -> EventStream {
        match &self.inner.kind {
            MusicKind::Items(items) => {
                Box::new(PlainExpansion::new(slice_items(Rc::clone(items)), ctx.clone()))
            }
            MusicKind::Lazy(_) => Box::new(PlainExpansion::new(self.shared().items(), ctx.clone())),
            MusicKind::Parallel(tracks) => Box::new(ParallelMerge::new(tracks, ctx)),
            MusicKind::Transform { base, factory } => factory(base.expand(ctx)),
            MusicKind::Generate(generator) => generator(ctx),
            MusicKind::Map { base, mapper } => {
                let (base, mapper, ctx) = (base.clone(), Rc::clone(mapper), ctx.clone());
                // The base runs in a fork; only the mapped events move the cursor.
                deferred(move || {
                    let fork = ctx.fork();
                    Ok(Box::new(MapStream::new(base.expand(&fork), mapper, ctx)) as EventStream)
                })
            }
            MusicKind::Filter { base, predicate } => {
                Box::new(FilterStream::new(base.expand(ctx), Rc::clone(predicate)))
            }
            MusicKind::Shared(shared) => shared.expand(ctx),
            MusicKind::Template(template) => template::expand(template, ctx),
        }
    }

    /// Raw content, before retiming.
    ///
    /// Plain content is returned as stored. Derived music (maps, filters,
    /// pipes, generators, parallel tracks) and templates yield themselves as
    /// a single nested item: what they produce depends on the scope, voice
    /// and cursor of whoever expands them, so they are only ever expanded in
    /// a fork of the caller's context.
    pub fn items(&self) -> ItemStream {
        match &self.inner.kind {
            MusicKind::Lazy(_) => self.shared().items(),
            _ => self.source_items(),
        }
    }

    fn source_items(&self) -> ItemStream {
        match &self.inner.kind {
            MusicKind::Items(items) => slice_items(Rc::clone(items)),
            MusicKind::Lazy(source) => {
                let taken = source.borrow_mut().take();
                taken.unwrap_or_else(|| {
                    debug!("one-shot music source pulled twice");
                    no_items()
                })
            }
            MusicKind::Shared(shared) => shared.items(),
            _ => Box::new(std::iter::once(Ok(MusicItem::Music(self.clone())))),
        }
    }

    /// The shared view of this music.
    ///
    /// Stored content is buffered once and memoized. Derived music and
    /// templates get a fresh wrapper around themselves on every call; a
    /// template's own cache still guarantees a single evaluation.
    pub fn shared(&self) -> SharedMusic {
        match &self.inner.kind {
            MusicKind::Shared(shared) => shared.clone(),
            MusicKind::Items(_) | MusicKind::Lazy(_) => self
                .inner
                .shared
                .get_or_init(|| SharedMusic::from_items(self.source_items()))
                .clone(),
            _ => SharedMusic::from_items(self.source_items()),
        }
    }

    /// The raw item at `index`, through the shared buffer.
    pub fn get(&self, index: usize) -> Result<Option<MusicItem>> {
        self.shared().get(index)
    }

    pub fn peek(&self) -> Result<Option<MusicItem>> {
        self.shared().peek()
    }

    pub fn peek_many(&self, count: usize) -> Result<Vec<MusicItem>> {
        self.shared().peek_many(count)
    }

    pub fn map(&self, mapper: impl Fn(&MusicEvent, usize, Tick) -> MusicEvent + 'static) -> Music {
        self.try_map(move |event, index, start| Ok(mapper(event, index, start)))
    }

    /// Lazily map every event. The mapper also receives the event's index
    /// and the timestamp of the first event of the base expansion.
    pub fn try_map(
        &self,
        mapper: impl Fn(&MusicEvent, usize, Tick) -> Result<MusicEvent> + 'static,
    ) -> Music {
        Self::from_kind(MusicKind::Map {
            base: self.clone(),
            mapper: Rc::new(mapper),
        })
    }

    pub fn filter(&self, predicate: impl Fn(&MusicEvent, usize, Tick) -> bool + 'static) -> Music {
        self.try_filter(move |event, index, start| Ok(predicate(event, index, start)))
    }

    pub fn try_filter(
        &self,
        predicate: impl Fn(&MusicEvent, usize, Tick) -> Result<bool> + 'static,
    ) -> Music {
        Self::from_kind(MusicKind::Filter {
            base: self.clone(),
            predicate: Rc::new(predicate),
        })
    }

    /// Lazily rewrite the expanded stream.
    pub fn pipe(&self, factory: impl Fn(EventStream) -> EventStream + 'static) -> Music {
        Self::from_kind(MusicKind::Transform {
            base: self.clone(),
            factory: Rc::new(factory),
        })
    }

    /// Run every expansion through a fresh transformer from `factory`.
    pub fn transform<T, F>(&self, factory: F) -> Music
    where
        T: Transformer + 'static,
        F: Fn() -> T + 'static,
    {
        self.pipe(move |events| Box::new(events.transform(factory())))
    }

    /// Whether both handles are the same music value.
    pub fn same(&self, other: &Music) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn kind_name(&self) -> &'static str {
        match &self.inner.kind {
            MusicKind::Items(_) => "items",
            MusicKind::Lazy(_) => "lazy",
            MusicKind::Parallel(_) => "parallel",
            MusicKind::Transform { .. } => "transform",
            MusicKind::Generate(_) => "generate",
            MusicKind::Map { .. } => "map",
            MusicKind::Filter { .. } => "filter",
            MusicKind::Shared(_) => "shared",
            MusicKind::Template(_) => "template",
        }
    }
}

impl Default for Music {
    fn default() -> Self {
        Self::empty()
    }
}

impl FromIterator<MusicEvent> for Music {
    fn from_iter<I: IntoIterator<Item = MusicEvent>>(iter: I) -> Self {
        Self::from_events(iter.into_iter().collect())
    }
}

impl From<SharedMusic> for Music {
    fn from(shared: SharedMusic) -> Self {
        Self::from_shared(shared)
    }
}

impl fmt::Debug for Music {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Music");
        out.field("kind", &self.kind_name());
        match &self.inner.kind {
            MusicKind::Items(items) => {
                out.field("items", &items.len());
            }
            MusicKind::Parallel(tracks) => {
                out.field("tracks", &tracks.len());
            }
            MusicKind::Template(template) => {
                out.field("node", &template.describe());
                out.field("evaluated", &template.is_evaluated());
            }
            _ => {}
        }
        out.finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::error::Error;
    use crate::event::Pitch;
    use crate::syntax::{LiteralNode, Node, VariableNode};
    use crate::value::Value;
    use crate::voice::Voice;

    fn rest(ts: Tick, duration: Tick) -> MusicEvent {
        MusicEvent::rest(ts, duration, true)
    }

    fn note(ts: Tick, name: &str) -> MusicEvent {
        MusicEvent::note(ts, Pitch::parse(name).unwrap(), fraction::Fraction::new(1u64, 4u64))
    }

    fn stamps(stream: EventStream) -> Vec<Tick> {
        stream.map(|e| e.unwrap().timestamp).collect()
    }

    #[test]
    fn plain_expansion_keeps_timestamps_and_joins() {
        let music = Music::from_events(vec![rest(0, 10), rest(10, 5)]);
        let ctx = Context::new();
        ctx.join(100);
        assert_eq!(stamps(music.expand(&ctx)), vec![0, 10]);
        assert_eq!(ctx.cursor(), 100);

        let fresh = Context::new();
        music.expand(&fresh).for_each(drop);
        assert_eq!(fresh.cursor(), 15);
    }

    #[test]
    fn shared_expansion_retimes_nested_music() {
        let inner = Music::from_events(vec![rest(0, 10), rest(10, 10)]);
        let outer = Music::from_items(vec![rest(0, 5).into(), Music::from(inner.shared()).into()]);
        let ctx = Context::new();
        ctx.join(1000);
        assert_eq!(stamps(outer.shared().expand(&ctx)), vec![1000, 1005, 1015]);
        assert_eq!(ctx.cursor(), 1025);

        // Plain nested content keeps its absolute position on the source timeline.
        let absolute = Music::from_items(vec![rest(0, 5).into(), inner.into()]);
        let ctx = Context::new();
        ctx.join(1000);
        assert_eq!(stamps(absolute.shared().expand(&ctx)), vec![1000, 1000, 1010]);
    }

    #[test]
    fn shared_is_memoized() {
        let music = Music::from_events(vec![rest(0, 1)]);
        assert!(music.shared().same(&music.shared()));
    }

    #[test]
    fn lazy_source_is_pulled_once() {
        let pulls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&pulls);
        let music = Music::from_source((0..3).map(move |i| {
            counter.set(counter.get() + 1);
            Ok(MusicItem::Event(rest(i * 10, 10)))
        }));
        assert_eq!(stamps(music.expand(&Context::new())), vec![0, 10, 20]);
        assert_eq!(stamps(music.expand(&Context::new())), vec![0, 10, 20]);
        assert_eq!(pulls.get(), 3);
    }

    #[test]
    fn get_and_peek_read_the_buffer() {
        let music = Music::from_events(vec![rest(0, 1), rest(1, 1), rest(2, 1)]);
        let Some(MusicItem::Event(second)) = music.get(1).unwrap() else {
            panic!("expected an event");
        };
        assert_eq!(second.timestamp, 1);
        assert!(music.get(3).unwrap().is_none());
        assert_eq!(music.peek_many(2).unwrap().len(), 2);
    }

    #[test]
    fn map_receives_index_and_start() {
        let music = Music::from_events(vec![rest(40, 10), rest(50, 10)]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let mapped = music.map(move |event, index, start| {
            log.borrow_mut().push((index, start));
            event.shifted(1)
        });
        assert_eq!(stamps(mapped.expand(&Context::new())), vec![41, 51]);
        assert_eq!(*seen.borrow(), vec![(0, 40), (1, 40)]);
    }

    #[test]
    fn map_joins_parent_with_mapped_ends_only() {
        let music = Music::from_events(vec![rest(0, 100)]);
        let shrunk = music.map(|event, _, _| event.with_duration(10));
        let ctx = Context::new();
        shrunk.expand(&ctx).for_each(drop);
        assert_eq!(ctx.cursor(), 10);
    }

    #[test]
    fn failing_mapper_yields_error_in_stream() {
        let music = Music::from_events(vec![rest(0, 1), rest(1, 1)]);
        let mapped = music.try_map(|event, index, _| {
            if index == 1 {
                Err(Error::runtime("bad event"))
            } else {
                Ok(event.clone())
            }
        });
        let results: Vec<Result<MusicEvent>> = mapped.expand(&Context::new()).collect();
        assert!(results[0].is_ok());
        assert_eq!(results[1], Err(Error::runtime("bad event")));
    }

    #[test]
    fn filter_keeps_matching_events() {
        let music = Music::from_events(vec![note(0, "C4"), rest(960, 960), note(1920, "E4")]);
        let notes = music.filter(|event, _, _| event.is_note());
        assert_eq!(stamps(notes.expand(&Context::new())), vec![0, 1920]);
    }

    #[test]
    fn parallel_merges_by_timestamp_with_stable_ties() {
        let a = Music::from_events(vec![rest(0, 10), rest(10, 10)]);
        let b = Music::from_events(vec![note(0, "C4"), note(5, "D4")]);
        let ctx = Context::new();
        let events: Vec<MusicEvent> = Music::parallel(vec![a, b])
            .expand(&ctx)
            .map(|e| e.unwrap())
            .collect();
        let order: Vec<(Tick, bool)> = events.iter().map(|e| (e.timestamp, e.is_rest())).collect();
        assert_eq!(order, vec![(0, true), (0, false), (5, false), (10, true)]);
        assert_eq!(ctx.cursor(), 965);
    }

    #[test]
    fn template_evaluates_once_and_revoices() {
        let evaluations = Rc::new(Cell::new(0));
        struct Counting(Rc<Cell<u32>>);
        impl Node for Counting {
            fn eval(&self, _ctx: &Context) -> Result<Value> {
                self.0.set(self.0.get() + 1);
                Ok(Value::Music(Music::from_events(vec![note(0, "C4")])))
            }
        }
        let template = Music::template(Rc::new(Counting(Rc::clone(&evaluations))));

        let ctx = Context::with_voice(Voice::new("lead").with_ticks_per_beat(96));
        ctx.join(50);
        let first: Vec<MusicEvent> = template.expand(&ctx).map(|e| e.unwrap()).collect();
        assert_eq!(first[0].timestamp, 50);
        assert_eq!(first[0].duration(), 96);
        assert_eq!(first[0].voice_name(), Some("lead"));
        assert_eq!(ctx.cursor(), 146);

        let again: Vec<MusicEvent> = template.expand(&ctx).map(|e| e.unwrap()).collect();
        assert_eq!(again[0].timestamp, 146);
        assert_eq!(evaluations.get(), 1);
    }

    #[test]
    fn template_reads_variables_from_the_expanding_context() {
        let ctx = Context::new();
        ctx.assign("riff", Value::Music(Music::from_events(vec![rest(0, 10)])))
            .unwrap();
        let template = Music::template(VariableNode::new("riff"));
        assert_eq!(stamps(template.expand(&ctx)), vec![0]);
    }

    #[test]
    fn template_of_non_music_is_a_runtime_error() {
        let template = Music::template(LiteralNode::new(Value::Int(3)));
        let results: Vec<Result<MusicEvent>> = template.expand(&Context::new()).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(Error::Runtime(_))));
    }

    #[test]
    fn template_errors_are_not_cached() {
        let ctx = Context::new();
        let template = Music::template(VariableNode::new("later"));
        assert!(template.expand(&ctx).next().unwrap().is_err());
        ctx.assign("later", Value::Music(Music::from_events(vec![rest(0, 1)])))
            .unwrap();
        assert_eq!(template.expand(&ctx).count(), 1);
    }

    #[test]
    fn debug_names_the_kind() {
        let music = Music::from_events(vec![rest(0, 1)]);
        assert_eq!(format!("{music:?}"), "Music { kind: \"items\", items: 1 }");
        assert!(format!("{:?}", music.filter(|_, _, _| true)).contains("filter"));
    }
}
