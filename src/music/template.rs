//! Template music: a syntax node evaluated to music on first expansion.
//!
//! The node is evaluated once, in a fork of the first expanding context, and
//! the resulting events are cached as shared music. Every expansion,
//! including the first, replays the cache at the current cursor rebound to
//! the expanding context's voice.

use std::cell::OnceCell;
use std::rc::Rc;

use tracing::debug;

use super::stream::deferred;
use super::{EventStream, MusicItem, SharedMusic};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::syntax::NodeRef;
use crate::value::Value;

pub(crate) struct TemplateState {
    node: NodeRef,
    cache: OnceCell<SharedMusic>,
}

impl TemplateState {
    pub(crate) fn new(node: NodeRef) -> Rc<Self> {
        Rc::new(Self {
            node,
            cache: OnceCell::new(),
        })
    }

    pub(crate) fn describe(&self) -> String {
        self.node.describe()
    }

    pub(crate) fn is_evaluated(&self) -> bool {
        self.cache.get().is_some()
    }

    /// The cached music, evaluating the node in a fork of `ctx` if needed.
    /// A failed evaluation is not cached.
    fn resolve(&self, ctx: &Context) -> Result<SharedMusic> {
        if let Some(shared) = self.cache.get() {
            return Ok(shared.clone());
        }
        let fork = ctx.fork();
        let music = match self.node.eval(&fork)? {
            Value::Music(music) => music,
            other => {
                return Err(Error::runtime(format!(
                    "template {} evaluated to {}, expected music",
                    self.node.describe(),
                    other.type_name()
                )))
            }
        };
        debug!(node = %self.node.describe(), "template evaluated");
        let shared = SharedMusic::from_items(Box::new(
            music.expand(&fork).map(|event| event.map(MusicItem::Event)),
        ));
        Ok(self.cache.get_or_init(|| shared).clone())
    }
}

pub(crate) fn expand(state: &Rc<TemplateState>, ctx: &Context) -> EventStream {
    let state = Rc::clone(state);
    let ctx = ctx.clone();
    deferred(move || {
        let shared = state.resolve(&ctx)?;
        let voice = ctx.voice();
        let replay = shared.expand(&ctx);
        Ok(Box::new(replay.map(move |event| {
            let event = event?.revoice(&voice);
            ctx.join(event.end_timestamp());
            Ok(event)
        })) as EventStream)
    })
}
