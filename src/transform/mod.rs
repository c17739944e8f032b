//! Streaming transformers over ordered event streams.
//!
//! A [`Transformer`] is a push-driven state machine: it is handed one event
//! at a time and appends whatever it can release to an output queue, then
//! gets one last chance to flush at end of stream. [`Transformed`] adapts
//! it into a pull iterator over `Result<MusicEvent>`, forwarding upstream
//! errors untouched. Every transformer keeps its output timestamps
//! non-decreasing provided its input is.

mod decompose;
mod notation;
mod sort;
mod voices;

use std::collections::VecDeque;

pub use decompose::{ComposeNotes, DecomposeChords, DecomposeNotes};
pub use notation::{
    AbcFormat, Notation, NotationBuilder, NotationFormat, NotationGroup, NotationStream, TextFormat,
};
pub use sort::Sort;
pub use voices::{VoiceIdentifier, VoiceIdentifierConfig};

use crate::error::Result;
use crate::event::MusicEvent;

pub trait Transformer {
    /// Accept the next upstream event, pushing any releasable output.
    fn push(&mut self, event: MusicEvent, out: &mut VecDeque<MusicEvent>) -> Result<()>;

    /// Upstream is exhausted; push everything still held back.
    fn finish(&mut self, _out: &mut VecDeque<MusicEvent>) -> Result<()> {
        Ok(())
    }
}

impl<T: Transformer + ?Sized> Transformer for Box<T> {
    fn push(&mut self, event: MusicEvent, out: &mut VecDeque<MusicEvent>) -> Result<()> {
        (**self).push(event, out)
    }

    fn finish(&mut self, out: &mut VecDeque<MusicEvent>) -> Result<()> {
        (**self).finish(out)
    }
}

/// Pull adaptor running a [`Transformer`] over a fallible event stream.
pub struct Transformed<I, T> {
    input: I,
    transformer: T,
    pending: VecDeque<MusicEvent>,
    finished: bool,
}

impl<I, T> Iterator for Transformed<I, T>
where
    I: Iterator<Item = Result<MusicEvent>>,
    T: Transformer,
{
    type Item = Result<MusicEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.finished {
                return None;
            }
            let step = match self.input.next() {
                Some(Ok(event)) => self.transformer.push(event, &mut self.pending),
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    self.finished = true;
                    self.transformer.finish(&mut self.pending)
                }
            };
            if let Err(e) = step {
                self.finished = true;
                return Some(Err(e));
            }
        }
    }
}

pub trait TransformExt: Iterator<Item = Result<MusicEvent>> + Sized {
    fn transform<T: Transformer>(self, transformer: T) -> Transformed<Self, T> {
        Transformed {
            input: self,
            transformer,
            pending: VecDeque::new(),
            finished: false,
        }
    }
}

impl<I: Iterator<Item = Result<MusicEvent>>> TransformExt for I {}

/// Transformers chained in order; itself a transformer.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Transformer>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, stage: impl Transformer + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Feed `batch` through stages `from..`, appending the result to `out`.
    fn feed(
        &mut self,
        from: usize,
        mut batch: VecDeque<MusicEvent>,
        out: &mut VecDeque<MusicEvent>,
    ) -> Result<()> {
        for stage in &mut self.stages[from..] {
            let mut next = VecDeque::new();
            for event in batch.drain(..) {
                stage.push(event, &mut next)?;
            }
            batch = next;
        }
        out.extend(batch);
        Ok(())
    }
}

impl Transformer for Pipeline {
    fn push(&mut self, event: MusicEvent, out: &mut VecDeque<MusicEvent>) -> Result<()> {
        self.feed(0, VecDeque::from([event]), out)
    }

    fn finish(&mut self, out: &mut VecDeque<MusicEvent>) -> Result<()> {
        for index in 0..self.stages.len() {
            let mut flushed = VecDeque::new();
            self.stages[index].finish(&mut flushed)?;
            self.feed(index + 1, flushed, out)?;
        }
        Ok(())
    }
}
