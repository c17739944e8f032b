//! Timestamp-ordered insertion buffer.
//!
//! Transformers park events here (pending note-offs, reorder windows) and
//! release them once the stream has moved far enough. Entries are kept sorted
//! by timestamp; simultaneous entries keep their insertion order.

use std::collections::VecDeque;

use super::time::Tick;
use super::types::MusicEvent;

/// A sorted buffer of pending events.
#[derive(Debug, Clone, Default)]
pub struct MusicBuffer {
    events: VecDeque<MusicEvent>,
}

impl MusicBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an event after every buffered event with the same or an earlier timestamp.
    pub fn append(&mut self, event: MusicEvent) {
        let pos = self.events.partition_point(|e| e.timestamp <= event.timestamp);
        self.events.insert(pos, event);
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = MusicEvent>) {
        for event in events {
            self.append(event);
        }
    }

    /// Release, in order, every event whose timestamp is `<= time`.
    pub fn collect(&mut self, time: Tick) -> impl Iterator<Item = MusicEvent> + '_ {
        let count = self.events.partition_point(|e| e.timestamp <= time);
        self.events.drain(..count)
    }

    /// Release everything, in order.
    pub fn collect_all(&mut self) -> impl Iterator<Item = MusicEvent> + '_ {
        self.events.drain(..)
    }

    /// Timestamp of the earliest pending event.
    pub fn peek_timestamp(&self) -> Option<Tick> {
        self.events.front().map(|e| e.timestamp)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MusicEvent> {
        self.events.iter()
    }
}
