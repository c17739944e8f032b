//! Windowed reordering of nearly sorted event streams.

use std::collections::VecDeque;

use super::Transformer;
use crate::error::Result;
use crate::event::{MusicBuffer, MusicEvent, Tick};

/// Windowed reordering of a nearly sorted stream.
///
/// Events are held in a sorted buffer; each time the largest timestamp seen
/// advances, everything at or before `largest - window` is released. A
/// window of zero passes events straight through.
#[derive(Debug, Default)]
pub struct Sort {
    window: Tick,
    buffer: MusicBuffer,
    latest: Option<Tick>,
}

impl Sort {
    pub fn new(window: Tick) -> Self {
        Self {
            window: window.max(0),
            ..Self::default()
        }
    }

    pub fn window(&self) -> Tick {
        self.window
    }
}

impl Transformer for Sort {
    fn push(&mut self, event: MusicEvent, out: &mut VecDeque<MusicEvent>) -> Result<()> {
        if self.window == 0 {
            out.push_back(event);
            return Ok(());
        }

        let timestamp = event.timestamp;
        self.buffer.append(event);
        if self.latest.map_or(true, |latest| timestamp > latest) {
            self.latest = Some(timestamp);
            out.extend(self.buffer.collect(timestamp - self.window));
        }
        Ok(())
    }

    fn finish(&mut self, out: &mut VecDeque<MusicEvent>) -> Result<()> {
        out.extend(self.buffer.collect_all());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::TransformExt;

    fn sorted(window: Tick, stamps: &[Tick]) -> Vec<Tick> {
        stamps
            .iter()
            .map(|&ts| Ok(MusicEvent::bar(ts)))
            .transform(Sort::new(window))
            .map(|e| e.unwrap().timestamp)
            .collect()
    }

    #[test]
    fn window_two_reorders_scenario() {
        assert_eq!(sorted(2, &[5, 1, 3, 2, 8]), vec![1, 2, 3, 5, 8]);
    }

    #[test]
    fn zero_window_passes_through() {
        assert_eq!(sorted(0, &[5, 1, 3]), vec![5, 1, 3]);
    }

    #[test]
    fn releases_as_the_stream_advances() {
        let mut sort = Sort::new(10);
        let mut out = VecDeque::new();
        sort.push(MusicEvent::bar(0), &mut out).unwrap();
        sort.push(MusicEvent::bar(5), &mut out).unwrap();
        assert!(out.is_empty());
        sort.push(MusicEvent::bar(12), &mut out).unwrap();
        let released: Vec<Tick> = out.iter().map(|e| e.timestamp).collect();
        assert_eq!(released, vec![0]);
    }

    #[test]
    fn simultaneous_events_keep_arrival_order() {
        let events = vec![
            Ok(MusicEvent::control_change(4, 1, 1)),
            Ok(MusicEvent::control_change(4, 2, 2)),
            Ok(MusicEvent::bar(2)),
        ];
        let out: Vec<MusicEvent> = events
            .into_iter()
            .transform(Sort::new(5))
            .map(|e| e.unwrap())
            .collect();
        assert_eq!(out[0], MusicEvent::bar(2));
        assert_eq!(out[1], MusicEvent::control_change(4, 1, 1));
        assert_eq!(out[2], MusicEvent::control_change(4, 2, 2));
    }
}
