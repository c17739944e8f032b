//! Event model — timestamped music events, pitches, tick arithmetic and the
//! ordered buffer transformers use to hold events back.

pub mod buffer;
pub mod pitch;
pub mod time;
pub mod types;

pub use buffer::MusicBuffer;
pub use pitch::{parse_note_name, Pitch, PitchClass};
pub use time::{Tick, DEFAULT_BEATS_PER_BAR, DEFAULT_TICKS_PER_BEAT};
pub use types::{
    ChordEvent, ContextChangeEvent, ControlChangeEvent, EventKind, MusicEvent, NoteEvent,
    ProgramChangeEvent, RestEvent, StaffNotationEvent,
};
