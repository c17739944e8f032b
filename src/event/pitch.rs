//! Pitch spelling — "C4", "Eb2", "F#3" to and from MIDI note numbers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The seven natural note letters, in scale order starting from C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl PitchClass {
    pub const ALL: [PitchClass; 7] = [
        PitchClass::C,
        PitchClass::D,
        PitchClass::E,
        PitchClass::F,
        PitchClass::G,
        PitchClass::A,
        PitchClass::B,
    ];

    /// Position of the letter within the scale (C = 0 .. B = 6).
    pub fn index(self) -> usize {
        self as usize
    }

    /// Semitone offset of the natural note from C.
    pub fn semitones(self) -> i32 {
        match self {
            PitchClass::C => 0,
            PitchClass::D => 2,
            PitchClass::E => 4,
            PitchClass::F => 5,
            PitchClass::G => 7,
            PitchClass::A => 9,
            PitchClass::B => 11,
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'C' => Some(PitchClass::C),
            'D' => Some(PitchClass::D),
            'E' => Some(PitchClass::E),
            'F' => Some(PitchClass::F),
            'G' => Some(PitchClass::G),
            'A' => Some(PitchClass::A),
            'B' => Some(PitchClass::B),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            PitchClass::C => 'C',
            PitchClass::D => 'D',
            PitchClass::E => 'E',
            PitchClass::F => 'F',
            PitchClass::G => 'G',
            PitchClass::A => 'A',
            PitchClass::B => 'B',
        }
    }
}

/// A spelled pitch: letter, accidental in semitones, and octave (C4 = middle C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pitch {
    pub class: PitchClass,
    pub accidental: i8,
    pub octave: i8,
}

impl Pitch {
    pub fn new(class: PitchClass, accidental: i8, octave: i8) -> Self {
        Self {
            class,
            accidental,
            octave,
        }
    }

    /// Parse a note name.
    ///
    /// Format: `<letter><optional accidental><octave>`
    /// - Letter: C, D, E, F, G, A, B
    /// - Accidental: `#` (sharp) or `b` (flat)
    /// - Octave: -1 to 9
    pub fn parse(name: &str) -> Option<Self> {
        let chars: Vec<char> = name.chars().collect();
        let class = PitchClass::from_letter(*chars.first()?)?;

        let mut i = 1;
        let accidental: i8 = if i < chars.len() && chars[i] == '#' {
            i += 1;
            1
        } else if i < chars.len() && chars[i] == 'b' {
            i += 1;
            -1
        } else {
            0
        };

        let octave_str: String = chars[i..].iter().collect();
        let octave: i8 = octave_str.parse().ok()?;

        let pitch = Self::new(class, accidental, octave);
        (0..=127).contains(&pitch.midi()).then_some(pitch)
    }

    /// Spell a MIDI note number, using sharps for black keys.
    pub fn from_midi(midi: i32) -> Self {
        const SPELLING: [(PitchClass, i8); 12] = [
            (PitchClass::C, 0),
            (PitchClass::C, 1),
            (PitchClass::D, 0),
            (PitchClass::D, 1),
            (PitchClass::E, 0),
            (PitchClass::F, 0),
            (PitchClass::F, 1),
            (PitchClass::G, 0),
            (PitchClass::G, 1),
            (PitchClass::A, 0),
            (PitchClass::A, 1),
            (PitchClass::B, 0),
        ];
        let (class, accidental) = SPELLING[midi.rem_euclid(12) as usize];
        let octave = midi.div_euclid(12) - 1;
        Self::new(class, accidental, octave as i8)
    }

    /// MIDI note = (octave + 1) * 12 + letter + accidental. C-1 = 0, C4 = 60, A4 = 69.
    pub fn midi(self) -> i32 {
        (self.octave as i32 + 1) * 12 + self.class.semitones() + self.accidental as i32
    }

    /// Shift by a number of semitones, respelling with sharps.
    pub fn transpose(self, semitones: i32) -> Self {
        if semitones == 0 {
            self
        } else {
            Self::from_midi(self.midi() + semitones)
        }
    }

    /// Shift by whole octaves, keeping the spelling.
    pub fn shift_octaves(self, octaves: i8) -> Self {
        Self {
            octave: self.octave.saturating_add(octaves),
            ..self
        }
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.class.letter())?;
        match self.accidental {
            0 => {}
            n if n > 0 => write!(f, "{}", "#".repeat(n as usize))?,
            n => write!(f, "{}", "b".repeat(n.unsigned_abs() as usize))?,
        }
        write!(f, "{}", self.octave)
    }
}

/// Parse a note name string straight into a MIDI note number.
pub fn parse_note_name(name: &str) -> Option<u8> {
    Pitch::parse(name).map(|p| p.midi() as u8)
}
