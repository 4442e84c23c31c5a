// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

const NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// The highest valid MIDI note number.
const MAX_NOTE: u8 = 127;

/// A MIDI note number, written in scientific pitch notation (C4 = 60).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Note(u8);

impl Note {
    /// Middle C. Voices play this note at the natural rate of the sample.
    pub const C4: Note = Note(60);

    /// Creates a note from a MIDI note number, if it's in range.
    pub fn new(number: u8) -> Option<Note> {
        (number <= MAX_NOTE).then_some(Note(number))
    }

    /// Gets the MIDI note number.
    pub fn number(self) -> u8 {
        self.0
    }

    /// Shifts the note by the given number of semitones, clamping to the MIDI range.
    pub fn transpose(self, semitones: i32) -> Note {
        Note((i32::from(self.0) + semitones).clamp(0, i32::from(MAX_NOTE)) as u8)
    }

    /// Returns the distance in semitones from `other` to this note.
    pub fn semitones_from(self, other: Note) -> i32 {
        i32::from(self.0) - i32::from(other.0)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let octave = i32::from(self.0) / 12 - 1;
        write!(f, "{}{}", NAMES[usize::from(self.0 % 12)], octave)
    }
}

impl FromStr for Note {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::Note(s.to_string());
        let mut chars = s.trim().chars();

        let pitch_class: i32 = match chars.next().map(|c| c.to_ascii_uppercase()) {
            Some('C') => 0,
            Some('D') => 2,
            Some('E') => 4,
            Some('F') => 5,
            Some('G') => 7,
            Some('A') => 9,
            Some('B') => 11,
            _ => return Err(invalid()),
        };

        let rest = chars.as_str();
        let (accidental, octave) = if let Some(octave) = rest.strip_prefix('#') {
            (1, octave)
        } else if let Some(octave) = rest.strip_prefix('b') {
            (-1, octave)
        } else {
            (0, rest)
        };

        let octave: i32 = octave.parse().map_err(|_| invalid())?;
        let number = (octave + 1) * 12 + pitch_class + accidental;
        if !(0..=i32::from(MAX_NOTE)).contains(&number) {
            return Err(invalid());
        }

        Ok(Note(number as u8))
    }
}

impl TryFrom<String> for Note {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Note> for String {
    fn from(note: Note) -> Self {
        note.to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(Note::C4.to_string(), "C4");
        assert_eq!(Note(61).to_string(), "C#4");
        assert_eq!(Note(0).to_string(), "C-1");
        assert_eq!(Note(127).to_string(), "G9");
    }

    #[test]
    fn parse() {
        assert_eq!("C4".parse::<Note>(), Ok(Note::C4));
        assert_eq!("a3".parse::<Note>(), Ok(Note(57)));
        assert_eq!("Db4".parse::<Note>(), Ok(Note(61)));
        assert_eq!("C#4".parse::<Note>(), Ok(Note(61)));
        assert_eq!("C-1".parse::<Note>(), Ok(Note(0)));
        assert!("H2".parse::<Note>().is_err());
        assert!("G#9".parse::<Note>().is_err());
        assert!("C".parse::<Note>().is_err());
    }

    #[test]
    fn names_round_trip() {
        for number in 0..=MAX_NOTE {
            let note = Note(number);
            assert_eq!(note.to_string().parse::<Note>(), Ok(note));
        }
    }

    #[test]
    fn transpose_clamps() {
        assert_eq!(Note::C4.transpose(3), Note(63));
        assert_eq!(Note::C4.transpose(-100), Note(0));
        assert_eq!(Note::C4.transpose(100), Note(127));
        assert_eq!(Note(57).semitones_from(Note::C4), -3);
    }
}
