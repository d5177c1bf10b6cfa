//! Frequency Table
//!
//! Twelve-tone equal-temperament lookup between note names (`A4`, `C#5`, ...)
//! and frequencies, anchored to a configurable reference pitch for A4.

use std::{collections::HashMap, fmt::Display, str::FromStr};
use thiserror::Error;

const SEMITONES: usize = 12;

/// Number of octaves covered by the table, starting at A0.
const OCTAVES: usize = 8;

/// Total number of table entries (A0 up to G#8).
const TABLE_LEN: usize = SEMITONES * OCTAVES;

/// Table index of A4 when the table starts at A0.
const A4_INDEX: usize = 4 * SEMITONES;

/// Position of A within an octave that starts at C.
const A_OFFSET: usize = 9;

/// Errors when building a frequency table.
#[derive(Debug, Error)]
pub enum FrequencyTableError {
    /// The reference pitch was zero, negative or not a finite number.
    #[error("invalid reference pitch {value}: must be a finite frequency above 0 Hz")]
    InvalidReferencePitch {
        /// The rejected reference pitch in Hz.
        value: f64,
    },
}

/// Twelve chromatic pitch classes, sharps only.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PitchClass {
    /// C
    C,
    /// C sharp
    Cs,
    /// D
    D,
    /// D sharp
    Ds,
    /// E
    E,
    /// F
    F,
    /// F sharp
    Fs,
    /// G
    G,
    /// G sharp
    Gs,
    /// A
    A,
    /// A sharp
    As,
    /// B
    B,
}

impl PitchClass {
    /// All pitch classes in ascending order from C.
    pub const ALL: [PitchClass; SEMITONES] = [
        PitchClass::C,
        PitchClass::Cs,
        PitchClass::D,
        PitchClass::Ds,
        PitchClass::E,
        PitchClass::F,
        PitchClass::Fs,
        PitchClass::G,
        PitchClass::Gs,
        PitchClass::A,
        PitchClass::As,
        PitchClass::B,
    ];

    /// Semitone offset above C.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Textual name as used in note names, e.g. `"C#"`.
    pub const fn as_str(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::Cs => "C#",
            PitchClass::D => "D",
            PitchClass::Ds => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::Fs => "F#",
            PitchClass::G => "G",
            PitchClass::Gs => "G#",
            PitchClass::A => "A",
            PitchClass::As => "A#",
            PitchClass::B => "B",
        }
    }

    /// Split a note name such as `"C#5"` into its pitch class and octave digit.
    ///
    /// Returns `None` unless the name is a letter `A`-`G`, an optional `#`, and
    /// exactly one octave digit.
    pub fn parse_note_name(name: &str) -> Option<(PitchClass, u8)> {
        let (split, last) = name.char_indices().last()?;
        let octave = last.to_digit(10)?;
        let class = name[..split].parse().ok()?;
        Some((class, octave as u8))
    }
}

impl Display for PitchClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PitchClass {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PitchClass::ALL
            .iter()
            .copied()
            .find(|class| class.as_str() == s)
            .ok_or(())
    }
}

/// Equal-tempered note table spanning eight octaves from A0.
///
/// Each table owns its own data, so tables tuned to different reference
/// pitches can be used side by side.
#[derive(Debug, Clone)]
pub struct FrequencyTable {
    reference_pitch: f64,
    names: Vec<String>,
    frequencies: Vec<f64>,
    by_name: HashMap<String, usize>,
}

impl FrequencyTable {
    /// Concert pitch for A4.
    pub const DEFAULT_REFERENCE_PITCH: f64 = 440.0;

    /// Build a table with A4 tuned to `reference_pitch` Hz.
    pub fn new(reference_pitch: f64) -> Result<Self, FrequencyTableError> {
        validate_reference_pitch(reference_pitch)?;
        Ok(Self::build(reference_pitch))
    }

    /// Retune the table so that A4 sits at `freq` Hz, rebuilding every entry.
    pub fn set_reference_pitch(&mut self, freq: f64) -> Result<(), FrequencyTableError> {
        validate_reference_pitch(freq)?;
        *self = Self::build(freq);
        Ok(())
    }

    fn build(reference_pitch: f64) -> Self {
        let mut names = Vec::with_capacity(TABLE_LEN);
        let mut frequencies = Vec::with_capacity(TABLE_LEN);
        let mut by_name = HashMap::with_capacity(TABLE_LEN);

        for i in 0..TABLE_LEN {
            let semitone = i + A_OFFSET;
            let class = PitchClass::ALL[semitone % SEMITONES];
            let octave = semitone / SEMITONES;
            let name = format!("{class}{octave}");
            let exponent = (i as f64 - A4_INDEX as f64) / SEMITONES as f64;

            by_name.insert(name.clone(), i);
            names.push(name);
            frequencies.push(reference_pitch * 2f64.powf(exponent));
        }

        FrequencyTable {
            reference_pitch,
            names,
            frequencies,
            by_name,
        }
    }

    /// The frequency A4 is tuned to.
    pub fn reference_pitch(&self) -> f64 {
        self.reference_pitch
    }

    /// Frequency of a named note, or `None` for names outside the table.
    pub fn frequency_of(&self, name: &str) -> Option<f64> {
        self.by_name.get(name).map(|&i| self.frequencies[i])
    }

    /// Name of the table entry closest to `freq`.
    ///
    /// Frequencies below the lowest or above the highest entry are rejected
    /// rather than clamped.
    pub fn nearest_name(&self, freq: f64) -> Option<&str> {
        if !(self.min_frequency()..=self.max_frequency()).contains(&freq) {
            return None;
        }
        // first entry at or above `freq`; the range check keeps it in bounds
        let upper = self.frequencies.partition_point(|&f| f < freq);
        if upper == 0 {
            return Some(&self.names[0]);
        }
        let lower = upper - 1;
        let closest = if freq - self.frequencies[lower] < self.frequencies[upper] - freq {
            lower
        } else {
            upper
        };
        Some(&self.names[closest])
    }

    /// Lowest frequency in the table (A0).
    pub fn min_frequency(&self) -> f64 {
        self.frequencies[0]
    }

    /// Highest frequency in the table (G#8).
    pub fn max_frequency(&self) -> f64 {
        self.frequencies[self.frequencies.len() - 1]
    }

    /// Note names in ascending pitch order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Frequencies in ascending order, parallel to [`FrequencyTable::names`].
    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }
}

impl Default for FrequencyTable {
    fn default() -> Self {
        Self::build(Self::DEFAULT_REFERENCE_PITCH)
    }
}

fn validate_reference_pitch(freq: f64) -> Result<(), FrequencyTableError> {
    if !freq.is_finite() || freq <= 0.0 {
        return Err(FrequencyTableError::InvalidReferencePitch { value: freq });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn spans_eight_octaves_from_a0() {
        let table = FrequencyTable::default();
        assert_eq!(table.len(), 96);
        assert_eq!(table.names()[0], "A0");
        assert_eq!(table.names()[95], "G#8");
        assert_relative_eq!(table.min_frequency(), 27.5, epsilon = 1e-9);
        assert_relative_eq!(table.frequency_of("A4").unwrap(), 440.0, epsilon = 1e-9);
        assert_relative_eq!(table.frequency_of("C5").unwrap(), 523.2511, epsilon = 1e-3);
    }

    #[test]
    fn frequencies_strictly_increase() {
        let table = FrequencyTable::default();
        assert!(table.frequencies().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn every_name_round_trips() {
        for pitch in [415.0, 432.0, 440.0, 442.0] {
            let table = FrequencyTable::new(pitch).unwrap();
            for (name, &freq) in table.names().iter().zip(table.frequencies()) {
                assert_eq!(table.nearest_name(freq), Some(name.as_str()));
            }
        }
    }

    #[test]
    fn nearest_name_picks_the_closer_neighbour() {
        let table = FrequencyTable::default();
        assert_eq!(table.nearest_name(450.0), Some("A4"));
        assert_eq!(table.nearest_name(460.0), Some("A#4"));
        assert_eq!(table.nearest_name(27.6), Some("A0"));
    }

    #[test]
    fn out_of_range_frequencies_are_rejected() {
        let table = FrequencyTable::default();
        assert_eq!(table.nearest_name(20.0), None);
        assert_eq!(table.nearest_name(table.max_frequency() + 1.0), None);
        assert_eq!(table.nearest_name(f64::NAN), None);
    }

    #[test]
    fn tables_with_different_reference_pitches_coexist() {
        let concert = FrequencyTable::default();
        let baroque = FrequencyTable::new(415.0).unwrap();
        assert_relative_eq!(baroque.frequency_of("A4").unwrap(), 415.0, epsilon = 1e-9);
        assert_relative_eq!(concert.frequency_of("A4").unwrap(), 440.0, epsilon = 1e-9);
        assert_eq!(concert.frequency_of("H4"), None);
    }

    #[test]
    fn rejects_non_positive_reference_pitch() {
        assert!(FrequencyTable::new(0.0).is_err());
        assert!(FrequencyTable::new(f64::INFINITY).is_err());
    }

    #[test]
    fn parses_note_names() {
        assert_eq!(PitchClass::parse_note_name("C#5"), Some((PitchClass::Cs, 5)));
        assert_eq!(PitchClass::parse_note_name("A4"), Some((PitchClass::A, 4)));
        assert_eq!(PitchClass::parse_note_name("H4"), None);
        assert_eq!(PitchClass::parse_note_name("A"), None);
        assert_eq!(PitchClass::parse_note_name(""), None);
    }
}
