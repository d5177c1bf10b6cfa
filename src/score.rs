//! Text formats for reference scores and transcriptions.
//!
//! Both are line-oriented: one note per block of `Key: value` lines, blocks
//! separated by a blank line.
//!
//! ```text
//! Name: A4
//! Beats: 1
//!
//! Name: C#5
//! Beats: 0.5
//! ```
//!
//! Transcriptions use the keys `Pitch` (Hz), `Onset` and `End` (seconds).

use thiserror::Error;

use crate::{
    frequency_table::PitchClass,
    notes::{MusicNote, TranscribedNote},
};

const SCORE_KEYS: [&str; 2] = ["Name", "Beats"];
const TRANSCRIPTION_KEYS: [&str; 3] = ["Pitch", "Onset", "End"];

/// Errors when reading a score or transcription. Line numbers start at 1.
#[derive(Debug, Error, PartialEq)]
pub enum ScoreError {
    /// A non-blank line without a `Key: value` shape.
    #[error("line {line}: expected `Key: value`, found {text:?}")]
    MalformedLine {
        /// Offending line.
        line: usize,
        /// Its contents.
        text: String,
    },

    /// A key that does not belong in this kind of file.
    #[error("line {line}: unknown field {key:?}")]
    UnknownField {
        /// Offending line.
        line: usize,
        /// The unrecognized key.
        key: String,
    },

    /// The same key twice within one block.
    #[error("line {line}: field `{field}` given twice in one block")]
    DuplicateField {
        /// Line of the repeated key.
        line: usize,
        /// The repeated key.
        field: &'static str,
    },

    /// A block ended without one of its required keys.
    #[error("block starting at line {line} has no `{field}`")]
    MissingField {
        /// First line of the block.
        line: usize,
        /// The absent key.
        field: &'static str,
    },

    /// A value that should be a finite decimal number is not.
    #[error("line {line}: {value:?} is not a valid number")]
    InvalidNumber {
        /// Offending line.
        line: usize,
        /// The rejected value.
        value: String,
    },

    /// A note length that is not a positive number of beats.
    #[error("line {line}: a note must last a positive number of beats, got {value:?}")]
    InvalidBeats {
        /// Offending line.
        line: usize,
        /// The rejected value.
        value: String,
    },

    /// A note name that is not a pitch class followed by an octave digit.
    #[error("line {line}: {name:?} is not a note name")]
    InvalidNoteName {
        /// Offending line.
        line: usize,
        /// The rejected name.
        name: String,
    },
}

/// Values of one block, by key position, each with its line number.
struct Block<'a, const N: usize> {
    line: usize,
    values: [Option<(usize, &'a str)>; N],
}

impl<'a, const N: usize> Block<'a, N> {
    fn get(&self, keys: &[&'static str; N], index: usize) -> Result<(usize, &'a str), ScoreError> {
        self.values[index].ok_or(ScoreError::MissingField {
            line: self.line,
            field: keys[index],
        })
    }
}

fn blocks<'a, const N: usize>(
    input: &'a str,
    keys: &[&'static str; N],
) -> Result<Vec<Block<'a, N>>, ScoreError> {
    let mut blocks = Vec::new();
    let mut current: Option<Block<'a, N>> = None;

    for (index, raw) in input.lines().enumerate() {
        let line = index + 1;
        let text = raw.trim();
        if text.is_empty() {
            blocks.extend(current.take());
            continue;
        }
        let Some((key, value)) = text.split_once(':') else {
            return Err(ScoreError::MalformedLine {
                line,
                text: text.to_owned(),
            });
        };
        let key = key.trim();
        let Some(slot) = keys.iter().position(|&k| k == key) else {
            return Err(ScoreError::UnknownField {
                line,
                key: key.to_owned(),
            });
        };
        let block = current.get_or_insert(Block {
            line,
            values: [None; N],
        });
        if block.values[slot].is_some() {
            return Err(ScoreError::DuplicateField {
                line,
                field: keys[slot],
            });
        }
        block.values[slot] = Some((line, value.trim()));
    }
    blocks.extend(current);
    Ok(blocks)
}

fn number((line, value): (usize, &str)) -> Result<f64, ScoreError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ScoreError::InvalidNumber {
            line,
            value: value.to_owned(),
        })
}

/// Read a reference score.
pub fn parse_score(input: &str) -> Result<Vec<MusicNote>, ScoreError> {
    blocks(input, &SCORE_KEYS)?
        .into_iter()
        .map(|block| {
            let (line, name) = block.get(&SCORE_KEYS, 0)?;
            if PitchClass::parse_note_name(name).is_none() {
                return Err(ScoreError::InvalidNoteName {
                    line,
                    name: name.to_owned(),
                });
            }
            let (line, value) = block.get(&SCORE_KEYS, 1)?;
            let beats = number((line, value))?;
            if beats <= 0.0 {
                return Err(ScoreError::InvalidBeats {
                    line,
                    value: value.to_owned(),
                });
            }
            Ok(MusicNote::new(name, beats))
        })
        .collect()
}

/// Read a transcription written by [`write_transcription`].
pub fn parse_transcription(input: &str) -> Result<Vec<TranscribedNote>, ScoreError> {
    blocks(input, &TRANSCRIPTION_KEYS)?
        .into_iter()
        .map(|block| {
            let pitch = number(block.get(&TRANSCRIPTION_KEYS, 0)?)?;
            let onset = number(block.get(&TRANSCRIPTION_KEYS, 1)?)?;
            let end = number(block.get(&TRANSCRIPTION_KEYS, 2)?)?;
            Ok(TranscribedNote::from_times(onset, end, pitch))
        })
        .collect()
}

/// Write a score in the format [`parse_score`] reads.
pub fn write_score(notes: &[MusicNote]) -> String {
    let mut out = String::new();
    for (i, note) in notes.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!("Name: {}\nBeats: {}\n", note.name(), note.beats()));
    }
    out
}

/// Write notes in the format [`parse_transcription`] reads.
pub fn write_transcription(notes: &[TranscribedNote]) -> String {
    let mut out = String::new();
    for (i, note) in notes.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!(
            "Pitch: {}\nOnset: {}\nEnd: {}\n",
            note.pitch(),
            note.start_time(),
            note.end_time()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_blocks_in_any_key_order() {
        let text = "Name: A4\nBeats: 1\n\n\n\nBeats: 0.5\r\nName: C#5\r\n";
        let notes = parse_score(text).unwrap();
        assert_eq!(
            notes,
            vec![MusicNote::new("A4", 1.0), MusicNote::new("C#5", 0.5)]
        );
    }

    #[test]
    fn last_block_needs_no_trailing_blank_line() {
        let notes = parse_transcription("Pitch: 440.5\nOnset: 0.25\nEnd: 0.75").unwrap();
        assert_eq!(notes, vec![TranscribedNote::from_times(0.25, 0.75, 440.5)]);
        assert!(notes[0].windows().is_none());
    }

    #[test]
    fn written_score_reads_back() {
        let notes = vec![
            MusicNote::new("A0", 4.0),
            MusicNote::new("G#8", 0.125),
            MusicNote::new("D5", 1.0 / 3.0),
        ];
        assert_eq!(parse_score(&write_score(&notes)).unwrap(), notes);
        assert_eq!(write_score(&notes[..1]), "Name: A0\nBeats: 4\n");
    }

    #[test]
    fn written_transcription_reads_back() {
        let notes = vec![
            TranscribedNote::from_times(0.0929, 0.615, 440.07),
            TranscribedNote::from_times(1.2, 1.8, 659.12),
        ];
        assert_eq!(parse_transcription(&write_transcription(&notes)).unwrap(), notes);
    }

    #[test]
    fn empty_input_has_no_notes() {
        assert_eq!(parse_score("").unwrap(), vec![]);
        assert_eq!(parse_transcription("\n\n").unwrap(), vec![]);
    }

    #[test]
    fn reports_the_offending_line() {
        assert_eq!(
            parse_score("Name: A4\nBeats: 1\n\nName: B4\n\nName: C5\nBeats: 2\n"),
            Err(ScoreError::MissingField {
                line: 4,
                field: "Beats"
            })
        );
        assert_eq!(
            parse_score("Name: A4\nBeats: one\n"),
            Err(ScoreError::InvalidNumber {
                line: 2,
                value: "one".into()
            })
        );
        assert_eq!(
            parse_score("Name: H4\nBeats: 1\n"),
            Err(ScoreError::InvalidNoteName {
                line: 1,
                name: "H4".into()
            })
        );
        assert_eq!(
            parse_score("Name: A4\nTempo: 90\n"),
            Err(ScoreError::UnknownField {
                line: 2,
                key: "Tempo".into()
            })
        );
        assert_eq!(
            parse_score("Name: A4\nA4 for one beat\n"),
            Err(ScoreError::MalformedLine {
                line: 2,
                text: "A4 for one beat".into()
            })
        );
        assert_eq!(
            parse_transcription("Pitch: 1\nPitch: 2\n"),
            Err(ScoreError::DuplicateField {
                line: 2,
                field: "Pitch"
            })
        );
    }

    #[test]
    fn rejects_notes_without_length() {
        assert_eq!(
            parse_score("Name: A4\nBeats: -1\n"),
            Err(ScoreError::InvalidBeats {
                line: 2,
                value: "-1".into()
            })
        );
        assert_eq!(
            parse_score("Name: A4\nBeats: 1\n\nBeats: 0\nName: B4\n"),
            Err(ScoreError::InvalidBeats {
                line: 4,
                value: "0".into()
            })
        );
    }

    #[test]
    fn rejects_non_finite_numbers() {
        assert!(matches!(
            parse_transcription("Pitch: NaN\nOnset: 0\nEnd: 1\n"),
            Err(ScoreError::InvalidNumber { line: 1, .. })
        ));
    }
}
