//! Score Alignment
//!
//! Note-level alignment of a transcription against a reference score, as an
//! edit distance over the two note sequences:
//!
//! - **Aligned**: a played note matches a score note; costs the relative pitch
//!   error, plus the relative rhythm error once a tempo is known;
//! - **Skipped**: a score note was never played; costs its length in beats;
//! - **Added**: a played note has no score counterpart; costs its length in
//!   beats at the current tempo.
//!
//! The tempo is re-estimated from the aligned pairs after every update and
//! feeds back into the rhythm and insertion costs.

use thiserror::Error;

use crate::{
    frequency_table::{FrequencyTable, FrequencyTableError},
    notes::{MusicNote, TranscribedNote},
};

/// Errors returned when setting up a score aligner.
#[derive(Debug, Error)]
pub enum AlignmentError {
    /// A score note is not a name the frequency table knows.
    #[error("score note {index} has unknown name {name:?}")]
    UnknownNoteName {
        /// Position of the note in the score.
        index: usize,
        /// The unresolved name.
        name: String,
    },

    /// A cost weight or tempo parameter is out of range.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The reference pitch could not be used to build a note table.
    #[error(transparent)]
    FrequencyTable(#[from] FrequencyTableError),
}

/// How the two sides of a [`NotePair`] relate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PairKind {
    /// A played note matched to a score note.
    Aligned,
    /// A score note with no played counterpart.
    Skipped,
    /// A played note with no score counterpart.
    Added,
}

/// One step of an alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct NotePair {
    transcribed: Option<TranscribedNote>,
    reference: Option<MusicNote>,
}

impl NotePair {
    /// The played note, absent for a skipped score note.
    pub fn transcribed(&self) -> Option<&TranscribedNote> {
        self.transcribed.as_ref()
    }

    /// The score note, absent for an added played note.
    pub fn reference(&self) -> Option<&MusicNote> {
        self.reference.as_ref()
    }

    /// Which sides are present.
    pub fn kind(&self) -> PairKind {
        match (&self.transcribed, &self.reference) {
            (Some(_), Some(_)) => PairKind::Aligned,
            (Some(_), None) => PairKind::Added,
            (None, Some(_)) => PairKind::Skipped,
            (None, None) => unreachable!("a note pair always holds at least one note"),
        }
    }
}

/// Ordered pairs covering every played note and every score note exactly once.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NoteAlignment {
    pairs: Vec<NotePair>,
}

impl NoteAlignment {
    /// Pairs in score order.
    pub fn pairs(&self) -> &[NotePair] {
        &self.pairs
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// `true` when both sequences were empty.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Number of pairs of the given kind.
    pub fn count(&self, kind: PairKind) -> usize {
        self.pairs.iter().filter(|pair| pair.kind() == kind).count()
    }

    /// Two-line text view: score note names on top, the nearest note names
    /// of the played pitches below, one four-character column per pair.
    /// Pitches outside `table` show as `?`.
    pub fn render(&self, table: &FrequencyTable) -> String {
        let mut top = String::new();
        let mut bottom = String::new();
        for pair in &self.pairs {
            let reference = pair.reference().map_or("", MusicNote::name);
            let transcribed = pair
                .transcribed()
                .map_or("", |note| table.nearest_name(note.pitch()).unwrap_or("?"));
            top.push_str(&format!("{reference:>4}"));
            bottom.push_str(&format!("{transcribed:>4}"));
        }
        top.push('\n');
        top.push_str(&bottom);
        top
    }
}

/// Builder for a [`ScoreAligner`].
pub struct ScoreAlignerBuilder {
    reference_pitch: f64,
    skip_weight: f64,
    add_weight: f64,
    duration_weight: f64,
    pitch_weight: f64,
    default_tempo_bpm: f64,
    min_tempo_samples: usize,
}

impl ScoreAlignerBuilder {
    /// Start with default parameters:
    /// reference_pitch = 440.0, skip_weight = 5.0, add_weight = 5.0,
    /// duration_weight = 1.0, pitch_weight = 4.0, default_tempo_bpm = 80.0,
    /// min_tempo_samples = 3.
    pub fn new() -> Self {
        ScoreAlignerBuilder {
            reference_pitch: FrequencyTable::DEFAULT_REFERENCE_PITCH,
            skip_weight: 5.0,
            add_weight: 5.0,
            duration_weight: 1.0,
            pitch_weight: 4.0,
            default_tempo_bpm: 80.0,
            min_tempo_samples: 3,
        }
    }

    /// Set the frequency of A4 used to resolve score note names.
    pub fn reference_pitch(mut self, freq: f64) -> Self {
        self.reference_pitch = freq;
        self
    }

    /// Set the cost per beat of a score note that was never played.
    pub fn skip_weight(mut self, weight: f64) -> Self {
        self.skip_weight = weight;
        self
    }

    /// Set the cost per beat of a played note missing from the score.
    pub fn add_weight(mut self, weight: f64) -> Self {
        self.add_weight = weight;
        self
    }

    /// Set the weight of the relative rhythm error of an aligned pair.
    pub fn duration_weight(mut self, weight: f64) -> Self {
        self.duration_weight = weight;
        self
    }

    /// Set the weight of the relative pitch error of an aligned pair.
    pub fn pitch_weight(mut self, weight: f64) -> Self {
        self.pitch_weight = weight;
        self
    }

    /// Set the tempo assumed before enough aligned notes give an estimate.
    pub fn default_tempo_bpm(mut self, bpm: f64) -> Self {
        self.default_tempo_bpm = bpm;
        self
    }

    /// Set how many inter-onset samples a tempo estimate needs.
    pub fn min_tempo_samples(mut self, samples: usize) -> Self {
        self.min_tempo_samples = samples;
        self
    }

    /// Finalize and create an aligner for `score`.
    pub fn build(self, score: Vec<MusicNote>) -> Result<ScoreAligner, AlignmentError> {
        for (name, value) in [
            ("skip_weight", self.skip_weight),
            ("add_weight", self.add_weight),
            ("duration_weight", self.duration_weight),
            ("pitch_weight", self.pitch_weight),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(AlignmentError::Configuration(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        if !self.default_tempo_bpm.is_finite() || self.default_tempo_bpm <= 0.0 {
            return Err(AlignmentError::Configuration(
                "default_tempo_bpm must be a positive number".into(),
            ));
        }
        if self.min_tempo_samples == 0 {
            return Err(AlignmentError::Configuration("min_tempo_samples cannot be zero".into()));
        }

        if let Some((index, note)) = score
            .iter()
            .enumerate()
            .find(|(_, note)| !note.beats().is_finite() || note.beats() <= 0.0)
        {
            return Err(AlignmentError::Configuration(format!(
                "score note {index} must last a positive number of beats, got {}",
                note.beats()
            )));
        }

        let table = FrequencyTable::new(self.reference_pitch)?;
        let reference_pitches = score
            .iter()
            .enumerate()
            .map(|(index, note)| {
                table
                    .frequency_of(note.name())
                    .ok_or_else(|| AlignmentError::UnknownNoteName {
                        index,
                        name: note.name().to_owned(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ScoreAligner {
            score,
            reference_pitches,
            transcribed: Vec::new(),
            seconds_per_beat: None,
            skip_weight: self.skip_weight,
            add_weight: self.add_weight,
            duration_weight: self.duration_weight,
            pitch_weight: self.pitch_weight,
            default_seconds_per_beat: 60.0 / self.default_tempo_bpm,
            min_tempo_samples: self.min_tempo_samples,
        })
    }
}

impl Default for ScoreAlignerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Aligns a growing transcription against a fixed score.
///
/// Every query rebuilds the whole `(T + 1) × (M + 1)` cost grid.
pub struct ScoreAligner {
    score: Vec<MusicNote>,
    reference_pitches: Vec<f64>,
    transcribed: Vec<TranscribedNote>,
    seconds_per_beat: Option<f64>,
    skip_weight: f64,
    add_weight: f64,
    duration_weight: f64,
    pitch_weight: f64,
    default_seconds_per_beat: f64,
    min_tempo_samples: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Step {
    Align,
    Skip,
    Add,
}

#[derive(Copy, Clone)]
struct Cell {
    cost: f64,
    step: Option<Step>,
}

struct Grid {
    cells: Vec<Cell>,
    columns: usize,
}

impl Grid {
    fn at(&self, t: usize, m: usize) -> Cell {
        self.cells[t * self.columns + m]
    }
}

impl ScoreAligner {
    /// Start customizing with a builder.
    pub fn builder() -> ScoreAlignerBuilder {
        ScoreAlignerBuilder::new()
    }

    /// Aligner for `score` with default weights.
    pub fn new(score: Vec<MusicNote>) -> Result<Self, AlignmentError> {
        ScoreAlignerBuilder::new().build(score)
    }

    /// Take in the notes of `notes` not seen yet, realign, re-estimate the
    /// tempo, and return the alignment under the new estimate.
    ///
    /// `notes` is the transcriber's full, growing note list.
    pub fn update(&mut self, notes: &[TranscribedNote]) -> NoteAlignment {
        let seen = self.transcribed.len();
        if let Some(new) = notes.get(seen..) {
            self.transcribed.extend_from_slice(new);
        }
        let alignment = self.alignment();
        self.estimate_tempo(&alignment);
        self.alignment()
    }

    /// Current alignment, recomputed from scratch.
    pub fn alignment(&self) -> NoteAlignment {
        let grid = self.solve();
        self.backtrace(&grid)
    }

    /// Cost of the current best alignment.
    pub fn total_cost(&self) -> f64 {
        self.solve().at(self.transcribed.len(), self.score.len()).cost
    }

    /// Estimated seconds per beat, once enough aligned notes have been seen.
    pub fn seconds_per_beat(&self) -> Option<f64> {
        self.seconds_per_beat
    }

    /// Estimated tempo, once enough aligned notes have been seen.
    pub fn beats_per_minute(&self) -> Option<f64> {
        self.seconds_per_beat.map(|spb| 60.0 / spb)
    }

    /// The reference score.
    pub fn score(&self) -> &[MusicNote] {
        &self.score
    }

    /// Played notes taken in so far.
    pub fn transcribed(&self) -> &[TranscribedNote] {
        &self.transcribed
    }

    fn solve(&self) -> Grid {
        let rows = self.transcribed.len() + 1;
        let columns = self.score.len() + 1;
        let mut cells = vec![
            Cell {
                cost: 0.0,
                step: None,
            };
            rows * columns
        ];

        for t in 0..rows {
            for m in 0..columns {
                let cell = match (t, m) {
                    (0, 0) => continue,
                    (0, _) => Cell {
                        cost: cells[m - 1].cost + self.skip_cost(m - 1),
                        step: Some(Step::Skip),
                    },
                    (_, 0) => Cell {
                        cost: cells[(t - 1) * columns].cost + self.add_cost(t - 1),
                        step: Some(Step::Add),
                    },
                    _ => {
                        let add = cells[(t - 1) * columns + m].cost + self.add_cost(t - 1);
                        let skip = cells[t * columns + m - 1].cost + self.skip_cost(m - 1);
                        let align =
                            cells[(t - 1) * columns + m - 1].cost + self.align_cost(t - 1, m - 1);
                        if add <= skip && add <= align {
                            Cell { cost: add, step: Some(Step::Add) }
                        } else if skip <= align {
                            Cell { cost: skip, step: Some(Step::Skip) }
                        } else {
                            Cell { cost: align, step: Some(Step::Align) }
                        }
                    }
                };
                cells[t * columns + m] = cell;
            }
        }

        let grid = Grid { cells, columns };
        log::debug!(
            "aligned {} played notes against {} score notes, cost {:.3}",
            rows - 1,
            columns - 1,
            grid.at(rows - 1, columns - 1).cost
        );
        grid
    }

    fn backtrace(&self, grid: &Grid) -> NoteAlignment {
        let (mut t, mut m) = (self.transcribed.len(), self.score.len());
        let mut pairs = Vec::with_capacity(t + m);
        while t > 0 || m > 0 {
            let pair = match grid.at(t, m).step {
                Some(Step::Align) => {
                    t -= 1;
                    m -= 1;
                    NotePair {
                        transcribed: Some(self.transcribed[t].clone()),
                        reference: Some(self.score[m].clone()),
                    }
                }
                Some(Step::Skip) => {
                    m -= 1;
                    NotePair {
                        transcribed: None,
                        reference: Some(self.score[m].clone()),
                    }
                }
                Some(Step::Add) => {
                    t -= 1;
                    NotePair {
                        transcribed: Some(self.transcribed[t].clone()),
                        reference: None,
                    }
                }
                None => unreachable!("alignment cell ({t}, {m}) was never filled"),
            };
            pairs.push(pair);
        }
        pairs.reverse();
        NoteAlignment { pairs }
    }

    /// Median of the inter-onset times per beat over runs of aligned pairs.
    fn estimate_tempo(&mut self, alignment: &NoteAlignment) {
        let mut samples = Vec::new();
        let mut previous: Option<(f64, f64)> = None;
        for pair in alignment.pairs() {
            let (Some(played), Some(written)) = (pair.transcribed(), pair.reference()) else {
                previous = None;
                continue;
            };
            if let Some((onset, beats)) = previous {
                if beats > 0.0 {
                    samples.push((played.start_time() - onset) / beats);
                }
            }
            previous = Some((played.start_time(), written.beats()));
        }

        if samples.len() < self.min_tempo_samples {
            return;
        }
        samples.sort_by(f64::total_cmp);
        let median = samples[samples.len() / 2];
        if median.is_finite() && median > 0.0 {
            log::debug!(
                "tempo {:.1} bpm from {} inter-onset samples",
                60.0 / median,
                samples.len()
            );
            self.seconds_per_beat = Some(median);
        }
    }

    fn skip_cost(&self, m: usize) -> f64 {
        self.skip_weight * self.score[m].beats()
    }

    fn add_cost(&self, t: usize) -> f64 {
        let spb = self.seconds_per_beat.unwrap_or(self.default_seconds_per_beat);
        self.add_weight * self.transcribed[t].duration() / spb
    }

    fn align_cost(&self, t: usize, m: usize) -> f64 {
        let played = &self.transcribed[t];
        let expected = self.reference_pitches[m];
        let mut cost = self.pitch_weight * (expected - played.pitch()).abs() / expected;

        if let Some(spb) = self.seconds_per_beat {
            let beats = self.score[m].beats();
            if beats > 0.0 {
                let played_beats = self.inter_onset(t) / spb;
                cost += self.duration_weight * (beats - played_beats).abs() / beats;
            }
        }
        cost
    }

    /// Time from a note's onset to the next one, or its own length for the last note.
    fn inter_onset(&self, t: usize) -> f64 {
        let note = &self.transcribed[t];
        match self.transcribed.get(t + 1) {
            Some(next) => next.start_time() - note.start_time(),
            None => note.duration(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn played(pitch: f64, start: f64, end: f64) -> TranscribedNote {
        TranscribedNote::from_times(start, end, pitch)
    }

    #[test]
    fn empty_sequences_align_to_nothing() {
        let aligner = ScoreAligner::new(Vec::new()).unwrap();
        assert!(aligner.alignment().is_empty());
        assert_eq!(aligner.total_cost(), 0.0);
    }

    #[test]
    fn only_score_means_all_skipped() {
        let score = vec![MusicNote::new("A4", 1.0), MusicNote::new("B4", 0.5)];
        let aligner = ScoreAligner::new(score).unwrap();
        let alignment = aligner.alignment();
        assert_eq!(alignment.count(PairKind::Skipped), 2);
        assert!((aligner.total_cost() - 7.5).abs() < 1e-12);
    }

    #[test]
    fn only_transcription_means_all_added() {
        let mut aligner = ScoreAligner::new(Vec::new()).unwrap();
        let alignment = aligner.update(&[played(440.0, 0.0, 0.75), played(500.0, 0.75, 1.5)]);
        assert_eq!(alignment.count(PairKind::Added), 2);
        // 5 per beat at the default 80 bpm
        assert!((aligner.total_cost() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn equal_costs_prefer_add_then_skip() {
        // skip then add and add then skip both cost 2.5; align is far off in pitch
        let score = vec![MusicNote::new("C5", 0.25)];
        let mut aligner = ScoreAligner::new(score).unwrap();
        let alignment = aligner.update(&[played(2093.0, 0.0, 0.1875)]);
        let kinds: Vec<_> = alignment.pairs().iter().map(NotePair::kind).collect();
        assert_eq!(kinds, vec![PairKind::Skipped, PairKind::Added]);
    }

    #[test]
    fn rejects_unknown_note_names() {
        let score = vec![MusicNote::new("A4", 1.0), MusicNote::new("H2", 1.0)];
        match ScoreAligner::new(score) {
            Err(AlignmentError::UnknownNoteName { index, name }) => {
                assert_eq!(index, 1);
                assert_eq!(name, "H2");
            }
            other => panic!("expected unknown note name, got {:?}", other.err()),
        }
    }

    #[test]
    fn rejects_bad_weights() {
        assert!(ScoreAligner::builder().skip_weight(-1.0).build(Vec::new()).is_err());
        assert!(ScoreAligner::builder().default_tempo_bpm(0.0).build(Vec::new()).is_err());
        assert!(ScoreAligner::builder().min_tempo_samples(0).build(Vec::new()).is_err());
    }

    #[test]
    fn rejects_score_notes_without_length() {
        for beats in [0.0, -1.0, f64::NAN] {
            let score = vec![MusicNote::new("A4", 1.0), MusicNote::new("B4", beats)];
            assert!(matches!(
                ScoreAligner::new(score),
                Err(AlignmentError::Configuration(_))
            ));
        }
    }

    #[test]
    fn renders_two_aligned_lines() {
        let table = FrequencyTable::default();
        let score = vec![MusicNote::new("A4", 1.0), MusicNote::new("C#5", 1.0)];
        let mut aligner = ScoreAligner::new(score).unwrap();
        let alignment = aligner.update(&[
            played(440.0, 0.0, 0.75),
            played(20.0, 0.75, 0.76),
            played(554.37, 0.76, 1.5),
        ]);
        assert_eq!(
            alignment.render(&table),
            concat!("  A4", "    ", " C#5", "\n", "  A4", "   ?", " C#5")
        );
    }
}
