//! Transcription Engine
//!
//! Incremental audio-to-note transcription. Raw PCM bytes are decoded into an
//! append-only sample list, cut into overlapping analysis windows whose
//! magnitude spectra form the spectrogram, and segmented into notes:
//!
//! - a note opens when a column's total energy crosses the energy threshold and
//!   closes after more than `min_note_size` quiet columns in a row;
//! - inside an open note a split detector compares a lagged running mean of
//!   the note's spectra against a short trailing mean, and cuts the note when
//!   the two stop looking alike (legato pitch changes);
//! - every emitted span is re-analyzed at full resolution and its pitch is the
//!   spectral peak closest to the span's coarse likely pitch.

use std::{collections::VecDeque, mem};
use thiserror::Error;

use crate::{
    frequency_table::{FrequencyTable, FrequencyTableError},
    notes::{TranscribedNote, WindowSpan},
    pcm::SampleFormat,
    spectral::{SpectralAnalyzer, SpectralError},
};

/// Bins at the bottom of a column that never hold the likely pitch.
const SKIPPED_LOW_BINS: usize = 3;

/// Bins the likely-pitch scan may go without a new maximum before stopping.
const MAX_STALE_BINS: usize = 2;

/// Errors returned by the transcription engine.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    /// Audio frames must be one or two bytes wide.
    #[error("unsupported frame width of {bytes_per_frame} bytes")]
    UnsupportedFrameWidth {
        /// The rejected frame width.
        bytes_per_frame: usize,
    },

    /// An engine parameter is out of range.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Spectral analysis was asked for an invalid sample range.
    #[error(transparent)]
    Spectral(#[from] SpectralError),

    /// The reference pitch could not be used to build a note table.
    #[error(transparent)]
    FrequencyTable(#[from] FrequencyTableError),
}

/// Builder for a [`TranscriptionEngine`].
pub struct TranscriptionEngineBuilder {
    sample_rate: u32,
    bytes_per_frame: usize,
    reference_pitch: f64,
    window_size: usize,
    window_step_size: usize,
    energy_threshold: f64,
    min_note_size: usize,
    compare_window_size: usize,
    split_threshold: f64,
    fold_energy_ratio: f64,
    pitch_floor: f64,
    peak_threshold: PeakThreshold,
}

/// How the full-resolution pass picks its peak threshold.
#[derive(Debug, Copy, Clone, PartialEq)]
enum PeakThreshold {
    /// Fraction of the strongest in-range magnitude.
    Relative(f64),
    /// Fixed magnitude.
    Absolute(f64),
}

impl TranscriptionEngineBuilder {
    /// Start with default parameters:
    /// sample_rate = 44_100, bytes_per_frame = 2, reference_pitch = 440.0,
    /// window_size = 1024, window_step_size = 256, energy_threshold = 100.0,
    /// min_note_size = 5, compare_window_size = 5, split_threshold = 0.88,
    /// fold_energy_ratio = 0.7, pitch_floor = 0.2, peak_threshold_ratio = 0.1.
    pub fn new() -> Self {
        TranscriptionEngineBuilder {
            sample_rate: 44_100,
            bytes_per_frame: 2,
            reference_pitch: FrequencyTable::DEFAULT_REFERENCE_PITCH,
            window_size: 1024,
            window_step_size: 256,
            energy_threshold: 100.0,
            min_note_size: 5,
            compare_window_size: 5,
            split_threshold: 0.88,
            fold_energy_ratio: 0.7,
            pitch_floor: 0.2,
            peak_threshold: PeakThreshold::Relative(0.1),
        }
    }

    /// Set the sample rate of the incoming audio in Hz.
    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Set the width of one PCM frame: 1 for unsigned 8-bit, 2 for signed
    /// big-endian 16-bit.
    pub fn bytes_per_frame(mut self, bytes: usize) -> Self {
        self.bytes_per_frame = bytes;
        self
    }

    /// Set the frequency of A4 used to bound the pitch search.
    pub fn reference_pitch(mut self, freq: f64) -> Self {
        self.reference_pitch = freq;
        self
    }

    /// Set the number of samples in each spectrogram column's analysis window.
    pub fn window_size(mut self, size: usize) -> Self {
        self.window_size = size;
        self
    }

    /// Set the hop between consecutive analysis windows, in samples.
    pub fn window_step_size(mut self, step: usize) -> Self {
        self.window_step_size = step;
        self
    }

    /// Set the column energy above which a window counts as sounding.
    pub fn energy_threshold(mut self, threshold: f64) -> Self {
        self.energy_threshold = threshold;
        self
    }

    /// Set the shortest note, in windows. Also the number of quiet windows
    /// tolerated inside a note.
    pub fn min_note_size(mut self, windows: usize) -> Self {
        self.min_note_size = windows;
        self
    }

    /// Set the length of the split detector's trailing mean, in windows.
    pub fn compare_window_size(mut self, windows: usize) -> Self {
        self.compare_window_size = windows;
        self
    }

    /// Set the spectral similarity below which an open note is split.
    pub fn split_threshold(mut self, threshold: f64) -> Self {
        self.split_threshold = threshold;
        self
    }

    /// Set the fraction of a note's mean column energy a loud column needs
    /// to be compared by the split detector. Weaker columns, such as the fade
    /// around a brief dip, still keep the note open. 0.0 compares every loud
    /// column.
    pub fn fold_energy_ratio(mut self, ratio: f64) -> Self {
        self.fold_energy_ratio = ratio;
        self
    }

    /// Set the fraction of the strongest bin below which the likely-pitch
    /// scan ignores low bins. 0.0 gives a plain running-maximum scan from the
    /// first bin above the near-DC bins.
    pub fn pitch_floor(mut self, floor: f64) -> Self {
        self.pitch_floor = floor;
        self
    }

    /// Set the full-resolution peak threshold, as a fraction of the strongest
    /// in-range magnitude. Replaces any fixed threshold.
    pub fn peak_threshold_ratio(mut self, ratio: f64) -> Self {
        self.peak_threshold = PeakThreshold::Relative(ratio);
        self
    }

    /// Set a fixed full-resolution peak threshold, in magnitude units.
    /// Replaces the relative threshold.
    pub fn peak_threshold(mut self, threshold: f64) -> Self {
        self.peak_threshold = PeakThreshold::Absolute(threshold);
        self
    }

    /// Finalize and create the engine.
    pub fn build(self) -> Result<TranscriptionEngine, TranscriptionError> {
        let format = SampleFormat::from_bytes_per_frame(self.bytes_per_frame).ok_or(
            TranscriptionError::UnsupportedFrameWidth {
                bytes_per_frame: self.bytes_per_frame,
            },
        )?;
        if self.sample_rate == 0 {
            return Err(TranscriptionError::Configuration("sample_rate cannot be zero".into()));
        }
        if self.window_size <= 2 * SKIPPED_LOW_BINS {
            return Err(TranscriptionError::Configuration(format!(
                "window_size must be larger than {}",
                2 * SKIPPED_LOW_BINS
            )));
        }
        if self.window_step_size == 0 || self.window_step_size > self.window_size {
            return Err(TranscriptionError::Configuration(
                "window_step_size must be between 1 and window_size".into(),
            ));
        }
        if self.min_note_size == 0 || self.compare_window_size == 0 {
            return Err(TranscriptionError::Configuration(
                "min_note_size and compare_window_size cannot be zero".into(),
            ));
        }
        if !self.energy_threshold.is_finite() || self.energy_threshold < 0.0 {
            return Err(TranscriptionError::Configuration(
                "energy_threshold must be finite and non-negative".into(),
            ));
        }
        let mut ratios = vec![
            ("split_threshold", self.split_threshold),
            ("fold_energy_ratio", self.fold_energy_ratio),
            ("pitch_floor", self.pitch_floor),
        ];
        match self.peak_threshold {
            PeakThreshold::Relative(ratio) => ratios.push(("peak_threshold_ratio", ratio)),
            PeakThreshold::Absolute(threshold) => {
                if !threshold.is_finite() || threshold < 0.0 {
                    return Err(TranscriptionError::Configuration(format!(
                        "peak_threshold must be finite and non-negative, got {threshold}"
                    )));
                }
            }
        }
        for (name, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                return Err(TranscriptionError::Configuration(format!(
                    "{name} must be within 0..=1, got {value}"
                )));
            }
        }

        let table = FrequencyTable::new(self.reference_pitch)?;
        let analyzer = SpectralAnalyzer::new(self.sample_rate, &table);

        Ok(TranscriptionEngine {
            format,
            sample_rate: self.sample_rate,
            window_size: self.window_size,
            window_step_size: self.window_step_size,
            energy_threshold: self.energy_threshold,
            min_note_size: self.min_note_size,
            compare_window_size: self.compare_window_size,
            split_threshold: self.split_threshold,
            fold_energy_ratio: self.fold_energy_ratio,
            pitch_floor: self.pitch_floor,
            peak_threshold: self.peak_threshold,
            table,
            analyzer,
            pending: Vec::new(),
            samples: Vec::new(),
            spectrogram: Vec::new(),
            notes: Vec::new(),
            state: NoteState::OutsideNote,
        })
    }
}

impl Default for TranscriptionEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Streaming monophonic transcriber.
///
/// Samples, spectrogram columns and notes only ever grow; readers can keep
/// the length they last saw and fetch the rest with
/// [`columns_since`](Self::columns_since) and [`notes_since`](Self::notes_since).
pub struct TranscriptionEngine {
    format: SampleFormat,
    sample_rate: u32,
    window_size: usize,
    window_step_size: usize,
    energy_threshold: f64,
    min_note_size: usize,
    compare_window_size: usize,
    split_threshold: f64,
    fold_energy_ratio: f64,
    pitch_floor: f64,
    peak_threshold: PeakThreshold,
    table: FrequencyTable,
    analyzer: SpectralAnalyzer,
    pending: Vec<u8>,
    samples: Vec<i32>,
    spectrogram: Vec<Vec<f64>>,
    notes: Vec<TranscribedNote>,
    state: NoteState,
}

enum NoteState {
    OutsideNote,
    WithinNote(OpenNote),
}

struct OpenNote {
    start: usize,
    quiet_run: usize,
    candidate_end: usize,
    mean_energy: f64,
    folded: usize,
    detector: SplitDetector,
}

impl TranscriptionEngine {
    /// Start customizing with a builder.
    pub fn builder() -> TranscriptionEngineBuilder {
        TranscriptionEngineBuilder::new()
    }

    /// Decode a buffer of PCM bytes and transcribe whatever it completes.
    ///
    /// A trailing partial frame is held back until the next call. Returns the
    /// notes finished during this call.
    pub fn process_bytes(&mut self, bytes: &[u8]) -> Result<&[TranscribedNote], TranscriptionError> {
        let rest = if self.pending.is_empty() {
            let rest = self.format.decode_into(bytes, &mut self.samples);
            self.pending.extend_from_slice(&bytes[bytes.len() - rest..]);
            rest
        } else {
            self.pending.extend_from_slice(bytes);
            let rest = self.format.decode_into(&self.pending, &mut self.samples);
            let consumed = self.pending.len() - rest;
            self.pending.drain(..consumed);
            rest
        };
        if rest > 0 {
            log::warn!("sample batch ended mid-frame, holding {rest} byte(s) for the next batch");
        }
        self.advance()
    }

    /// Append already decoded samples and transcribe whatever they complete.
    /// Returns the notes finished during this call.
    pub fn push_samples(&mut self, samples: &[i32]) -> Result<&[TranscribedNote], TranscriptionError> {
        self.samples.extend_from_slice(samples);
        self.advance()
    }

    /// Close a note still open at the end of the input, applying the same
    /// minimum length and pitch resolution as any other note. Returns the
    /// note if one was emitted.
    pub fn finish(&mut self) -> Result<Option<&TranscribedNote>, TranscriptionError> {
        let before = self.notes.len();
        if let NoteState::WithinNote(note) = mem::replace(&mut self.state, NoteState::OutsideNote) {
            let end = if note.quiet_run > 0 {
                note.candidate_end
            } else {
                self.spectrogram.len()
            };
            self.close(note, end)?;
        }
        Ok(self.notes[before..].first())
    }

    fn advance(&mut self) -> Result<&[TranscribedNote], TranscriptionError> {
        let before = self.notes.len();
        loop {
            let window = self.spectrogram.len();
            let start = window * self.window_step_size;
            let end = start + self.window_size;
            if end > self.samples.len() {
                break;
            }
            let column = self.analyzer.magnitudes(&self.samples, start, end)?;
            self.handle_column(window, &column)?;
            self.spectrogram.push(column);
        }
        Ok(&self.notes[before..])
    }

    fn handle_column(&mut self, window: usize, column: &[f64]) -> Result<(), TranscriptionError> {
        let energy: f64 = column.iter().sum();
        let loud = energy > self.energy_threshold;
        log::trace!("window {window}: energy {energy:.1}");

        self.state = match mem::replace(&mut self.state, NoteState::OutsideNote) {
            NoteState::OutsideNote if loud => {
                let mut note = OpenNote {
                    start: window,
                    quiet_run: 0,
                    candidate_end: window,
                    mean_energy: 0.0,
                    folded: 0,
                    detector: SplitDetector::new(
                        self.window_size / 2,
                        self.compare_window_size,
                        self.min_note_size,
                        self.split_threshold,
                    ),
                };
                self.fold(&mut note, window, column, energy)?;
                NoteState::WithinNote(note)
            }
            NoteState::OutsideNote => NoteState::OutsideNote,
            NoteState::WithinNote(mut note) if loud => {
                note.quiet_run = 0;
                self.fold(&mut note, window, column, energy)?;
                NoteState::WithinNote(note)
            }
            NoteState::WithinNote(mut note) => {
                if note.quiet_run == 0 {
                    note.candidate_end = window;
                }
                note.quiet_run += 1;
                if note.quiet_run > self.min_note_size {
                    let end = note.candidate_end;
                    self.close(note, end)?;
                    NoteState::OutsideNote
                } else {
                    NoteState::WithinNote(note)
                }
            }
        };
        Ok(())
    }

    fn fold(
        &mut self,
        note: &mut OpenNote,
        window: usize,
        column: &[f64],
        energy: f64,
    ) -> Result<(), TranscriptionError> {
        // columns straddling a dip mix two onsets and look like a new note
        if note.folded > 0 && energy < self.fold_energy_ratio * note.mean_energy {
            log::trace!("window {window}: fading column, not compared");
            return Ok(());
        }
        note.folded += 1;
        note.mean_energy += (energy - note.mean_energy) / note.folded as f64;

        let Some(split) = note.detector.fold(window, column) else {
            return Ok(());
        };
        let profile = note.detector.reseed();
        if split.saturating_sub(note.start) >= self.min_note_size {
            let span = WindowSpan { start: note.start, end: split };
            self.emit(span, &profile)?;
        } else {
            log::debug!("split at window {split} leaves a fragment shorter than {} windows", self.min_note_size);
        }
        note.start = split + 1;
        Ok(())
    }

    fn close(&mut self, note: OpenNote, end: usize) -> Result<(), TranscriptionError> {
        if end.saturating_sub(note.start) < self.min_note_size {
            log::debug!("note at windows {}..{end} too short, dropping it", note.start);
            return Ok(());
        }
        let profile = note.detector.profile();
        self.emit(WindowSpan { start: note.start, end }, &profile)
    }

    fn emit(&mut self, span: WindowSpan, profile: &[f64]) -> Result<(), TranscriptionError> {
        let Some(bin) = likely_pitch_bin(profile, self.pitch_floor) else {
            log::debug!("no likely pitch in windows {}..{}, dropping note", span.start, span.end);
            return Ok(());
        };
        let coarse = bin as f64 * f64::from(self.sample_rate) / self.window_size as f64;

        let half = self.window_size / 2;
        let lo = span.start * self.window_step_size + half;
        let hi = (span.end * self.window_step_size + half).min(self.samples.len());
        if hi < lo + 2 {
            log::debug!("windows {}..{} cover too few samples, dropping note", span.start, span.end);
            return Ok(());
        }

        let magnitudes = self.analyzer.magnitudes(&self.samples, lo, hi)?;
        let threshold = match self.peak_threshold {
            PeakThreshold::Absolute(threshold) => threshold,
            PeakThreshold::Relative(ratio) => {
                let (min_freq, max_freq) = self.analyzer.usable_range();
                let transform_len = hi - lo;
                let strongest = magnitudes
                    .iter()
                    .enumerate()
                    .filter(|&(bin, _)| {
                        let freq = self.analyzer.bin_frequency(bin as f64, transform_len);
                        freq >= min_freq && freq <= max_freq
                    })
                    .map(|(_, &mag)| mag)
                    .fold(0.0, f64::max);
                ratio * strongest
            }
        };
        let peaks = self.analyzer.find_peaks(&magnitudes, threshold);

        let Some(pitch) = peaks
            .into_iter()
            .min_by(|a, b| (a - coarse).abs().total_cmp(&(b - coarse).abs()))
        else {
            log::debug!("no spectral peak near {coarse:.1} Hz, dropping note");
            return Ok(());
        };

        let sample_rate = f64::from(self.sample_rate);
        let note = TranscribedNote::new(span, lo as f64 / sample_rate, hi as f64 / sample_rate, pitch);
        log::debug!(
            "note {:.2} Hz at {:.3}s..{:.3}s (windows {}..{}, coarse {coarse:.1} Hz)",
            pitch,
            note.start_time(),
            note.end_time(),
            span.start,
            span.end
        );
        self.notes.push(note);
        Ok(())
    }

    /// Every decoded sample so far.
    pub fn samples(&self) -> &[i32] {
        &self.samples
    }

    /// Every spectrogram column so far, each `window_size / 2` bins long.
    pub fn spectrogram(&self) -> &[Vec<f64>] {
        &self.spectrogram
    }

    /// Every note transcribed so far, in onset order.
    pub fn notes(&self) -> &[TranscribedNote] {
        &self.notes
    }

    /// Columns appended after the first `index`.
    pub fn columns_since(&self, index: usize) -> &[Vec<f64>] {
        self.spectrogram.get(index..).unwrap_or_default()
    }

    /// Notes appended after the first `index`.
    pub fn notes_since(&self, index: usize) -> &[TranscribedNote] {
        self.notes.get(index..).unwrap_or_default()
    }

    /// Layout of the incoming PCM frames.
    pub fn sample_format(&self) -> SampleFormat {
        self.format
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples per analysis window.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Samples between the starts of consecutive analysis windows.
    pub fn window_step_size(&self) -> usize {
        self.window_step_size
    }

    /// Note table bounding the pitch search.
    pub fn frequency_table(&self) -> &FrequencyTable {
        &self.table
    }

    /// Number of FFTs run so far, spectrogram columns and note re-analysis included.
    pub fn fft_count(&self) -> usize {
        self.analyzer.fft_count()
    }
}

/// Running comparison of a note's settled spectrum against its recent spectrum.
///
/// Columns enter the trailing compare mean first; once the compare buffer is
/// full the oldest column moves on into the lagged average mean.
struct SplitDetector {
    average: Vec<f64>,
    average_count: usize,
    compare: Vec<f64>,
    compare_count: usize,
    buffer: VecDeque<(usize, Vec<f64>)>,
    compare_size: usize,
    warm_up: usize,
    threshold: f64,
}

impl SplitDetector {
    fn new(bins: usize, compare_size: usize, warm_up: usize, threshold: f64) -> Self {
        SplitDetector {
            average: vec![0.0; bins],
            average_count: 0,
            compare: vec![0.0; bins],
            compare_count: 0,
            buffer: VecDeque::with_capacity(compare_size + 1),
            compare_size,
            warm_up,
            threshold,
        }
    }

    /// Fold one column in. Returns the split point when the note should be cut.
    fn fold(&mut self, window: usize, column: &[f64]) -> Option<usize> {
        let unit = normalized(column);
        self.compare_count += 1;
        add_to_mean(&mut self.compare, &unit, self.compare_count);
        self.buffer.push_back((window, unit));

        if self.buffer.len() > self.compare_size {
            if let Some((_, oldest)) = self.buffer.pop_front() {
                remove_from_mean(&mut self.compare, &oldest, self.compare_count);
                self.compare_count -= 1;
                self.average_count += 1;
                add_to_mean(&mut self.average, &oldest, self.average_count);
            }
        }

        if self.average_count <= self.warm_up {
            return None;
        }
        let similarity = cosine_similarity(&self.average, &self.compare);
        log::trace!("window {window}: similarity {similarity:.4}");
        if similarity < self.threshold {
            self.buffer.front().map(|&(split, _)| split)
        } else {
            None
        }
    }

    /// Start over from the recent columns. Returns the old average, which
    /// covers the note up to the split point.
    fn reseed(&mut self) -> Vec<f64> {
        let bins = self.compare.len();
        let average = mem::replace(&mut self.average, mem::replace(&mut self.compare, vec![0.0; bins]));
        self.average_count = mem::take(&mut self.compare_count);
        self.buffer.clear();
        average
    }

    /// Mean of every column folded in so far.
    fn profile(&self) -> Vec<f64> {
        let total = self.average_count + self.compare_count;
        if total == 0 {
            return self.average.clone();
        }
        let (wa, wc) = (self.average_count as f64, self.compare_count as f64);
        self.average
            .iter()
            .zip(&self.compare)
            .map(|(a, c)| (a * wa + c * wc) / total as f64)
            .collect()
    }
}

fn add_to_mean(mean: &mut [f64], value: &[f64], count: usize) {
    let n = count as f64;
    for (m, &x) in mean.iter_mut().zip(value) {
        *m += (x - *m) / n;
    }
}

/// Inverse of [`add_to_mean`]; `count` is the number of members before removal.
fn remove_from_mean(mean: &mut [f64], value: &[f64], count: usize) {
    if count <= 1 {
        mean.iter_mut().for_each(|m| *m = 0.0);
        return;
    }
    let n = (count - 1) as f64;
    for (m, &x) in mean.iter_mut().zip(value) {
        *m += (*m - x) / n;
    }
}

fn normalized(column: &[f64]) -> Vec<f64> {
    let norm = column.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        column.iter().map(|x| x / norm).collect()
    } else {
        column.to_vec()
    }
}

/// Cosine of the angle between two spectra; 1.0 if either is silent.
fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (norm_a * norm_b)
}

/// Bin of the first prominent maximum above the near-DC bins.
///
/// Bins weaker than `floor` times the strongest bin are passed over until the
/// first one that is not; from there the scan follows the running maximum and
/// stops once it has gone more than two bins without improving.
fn likely_pitch_bin(profile: &[f64], floor: f64) -> Option<usize> {
    let scanned = profile.get(SKIPPED_LOW_BINS..)?;
    let strongest = scanned.iter().copied().fold(0.0, f64::max);
    if strongest <= 0.0 {
        return None;
    }
    let cutoff = floor * strongest;

    let mut best: Option<(usize, f64)> = None;
    let mut stale = 0;
    for (i, &mag) in scanned.iter().enumerate() {
        match best {
            None if mag < cutoff => continue,
            Some((_, top)) if mag <= top => {
                stale += 1;
                if stale > MAX_STALE_BINS {
                    break;
                }
            }
            _ => {
                best = Some((i + SKIPPED_LOW_BINS, mag));
                stale = 0;
            }
        }
    }
    best.map(|(bin, _)| bin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn likely_pitch_skips_dc_and_weak_bins() {
        let mut profile = vec![0.0; 64];
        profile[0] = 50.0;
        profile[1] = 40.0;
        profile[2] = 30.0;
        profile[3] = 1.0;
        profile[9] = 6.0;
        profile[10] = 10.0;
        profile[11] = 7.0;
        // a stronger harmonic further up is never reached
        profile[20] = 12.0;
        assert_eq!(likely_pitch_bin(&profile, 0.2), Some(10));
    }

    #[test]
    fn likely_pitch_follows_a_slow_rise() {
        let mut profile = vec![0.0; 32];
        profile[5] = 4.0;
        profile[6] = 3.0;
        profile[7] = 3.5;
        profile[8] = 9.0;
        assert_eq!(likely_pitch_bin(&profile, 0.2), Some(8));
        profile[8] = 0.0;
        profile[9] = 9.0;
        assert_eq!(likely_pitch_bin(&profile, 0.2), Some(5));
    }

    #[test]
    fn zero_floor_scans_from_the_first_bin_above_dc() {
        let mut profile = vec![0.0; 32];
        profile[3] = 1.0;
        profile[4] = 0.5;
        profile[5] = 0.4;
        profile[6] = 0.3;
        profile[10] = 10.0;
        assert_eq!(likely_pitch_bin(&profile, 0.0), Some(3));
        assert_eq!(likely_pitch_bin(&profile, 0.2), Some(10));
    }

    #[test]
    fn likely_pitch_of_silence_is_none() {
        assert_eq!(likely_pitch_bin(&[0.0; 16], 0.2), None);
        assert_eq!(likely_pitch_bin(&[1.0, 2.0], 0.2), None);
    }

    #[test]
    fn cosine_similarity_of_silence_is_one() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_abs_diff_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 2.0]), 0.0);
        assert_abs_diff_eq!(cosine_similarity(&[3.0, 4.0], &[6.0, 8.0]), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn running_mean_add_and_remove_are_inverse() {
        let mut mean = vec![0.0; 2];
        add_to_mean(&mut mean, &[1.0, 2.0], 1);
        add_to_mean(&mut mean, &[3.0, 6.0], 2);
        add_to_mean(&mut mean, &[5.0, 1.0], 3);
        assert_abs_diff_eq!(mean[0], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(mean[1], 3.0, epsilon = 1e-12);
        remove_from_mean(&mut mean, &[1.0, 2.0], 3);
        assert_abs_diff_eq!(mean[0], 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(mean[1], 3.5, epsilon = 1e-12);
    }

    #[test]
    fn split_detector_cuts_on_spectral_change() {
        let mut detector = SplitDetector::new(4, 2, 2, 0.9);
        let low = [1.0, 0.0, 0.0, 0.0];
        let high = [0.0, 0.0, 1.0, 0.0];
        for window in 0..6 {
            assert_eq!(detector.fold(window, &low), None);
        }
        let mut split = None;
        for window in 6..10 {
            if let Some(at) = detector.fold(window, &high) {
                split = Some(at);
                break;
            }
        }
        // similarity first drops once a `high` column is in the compare buffer
        // with one `low` column still ahead of it
        assert_eq!(split, Some(5));

        let average = detector.reseed();
        assert_abs_diff_eq!(average[0], 1.0, epsilon = 1e-12);
        assert_eq!(detector.compare_count, 0);
        assert_eq!(detector.average_count, 2);
    }

    #[test]
    fn profile_weights_both_means_by_count() {
        let mut detector = SplitDetector::new(2, 2, 10, 0.9);
        detector.fold(0, &[1.0, 0.0]);
        detector.fold(1, &[1.0, 0.0]);
        detector.fold(2, &[0.0, 1.0]);
        let profile = detector.profile();
        assert_abs_diff_eq!(profile[0], 2.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(profile[1], 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn rejects_unsupported_frame_width() {
        let err = TranscriptionEngine::builder().bytes_per_frame(3).build().err();
        assert!(matches!(
            err,
            Some(TranscriptionError::UnsupportedFrameWidth { bytes_per_frame: 3 })
        ));
    }

    #[test]
    fn rejects_bad_configuration() {
        assert!(TranscriptionEngine::builder().sample_rate(0).build().is_err());
        assert!(TranscriptionEngine::builder().window_step_size(0).build().is_err());
        assert!(TranscriptionEngine::builder().window_size(256).window_step_size(512).build().is_err());
        assert!(TranscriptionEngine::builder().split_threshold(1.5).build().is_err());
        assert!(TranscriptionEngine::builder().fold_energy_ratio(-0.1).build().is_err());
        assert!(TranscriptionEngine::builder().peak_threshold(f64::NAN).build().is_err());
        assert!(TranscriptionEngine::builder().peak_threshold(20.0).build().is_ok());
        assert!(matches!(
            TranscriptionEngine::builder().reference_pitch(-1.0).build().err(),
            Some(TranscriptionError::FrequencyTable(_))
        ));
    }

    #[test]
    fn read_views_past_the_end_are_empty() {
        let engine = TranscriptionEngine::builder().build().unwrap();
        assert!(engine.columns_since(10).is_empty());
        assert!(engine.notes_since(0).is_empty());
    }
}
