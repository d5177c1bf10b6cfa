//! Spectral Analyzer
//!
//! Magnitude spectra of integer sample slices, spectral peak picking with
//! quadratic refinement, and harmonic fundamental estimation.
//!
//! Samples are half-wave rectified and log-compressed before a Hamming window
//! and a forward complex FFT; only the first half of the transform is kept.

use std::{f64::consts::PI, sync::Arc};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use thiserror::Error;

use crate::frequency_table::FrequencyTable;

/// Highest harmonic number considered when fitting a fundamental.
const MAX_HARMONIC: usize = 15;

/// A first peak this far below the second is treated as a spurious sub-harmonic.
const SUBHARMONIC_RATIO: f64 = 4.0;

/// Errors returned by the spectral analyzer.
#[derive(Debug, Error)]
pub enum SpectralError {
    /// The requested slice is empty, reversed, too short or out of bounds.
    #[error("invalid analysis range {start}..{end} over a signal of {len} samples")]
    InvalidRange {
        /// First sample of the requested slice.
        start: usize,
        /// One past the last sample of the requested slice.
        end: usize,
        /// Length of the signal the slice was taken from.
        len: usize,
    },
}

/// FFT-based magnitude spectrum and peak extraction.
///
/// Keeps its FFT plan and Hamming weights between calls; both are only
/// rebuilt when the slice length changes.
pub struct SpectralAnalyzer {
    sample_rate: u32,
    min_frequency: f64,
    max_frequency: f64,
    planner: FftPlanner<f64>,
    plan: Option<(usize, Arc<dyn Fft<f64>>)>,
    window: Vec<f64>,
    fft_buffer: Vec<Complex<f64>>,
    fft_count: usize,
}

impl SpectralAnalyzer {
    /// Analyzer for audio at `sample_rate` Hz. Peaks are only searched for
    /// between the lowest and highest notes of `table`.
    pub fn new(sample_rate: u32, table: &FrequencyTable) -> Self {
        SpectralAnalyzer {
            sample_rate,
            min_frequency: table.min_frequency(),
            max_frequency: table.max_frequency(),
            planner: FftPlanner::new(),
            plan: None,
            window: Vec::new(),
            fft_buffer: Vec::new(),
            fft_count: 0,
        }
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Lowest and highest frequency considered by peak extraction.
    pub fn usable_range(&self) -> (f64, f64) {
        (self.min_frequency, self.max_frequency)
    }

    /// Number of transforms performed so far.
    pub fn fft_count(&self) -> usize {
        self.fft_count
    }

    /// Centre frequency of `bin` in a transform of `transform_len` samples.
    #[inline]
    pub fn bin_frequency(&self, bin: f64, transform_len: usize) -> f64 {
        f64::from(self.sample_rate) * bin / transform_len as f64
    }

    /// Magnitude spectrum of `signal[start..end]`.
    ///
    /// The result has `(end - start) / 2` bins spaced `sample_rate / (end - start)` Hz apart.
    pub fn magnitudes(
        &mut self,
        signal: &[i32],
        start: usize,
        end: usize,
    ) -> Result<Vec<f64>, SpectralError> {
        if start >= end || end > signal.len() || end - start < 2 {
            return Err(SpectralError::InvalidRange {
                start,
                end,
                len: signal.len(),
            });
        }
        let n = end - start;

        if self.window.len() != n {
            self.window = hamming_window(n);
        }
        let fft = match &self.plan {
            Some((len, fft)) if *len == n => Arc::clone(fft),
            _ => {
                let fft = self.planner.plan_fft_forward(n);
                self.plan = Some((n, Arc::clone(&fft)));
                fft
            }
        };

        self.fft_buffer.clear();
        self.fft_buffer.extend(
            signal[start..end]
                .iter()
                .zip(&self.window)
                .map(|(&s, &w)| Complex::new(compress(s) * w, 0.0)),
        );
        fft.process(&mut self.fft_buffer);
        self.fft_count += 1;

        Ok(self.fft_buffer[..n / 2]
            .iter()
            .map(|c| (c.re * c.re + c.im * c.im).sqrt())
            .collect())
    }

    /// Refined frequencies of the spectral peaks in `magnitudes`.
    ///
    /// A peak region is a run of in-range bins above `threshold`. The first
    /// run is ignored unless a bin at or below the threshold has been seen
    /// before it, which drops the skirt of the DC component. Regions need at
    /// least two bins and must be closed by a quiet bin; their maximum is
    /// refined with [`interpolate_peak`] unless it sits on the region edge.
    pub fn find_peaks(&self, magnitudes: &[f64], threshold: f64) -> Vec<f64> {
        let transform_len = magnitudes.len() * 2;
        let mut peaks = Vec::new();
        let mut past_zero = false;
        let mut open: Option<usize> = None;

        for (bin, &mag) in magnitudes.iter().enumerate() {
            let freq = self.bin_frequency(bin as f64, transform_len);
            if freq < self.min_frequency || freq > self.max_frequency {
                continue;
            }
            if mag > threshold {
                if past_zero && open.is_none() {
                    open = Some(bin);
                }
                continue;
            }
            past_zero = true;
            if let Some(first) = open.take() {
                if bin - first > 1 {
                    if let Some(peak) = self.region_peak(magnitudes, first, bin, transform_len) {
                        peaks.push(peak);
                    }
                }
            }
        }
        peaks
    }

    /// Transform the whole of `signal` and estimate its fundamental from the
    /// peaks above `threshold`. `Ok(None)` when no usable peak is found.
    pub fn detect_pitch(
        &mut self,
        signal: &[i32],
        threshold: f64,
    ) -> Result<Option<f64>, SpectralError> {
        let magnitudes = self.magnitudes(signal, 0, signal.len())?;
        let peaks = self.find_peaks(&magnitudes, threshold);
        Ok(estimate_fundamental(&peaks))
    }

    fn region_peak(
        &self,
        magnitudes: &[f64],
        first: usize,
        end: usize,
        transform_len: usize,
    ) -> Option<f64> {
        let region = &magnitudes[first..end];
        let mut top = 0;
        for (i, &mag) in region.iter().enumerate() {
            if mag > region[top] {
                top = i;
            }
        }
        if top == 0 || top == region.len() - 1 {
            return Some(self.bin_frequency((first + top) as f64, transform_len));
        }
        let bin = interpolate_peak(magnitudes, first + top);
        if bin.is_none() {
            log::debug!("flat peak at bin {}, dropping it", first + top);
        }
        bin.map(|bin| self.bin_frequency(bin, transform_len))
    }
}

/// Half-wave rectification followed by log compression.
#[inline]
fn compress(sample: i32) -> f64 {
    if sample > 0 {
        f64::from(sample).ln()
    } else {
        0.0
    }
}

/// Hamming window of length `n`: `0.54 - 0.46 cos(2πi / (n - 1))`.
pub fn hamming_window(n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![1.0; n];
    }
    let denom = (n - 1) as f64;
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / denom).cos())
        .collect()
}

/// Fractional bin of the peak at `index`, fitted through the parabola that
/// passes its two neighbours.
///
/// `None` when `index` has no neighbour on either side or the three
/// magnitudes are collinear.
pub fn interpolate_peak(magnitudes: &[f64], index: usize) -> Option<f64> {
    if index == 0 || index + 1 >= magnitudes.len() {
        return None;
    }
    let (left, centre, right) = (magnitudes[index - 1], magnitudes[index], magnitudes[index + 1]);
    let denom = left - 2.0 * centre + right;
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }
    Some(index as f64 + 0.5 * (left - right) / denom)
}

/// Fundamental frequency of a harmonic series given its peaks in ascending order.
///
/// Each peak is assigned the nearest harmonic number of the lowest peak,
/// keeping the closest candidate per harmonic. The fundamental is the slope
/// of the least-squares line through the `(harmonic, frequency)` points, or
/// the single frequency when only one harmonic is populated.
pub fn estimate_fundamental(peaks: &[f64]) -> Option<f64> {
    let peaks = match peaks {
        [] => return None,
        [first, second, ..] if second / first > SUBHARMONIC_RATIO => &peaks[1..],
        _ => peaks,
    };
    let base = peaks[0];
    if !base.is_finite() || base <= 0.0 {
        return None;
    }

    // (frequency, distance from the exact multiple) per harmonic number
    let mut harmonics: [Option<(f64, f64)>; MAX_HARMONIC] = [None; MAX_HARMONIC];
    for &peak in peaks {
        let multiple = peak / base;
        let harmonic = (multiple + 0.5) as usize;
        if harmonic == 0 || harmonic >= MAX_HARMONIC {
            continue;
        }
        let off = (multiple - harmonic as f64).abs();
        match harmonics[harmonic] {
            Some((_, best)) if best <= off => {}
            _ => harmonics[harmonic] = Some((peak, off)),
        }
    }

    let (mut n, mut sum_h, mut sum_h2, mut sum_f, mut sum_hf) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (h, slot) in harmonics.iter().enumerate() {
        if let Some((freq, _)) = *slot {
            let h = h as f64;
            n += 1.0;
            sum_h += h;
            sum_h2 += h * h;
            sum_f += freq;
            sum_hf += h * freq;
        }
    }

    let fundamental = if n == 1.0 {
        sum_f
    } else {
        (n * sum_hf - sum_h * sum_f) / (n * sum_h2 - sum_h * sum_h)
    };
    (fundamental.is_finite() && fundamental > 0.0).then_some(fundamental)
}
