//! Notes
//!
//! Value types shared by transcription and alignment.

/// Half-open range of spectrogram columns `[start, end)` a note was cut from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct WindowSpan {
    /// First column of the note.
    pub start: usize,
    /// Column one past the end of the note.
    pub end: usize,
}

/// A note found in the audio signal.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscribedNote {
    windows: Option<WindowSpan>,
    start_time: f64,
    end_time: f64,
    pitch: f64,
}

impl TranscribedNote {
    /// Create a note cut from the given columns. Times are in seconds from
    /// the start of the stream, `pitch` is in Hz.
    ///
    /// `end_time` is raised to `start_time` if it would otherwise precede it.
    pub fn new(windows: WindowSpan, start_time: f64, end_time: f64, pitch: f64) -> Self {
        let windows = WindowSpan {
            start: windows.start,
            end: windows.end.max(windows.start),
        };
        TranscribedNote {
            windows: Some(windows),
            start_time,
            end_time: end_time.max(start_time),
            pitch,
        }
    }

    /// Create a note that has no spectrogram behind it, e.g. one read back
    /// from a transcription file.
    pub fn from_times(start_time: f64, end_time: f64, pitch: f64) -> Self {
        TranscribedNote {
            windows: None,
            start_time,
            end_time: end_time.max(start_time),
            pitch,
        }
    }

    /// Columns the note spans, if it came from a spectrogram.
    pub fn windows(&self) -> Option<WindowSpan> {
        self.windows
    }

    /// Onset in seconds.
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// End in seconds.
    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    /// `end_time - start_time`, never negative.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Estimated pitch in Hz.
    pub fn pitch(&self) -> f64 {
        self.pitch
    }
}

/// A note as written in the reference score.
#[derive(Debug, Clone, PartialEq)]
pub struct MusicNote {
    name: String,
    beats: f64,
}

impl MusicNote {
    /// A note named like `"A4"` or `"C#5"` lasting `beats` beats.
    pub fn new(name: impl Into<String>, beats: f64) -> Self {
        MusicNote {
            name: name.into(),
            beats,
        }
    }

    /// Note name, pitch class followed by octave.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Written duration; 1.0 is one beat.
    pub fn beats(&self) -> f64 {
        self.beats
    }
}
