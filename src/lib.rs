//! # melody_transcriber
//!
//! Incremental monophonic transcription: turn a stream of PCM audio into
//! discrete notes (pitch, onset, end), then align those notes against a
//! reference score to follow a performance and estimate its tempo.
//!
//! ## Example
//! ```rust
//! use melody_transcriber::{parse_score, PairKind, ScoreAligner, TranscriptionEngine};
//!
//! fn run() -> Result<(), Box<dyn std::error::Error>> {
//!     // 1) Build a transcriber for 16-bit big-endian audio at 44.1 kHz
//!     let mut engine = TranscriptionEngine::builder()
//!         .sample_rate(44_100)
//!         .bytes_per_frame(2)
//!         .build()?;
//!
//!     // 2) Load the score being played
//!     let score = parse_score("Name: A4\nBeats: 1\n\nName: E5\nBeats: 1\n")?;
//!     let mut aligner = ScoreAligner::new(score)?;
//!
//!     // 3) In your audio loop:
//!     let pcm: Vec<u8> = vec![0; 4096]; // fill with captured bytes
//!     engine.process_bytes(&pcm)?;
//!     engine.finish()?;
//!
//!     let alignment = aligner.update(engine.notes());
//!     println!(
//!         "{} of {} score notes played",
//!         alignment.count(PairKind::Aligned),
//!         aligner.score().len()
//!     );
//!     println!("{}", alignment.render(engine.frequency_table()));
//!     Ok(())
//! }
//! # run().unwrap();
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rust_2018_idioms)]
#![deny(clippy::all)]

/// Note table and pitch classes.
pub use frequency_table::{FrequencyTable, FrequencyTableError, PitchClass};

/// Spectral analysis primitives.
pub use spectral::{
    estimate_fundamental, hamming_window, interpolate_peak, SpectralAnalyzer, SpectralError,
};

/// Note value types.
pub use notes::{MusicNote, TranscribedNote, WindowSpan};

/// PCM frame layouts.
pub use pcm::SampleFormat;

/// Streaming audio-to-note transcription.
pub use transcription::{TranscriptionEngine, TranscriptionEngineBuilder, TranscriptionError};

/// Score alignment and tempo estimation.
pub use alignment::{
    AlignmentError, NoteAlignment, NotePair, PairKind, ScoreAligner, ScoreAlignerBuilder,
};

/// Score and transcription text formats.
pub use score::{parse_score, parse_transcription, write_score, write_transcription, ScoreError};

/// Equal-temperament note table.
pub mod frequency_table;

/// FFT magnitudes, peak picking and fundamental estimation.
pub mod spectral;

/// Transcribed and written notes.
pub mod notes;

/// PCM byte decoding.
pub mod pcm;

/// Transcription engine.
pub mod transcription;

/// Score aligner.
pub mod alignment;

/// Text formats.
pub mod score;
