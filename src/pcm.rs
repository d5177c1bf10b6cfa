//! PCM decoding for the byte buffers handed over by an audio source.

/// Frame layout of incoming audio bytes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SampleFormat {
    /// One unsigned byte per frame, re-centred around zero.
    Unsigned8,
    /// Two bytes per frame, signed, most significant byte first.
    Signed16BigEndian,
}

impl SampleFormat {
    /// Format for a frame width in bytes, or `None` for unsupported widths.
    pub fn from_bytes_per_frame(bytes_per_frame: usize) -> Option<Self> {
        match bytes_per_frame {
            1 => Some(SampleFormat::Unsigned8),
            2 => Some(SampleFormat::Signed16BigEndian),
            _ => None,
        }
    }

    /// Bytes making up one frame.
    pub const fn bytes_per_frame(self) -> usize {
        match self {
            SampleFormat::Unsigned8 => 1,
            SampleFormat::Signed16BigEndian => 2,
        }
    }

    /// Magnitude of a full-scale sample, for normalizing to `[-1, 1]`.
    pub const fn full_scale(self) -> i32 {
        match self {
            SampleFormat::Unsigned8 => 128,
            SampleFormat::Signed16BigEndian => 32_768,
        }
    }

    /// Decode every complete frame in `bytes`, appending to `out`.
    ///
    /// Returns the number of trailing bytes that did not form a full frame.
    pub fn decode_into(self, bytes: &[u8], out: &mut Vec<i32>) -> usize {
        match self {
            SampleFormat::Unsigned8 => {
                out.extend(bytes.iter().map(|&b| i32::from(b) - 128));
                0
            }
            SampleFormat::Signed16BigEndian => {
                let frames = bytes.chunks_exact(2);
                let rest = frames.remainder().len();
                out.extend(frames.map(|f| i32::from(i16::from_be_bytes([f[0], f[1]]))));
                rest
            }
        }
    }
}
