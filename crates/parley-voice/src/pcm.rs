//! PCM16 helpers: wire codec, energy, container sniffing and playback framing.
//!
//! All audio on the wire is signed 16-bit little-endian mono. Synthesized
//! audio may instead be a self-describing container, which is forwarded to
//! the client untouched.

/// Decode PCM16 LE bytes. A trailing odd byte is ignored.
pub fn decode_pcm16_le(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Encode samples as PCM16 LE bytes.
pub fn encode_pcm16_le(samples: &[i16]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        buf.extend_from_slice(&s.to_le_bytes());
    }
    buf
}

/// Convert PCM16 samples to `f32` in `[-1.0, 1.0)`.
pub fn to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| f32::from(s) / 32_768.0).collect()
}

/// Root-mean-square energy on the PCM16 scale (0 ..= 32768).
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples
        .iter()
        .map(|&s| {
            let v = f64::from(s);
            v * v
        })
        .sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// Self-describing encoded audio formats recognised by header bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioContainer {
    Wav,
    Aiff,
    Mp3,
    Ogg,
    Flac,
}

impl AudioContainer {
    /// Encoding label used in relay envelopes.
    pub const fn encoding(self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Aiff => "aiff",
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
            Self::Flac => "flac",
        }
    }
}

/// Encoding label for raw PCM in relay envelopes.
pub const PCM_ENCODING: &str = "pcm_s16le";

/// Sniff the container of a synthesized payload. `None` means raw PCM.
pub fn detect_container(bytes: &[u8]) -> Option<AudioContainer> {
    match bytes {
        [b'R', b'I', b'F', b'F', ..] => Some(AudioContainer::Wav),
        [b'F', b'O', b'R', b'M', ..] => Some(AudioContainer::Aiff),
        [b'I', b'D', b'3', ..] => Some(AudioContainer::Mp3),
        // MPEG audio frame sync: 11 set bits.
        [0xFF, second, ..] if second & 0xE0 == 0xE0 => Some(AudioContainer::Mp3),
        [b'O', b'g', b'g', b'S', ..] => Some(AudioContainer::Ogg),
        [b'f', b'L', b'a', b'C', ..] => Some(AudioContainer::Flac),
        _ => None,
    }
}

/// Bytes in one playback frame: `sample_rate x 2 x frame_ms / 1000`.
///
/// Always even (whole samples) and at least one sample.
pub fn frame_bytes(sample_rate: u32, frame_ms: u32) -> usize {
    let samples = (u64::from(sample_rate) * u64::from(frame_ms) / 1000).max(1);
    usize::try_from(samples * 2).unwrap_or(usize::MAX & !1)
}

/// Split raw PCM into playback frames. The last frame may be shorter.
pub fn playback_frames(pcm: &[u8], sample_rate: u32, frame_ms: u32) -> impl Iterator<Item = &[u8]> {
    pcm.chunks(frame_bytes(sample_rate, frame_ms))
}

/// Duration of `samples` at `sample_rate`, in milliseconds.
pub fn duration_ms(samples: usize, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    (samples as u64).saturating_mul(1000) / u64::from(sample_rate)
}
