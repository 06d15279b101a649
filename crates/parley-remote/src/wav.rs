//! Minimal WAV encoder for transcription uploads.

const HEADER_LEN: usize = 44;

/// Encode mono `f32` samples in `[-1.0, 1.0]` as a 16-bit PCM WAV file.
///
/// Out-of-range samples are clamped.
#[allow(clippy::cast_possible_truncation)]
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = u32::try_from(samples.len() * 2).unwrap_or(u32::MAX - 36);
    let mut buf = Vec::with_capacity(HEADER_LEN + samples.len() * 2);

    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(data_len + 36).to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&1u16.to_le_bytes()); // mono
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    buf.extend_from_slice(&2u16.to_le_bytes());
    buf.extend_from_slice(&16u16.to_le_bytes());

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * 32_767.0).round() as i16;
        buf.extend_from_slice(&value.to_le_bytes());
    }
    buf
}
