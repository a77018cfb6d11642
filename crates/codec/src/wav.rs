//! WAV container demuxing
//!
//! Some TTS providers wrap their payload in a RIFF/WAV container. The
//! gateway only needs the raw sample bytes, so this scans for the
//! `data` subchunk instead of parsing the full chunk tree.

/// The `data` subchunk tag.
const DATA_TAG: &[u8; 4] = b"data";

/// Extract the raw payload of the `data` subchunk.
///
/// Scans for the 4-byte ASCII `data` tag, skips the tag and the 4-byte
/// length field, and returns everything after. Returns an empty Vec
/// when no `data` tag exists; callers treat that as "no audio
/// produced", not a session failure.
pub fn extract_pcm_from_wav(bytes: &[u8]) -> Vec<u8> {
    let Some(tag_pos) = bytes.windows(4).position(|window| window == DATA_TAG) else {
        tracing::warn!(len = bytes.len(), "no data subchunk in WAV payload");
        return Vec::new();
    };

    let payload_start = tag_pos + 4 + 4;
    if payload_start > bytes.len() {
        tracing::warn!("WAV data subchunk truncated before payload");
        return Vec::new();
    }

    bytes[payload_start..].to_vec()
}

/// Does this payload look like a RIFF/WAV container?
pub fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && &bytes[..4] == b"RIFF"
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal WAV: RIFF header, fmt subchunk, data subchunk.
    fn synthetic_wav(payload: &[u8]) -> Vec<u8> {
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&(36 + payload.len() as u32).to_le_bytes());
        wav.extend_from_slice(b"WAVE");
        wav.extend_from_slice(b"fmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&[0u8; 16]);
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        wav.extend_from_slice(payload);
        wav
    }

    #[test]
    fn test_extracts_exact_payload() {
        let payload: Vec<u8> = (0..=255).collect();
        let wav = synthetic_wav(&payload);
        assert_eq!(extract_pcm_from_wav(&wav), payload);
    }

    #[test]
    fn test_missing_data_tag_is_empty() {
        assert!(extract_pcm_from_wav(b"RIFF....WAVEfmt ").is_empty());
        assert!(extract_pcm_from_wav(&[]).is_empty());
    }

    #[test]
    fn test_truncated_after_tag_is_empty() {
        // Tag present but the length field runs off the end.
        assert!(extract_pcm_from_wav(b"RIFFdata\x04\x00").is_empty());
    }

    #[test]
    fn test_is_wav() {
        assert!(is_wav(&synthetic_wav(&[1, 2, 3])));
        assert!(!is_wav(b"\x00\x01\x02\x03"));
        assert!(!is_wav(b"RI"));
    }
}
