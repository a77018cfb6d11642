//! 16-bit PCM byte packing
//!
//! All 16-bit samples in this system are little-endian.

/// Unpack little-endian 16-bit PCM bytes into samples.
///
/// An odd trailing byte cannot be half a sample; it is truncated
/// deterministically and logged rather than failing the hot audio path.
pub fn pcm16_from_bytes(bytes: &[u8]) -> Vec<i16> {
    if bytes.len() % 2 != 0 {
        tracing::warn!(
            len = bytes.len(),
            "odd PCM16 byte count, truncating trailing byte"
        );
    }
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Pack samples into little-endian 16-bit PCM bytes.
pub fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let samples = vec![0i16, 1, -1, i16::MAX, i16::MIN, 12345];
        let bytes = pcm16_to_bytes(&samples);
        assert_eq!(pcm16_from_bytes(&bytes), samples);
    }

    #[test]
    fn test_odd_byte_count_truncates() {
        let samples = pcm16_from_bytes(&[0x34, 0x12, 0xFF]);
        assert_eq!(samples, vec![0x1234]);
    }

    #[test]
    fn test_little_endian() {
        assert_eq!(pcm16_from_bytes(&[0x01, 0x00]), vec![1]);
        assert_eq!(pcm16_to_bytes(&[1]), vec![0x01, 0x00]);
    }
}
