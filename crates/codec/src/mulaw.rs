//! ITU-T G.711 μ-law companding
//!
//! Uses the 14-bit segment table: magnitudes are scaled to the 13-bit
//! biased μ-law range and clipped at `CLIP = 8159` uniformly. The wider
//! 32635 clip seen in some 16-bit tables is the same ceiling expressed
//! in a different domain; mixing the two is a classic source of codec
//! bugs, so only the 8159 table exists here.
//!
//! μ-law is lossy: round trips land within the quantization step of the
//! sample's exponent band, never bit-exact.

/// Bias added before segment search (0x84 in the 16-bit domain)
const BIAS: i32 = 0x84;

/// Magnitude ceiling in the 14-bit μ-law domain
const CLIP: i32 = 8159;

/// Upper bound of each segment in the biased 14-bit domain
const SEG_END: [i32; 8] = [0x3F, 0x7F, 0xFF, 0x1FF, 0x3FF, 0x7FF, 0xFFF, 0x1FFF];

/// Encode one 16-bit linear sample to a μ-law byte.
pub fn linear_to_mulaw(sample: i16) -> u8 {
    let sign: u8 = if sample < 0 { 0x80 } else { 0x00 };

    // Scale to the 14-bit μ-law domain, clip, bias.
    let mut magnitude = i32::from(sample).abs() >> 2;
    if magnitude > CLIP {
        magnitude = CLIP;
    }
    magnitude += BIAS >> 2;

    // Minimal exponent whose segment holds the biased magnitude.
    let exponent = match SEG_END.iter().position(|&end| magnitude <= end) {
        Some(seg) => seg as i32,
        // Biased magnitude can exceed the last segment by one step at
        // full clip; that is the maximal code word.
        None => return !(sign | 0x7F),
    };

    let mantissa = ((magnitude >> (exponent + 1)) & 0x0F) as u8;
    !(sign | ((exponent as u8) << 4) | mantissa)
}

/// Decode one μ-law byte to a 16-bit linear sample.
pub fn mulaw_to_linear(byte: u8) -> i16 {
    let inverted = !byte;
    let sign = inverted & 0x80;
    let exponent = i32::from((inverted >> 4) & 0x07);
    let mantissa = i32::from(inverted & 0x0F);

    // Reconstruct the band midpoint, debiased back to the 16-bit domain.
    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;

    if sign != 0 {
        (-magnitude) as i16
    } else {
        magnitude as i16
    }
}

/// Decode a μ-law byte payload into 16-bit linear samples.
pub fn decode_mulaw(bytes: &[u8]) -> Vec<i16> {
    bytes.iter().map(|&b| mulaw_to_linear(b)).collect()
}

/// Encode 16-bit linear samples into a μ-law byte payload.
pub fn encode_mulaw(samples: &[i16]) -> Vec<u8> {
    samples.iter().map(|&s| linear_to_mulaw(s)).collect()
}
