//! Wideband to narrowband decimation
//!
//! Known quality limitation: this is plain 2:1 decimation with no
//! anti-aliasing filter. Content above 4kHz folds back into the
//! narrowband signal. Telephony speech tolerates it and the zero-filter
//! path keeps per-chunk latency flat, which is the tradeoff this
//! gateway makes on purpose.

/// Downsample 16kHz samples to 8kHz by dropping every other sample.
pub fn resample_16k_to_8k(samples: &[i16]) -> Vec<i16> {
    samples.iter().copied().step_by(2).collect()
}
