//! Audio frame types
//!
//! One `AudioFrame` is one transport-level chunk of audio. Frames are
//! immutable once produced; ownership moves from producer to consumer.

use serde::{Deserialize, Serialize};

/// Audio encoding of a frame payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AudioEncoding {
    /// G.711 μ-law, 8 bits per sample
    MuLaw,
    /// Linear PCM, 16 bits per sample, little-endian
    LinearPcm16,
}

impl AudioEncoding {
    /// Bytes per sample for this encoding
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            AudioEncoding::MuLaw => 1,
            AudioEncoding::LinearPcm16 => 2,
        }
    }
}

/// Sample rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleRate {
    Hz8000,
    Hz16000,
}

impl SampleRate {
    /// Rate in Hz
    pub fn as_hz(&self) -> u32 {
        match self {
            SampleRate::Hz8000 => 8000,
            SampleRate::Hz16000 => 16000,
        }
    }
}

/// Channel layout (this system is mono end to end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channels {
    Mono,
}

impl Channels {
    pub fn count(&self) -> u8 {
        1
    }
}

/// One transport-level chunk of audio
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw payload bytes in the declared encoding
    pub data: Vec<u8>,
    /// Payload encoding
    pub encoding: AudioEncoding,
    /// Sample rate
    pub sample_rate: SampleRate,
    /// Channel layout
    pub channels: Channels,
}

impl AudioFrame {
    /// Create a frame with explicit parameters
    pub fn new(data: Vec<u8>, encoding: AudioEncoding, sample_rate: SampleRate) -> Self {
        Self {
            data,
            encoding,
            sample_rate,
            channels: Channels::Mono,
        }
    }

    /// μ-law payload at telephony rate
    pub fn mulaw_8k(data: Vec<u8>) -> Self {
        Self::new(data, AudioEncoding::MuLaw, SampleRate::Hz8000)
    }

    /// 16-bit PCM payload at wideband rate
    pub fn pcm16_16k(data: Vec<u8>) -> Self {
        Self::new(data, AudioEncoding::LinearPcm16, SampleRate::Hz16000)
    }

    /// 16-bit PCM payload at telephony rate
    pub fn pcm16_8k(data: Vec<u8>) -> Self {
        Self::new(data, AudioEncoding::LinearPcm16, SampleRate::Hz8000)
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Is the payload empty?
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of samples in the payload
    pub fn sample_count(&self) -> usize {
        self.data.len() / self.encoding.bytes_per_sample()
    }

    /// Approximate duration of the frame in milliseconds
    pub fn duration_ms(&self) -> u64 {
        (self.sample_count() as u64 * 1000) / u64::from(self.sample_rate.as_hz())
    }
}
