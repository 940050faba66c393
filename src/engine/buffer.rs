//! Audio Buffer Management
//!
//! Provides the block buffer type shared by both rendering back-ends and the
//! negotiated stream format. Samples are processed as non-interleaved 32-bit
//! float at the source's native sample rate.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VoiceFxError};

// ============================================================================
// Constants
// ============================================================================

/// Lowest sample rate the graph will run at
pub const MIN_SAMPLE_RATE: u32 = 8_000;

/// Highest sample rate the graph will run at
pub const MAX_SAMPLE_RATE: u32 = 192_000;

/// Default block capacity for offline rendering (frames)
pub const DEFAULT_BLOCK_CAPACITY: usize = 4096;

/// Largest block capacity the manual rendering mode accepts (frames)
pub const MAX_BLOCK_CAPACITY: usize = 65_536;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert linear amplitude to decibels
///
/// Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Calculate the RMS level of an audio buffer in dB
pub fn calculate_rms(buffer: &AudioBuffer) -> f32 {
    let total_samples = buffer.num_channels() * buffer.len();
    if total_samples == 0 {
        return f32::NEG_INFINITY;
    }

    let sum_squares: f64 = buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| (s as f64) * (s as f64))
        .sum();

    let rms = (sum_squares / total_samples as f64).sqrt() as f32;
    linear_to_db(rms)
}

/// Calculate the peak level of an audio buffer in dB
pub fn calculate_peak(buffer: &AudioBuffer) -> f32 {
    let peak = buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| s.abs())
        .fold(0.0_f32, f32::max);

    linear_to_db(peak)
}

// ============================================================================
// Channel Layout
// ============================================================================

/// Audio channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChannelLayout {
    /// Single channel (mono)
    Mono,
    /// Two channels (stereo: left, right)
    #[default]
    Stereo,
}

impl ChannelLayout {
    /// Returns the number of channels for this layout
    pub fn num_channels(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    /// Create a ChannelLayout from a channel count
    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(ChannelLayout::Mono),
            2 => Some(ChannelLayout::Stereo),
            _ => None,
        }
    }
}

// ============================================================================
// Stream Format
// ============================================================================

/// How samples are encoded in the source/destination asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleEncoding {
    /// Signed integer PCM
    Int,
    /// IEEE float PCM
    Float,
}

/// Format negotiated between source, graph and output asset
///
/// The offline render inherits this from the source so the rendered asset
/// has the same sample rate, channel layout and bit depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub layout: ChannelLayout,
    pub bits_per_sample: u16,
    pub encoding: SampleEncoding,
}

impl AudioFormat {
    /// 16-bit integer PCM at the given rate and layout
    pub fn pcm16(sample_rate: u32, layout: ChannelLayout) -> Self {
        Self {
            sample_rate,
            layout,
            bits_per_sample: 16,
            encoding: SampleEncoding::Int,
        }
    }

    /// 32-bit float PCM at the given rate and layout
    pub fn float32(sample_rate: u32, layout: ChannelLayout) -> Self {
        Self {
            sample_rate,
            layout,
            bits_per_sample: 32,
            encoding: SampleEncoding::Float,
        }
    }

    /// Number of interleaved channels
    pub fn channels(&self) -> usize {
        self.layout.num_channels()
    }

    /// Check the format can be decoded and encoded by the asset layer
    ///
    /// Integer PCM is limited to 24 bits, the precision of the f32 graph, so
    /// a bypassed render stays sample-exact.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(VoiceFxError::UnsupportedFormat {
                format: "0 Hz sample rate".to_string(),
            });
        }
        match (self.encoding, self.bits_per_sample) {
            (SampleEncoding::Int, 8 | 16 | 24) | (SampleEncoding::Float, 32) => Ok(()),
            (encoding, bits) => Err(VoiceFxError::UnsupportedFormat {
                format: format!("{}-bit {:?} samples", bits, encoding),
            }),
        }
    }

    /// Duration in seconds of `frames` frames at this format's rate
    pub fn frames_to_secs(&self, frames: u64) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        frames as f64 / self.sample_rate as f64
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Hz {:?} {}-bit {:?}",
            self.sample_rate, self.layout, self.bits_per_sample, self.encoding
        )
    }
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Block buffer used to move audio through the graph
///
/// Stores audio as non-interleaved 32-bit floating point samples.
/// Each channel is a separate Vec<f32>; every channel has the same length,
/// which is the buffer's frame capacity.
///
/// # Example
/// ```
/// use voicefx::engine::{AudioBuffer, ChannelLayout};
///
/// let buffer = AudioBuffer::new(4096, ChannelLayout::Stereo, 44100);
/// assert_eq!(buffer.channels(), 2);
/// assert_eq!(buffer.len(), 4096);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a silent buffer with `num_frames` frames per channel
    pub fn new(num_frames: usize, layout: ChannelLayout, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_frames]; layout.num_channels()],
            sample_rate,
        }
    }

    /// Create a silent buffer sized for `num_frames` frames of `format`
    pub fn for_format(format: &AudioFormat, num_frames: usize) -> Self {
        Self::new(num_frames, format.layout, format.sample_rate)
    }

    /// Get the number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Alias for channels()
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels()
    }

    /// Get the number of frames per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer holds no frames
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Get the channel layout
    pub fn channel_layout(&self) -> Option<ChannelLayout> {
        ChannelLayout::from_count(self.channels())
    }

    /// Immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Mutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.samples[index]
    }

    /// Zero the first `frames` frames of every channel
    pub fn clear(&mut self, frames: usize) {
        for channel in &mut self.samples {
            let end = frames.min(channel.len());
            channel[..end].fill(0.0);
        }
    }

    /// Append the first `frames` frames of `block` to this buffer
    pub fn append_frames(&mut self, block: &AudioBuffer, frames: usize) {
        for (dst, src) in self.samples.iter_mut().zip(block.samples.iter()) {
            let end = frames.min(src.len());
            dst.extend_from_slice(&src[..end]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_new_buffer_is_silent() {
        let buffer = AudioBuffer::new(128, ChannelLayout::Mono, 44100);
        assert_eq!(buffer.channels(), 1);
        assert!(buffer.channel(0).iter().all(|&s| s == 0.0));
        assert_eq!(calculate_rms(&buffer), f32::NEG_INFINITY);
    }

    #[test]
    fn test_append_frames() {
        let mut block = AudioBuffer::new(4, ChannelLayout::Mono, 48000);
        block.channel_mut(0).copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        let mut collected = AudioBuffer::new(0, ChannelLayout::Mono, 48000);
        collected.append_frames(&block, 3);
        collected.append_frames(&block, 1);
        assert_eq!(collected.channel(0), &[1.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn test_format_validation() {
        assert!(AudioFormat::pcm16(44100, ChannelLayout::Mono).validate().is_ok());
        let mut format = AudioFormat::float32(48000, ChannelLayout::Stereo);
        format.bits_per_sample = 64;
        assert!(format.validate().is_err());
        assert_relative_eq!(
            AudioFormat::pcm16(44100, ChannelLayout::Mono).frames_to_secs(441_000),
            10.0
        );
    }

    #[test]
    fn test_int_pcm_deeper_than_graph_is_rejected() {
        let mut format = AudioFormat::pcm16(44100, ChannelLayout::Mono);
        format.bits_per_sample = 24;
        assert!(format.validate().is_ok());

        format.bits_per_sample = 32;
        let err = format.validate().unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_FORMAT");
        assert!(AudioFormat::float32(44100, ChannelLayout::Mono).validate().is_ok());
    }

    #[test]
    fn test_peak_of_full_scale() {
        let mut buffer = AudioBuffer::new(2, ChannelLayout::Mono, 48000);
        buffer.channel_mut(0)[1] = -1.0;
        assert_relative_eq!(calculate_peak(&buffer), 0.0);
    }
}
