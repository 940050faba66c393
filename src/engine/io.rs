//! Audio asset I/O for VoiceFX
//!
//! Source assets are decoded block by block (the graph never holds a whole
//! file in memory) and rendered assets are written block by block through an
//! [`AssetWriter`]. WAV is the container on both sides.
//!
//! Integer PCM up to 24 bits is scaled symmetrically on the way in and out
//! (`v / 2^(n-1)` and `round(x * 2^(n-1))`), so a file that passes through an
//! all-bypassed graph is written back sample-for-sample.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::engine::buffer::{AudioBuffer, AudioFormat, ChannelLayout, SampleEncoding};
use crate::error::{Result, VoiceFxError};

// ============================================================================
// Format negotiation
// ============================================================================

impl AudioFormat {
    /// Negotiate a graph format from a WAV header
    ///
    /// # Errors
    /// * `UnsupportedFormat` - no channels, more than 2 channels, or an
    ///   encoding the asset layer cannot decode
    pub fn from_wav_spec(spec: &WavSpec) -> Result<Self> {
        let layout = ChannelLayout::from_count(spec.channels as usize).ok_or_else(|| {
            VoiceFxError::UnsupportedFormat {
                format: format!(
                    "{}-channel audio (only mono/stereo supported)",
                    spec.channels
                ),
            }
        })?;

        let format = AudioFormat {
            sample_rate: spec.sample_rate,
            layout,
            bits_per_sample: spec.bits_per_sample,
            encoding: match spec.sample_format {
                SampleFormat::Int => SampleEncoding::Int,
                SampleFormat::Float => SampleEncoding::Float,
            },
        };
        format.validate()?;
        Ok(format)
    }

    /// WAV header that reproduces this format
    pub fn to_wav_spec(&self) -> WavSpec {
        WavSpec {
            channels: self.layout.num_channels() as u16,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: match self.encoding {
                SampleEncoding::Int => SampleFormat::Int,
                SampleEncoding::Float => SampleFormat::Float,
            },
        }
    }
}

/// Full-scale value for an integer bit depth
#[inline]
fn int_scale(bits: u16) -> f32 {
    (1_u64 << (bits - 1)) as f32
}

// ============================================================================
// Source assets
// ============================================================================

/// A decodable audio stream feeding the graph's player node
///
/// `read_frames` follows `std::io::Read` conventions: `Ok(0)` means the
/// stream is exhausted, an error of kind `Interrupted` or `WouldBlock` means
/// the stream could not deliver right now and may be retried, any other
/// error is fatal.
pub trait FrameSource: Send {
    /// Native format of the stream
    fn format(&self) -> AudioFormat;

    /// Declared length of the stream in frames
    fn total_frames(&self) -> u64;

    /// Decode up to `frames` frames into the start of `out`
    fn read_frames(&mut self, out: &mut AudioBuffer, frames: usize) -> std::io::Result<usize>;
}

/// Handle to the audio a session works on
#[derive(Debug, Clone, PartialEq)]
pub enum SourceAsset {
    /// WAV file on disk
    File(PathBuf),
    /// Audio already decoded into memory
    Memory(Arc<AudioBuffer>),
}

/// Format and length of a source asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub format: AudioFormat,
    pub total_frames: u64,
}

impl AssetInfo {
    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.format.frames_to_secs(self.total_frames)
    }
}

impl SourceAsset {
    /// Source backed by a WAV file
    pub fn file(path: impl Into<PathBuf>) -> Self {
        SourceAsset::File(path.into())
    }

    /// Source backed by an in-memory buffer
    pub fn memory(buffer: AudioBuffer) -> Self {
        SourceAsset::Memory(Arc::new(buffer))
    }

    /// Path of the backing file, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            SourceAsset::File(path) => Some(path),
            SourceAsset::Memory(_) => None,
        }
    }

    /// Read the format and length without decoding any audio
    pub fn probe(&self) -> Result<AssetInfo> {
        let source = self.open()?;
        Ok(AssetInfo {
            format: source.format(),
            total_frames: source.total_frames(),
        })
    }

    /// Open a fresh decoder positioned at the first frame
    ///
    /// # Errors
    /// * `FileNotFound` - the file does not exist
    /// * `UnsupportedFormat` - the file has no decodable audio track
    pub fn open(&self) -> Result<Box<dyn FrameSource>> {
        match self {
            SourceAsset::File(path) => Ok(Box::new(WavSource::open(path)?)),
            SourceAsset::Memory(buffer) => Ok(Box::new(MemorySource::new(Arc::clone(buffer))?)),
        }
    }
}

impl std::fmt::Display for SourceAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceAsset::File(path) => write!(f, "{}", path.display()),
            SourceAsset::Memory(buffer) => write!(f, "<memory: {} frames>", buffer.len()),
        }
    }
}

/// Streaming WAV decoder
pub struct WavSource {
    reader: WavReader<BufReader<File>>,
    format: AudioFormat,
    total_frames: u64,
    scratch: Vec<f32>,
    /// The data chunk ended early; nothing more will be decoded
    truncated: bool,
}

impl WavSource {
    /// Open a WAV file for block-wise decoding
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(VoiceFxError::FileNotFound {
                path: path.display().to_string(),
                source: None,
            });
        }

        let reader = WavReader::open(path).map_err(|e| VoiceFxError::UnsupportedFormat {
            format: format!("{}: no decodable audio track ({})", path.display(), e),
        })?;
        let format = AudioFormat::from_wav_spec(&reader.spec())?;
        let total_frames = reader.duration() as u64;

        Ok(Self {
            reader,
            format,
            total_frames,
            scratch: Vec::new(),
            truncated: false,
        })
    }

    fn read_interleaved(&mut self, wanted: usize) -> std::io::Result<()> {
        self.scratch.clear();
        if self.truncated {
            return Ok(());
        }

        let scratch = &mut self.scratch;
        let decoded = match (self.format.encoding, self.format.bits_per_sample) {
            (SampleEncoding::Float, _) => {
                decode_samples::<f32>(&mut self.reader, scratch, wanted, 1.0)
            }
            (SampleEncoding::Int, 8) => {
                decode_samples::<i8>(&mut self.reader, scratch, wanted, int_scale(8))
            }
            (SampleEncoding::Int, 16) => {
                decode_samples::<i16>(&mut self.reader, scratch, wanted, int_scale(16))
            }
            // 24-bit is read as i32 by hound
            (SampleEncoding::Int, bits) => {
                decode_samples::<i32>(&mut self.reader, scratch, wanted, int_scale(bits))
            }
        };

        match decoded {
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                warn!(
                    "WAV data ends before the {} frames its header declares",
                    self.total_frames
                );
                self.truncated = true;
                Ok(())
            }
            other => other,
        }
    }
}

/// Append up to `wanted` samples to `out`, divided by `scale`
///
/// Samples decoded before an error stay in `out`.
fn decode_samples<S>(
    reader: &mut WavReader<BufReader<File>>,
    out: &mut Vec<f32>,
    wanted: usize,
    scale: f32,
) -> std::io::Result<()>
where
    S: hound::Sample + Into<f64>,
{
    let scale = scale as f64;
    for sample in reader.samples::<S>().take(wanted) {
        let value: f64 = sample.map_err(hound_to_io)?.into();
        out.push((value / scale) as f32);
    }
    Ok(())
}

impl FrameSource for WavSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn total_frames(&self) -> u64 {
        self.total_frames
    }

    fn read_frames(&mut self, out: &mut AudioBuffer, frames: usize) -> std::io::Result<usize> {
        let channels = self.format.channels();
        let frames = frames.min(out.len());
        self.read_interleaved(frames * channels)?;

        // A truncated trailing frame is dropped
        let produced = self.scratch.len() / channels;
        for (i, frame) in self.scratch.chunks_exact(channels).enumerate() {
            for (ch, &sample) in frame.iter().enumerate() {
                out.samples[ch][i] = sample;
            }
        }
        Ok(produced)
    }
}

fn hound_to_io(err: hound::Error) -> std::io::Error {
    match err {
        hound::Error::IoError(e) => e,
        other => std::io::Error::new(std::io::ErrorKind::InvalidData, other.to_string()),
    }
}

/// Decoder over an in-memory buffer
pub struct MemorySource {
    buffer: Arc<AudioBuffer>,
    format: AudioFormat,
    position: usize,
}

impl MemorySource {
    /// Wrap a decoded buffer; its format is reported as 32-bit float
    pub fn new(buffer: Arc<AudioBuffer>) -> Result<Self> {
        let layout = buffer
            .channel_layout()
            .ok_or_else(|| VoiceFxError::UnsupportedFormat {
                format: format!("{}-channel audio", buffer.channels()),
            })?;
        let format = AudioFormat::float32(buffer.sample_rate, layout);
        format.validate()?;
        Ok(Self {
            buffer,
            format,
            position: 0,
        })
    }
}

impl FrameSource for MemorySource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn total_frames(&self) -> u64 {
        self.buffer.len() as u64
    }

    fn read_frames(&mut self, out: &mut AudioBuffer, frames: usize) -> std::io::Result<usize> {
        let available = self.buffer.len() - self.position;
        let frames = frames.min(available).min(out.len());
        for (dst, src) in out.samples.iter_mut().zip(self.buffer.samples.iter()) {
            dst[..frames].copy_from_slice(&src[self.position..self.position + frames]);
        }
        self.position += frames;
        Ok(frames)
    }
}

// ============================================================================
// Output assets
// ============================================================================

/// Block-wise writer for a rendered asset
pub trait AssetWriter: Send {
    /// Destination of the asset
    fn path(&self) -> &Path;

    /// Append the first `frames` frames of `block`
    ///
    /// # Errors
    /// * `WriteFailure` - the frames could not be written
    fn write_block(&mut self, block: &AudioBuffer, frames: usize) -> Result<()>;

    /// Flush and close the asset
    fn finalize(self: Box<Self>) -> Result<()>;
}

/// Creates writers for rendered assets
pub trait OutputFactory: Send + Sync {
    /// Create a writer at `path` with `format`
    ///
    /// # Errors
    /// * `OutputCreateFailure` - the destination cannot be created
    fn create(&self, path: &Path, format: &AudioFormat) -> Result<Box<dyn AssetWriter>>;
}

/// Writes rendered assets as WAV files
#[derive(Debug, Clone, Copy, Default)]
pub struct WavOutputFactory;

impl OutputFactory for WavOutputFactory {
    fn create(&self, path: &Path, format: &AudioFormat) -> Result<Box<dyn AssetWriter>> {
        Ok(Box::new(WavAssetWriter::create(path, format)?))
    }
}

/// WAV implementation of [`AssetWriter`]
pub struct WavAssetWriter {
    writer: WavWriter<BufWriter<File>>,
    path: PathBuf,
    format: AudioFormat,
}

impl WavAssetWriter {
    /// Create (or truncate) a WAV file for writing
    pub fn create(path: &Path, format: &AudioFormat) -> Result<Self> {
        format.validate()?;
        let writer = WavWriter::create(path, format.to_wav_spec()).map_err(|e| {
            VoiceFxError::OutputCreateFailure {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            format: *format,
        })
    }

    fn write_failure(&self, err: hound::Error) -> VoiceFxError {
        VoiceFxError::WriteFailure {
            path: self.path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

impl AssetWriter for WavAssetWriter {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write_block(&mut self, block: &AudioBuffer, frames: usize) -> Result<()> {
        let frames = frames.min(block.len());
        let bits = self.format.bits_per_sample;
        for frame in 0..frames {
            for channel in &block.samples {
                let sample = channel[frame];
                let written = match self.format.encoding {
                    SampleEncoding::Float => self.writer.write_sample(sample),
                    SampleEncoding::Int => {
                        let scale = int_scale(bits) as f64;
                        let value = (sample as f64 * scale).round().clamp(-scale, scale - 1.0);
                        if bits == 8 {
                            self.writer.write_sample(value as i8)
                        } else if bits == 16 {
                            self.writer.write_sample(value as i16)
                        } else {
                            self.writer.write_sample(value as i32)
                        }
                    }
                };
                written.map_err(|e| self.write_failure(e))?;
            }
        }
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<()> {
        let this = *self;
        let path = this.path.display().to_string();
        this.writer
            .finalize()
            .map_err(|e| VoiceFxError::WriteFailure {
                path,
                reason: e.to_string(),
            })
    }
}

// ============================================================================
// Whole-file helpers
// ============================================================================

/// Decode a whole WAV file into memory
pub fn read_wav(path: &Path) -> Result<(AudioBuffer, AudioFormat)> {
    let mut source = WavSource::open(path)?;
    let format = source.format();
    let total = source.total_frames() as usize;
    let mut buffer = AudioBuffer::for_format(&format, total);
    let mut filled = 0;
    let mut block = AudioBuffer::for_format(&format, 4096);

    loop {
        let read = source.read_frames(&mut block, 4096)?;
        if read == 0 {
            break;
        }
        let end = (filled + read).min(total);
        for (dst, src) in buffer.samples.iter_mut().zip(block.samples.iter()) {
            dst[filled..end].copy_from_slice(&src[..end - filled]);
        }
        filled = end;
    }

    for channel in &mut buffer.samples {
        channel.truncate(filled);
    }
    Ok((buffer, format))
}

/// Write a whole buffer to a WAV file in `format`
pub fn write_wav(buffer: &AudioBuffer, path: &Path, format: &AudioFormat) -> Result<()> {
    let mut writer = Box::new(WavAssetWriter::create(path, format)?);
    writer.write_block(buffer, buffer.len())?;
    writer.finalize()
}

/// Generate a mono sine tone
pub fn generate_test_tone(frequency: f32, duration_secs: f32, sample_rate: u32) -> AudioBuffer {
    let num_frames = (duration_secs as f64 * sample_rate as f64).round() as usize;
    let mut buffer = AudioBuffer::new(num_frames, ChannelLayout::Mono, sample_rate);

    let angular_freq = 2.0 * std::f64::consts::PI * frequency as f64 / sample_rate as f64;
    for (i, sample) in buffer.samples[0].iter_mut().enumerate() {
        *sample = (0.5 * (angular_freq * i as f64).sin()) as f32;
    }

    buffer
}

/// Generate a stereo tone with a different frequency per channel
pub fn generate_stereo_test_tone(
    freq_left: f32,
    freq_right: f32,
    duration_secs: f32,
    sample_rate: u32,
) -> AudioBuffer {
    let left = generate_test_tone(freq_left, duration_secs, sample_rate);
    let right = generate_test_tone(freq_right, duration_secs, sample_rate);
    AudioBuffer {
        samples: vec![left.samples[0].clone(), right.samples[0].clone()],
        sample_rate,
    }
}
