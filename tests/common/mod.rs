//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use voicefx::engine::io::{generate_stereo_test_tone, generate_test_tone, write_wav};
use voicefx::engine::{
    AssetWriter, AudioBuffer, AudioFormat, ChannelLayout, OutputFactory, WavOutputFactory,
};
use voicefx::{Result, VoiceFxError};

/// Write a 16-bit sine fixture and return its path
pub fn write_tone(dir: &Path, name: &str, secs: f32, layout: ChannelLayout) -> PathBuf {
    let path = dir.join(name);
    let tone = match layout {
        ChannelLayout::Mono => generate_test_tone(220.0, secs, 44100),
        ChannelLayout::Stereo => generate_stereo_test_tone(220.0, 330.0, secs, 44100),
    };
    write_wav(&tone, &path, &AudioFormat::pcm16(44100, layout)).unwrap();
    path
}

/// WAV output that fails on the `fail_at`-th block (1-based) and can slow
/// every write down
pub struct FaultyOutput {
    pub fail_at: Option<usize>,
    pub delay: Duration,
    pub blocks_written: Arc<AtomicUsize>,
}

impl FaultyOutput {
    pub fn failing_at(block: usize) -> Self {
        Self {
            fail_at: Some(block),
            delay: Duration::ZERO,
            blocks_written: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            fail_at: None,
            delay,
            blocks_written: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl OutputFactory for FaultyOutput {
    fn create(&self, path: &Path, format: &AudioFormat) -> Result<Box<dyn AssetWriter>> {
        Ok(Box::new(FaultyWriter {
            inner: WavOutputFactory.create(path, format)?,
            fail_at: self.fail_at,
            delay: self.delay,
            blocks_written: Arc::clone(&self.blocks_written),
        }))
    }
}

struct FaultyWriter {
    inner: Box<dyn AssetWriter>,
    fail_at: Option<usize>,
    delay: Duration,
    blocks_written: Arc<AtomicUsize>,
}

impl AssetWriter for FaultyWriter {
    fn path(&self) -> &Path {
        self.inner.path()
    }

    fn write_block(&mut self, block: &AudioBuffer, frames: usize) -> Result<()> {
        let index = self.blocks_written.fetch_add(1, Ordering::SeqCst) + 1;
        if Some(index) == self.fail_at {
            return Err(VoiceFxError::WriteFailure {
                path: self.path().display().to_string(),
                reason: "disk full".to_string(),
            });
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.inner.write_block(block, frames)
    }

    fn finalize(self: Box<Self>) -> Result<()> {
        self.inner.finalize()
    }
}
