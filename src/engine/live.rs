//! Live output devices
//!
//! The live producer thread pulls blocks through the graph and hands them to
//! an [`OutputDevice`]. `write` blocks until the device can take more audio,
//! so the device clocks the producer.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::debug;

use crate::engine::buffer::{AudioBuffer, AudioFormat};
use crate::error::Result;

/// Sink of the live graph
pub trait OutputDevice: Send {
    /// Play the first `frames` frames of `block`, blocking while the device
    /// is full
    fn write(&mut self, block: &AudioBuffer, frames: usize) -> Result<()>;

    /// Release the device
    fn close(&mut self) {}
}

/// Opens output devices for a stream format
pub trait OutputDeviceFactory: Send + Sync {
    /// Open a device that plays `format`
    ///
    /// # Errors
    /// * `EngineStartFailure` - no device can play this format
    fn open(&self, format: &AudioFormat) -> Result<Box<dyn OutputDevice>>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

// ============================================================================
// Null device
// ============================================================================

/// Discards audio at real-time pace
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockedNullDevice;

impl OutputDeviceFactory for ClockedNullDevice {
    fn open(&self, format: &AudioFormat) -> Result<Box<dyn OutputDevice>> {
        Ok(Box::new(NullSink {
            sample_rate: format.sample_rate,
            started: None,
            frames_written: 0,
        }))
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

struct NullSink {
    sample_rate: u32,
    started: Option<Instant>,
    frames_written: u64,
}

impl OutputDevice for NullSink {
    fn write(&mut self, _block: &AudioBuffer, frames: usize) -> Result<()> {
        let started = *self.started.get_or_insert_with(Instant::now);
        self.frames_written += frames as u64;

        // Sleep to an absolute deadline so block overheads do not accumulate
        let deadline =
            started + Duration::from_secs_f64(self.frames_written as f64 / self.sample_rate as f64);
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        Ok(())
    }

    fn close(&mut self) {
        // A resumed stream restarts the clock
        self.started = None;
        self.frames_written = 0;
    }
}

// ============================================================================
// Capture device
// ============================================================================

/// Records everything the live graph plays, as fast as it is produced
#[derive(Debug, Clone, Default)]
pub struct CaptureDevice {
    captured: Arc<Mutex<Option<AudioBuffer>>>,
}

impl CaptureDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written since the last `clear`
    pub fn captured(&self) -> Option<AudioBuffer> {
        let guard = self.captured.lock().unwrap_or_else(|e| e.into_inner());
        guard.clone()
    }

    /// Number of frames captured
    pub fn captured_frames(&self) -> usize {
        let guard = self.captured.lock().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().map_or(0, |b| b.len())
    }

    pub fn clear(&self) {
        let mut guard = self.captured.lock().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }
}

impl OutputDeviceFactory for CaptureDevice {
    fn open(&self, format: &AudioFormat) -> Result<Box<dyn OutputDevice>> {
        let mut guard = self.captured.lock().unwrap_or_else(|e| e.into_inner());
        let matches = guard
            .as_ref()
            .is_some_and(|b| b.channels() == format.channels() && b.sample_rate == format.sample_rate);
        if !matches {
            *guard = Some(AudioBuffer::for_format(format, 0));
        }
        Ok(Box::new(CaptureSink {
            captured: Arc::clone(&self.captured),
        }))
    }

    fn name(&self) -> &'static str {
        "capture"
    }
}

struct CaptureSink {
    captured: Arc<Mutex<Option<AudioBuffer>>>,
}

impl OutputDevice for CaptureSink {
    fn write(&mut self, block: &AudioBuffer, frames: usize) -> Result<()> {
        let mut guard = self.captured.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(buffer) = guard.as_mut() {
            buffer.append_frames(block, frames);
        }
        Ok(())
    }
}

// ============================================================================
// Hardware device (cpal)
// ============================================================================

#[cfg(feature = "device")]
pub use self::hardware::CpalDevice;

#[cfg(feature = "device")]
mod hardware {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread::JoinHandle;
    use std::time::Duration;

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use log::{error, info};

    use super::{OutputDevice, OutputDeviceFactory};
    use crate::engine::buffer::{AudioBuffer, AudioFormat};
    use crate::error::{Result, VoiceFxError};

    /// Ring size in seconds of audio
    const RING_SECONDS: f64 = 0.25;

    /// Plays through the default output device of the default host
    #[derive(Debug, Clone, Copy, Default)]
    pub struct CpalDevice;

    impl OutputDeviceFactory for CpalDevice {
        fn open(&self, format: &AudioFormat) -> Result<Box<dyn OutputDevice>> {
            let channels = format.channels();
            let capacity =
                ((format.sample_rate as f64 * RING_SECONDS) as usize).max(1024) * channels;
            let (producer, consumer) = rtrb::RingBuffer::<f32>::new(capacity);

            let running = Arc::new(AtomicBool::new(true));
            let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
            let format = *format;
            let thread_running = Arc::clone(&running);

            // cpal streams are !Send, so the stream lives on its own thread
            let stream_thread = std::thread::Builder::new()
                .name("cpal-output".to_string())
                .spawn(move || run_stream(format, consumer, thread_running, ready_tx))
                .map_err(|e| VoiceFxError::EngineStartFailure {
                    reason: format!("cannot spawn output thread: {}", e),
                })?;

            match ready_rx.recv() {
                Ok(Ok(())) => Ok(Box::new(CpalSink {
                    producer,
                    running,
                    stream_thread: Some(stream_thread),
                })),
                Ok(Err(e)) => {
                    let _ = stream_thread.join();
                    Err(e)
                }
                Err(_) => {
                    let _ = stream_thread.join();
                    Err(VoiceFxError::EngineStartFailure {
                        reason: "output thread exited during startup".to_string(),
                    })
                }
            }
        }

        fn name(&self) -> &'static str {
            "cpal"
        }
    }

    fn run_stream(
        format: AudioFormat,
        mut consumer: rtrb::Consumer<f32>,
        running: Arc<AtomicBool>,
        ready: mpsc::Sender<Result<()>>,
    ) {
        let start = || -> Result<cpal::Stream> {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| VoiceFxError::EngineStartFailure {
                    reason: "no default output device".to_string(),
                })?;
            let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            info!("Using audio device: {}", device_name);

            let config = cpal::StreamConfig {
                channels: format.channels() as u16,
                sample_rate: cpal::SampleRate(format.sample_rate),
                buffer_size: cpal::BufferSize::Default,
            };

            let stream = device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                        for sample in data.iter_mut() {
                            // Underruns play silence
                            *sample = consumer.pop().unwrap_or(0.0);
                        }
                    },
                    move |err| {
                        error!("Audio stream error: {}", err);
                    },
                    None,
                )
                .map_err(|e| VoiceFxError::EngineStartFailure {
                    reason: format!("cannot open output stream for {}: {}", format, e),
                })?;
            stream.play().map_err(|e| VoiceFxError::EngineStartFailure {
                reason: format!("cannot start output stream: {}", e),
            })?;
            Ok(stream)
        };

        let stream = match start() {
            Ok(stream) => {
                let _ = ready.send(Ok(()));
                stream
            }
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };

        while running.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(10));
        }
        drop(stream);
    }

    struct CpalSink {
        producer: rtrb::Producer<f32>,
        running: Arc<AtomicBool>,
        stream_thread: Option<JoinHandle<()>>,
    }

    impl OutputDevice for CpalSink {
        fn write(&mut self, block: &AudioBuffer, frames: usize) -> Result<()> {
            let frames = frames.min(block.len());
            for frame in 0..frames {
                for channel in &block.samples {
                    let mut sample = channel[frame];
                    loop {
                        match self.producer.push(sample) {
                            Ok(()) => break,
                            Err(rtrb::PushError::Full(value)) => {
                                sample = value;
                                std::thread::sleep(Duration::from_millis(1));
                            }
                        }
                    }
                }
            }
            Ok(())
        }

        fn close(&mut self) {
            self.running.store(false, Ordering::Release);
            if let Some(handle) = self.stream_thread.take() {
                let _ = handle.join();
            }
        }
    }

    impl Drop for CpalSink {
        fn drop(&mut self) {
            self.close();
        }
    }
}

/// Device factory used when none is configured
pub fn default_device() -> Arc<dyn OutputDeviceFactory> {
    #[cfg(feature = "device")]
    {
        debug!("Live preview plays through the default cpal output");
        Arc::new(CpalDevice)
    }
    #[cfg(not(feature = "device"))]
    {
        debug!("Built without the `device` feature; live preview uses the null device");
        Arc::new(ClockedNullDevice)
    }
}
