//! Audio Engine Module
//!
//! Core audio engine including:
//! - Audio buffer and stream format types
//! - Asset I/O (block-wise WAV decoding and encoding)
//! - The graph engine state machine
//! - Live output devices

pub mod buffer;
pub mod graph;
pub mod io;
pub mod live;
pub mod state;

pub use buffer::{
    calculate_peak, calculate_rms, linear_to_db, AudioBuffer, AudioFormat, ChannelLayout,
    SampleEncoding, DEFAULT_BLOCK_CAPACITY, MAX_BLOCK_CAPACITY,
};
pub use graph::{AudioGraphEngine, DEFAULT_LIVE_BLOCK_FRAMES};
pub use io::{
    generate_stereo_test_tone, generate_test_tone, read_wav, write_wav, AssetInfo, AssetWriter,
    FrameSource, OutputFactory, SourceAsset, WavOutputFactory,
};
pub use live::{
    default_device, CaptureDevice, ClockedNullDevice, OutputDevice, OutputDeviceFactory,
};
#[cfg(feature = "device")]
pub use live::CpalDevice;
pub use state::{EngineState, RenderStatus};
