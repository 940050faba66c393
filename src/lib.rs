//! VoiceFX - Voice Filters for Video Soundtracks
//!
//! VoiceFX alters the audio track of a short video with a small set of voice
//! filters and muxes the result back with the original picture.
//!
//! # Architecture
//!
//! - `dsp`: the fixed effect chain (PitchShift → Distortion → Reverb) and
//!   its lock-free stage parameters
//! - `engine`: block buffers, WAV assets and the graph engine with its live
//!   (device-clocked) and offline (manually pumped) modes
//! - `render`: deterministic offline rendering to a new audio asset
//! - `session`: preview, filter switching, export and sharing for one video

pub mod cli;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod filter;
pub mod media;
pub mod render;
pub mod session;

pub use config::SessionConfig;
pub use error::{Result, VoiceFxError};
pub use filter::VoiceFilter;
pub use render::{CancelToken, OfflineRenderer, RenderJob, RenderedAsset};
pub use session::{SessionController, SessionEvent, ViewInput};
