//! Voice effect DSP
//!
//! The three transforms of the chain and the parameter plumbing around them.
//! All effects implement the `Effect` trait for uniform processing.

mod chain;
mod distortion;
mod effect;
mod pitch;
mod reverb;
mod stage;

pub use chain::{ChainSnapshot, EffectChain, ProcessorChain, StageSnapshot};
pub use distortion::{Distortion, DistortionPreset, DistortionRecipe, Shaper};
pub use effect::Effect;
pub use pitch::{cents_to_ratio, PitchShifter};
pub use reverb::{Reverb, ReverbPreset, RoomParams};
pub use stage::{
    EffectStage, Preset, StageKind, StageSettings, MAX_WET_DRY_MIX, PITCH_RANGE_CENTS,
};
