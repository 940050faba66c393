//! Effect stages
//!
//! An [`EffectStage`] is the parameter half of a stage: its kind, intensity
//! and factory preset. The values live in atomics so the control context can
//! change them while a producer thread is rendering. The DSP half is an
//! [`Effect`](super::Effect) created fresh for each graph build.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::dsp::distortion::DistortionPreset;
use crate::dsp::reverb::ReverbPreset;
use crate::error::{Result, VoiceFxError};

/// Pitch shift range in cents
pub const PITCH_RANGE_CENTS: f32 = 2400.0;

/// Upper bound of the wet/dry mix in percent
pub const MAX_WET_DRY_MIX: f32 = 100.0;

/// The three transforms of the chain, in signal order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    PitchShift,
    Distortion,
    Reverb,
}

impl StageKind {
    /// Signal order from source to sink
    pub const ORDER: [StageKind; 3] = [
        StageKind::PitchShift,
        StageKind::Distortion,
        StageKind::Reverb,
    ];

    /// Position of the stage in the chain
    pub fn index(&self) -> usize {
        match self {
            StageKind::PitchShift => 0,
            StageKind::Distortion => 1,
            StageKind::Reverb => 2,
        }
    }

    /// Intensity value that leaves the signal untouched
    pub fn bypass_value(&self) -> f32 {
        0.0
    }

    /// Accepted intensity range (inclusive)
    pub fn intensity_range(&self) -> (f32, f32) {
        match self {
            StageKind::PitchShift => (-PITCH_RANGE_CENTS, PITCH_RANGE_CENTS),
            StageKind::Distortion | StageKind::Reverb => (0.0, MAX_WET_DRY_MIX),
        }
    }

    /// Unit the intensity is expressed in
    pub fn intensity_unit(&self) -> &'static str {
        match self {
            StageKind::PitchShift => "cents",
            StageKind::Distortion | StageKind::Reverb => "% wet",
        }
    }

    /// Whether the stage has discrete factory presets
    pub fn has_presets(&self) -> bool {
        !matches!(self, StageKind::PitchShift)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::PitchShift => write!(f, "PitchShift"),
            StageKind::Distortion => write!(f, "Distortion"),
            StageKind::Reverb => write!(f, "Reverb"),
        }
    }
}

/// A discrete factory preset for a stage that supports them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Preset {
    Distortion(DistortionPreset),
    Reverb(ReverbPreset),
}

impl Preset {
    /// The stage this preset belongs to
    pub fn stage(&self) -> StageKind {
        match self {
            Preset::Distortion(_) => StageKind::Distortion,
            Preset::Reverb(_) => StageKind::Reverb,
        }
    }

    fn index(&self) -> u8 {
        match self {
            Preset::Distortion(p) => p.index(),
            Preset::Reverb(p) => p.index(),
        }
    }

    fn from_index(stage: StageKind, index: u8) -> Option<Self> {
        match stage {
            StageKind::PitchShift => None,
            StageKind::Distortion => DistortionPreset::from_index(index).map(Preset::Distortion),
            StageKind::Reverb => ReverbPreset::from_index(index).map(Preset::Reverb),
        }
    }
}

/// Values an effect renders with, read once per block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageSettings {
    pub intensity: f32,
    pub preset: Option<Preset>,
}

impl StageSettings {
    /// True when the intensity is the stage's bypass value
    pub fn is_bypassed(&self) -> bool {
        self.intensity == 0.0
    }
}

/// Shared parameters of one stage
#[derive(Debug)]
pub struct EffectStage {
    kind: StageKind,
    /// f32 bits of the intensity
    intensity: AtomicU32,
    preset: AtomicU8,
}

impl EffectStage {
    /// Create a bypassed stage with its default preset
    pub fn new(kind: StageKind) -> Self {
        let preset = match kind {
            StageKind::PitchShift => 0,
            StageKind::Distortion => Preset::Distortion(DistortionPreset::default()).index(),
            StageKind::Reverb => Preset::Reverb(ReverbPreset::default()).index(),
        };
        Self {
            kind,
            intensity: AtomicU32::new(kind.bypass_value().to_bits()),
            preset: AtomicU8::new(preset),
        }
    }

    /// Which transform this stage is
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// Current intensity
    pub fn intensity(&self) -> f32 {
        f32::from_bits(self.intensity.load(Ordering::Relaxed))
    }

    /// Current preset (None for stages without presets)
    pub fn preset(&self) -> Option<Preset> {
        Preset::from_index(self.kind, self.preset.load(Ordering::Relaxed))
    }

    /// Whether the stage currently leaves audio untouched
    pub fn is_bypassed(&self) -> bool {
        self.intensity() == self.kind.bypass_value()
    }

    /// Snapshot of intensity and preset for one block
    pub fn settings(&self) -> StageSettings {
        StageSettings {
            intensity: self.intensity(),
            preset: self.preset(),
        }
    }

    /// Store a new intensity, returning true if it changed
    ///
    /// # Errors
    /// * `InvalidParameter` - value is NaN or outside the stage's range
    pub(crate) fn set_intensity(&self, value: f32) -> Result<bool> {
        let (min, max) = self.kind.intensity_range();
        if !value.is_finite() || value < min || value > max {
            return Err(VoiceFxError::InvalidParameter {
                param: format!("{} intensity", self.kind),
                value: value.to_string(),
                expected: format!("{} to {} {}", min, max, self.kind.intensity_unit()),
            });
        }
        // -0.0 and 0.0 are both bypass; store the canonical one
        let value = if value == 0.0 { 0.0 } else { value };
        let previous = self.intensity.swap(value.to_bits(), Ordering::Relaxed);
        Ok(previous != value.to_bits())
    }

    /// Store a new preset, returning true if it changed
    ///
    /// # Errors
    /// * `InvalidParameter` - the preset belongs to another stage
    pub(crate) fn set_preset(&self, preset: Preset) -> Result<bool> {
        if preset.stage() != self.kind {
            return Err(VoiceFxError::InvalidParameter {
                param: format!("{} preset", self.kind),
                value: format!("{:?}", preset),
                expected: format!("a {} preset", self.kind),
            });
        }
        let previous = self.preset.swap(preset.index(), Ordering::Relaxed);
        Ok(previous != preset.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stage_is_bypassed() {
        for kind in StageKind::ORDER {
            let stage = EffectStage::new(kind);
            assert!(stage.is_bypassed());
            assert_eq!(stage.preset().is_some(), kind.has_presets());
        }
    }

    #[test]
    fn test_intensity_range_is_enforced() {
        let pitch = EffectStage::new(StageKind::PitchShift);
        assert!(pitch.set_intensity(-1000.0).unwrap());
        assert!(!pitch.set_intensity(-1000.0).unwrap());
        assert!(pitch.set_intensity(2400.5).is_err());
        assert!(pitch.set_intensity(f32::NAN).is_err());

        let reverb = EffectStage::new(StageKind::Reverb);
        assert!(reverb.set_intensity(-1.0).is_err());
        assert!(reverb.set_intensity(100.0).is_ok());
    }

    #[test]
    fn test_preset_must_match_stage() {
        let distortion = EffectStage::new(StageKind::Distortion);
        let err = distortion
            .set_preset(Preset::Reverb(ReverbPreset::Cathedral))
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");

        distortion
            .set_preset(Preset::Distortion(DistortionPreset::CosmicInterference))
            .unwrap();
        assert_eq!(
            distortion.preset(),
            Some(Preset::Distortion(DistortionPreset::CosmicInterference))
        );
    }

    #[test]
    fn test_negative_zero_counts_as_bypass() {
        let pitch = EffectStage::new(StageKind::PitchShift);
        pitch.set_intensity(-0.0).unwrap();
        assert!(pitch.is_bypassed());
        assert_eq!(pitch.intensity().to_bits(), 0.0_f32.to_bits());
    }
}
