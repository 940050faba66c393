//! Voice filters
//!
//! A filter is a named recipe that activates exactly one stage of the chain
//! (or none, for `Clear`).

use std::fmt;

use log::info;
use serde::{Deserialize, Serialize};

use crate::dsp::{DistortionPreset, EffectChain, Preset, ReverbPreset, StageKind};
use crate::error::Result;

/// Pitch offset of the DarthVader and Helium filters, in cents
pub const FILTER_PITCH_CENTS: f32 = 1000.0;

/// Wet/dry mix of the Alien and Cave filters, in percent
pub const FILTER_WET_DRY_MIX: f32 = 50.0;

/// User-facing voice filters
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum VoiceFilter {
    /// Pitch down 1000 cents
    DarthVader,
    /// Distortion at 50% with the CosmicInterference preset
    Alien,
    /// Pitch up 1000 cents
    Helium,
    /// Reverb at 50% with the Cathedral preset
    Cave,
    /// Everything bypassed
    Clear,
}

impl VoiceFilter {
    pub const ALL: [VoiceFilter; 5] = [
        VoiceFilter::DarthVader,
        VoiceFilter::Alien,
        VoiceFilter::Helium,
        VoiceFilter::Cave,
        VoiceFilter::Clear,
    ];

    /// The stage this filter turns on, if any
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            VoiceFilter::DarthVader | VoiceFilter::Helium => Some(StageKind::PitchShift),
            VoiceFilter::Alien => Some(StageKind::Distortion),
            VoiceFilter::Cave => Some(StageKind::Reverb),
            VoiceFilter::Clear => None,
        }
    }

    /// Intensity the filter sets on its stage
    pub fn intensity(&self) -> f32 {
        match self {
            VoiceFilter::DarthVader => -FILTER_PITCH_CENTS,
            VoiceFilter::Helium => FILTER_PITCH_CENTS,
            VoiceFilter::Alien | VoiceFilter::Cave => FILTER_WET_DRY_MIX,
            VoiceFilter::Clear => 0.0,
        }
    }

    /// Preset the filter loads, if any
    pub fn preset(&self) -> Option<Preset> {
        match self {
            VoiceFilter::Alien => Some(Preset::Distortion(DistortionPreset::CosmicInterference)),
            VoiceFilter::Cave => Some(Preset::Reverb(ReverbPreset::Cathedral)),
            _ => None,
        }
    }

    /// Reset the chain and activate this filter's stage
    ///
    /// The preset is loaded before the intensity so the first block that
    /// hears the stage already uses the right recipe.
    pub fn apply(&self, chain: &EffectChain) -> Result<()> {
        chain.bypass_all();
        if let Some(stage) = self.stage() {
            if let Some(preset) = self.preset() {
                chain.apply_preset(stage, preset)?;
            }
            chain.set_parameter(stage, self.intensity())?;
        }
        info!("Applied filter {}", self);
        Ok(())
    }

    /// Human readable description
    pub fn description(&self) -> String {
        match (self.stage(), self.preset()) {
            (Some(StageKind::PitchShift), _) => {
                format!("pitch shift {:+} cents", self.intensity())
            }
            (Some(stage), Some(Preset::Distortion(p))) => {
                format!("{} {}% ({})", stage, self.intensity(), p.display_name())
            }
            (Some(stage), Some(Preset::Reverb(p))) => {
                format!("{} {}% ({})", stage, self.intensity(), p.display_name())
            }
            _ => "no effect".to_string(),
        }
    }
}

impl fmt::Display for VoiceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceFilter::DarthVader => write!(f, "DarthVader"),
            VoiceFilter::Alien => write!(f, "Alien"),
            VoiceFilter::Helium => write!(f, "Helium"),
            VoiceFilter::Cave => write!(f, "Cave"),
            VoiceFilter::Clear => write!(f, "Clear"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(VoiceFilter::DarthVader, vec![StageKind::PitchShift] ; "darth vader")]
    #[test_case(VoiceFilter::Alien, vec![StageKind::Distortion] ; "alien")]
    #[test_case(VoiceFilter::Helium, vec![StageKind::PitchShift] ; "helium")]
    #[test_case(VoiceFilter::Cave, vec![StageKind::Reverb] ; "cave")]
    #[test_case(VoiceFilter::Clear, vec![] ; "clear")]
    fn test_filter_activates_one_stage(filter: VoiceFilter, expected: Vec<StageKind>) {
        let chain = EffectChain::new();
        VoiceFilter::Cave.apply(&chain).unwrap();
        filter.apply(&chain).unwrap();
        assert_eq!(chain.active_stages(), expected);
    }

    #[test]
    fn test_filter_values() {
        let chain = EffectChain::new();
        VoiceFilter::DarthVader.apply(&chain).unwrap();
        assert_eq!(chain.parameter(StageKind::PitchShift), -1000.0);

        VoiceFilter::Cave.apply(&chain).unwrap();
        assert_eq!(chain.parameter(StageKind::PitchShift), 0.0);
        assert_eq!(chain.parameter(StageKind::Reverb), 50.0);
        assert_eq!(
            chain.preset(StageKind::Reverb),
            Some(Preset::Reverb(ReverbPreset::Cathedral))
        );
    }

    #[test]
    fn test_filter_serde_names() {
        let json = serde_json::to_string(&VoiceFilter::DarthVader).unwrap();
        assert_eq!(json, "\"darth-vader\"");
        let parsed: VoiceFilter = serde_json::from_str("\"cave\"").unwrap();
        assert_eq!(parsed, VoiceFilter::Cave);
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(VoiceFilter::Helium.description(), "pitch shift +1000 cents");
        assert_eq!(VoiceFilter::Clear.description(), "no effect");
        assert_eq!(
            VoiceFilter::Alien.description(),
            "Distortion 50% (Cosmic Interference)"
        );
    }
}
