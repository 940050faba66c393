//! Distortion Effect
//!
//! Preset-driven distortion for voice: waveshaping saturation combined with
//! ring modulation, sample-rate decimation and bit reduction. The stage
//! intensity is the wet/dry mix in percent.

use serde::{Deserialize, Serialize};

use crate::dsp::effect::Effect;
use crate::dsp::stage::{Preset, StageSettings, MAX_WET_DRY_MIX};
use crate::engine::AudioBuffer;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
#[inline]
fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

// ============================================================================
// Waveshaping Functions
// ============================================================================

/// Waveshaper curves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shaper {
    /// Soft saturation with slight asymmetry, emulates magnetic tape
    Tape,
    /// Soft knee, emulates vacuum tube warmth
    Tube,
    /// Harder edge with odd harmonics
    Transistor,
    /// Digital clipping at full scale
    HardClip,
}

/// Tape saturation: tanh(x * (1 + drive * 4)) with asymmetry
#[inline]
fn waveshape_tape(x: f32, drive: f32) -> f32 {
    let gain = 1.0 + drive * 4.0;
    let shaped = (x * gain).tanh();
    let asymmetry = 0.1 * drive;
    shaped + asymmetry * shaped * shaped
}

/// Tube saturation: x / (1 + |x|^(1 + drive))
#[inline]
fn waveshape_tube(x: f32, drive: f32) -> f32 {
    let exp = 1.0 + drive;
    x / (1.0 + x.abs().powf(exp))
}

/// Transistor saturation: x * g / (1 + |x * g|)
#[inline]
fn waveshape_transistor(x: f32, drive: f32) -> f32 {
    let driven = x * (1.0 + drive * 3.0);
    driven / (1.0 + driven.abs())
}

/// Hard clip: amplify then clamp to -1..1
#[inline]
fn waveshape_hardclip(x: f32, drive: f32) -> f32 {
    (x * (1.0 + drive * 10.0)).clamp(-1.0, 1.0)
}

impl Shaper {
    #[inline]
    fn apply(&self, x: f32, drive: f32) -> f32 {
        match self {
            Shaper::Tape => waveshape_tape(x, drive),
            Shaper::Tube => waveshape_tube(x, drive),
            Shaper::Transistor => waveshape_transistor(x, drive),
            Shaper::HardClip => waveshape_hardclip(x, drive),
        }
    }
}

// ============================================================================
// Presets
// ============================================================================

/// Factory presets of the distortion stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DistortionPreset {
    /// Ring-modulated "alien" speech
    #[default]
    CosmicInterference,
    /// Band-limited, crunchy broadcast voice
    RadioTower,
    /// Overdriven, clipped small speaker
    BrokenSpeaker,
    /// Sample-rate and bit reduction
    Decimated,
    /// Slow amplitude wobble on saturated speech
    Waves,
}

/// Parameter recipe behind a preset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistortionRecipe {
    pub shaper: Shaper,
    pub drive: f32,
    /// Ring modulator carrier in Hz (0 = off)
    pub ring_mod_hz: f32,
    /// 0 = no modulation, 1 = full ring modulation
    pub ring_mod_depth: f32,
    /// Hold every sample this many frames (1 = off)
    pub decimation: u32,
    /// Quantize to this many bits (None = off)
    pub bit_depth: Option<u32>,
    pub output_gain_db: f32,
}

impl DistortionPreset {
    pub const ALL: [DistortionPreset; 5] = [
        DistortionPreset::CosmicInterference,
        DistortionPreset::RadioTower,
        DistortionPreset::BrokenSpeaker,
        DistortionPreset::Decimated,
        DistortionPreset::Waves,
    ];

    pub(crate) fn index(&self) -> u8 {
        match self {
            DistortionPreset::CosmicInterference => 0,
            DistortionPreset::RadioTower => 1,
            DistortionPreset::BrokenSpeaker => 2,
            DistortionPreset::Decimated => 3,
            DistortionPreset::Waves => 4,
        }
    }

    pub(crate) fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// The DSP settings this preset loads
    pub fn recipe(&self) -> DistortionRecipe {
        match self {
            DistortionPreset::CosmicInterference => DistortionRecipe {
                shaper: Shaper::Tape,
                drive: 0.4,
                ring_mod_hz: 280.0,
                ring_mod_depth: 0.85,
                decimation: 1,
                bit_depth: None,
                output_gain_db: -3.0,
            },
            DistortionPreset::RadioTower => DistortionRecipe {
                shaper: Shaper::Transistor,
                drive: 0.7,
                ring_mod_hz: 0.0,
                ring_mod_depth: 0.0,
                decimation: 2,
                bit_depth: Some(8),
                output_gain_db: -4.0,
            },
            DistortionPreset::BrokenSpeaker => DistortionRecipe {
                shaper: Shaper::HardClip,
                drive: 0.8,
                ring_mod_hz: 0.0,
                ring_mod_depth: 0.0,
                decimation: 1,
                bit_depth: None,
                output_gain_db: -9.0,
            },
            DistortionPreset::Decimated => DistortionRecipe {
                shaper: Shaper::Tube,
                drive: 0.3,
                ring_mod_hz: 0.0,
                ring_mod_depth: 0.0,
                decimation: 4,
                bit_depth: Some(6),
                output_gain_db: 0.0,
            },
            DistortionPreset::Waves => DistortionRecipe {
                shaper: Shaper::Tube,
                drive: 0.5,
                ring_mod_hz: 6.0,
                ring_mod_depth: 0.5,
                decimation: 1,
                bit_depth: None,
                output_gain_db: 0.0,
            },
        }
    }

    /// Get display name for the preset
    pub fn display_name(&self) -> &'static str {
        match self {
            DistortionPreset::CosmicInterference => "Cosmic Interference",
            DistortionPreset::RadioTower => "Radio Tower",
            DistortionPreset::BrokenSpeaker => "Broken Speaker",
            DistortionPreset::Decimated => "Decimated",
            DistortionPreset::Waves => "Waves",
        }
    }
}

// ============================================================================
// Distortion Effect
// ============================================================================

/// Preset-driven distortion
///
/// Signal path per sample: decimate → bit-reduce → waveshape → ring
/// modulate → output gain → dry/wet mix. The ring modulator's carrier phase
/// advances once per frame and is shared by both channels.
#[derive(Debug, Clone)]
pub struct Distortion {
    recipe: DistortionRecipe,
    /// Dry/wet mix (0.0 = dry, 1.0 = wet)
    mix: f32,
    output_gain_linear: f32,
    sample_rate: f32,
    carrier_phase: f32,
    hold_counter: u32,
    held: [f32; 2],
}

impl Distortion {
    /// Create a distortion loaded with `preset`, fully dry
    pub fn new(preset: DistortionPreset) -> Self {
        let recipe = preset.recipe();
        Self {
            recipe,
            mix: 0.0,
            output_gain_linear: db_to_linear(recipe.output_gain_db),
            sample_rate: 48000.0,
            carrier_phase: 0.0,
            hold_counter: 0,
            held: [0.0; 2],
        }
    }

    /// Load a preset without clearing state
    pub fn load_preset(&mut self, preset: DistortionPreset) {
        self.recipe = preset.recipe();
        self.output_gain_linear = db_to_linear(self.recipe.output_gain_db);
    }

    /// Set the dry/wet mix in percent (clamped to 0..100)
    pub fn set_wet_dry_mix(&mut self, percent: f32) {
        self.mix = percent.clamp(0.0, MAX_WET_DRY_MIX) / MAX_WET_DRY_MIX;
    }

    /// Current recipe
    pub fn recipe(&self) -> &DistortionRecipe {
        &self.recipe
    }

    #[inline]
    fn crush(&self, x: f32) -> f32 {
        match self.recipe.bit_depth {
            Some(bits) => {
                let steps = (1_u32 << (bits - 1)) as f32;
                (x * steps).round() / steps
            }
            None => x,
        }
    }
}

impl Default for Distortion {
    fn default() -> Self {
        Self::new(DistortionPreset::default())
    }
}

impl Effect for Distortion {
    fn process(&mut self, buffer: &mut AudioBuffer, frames: usize) {
        if self.mix < f32::EPSILON {
            return;
        }

        let dry_mix = 1.0 - self.mix;
        let wet_mix = self.mix;
        let channels = buffer.num_channels().min(2);
        let frames = frames.min(buffer.len());
        let phase_step = self.recipe.ring_mod_hz / self.sample_rate;
        let decimation = self.recipe.decimation.max(1);

        for frame in 0..frames {
            let refresh = self.hold_counter == 0;
            self.hold_counter = (self.hold_counter + 1) % decimation;

            let carrier = (2.0 * std::f32::consts::PI * self.carrier_phase).sin();
            let modulation = 1.0 - self.recipe.ring_mod_depth + self.recipe.ring_mod_depth * carrier;

            for ch in 0..channels {
                let dry = buffer.samples[ch][frame];
                if refresh {
                    self.held[ch] = dry;
                }
                let crushed = self.crush(self.held[ch]);
                let shaped = self.recipe.shaper.apply(crushed, self.recipe.drive);
                let wet = shaped * modulation * self.output_gain_linear;
                buffer.samples[ch][frame] = dry * dry_mix + wet * wet_mix;
            }

            self.carrier_phase = (self.carrier_phase + phase_step).fract();
        }
    }

    fn prepare(&mut self, sample_rate: u32, _max_block_size: usize) {
        self.sample_rate = sample_rate as f32;
        self.reset();
    }

    fn reset(&mut self) {
        self.carrier_phase = 0.0;
        self.hold_counter = 0;
        self.held = [0.0; 2];
    }

    fn apply_settings(&mut self, settings: StageSettings) {
        if let Some(Preset::Distortion(preset)) = settings.preset {
            if preset.recipe() != self.recipe {
                self.load_preset(preset);
            }
        }
        self.set_wet_dry_mix(settings.intensity);
    }

    fn effect_type(&self) -> &'static str {
        "distortion"
    }
}
