//! Reverb effect implementation
//!
//! Implements the Freeverb algorithm:
//! - 8 parallel comb filters for early reflections
//! - 4 series allpass filters for diffusion
//! - Stereo width control
//! - Pre-delay buffer
//!
//! Room size, damping, width and pre-delay come from a factory preset; the
//! stage intensity is the wet/dry mix in percent.

use serde::{Deserialize, Serialize};

use crate::dsp::effect::Effect;
use crate::dsp::stage::{Preset, StageSettings, MAX_WET_DRY_MIX};
use crate::engine::AudioBuffer;

// ============================================================================
// Freeverb Constants
// ============================================================================

/// Reference sample rate for Freeverb delays
const REFERENCE_SAMPLE_RATE: f64 = 44100.0;

/// Comb filter delays at 44100 Hz (8 filters)
const COMB_DELAYS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];

/// Allpass filter delays at 44100 Hz (4 filters)
const ALLPASS_DELAYS: [usize; 4] = [556, 441, 341, 225];

/// Stereo spread offset in samples (for right channel)
const STEREO_SPREAD: usize = 23;

/// Fixed gain for allpass filters (standard Freeverb value)
const ALLPASS_GAIN: f32 = 0.5;

/// Input attenuation ahead of the comb bank
const FIXED_GAIN: f32 = 0.015;

/// Makeup gain applied to the wet signal
const WET_SCALE: f32 = 3.0;

/// Scale factor for room size parameter to feedback
const ROOM_SCALE: f32 = 0.28;

/// Offset for room size parameter to feedback
const ROOM_OFFSET: f32 = 0.7;

/// Scale factor for damping parameter
const DAMP_SCALE: f32 = 0.4;

/// Maximum pre-delay time in milliseconds
const MAX_PRE_DELAY_MS: f32 = 100.0;

// ============================================================================
// Presets
// ============================================================================

/// Factory presets of the reverb stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReverbPreset {
    SmallRoom,
    #[default]
    MediumHall,
    LargeHall,
    Cathedral,
    Plate,
}

/// Room parameters behind a preset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoomParams {
    /// Room size: 0 (tiny) to 1 (huge hall)
    pub room_size: f32,
    /// Damping: 0 (bright) to 1 (dark)
    pub damping: f32,
    /// Stereo width: 0 (mono) to 1 (full stereo)
    pub width: f32,
    /// Pre-delay in milliseconds: 0 to 100
    pub pre_delay_ms: f32,
}

impl ReverbPreset {
    pub const ALL: [ReverbPreset; 5] = [
        ReverbPreset::SmallRoom,
        ReverbPreset::MediumHall,
        ReverbPreset::LargeHall,
        ReverbPreset::Cathedral,
        ReverbPreset::Plate,
    ];

    pub(crate) fn index(&self) -> u8 {
        match self {
            ReverbPreset::SmallRoom => 0,
            ReverbPreset::MediumHall => 1,
            ReverbPreset::LargeHall => 2,
            ReverbPreset::Cathedral => 3,
            ReverbPreset::Plate => 4,
        }
    }

    pub(crate) fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Room parameters this preset loads
    pub fn room(&self) -> RoomParams {
        match self {
            ReverbPreset::SmallRoom => RoomParams {
                room_size: 0.3,
                damping: 0.6,
                width: 0.6,
                pre_delay_ms: 2.0,
            },
            ReverbPreset::MediumHall => RoomParams {
                room_size: 0.6,
                damping: 0.5,
                width: 0.9,
                pre_delay_ms: 10.0,
            },
            ReverbPreset::LargeHall => RoomParams {
                room_size: 0.8,
                damping: 0.4,
                width: 1.0,
                pre_delay_ms: 20.0,
            },
            ReverbPreset::Cathedral => RoomParams {
                room_size: 0.95,
                damping: 0.25,
                width: 1.0,
                pre_delay_ms: 40.0,
            },
            ReverbPreset::Plate => RoomParams {
                room_size: 0.7,
                damping: 0.1,
                width: 0.8,
                pre_delay_ms: 0.0,
            },
        }
    }

    /// Get display name for the preset
    pub fn display_name(&self) -> &'static str {
        match self {
            ReverbPreset::SmallRoom => "Small Room",
            ReverbPreset::MediumHall => "Medium Hall",
            ReverbPreset::LargeHall => "Large Hall",
            ReverbPreset::Cathedral => "Cathedral",
            ReverbPreset::Plate => "Plate",
        }
    }
}

// ============================================================================
// Filter Components
// ============================================================================

/// Low-pass comb filter for Freeverb
#[derive(Debug, Clone)]
struct CombFilter {
    /// Circular buffer for delay line
    buffer: Vec<f32>,
    write_pos: usize,
    /// Buffer size mask for efficient wrapping
    mask: usize,
    /// Filter state for damping (low-pass)
    filter_state: f32,
    feedback: f32,
    damp1: f32,
    damp2: f32,
}

impl CombFilter {
    fn new(delay_size: usize) -> Self {
        let size = delay_size.next_power_of_two();
        Self {
            buffer: vec![0.0; size],
            write_pos: 0,
            mask: size - 1,
            filter_state: 0.0,
            feedback: 0.5,
            damp1: 0.5,
            damp2: 0.5,
        }
    }

    fn set_coefficients(&mut self, feedback: f32, damp1: f32, damp2: f32) {
        self.feedback = feedback;
        self.damp1 = damp1;
        self.damp2 = damp2;
    }

    #[inline]
    fn process(&mut self, input: f32, delay: usize) -> f32 {
        let read_pos = (self.write_pos + self.mask + 1 - delay) & self.mask;
        let output = self.buffer[read_pos];

        // One-pole low-pass in the feedback path
        self.filter_state = output * self.damp1 + self.filter_state * self.damp2;
        self.buffer[self.write_pos] = input + self.filter_state * self.feedback;
        self.write_pos = (self.write_pos + 1) & self.mask;

        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.filter_state = 0.0;
        self.write_pos = 0;
    }
}

/// Allpass filter for Freeverb diffusion
#[derive(Debug, Clone)]
struct AllpassFilter {
    buffer: Vec<f32>,
    write_pos: usize,
    mask: usize,
}

impl AllpassFilter {
    fn new(delay_size: usize) -> Self {
        let size = delay_size.next_power_of_two();
        Self {
            buffer: vec![0.0; size],
            write_pos: 0,
            mask: size - 1,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, delay: usize) -> f32 {
        let read_pos = (self.write_pos + self.mask + 1 - delay) & self.mask;
        let delayed = self.buffer[read_pos];

        let output = delayed - ALLPASS_GAIN * input;
        self.buffer[self.write_pos] = input + ALLPASS_GAIN * output;
        self.write_pos = (self.write_pos + 1) & self.mask;

        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

/// Pre-delay buffer for reverb
#[derive(Debug, Clone)]
struct PreDelayBuffer {
    buffer: Vec<f32>,
    write_pos: usize,
    mask: usize,
}

impl PreDelayBuffer {
    fn new(max_size: usize) -> Self {
        let size = max_size.next_power_of_two();
        Self {
            buffer: vec![0.0; size],
            write_pos: 0,
            mask: size - 1,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, delay_samples: usize) -> f32 {
        self.buffer[self.write_pos] = input;
        let read_pos = (self.write_pos + self.mask + 1 - delay_samples) & self.mask;
        let output = self.buffer[read_pos];
        self.write_pos = (self.write_pos + 1) & self.mask;
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

// ============================================================================
// Main Reverb Effect
// ============================================================================

/// Reverb effect using the Freeverb algorithm
#[derive(Debug, Clone)]
pub struct Reverb {
    room: RoomParams,
    /// Dry/wet mix (0.0 = dry, 1.0 = wet)
    mix: f32,
    sample_rate: f64,

    comb_left: [CombFilter; 8],
    allpass_left: [AllpassFilter; 4],
    comb_right: [CombFilter; 8],
    allpass_right: [AllpassFilter; 4],
    pre_delay_left: PreDelayBuffer,
    pre_delay_right: PreDelayBuffer,

    /// Filter delays scaled to the current sample rate
    comb_delays_left: [usize; 8],
    comb_delays_right: [usize; 8],
    allpass_delays_left: [usize; 4],
    allpass_delays_right: [usize; 4],

    pre_delay_samples: usize,
}

impl Reverb {
    /// Create a reverb loaded with `preset`, fully dry
    pub fn new(preset: ReverbPreset) -> Self {
        let mut reverb = Self {
            room: preset.room(),
            mix: 0.0,
            sample_rate: REFERENCE_SAMPLE_RATE,
            comb_left: std::array::from_fn(|i| CombFilter::new(COMB_DELAYS[i] + 1)),
            allpass_left: std::array::from_fn(|i| AllpassFilter::new(ALLPASS_DELAYS[i] + 1)),
            comb_right: std::array::from_fn(|i| {
                CombFilter::new(COMB_DELAYS[i] + STEREO_SPREAD + 1)
            }),
            allpass_right: std::array::from_fn(|i| {
                AllpassFilter::new(ALLPASS_DELAYS[i] + STEREO_SPREAD + 1)
            }),
            pre_delay_left: PreDelayBuffer::new(1),
            pre_delay_right: PreDelayBuffer::new(1),
            comb_delays_left: COMB_DELAYS,
            comb_delays_right: std::array::from_fn(|i| COMB_DELAYS[i] + STEREO_SPREAD),
            allpass_delays_left: ALLPASS_DELAYS,
            allpass_delays_right: std::array::from_fn(|i| ALLPASS_DELAYS[i] + STEREO_SPREAD),
            pre_delay_samples: 0,
        };
        reverb.resize_buffers();
        reverb
    }

    /// Current room parameters
    pub fn room(&self) -> &RoomParams {
        &self.room
    }

    /// Load a preset without clearing the tail
    pub fn load_preset(&mut self, preset: ReverbPreset) {
        self.room = preset.room();
        self.update_coefficients();
        self.update_pre_delay();
    }

    /// Set the dry/wet mix in percent (clamped to 0..100)
    pub fn set_wet_dry_mix(&mut self, percent: f32) {
        self.mix = percent.clamp(0.0, MAX_WET_DRY_MIX) / MAX_WET_DRY_MIX;
    }

    fn update_coefficients(&mut self) {
        let feedback = self.room.room_size * ROOM_SCALE + ROOM_OFFSET;
        let damp1 = 1.0 - self.room.damping * DAMP_SCALE;
        let damp2 = self.room.damping * DAMP_SCALE;

        for comb in self.comb_left.iter_mut().chain(self.comb_right.iter_mut()) {
            comb.set_coefficients(feedback, damp1, damp2);
        }
    }

    fn update_pre_delay(&mut self) {
        let ms = self.room.pre_delay_ms.clamp(0.0, MAX_PRE_DELAY_MS);
        self.pre_delay_samples = ((ms / 1000.0) as f64 * self.sample_rate) as usize;
    }

    /// Scale delays and resize every delay line for the current sample rate
    fn resize_buffers(&mut self) {
        let scale = self.sample_rate / REFERENCE_SAMPLE_RATE;

        for i in 0..8 {
            self.comb_delays_left[i] = ((COMB_DELAYS[i] as f64 * scale) as usize).max(1);
            self.comb_delays_right[i] =
                (((COMB_DELAYS[i] + STEREO_SPREAD) as f64 * scale) as usize).max(1);
            self.comb_left[i] = CombFilter::new(self.comb_delays_left[i] + 1);
            self.comb_right[i] = CombFilter::new(self.comb_delays_right[i] + 1);
        }

        for i in 0..4 {
            self.allpass_delays_left[i] = ((ALLPASS_DELAYS[i] as f64 * scale) as usize).max(1);
            self.allpass_delays_right[i] =
                (((ALLPASS_DELAYS[i] + STEREO_SPREAD) as f64 * scale) as usize).max(1);
            self.allpass_left[i] = AllpassFilter::new(self.allpass_delays_left[i] + 1);
            self.allpass_right[i] = AllpassFilter::new(self.allpass_delays_right[i] + 1);
        }

        let max_pre_delay = ((MAX_PRE_DELAY_MS / 1000.0) as f64 * self.sample_rate) as usize + 1;
        self.pre_delay_left = PreDelayBuffer::new(max_pre_delay);
        self.pre_delay_right = PreDelayBuffer::new(max_pre_delay);

        self.update_coefficients();
        self.update_pre_delay();
    }

    fn process_mono(&mut self, buffer: &mut AudioBuffer, frames: usize) {
        let wet_level = self.mix * WET_SCALE;
        let dry_level = 1.0 - self.mix;

        for i in 0..frames {
            let input = buffer.samples[0][i];
            let delayed = if self.pre_delay_samples > 0 {
                self.pre_delay_left.process(input, self.pre_delay_samples)
            } else {
                input
            };
            let feed = delayed * FIXED_GAIN;

            let mut output = 0.0;
            for (comb, &delay) in self.comb_left.iter_mut().zip(&self.comb_delays_left) {
                output += comb.process(feed, delay);
            }
            for (allpass, &delay) in self.allpass_left.iter_mut().zip(&self.allpass_delays_left) {
                output = allpass.process(output, delay);
            }

            buffer.samples[0][i] = input * dry_level + output * wet_level;
        }
    }

    fn process_stereo(&mut self, buffer: &mut AudioBuffer, frames: usize) {
        let wet_level = self.mix * WET_SCALE;
        let dry_level = 1.0 - self.mix;
        let width = self.room.width;

        // wet1 feeds the same side, wet2 the opposite side
        let wet1 = wet_level * (1.0 + width) / 2.0;
        let wet2 = wet_level * (1.0 - width) / 2.0;

        for i in 0..frames {
            let input_left = buffer.samples[0][i];
            let input_right = buffer.samples[1][i];
            let input_mono = (input_left + input_right) * 0.5;

            let (delayed_left, delayed_right) = if self.pre_delay_samples > 0 {
                (
                    self.pre_delay_left.process(input_mono, self.pre_delay_samples),
                    self.pre_delay_right.process(input_mono, self.pre_delay_samples),
                )
            } else {
                (input_mono, input_mono)
            };
            let feed_left = delayed_left * FIXED_GAIN;
            let feed_right = delayed_right * FIXED_GAIN;

            let mut out_left = 0.0;
            let mut out_right = 0.0;
            for j in 0..8 {
                out_left += self.comb_left[j].process(feed_left, self.comb_delays_left[j]);
                out_right += self.comb_right[j].process(feed_right, self.comb_delays_right[j]);
            }
            for j in 0..4 {
                out_left = self.allpass_left[j].process(out_left, self.allpass_delays_left[j]);
                out_right = self.allpass_right[j].process(out_right, self.allpass_delays_right[j]);
            }

            let wet_left = out_left * wet1 + out_right * wet2;
            let wet_right = out_right * wet1 + out_left * wet2;

            buffer.samples[0][i] = input_left * dry_level + wet_left;
            buffer.samples[1][i] = input_right * dry_level + wet_right;
        }
    }
}

impl Default for Reverb {
    fn default() -> Self {
        Self::new(ReverbPreset::default())
    }
}

impl Effect for Reverb {
    fn process(&mut self, buffer: &mut AudioBuffer, frames: usize) {
        if self.mix < f32::EPSILON {
            return;
        }
        let frames = frames.min(buffer.len());
        match buffer.num_channels() {
            1 => self.process_mono(buffer, frames),
            2 => self.process_stereo(buffer, frames),
            _ => {}
        }
    }

    fn prepare(&mut self, sample_rate: u32, _max_block_size: usize) {
        self.sample_rate = sample_rate as f64;
        self.resize_buffers();
    }

    fn reset(&mut self) {
        for comb in self.comb_left.iter_mut().chain(self.comb_right.iter_mut()) {
            comb.clear();
        }
        for allpass in self.allpass_left.iter_mut().chain(self.allpass_right.iter_mut()) {
            allpass.clear();
        }
        self.pre_delay_left.clear();
        self.pre_delay_right.clear();
    }

    fn apply_settings(&mut self, settings: StageSettings) {
        if let Some(Preset::Reverb(preset)) = settings.preset {
            if preset.room() != self.room {
                self.load_preset(preset);
            }
        }
        self.set_wet_dry_mix(settings.intensity);
    }

    fn effect_type(&self) -> &'static str {
        "reverb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ChannelLayout;

    fn impulse(frames: usize, layout: ChannelLayout) -> AudioBuffer {
        let mut buffer = AudioBuffer::new(frames, layout, 44100);
        for ch in 0..buffer.channels() {
            buffer.channel_mut(ch)[0] = 1.0;
        }
        buffer
    }

    #[test]
    fn test_dry_reverb_is_passthrough() {
        let original = impulse(1024, ChannelLayout::Stereo);
        let mut buffer = original.clone();
        let mut reverb = Reverb::new(ReverbPreset::Cathedral);
        reverb.prepare(44100, 1024);
        reverb.process(&mut buffer, 1024);
        assert_eq!(buffer, original);
    }

    #[test]
    fn test_impulse_produces_tail() {
        let mut buffer = impulse(8192, ChannelLayout::Mono);
        let mut reverb = Reverb::new(ReverbPreset::Cathedral);
        reverb.prepare(44100, 8192);
        reverb.set_wet_dry_mix(50.0);
        reverb.process(&mut buffer, 8192);

        let tail_energy: f32 = buffer.channel(0)[2000..].iter().map(|s| s * s).sum();
        assert!(tail_energy > 0.0);
        assert!(buffer.channel(0).iter().all(|s| s.is_finite() && s.abs() < 2.0));
    }

    #[test]
    fn test_cathedral_rings_longer_than_small_room() {
        let tail = |preset: ReverbPreset| {
            let mut buffer = impulse(44100, ChannelLayout::Mono);
            let mut reverb = Reverb::new(preset);
            reverb.prepare(44100, 44100);
            reverb.set_wet_dry_mix(100.0);
            reverb.process(&mut buffer, 44100);
            buffer.channel(0)[22050..].iter().map(|s| s * s).sum::<f32>()
        };
        assert!(tail(ReverbPreset::Cathedral) > tail(ReverbPreset::SmallRoom));
    }

    #[test]
    fn test_preset_change_keeps_tail() {
        let mut buffer = impulse(4096, ChannelLayout::Mono);
        let mut reverb = Reverb::new(ReverbPreset::LargeHall);
        reverb.prepare(44100, 4096);
        reverb.set_wet_dry_mix(100.0);
        reverb.process(&mut buffer, 4096);

        reverb.load_preset(ReverbPreset::Plate);
        let mut silence = AudioBuffer::new(4096, ChannelLayout::Mono, 44100);
        reverb.process(&mut silence, 4096);
        assert!(silence.channel(0).iter().any(|&s| s != 0.0));
    }
}
