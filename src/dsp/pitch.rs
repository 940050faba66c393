//! Pitch shift effect
//!
//! Time-domain pitch shifter built on a modulated delay line. Two read taps
//! sweep through a window of the delay line at a rate set by the pitch ratio;
//! each tap is faded by a triangular window so the wrap-around of one tap is
//! always covered by the other. Duration is unchanged.

use crate::dsp::effect::Effect;
use crate::dsp::stage::{StageSettings, PITCH_RANGE_CENTS};
use crate::engine::AudioBuffer;

/// Sweep window at the reference rate, in samples (~46 ms)
const WINDOW_SAMPLES: f64 = 2048.0;

const REFERENCE_SAMPLE_RATE: f64 = 44100.0;

/// Channels a shifter keeps delay lines for
const MAX_CHANNELS: usize = 2;

/// Convert cents to a frequency ratio
#[inline]
pub fn cents_to_ratio(cents: f32) -> f32 {
    2.0_f32.powf(cents / 1200.0)
}

/// Delay-line pitch shifter
#[derive(Debug, Clone)]
pub struct PitchShifter {
    cents: f32,
    ratio: f32,
    window: f32,
    lines: Vec<Vec<f32>>,
    mask: usize,
    write_pos: usize,
    /// Position of the first tap within the window, 0..1
    phase: f32,
}

impl PitchShifter {
    /// Create an unprepared shifter at `cents`
    pub fn new(cents: f32) -> Self {
        let mut shifter = Self {
            cents: 0.0,
            ratio: 1.0,
            window: WINDOW_SAMPLES as f32,
            lines: Vec::new(),
            mask: 0,
            write_pos: 0,
            phase: 0.0,
        };
        shifter.set_cents(cents);
        shifter.allocate(REFERENCE_SAMPLE_RATE as u32);
        shifter
    }

    /// Shift amount in cents, clamped to ±2400
    pub fn set_cents(&mut self, cents: f32) {
        self.cents = cents.clamp(-PITCH_RANGE_CENTS, PITCH_RANGE_CENTS);
        self.ratio = cents_to_ratio(self.cents);
    }

    pub fn cents(&self) -> f32 {
        self.cents
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    fn allocate(&mut self, sample_rate: u32) {
        let window = (WINDOW_SAMPLES * sample_rate as f64 / REFERENCE_SAMPLE_RATE).round();
        self.window = window.max(64.0) as f32;
        let size = (self.window as usize + 2).next_power_of_two();
        self.lines = vec![vec![0.0; size]; MAX_CHANNELS];
        self.mask = size - 1;
        self.write_pos = 0;
        self.phase = 0.0;
    }

    /// Fractional read `delay` samples behind `write_pos`
    #[inline]
    fn read(line: &[f32], mask: usize, write_pos: usize, delay: f32) -> f32 {
        let pos = write_pos as f32 + line.len() as f32 - delay;
        let base = pos.floor();
        let frac = pos - base;
        let i0 = (base as usize) & mask;
        let i1 = (i0 + 1) & mask;
        line[i0] * (1.0 - frac) + line[i1] * frac
    }
}

impl Default for PitchShifter {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Effect for PitchShifter {
    fn process(&mut self, buffer: &mut AudioBuffer, frames: usize) {
        if self.cents == 0.0 {
            return;
        }
        let frames = frames.min(buffer.len());
        let channels = buffer.num_channels().min(self.lines.len());
        let step = (1.0 - self.ratio) / self.window;

        for i in 0..frames {
            let phase_a = self.phase;
            let phase_b = (phase_a + 0.5).fract();
            let gain_a = 1.0 - (2.0 * phase_a - 1.0).abs();
            let gain_b = 1.0 - (2.0 * phase_b - 1.0).abs();
            let delay_a = phase_a * self.window;
            let delay_b = phase_b * self.window;

            for ch in 0..channels {
                let line = &mut self.lines[ch];
                line[self.write_pos] = buffer.samples[ch][i];
                let out = gain_a * Self::read(line, self.mask, self.write_pos, delay_a)
                    + gain_b * Self::read(line, self.mask, self.write_pos, delay_b);
                buffer.samples[ch][i] = out;
            }

            self.write_pos = (self.write_pos + 1) & self.mask;
            self.phase = (self.phase + step).rem_euclid(1.0);
        }
    }

    fn prepare(&mut self, sample_rate: u32, _max_block_size: usize) {
        self.allocate(sample_rate);
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.fill(0.0);
        }
        self.write_pos = 0;
        self.phase = 0.0;
    }

    fn apply_settings(&mut self, settings: StageSettings) {
        self.set_cents(settings.intensity);
    }

    fn effect_type(&self) -> &'static str {
        "pitch_shift"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::generate_test_tone;
    use approx::assert_relative_eq;

    /// Zero crossings per second over the second half of the channel
    fn crossing_rate(samples: &[f32], sample_rate: u32) -> f32 {
        let tail = &samples[samples.len() / 2..];
        let crossings = tail
            .windows(2)
            .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
            .count();
        crossings as f32 / 2.0 / (tail.len() as f32 / sample_rate as f32)
    }

    #[test]
    fn test_cents_to_ratio() {
        assert_relative_eq!(cents_to_ratio(0.0), 1.0);
        assert_relative_eq!(cents_to_ratio(1200.0), 2.0, epsilon = 1e-6);
        assert_relative_eq!(cents_to_ratio(-1200.0), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_cents_is_identity() {
        let original = generate_test_tone(440.0, 0.25, 44100);
        let mut buffer = original.clone();
        let mut shifter = PitchShifter::new(0.0);
        shifter.prepare(44100, buffer.len());
        shifter.process(&mut buffer, original.len());
        assert_eq!(buffer, original);
    }

    #[test]
    fn test_octave_up_doubles_frequency() {
        let mut buffer = generate_test_tone(440.0, 2.0, 44100);
        let mut shifter = PitchShifter::new(1200.0);
        shifter.prepare(44100, buffer.len());
        let frames = buffer.len();
        shifter.process(&mut buffer, frames);

        let rate = crossing_rate(buffer.channel(0), 44100);
        assert!(rate > 792.0 && rate < 968.0, "measured {rate} Hz");
    }

    #[test]
    fn test_octave_down_halves_frequency() {
        let mut buffer = generate_test_tone(440.0, 2.0, 44100);
        let mut shifter = PitchShifter::new(-1200.0);
        shifter.prepare(44100, buffer.len());
        let frames = buffer.len();
        shifter.process(&mut buffer, frames);

        let rate = crossing_rate(buffer.channel(0), 44100);
        assert!(rate > 198.0 && rate < 242.0, "measured {rate} Hz");
    }

    #[test]
    fn test_settings_clamp_cents() {
        let mut shifter = PitchShifter::default();
        shifter.apply_settings(StageSettings {
            intensity: 5000.0,
            preset: None,
        });
        assert_relative_eq!(shifter.cents(), 2400.0);
        assert_relative_eq!(shifter.ratio(), 4.0, epsilon = 1e-5);
    }
}
