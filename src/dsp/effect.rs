//! Effect trait definition
//!
//! Base trait for the DSP behind every effect stage.

use crate::dsp::stage::StageSettings;
use crate::engine::AudioBuffer;

/// Base trait for all DSP effects
///
/// Effects process the first `frames` frames of a block in place. They are
/// owned by exactly one graph instance; the parameters they render with are
/// pushed in through [`Effect::apply_settings`] before each block.
pub trait Effect: Send {
    /// Process audio buffer in-place
    fn process(&mut self, buffer: &mut AudioBuffer, frames: usize);

    /// Prepare the effect for processing
    ///
    /// Called once per graph build with the stream's sample rate and the
    /// largest block the graph will pull.
    fn prepare(&mut self, sample_rate: u32, max_block_size: usize);

    /// Reset effect state
    ///
    /// Clears any internal buffers/state (e.g., delay lines, oscillators).
    fn reset(&mut self);

    /// Update intensity and preset; must not clear internal state
    fn apply_settings(&mut self, settings: StageSettings);

    /// Get the effect type identifier
    fn effect_type(&self) -> &'static str;
}
