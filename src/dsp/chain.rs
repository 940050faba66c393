//! Effect chain
//!
//! Fixed topology: source → PitchShift → Distortion → Reverb → sink.
//! Stages are never added or removed; only their parameters change.
//!
//! [`EffectChain`] is the shared, lock-free parameter side. Every graph build
//! calls [`EffectChain::build_processors`] to get a [`ProcessorChain`] with
//! fresh DSP state bound to those parameters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::dsp::distortion::Distortion;
use crate::dsp::effect::Effect;
use crate::dsp::pitch::PitchShifter;
use crate::dsp::reverb::Reverb;
use crate::dsp::stage::{EffectStage, Preset, StageKind};
use crate::engine::{AudioBuffer, AudioFormat};
use crate::error::Result;

/// Shared parameters of the three stages
#[derive(Debug)]
pub struct EffectChain {
    stages: [Arc<EffectStage>; 3],
    revision: AtomicU64,
}

impl EffectChain {
    /// Create a chain with every stage bypassed
    pub fn new() -> Self {
        Self {
            stages: StageKind::ORDER.map(|kind| Arc::new(EffectStage::new(kind))),
            revision: AtomicU64::new(0),
        }
    }

    /// Parameters of one stage
    pub fn stage(&self, kind: StageKind) -> &EffectStage {
        &self.stages[kind.index()]
    }

    /// Set the intensity of one stage
    ///
    /// Safe while a graph is rendering; the value is picked up at the next
    /// block boundary.
    ///
    /// # Errors
    /// * `InvalidParameter` - value outside the stage's range
    pub fn set_parameter(&self, kind: StageKind, value: f32) -> Result<()> {
        if self.stage(kind).set_intensity(value)? {
            let revision = self.bump();
            debug!("{} intensity -> {} (revision {})", kind, value, revision);
        }
        Ok(())
    }

    /// Put every stage back to its bypass value
    pub fn bypass_all(&self) {
        let mut changed = false;
        for stage in &self.stages {
            // bypass values are always in range
            changed |= stage.set_intensity(stage.kind().bypass_value()).unwrap_or(false);
        }
        if changed {
            let revision = self.bump();
            debug!("All stages bypassed (revision {})", revision);
        }
    }

    /// Load a factory preset into a stage
    ///
    /// # Errors
    /// * `InvalidParameter` - preset belongs to a different stage
    pub fn apply_preset(&self, kind: StageKind, preset: Preset) -> Result<()> {
        if self.stage(kind).set_preset(preset)? {
            let revision = self.bump();
            debug!("{} preset -> {:?} (revision {})", kind, preset, revision);
        }
        Ok(())
    }

    /// Current intensity of a stage
    pub fn parameter(&self, kind: StageKind) -> f32 {
        self.stage(kind).intensity()
    }

    /// Current preset of a stage
    pub fn preset(&self, kind: StageKind) -> Option<Preset> {
        self.stage(kind).preset()
    }

    /// Stages that currently alter audio, in signal order
    pub fn active_stages(&self) -> Vec<StageKind> {
        self.stages
            .iter()
            .filter(|s| !s.is_bypassed())
            .map(|s| s.kind())
            .collect()
    }

    /// Counter bumped on every effective change
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Serializable view of the chain
    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            revision: self.revision(),
            stages: self
                .stages
                .iter()
                .map(|s| StageSnapshot {
                    kind: s.kind(),
                    intensity: s.intensity(),
                    preset: s.preset(),
                })
                .collect(),
        }
    }

    /// Instantiate fresh DSP bound to this chain's parameters
    pub fn build_processors(&self, format: &AudioFormat, max_block_size: usize) -> ProcessorChain {
        let nodes = self
            .stages
            .iter()
            .map(|stage| {
                let mut effect: Box<dyn Effect> = match stage.kind() {
                    StageKind::PitchShift => Box::new(PitchShifter::default()),
                    StageKind::Distortion => Box::new(Distortion::default()),
                    StageKind::Reverb => Box::new(Reverb::default()),
                };
                effect.prepare(format.sample_rate, max_block_size);
                StageNode {
                    stage: Arc::clone(stage),
                    effect,
                    was_active: false,
                }
            })
            .collect();

        debug!(
            "Built processors for {} (max block {})",
            format, max_block_size
        );
        ProcessorChain { nodes }
    }

    fn bump(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl Default for EffectChain {
    fn default() -> Self {
        Self::new()
    }
}

/// One stage in a [`ChainSnapshot`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSnapshot {
    pub kind: StageKind,
    pub intensity: f32,
    pub preset: Option<Preset>,
}

/// Point-in-time view of the chain parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub revision: u64,
    pub stages: Vec<StageSnapshot>,
}

struct StageNode {
    stage: Arc<EffectStage>,
    effect: Box<dyn Effect>,
    was_active: bool,
}

/// DSP instances of one graph build
pub struct ProcessorChain {
    nodes: Vec<StageNode>,
}

impl ProcessorChain {
    /// Run the first `frames` frames of `buffer` through every stage
    ///
    /// Settings are read once per call. A bypassed stage is skipped entirely
    /// so the block passes through bit-exact.
    pub fn process(&mut self, buffer: &mut AudioBuffer, frames: usize) {
        for node in &mut self.nodes {
            let settings = node.stage.settings();
            if settings.is_bypassed() {
                if node.was_active {
                    node.effect.reset();
                    node.was_active = false;
                }
                continue;
            }
            node.effect.apply_settings(settings);
            node.effect.process(buffer, frames);
            node.was_active = true;
        }
    }

    /// Clear the state of every effect
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.effect.reset();
            node.was_active = false;
        }
    }

    /// Effect type identifiers in signal order
    pub fn effect_types(&self) -> Vec<&'static str> {
        self.nodes.iter().map(|n| n.effect.effect_type()).collect()
    }
}

impl std::fmt::Debug for ProcessorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorChain")
            .field("effects", &self.effect_types())
            .finish()
    }
}
