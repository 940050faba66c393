//! Engine state machine
//!
//! ```text
//! Idle ──prepare_live──▶ LivePrepared ◀──pause── LiveRunning
//!   ▲                        │  ──start──────────────▲
//!   │                        ▼
//!   └──finish_offline── OfflinePrepared ──start_offline──▶ OfflineRunning
//! ```
//!
//! `stop` returns to `Idle` from anywhere. `finish_offline` returns to
//! `LivePrepared` when a live source is known.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of the audio graph engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EngineState {
    /// No graph built
    #[default]
    Idle,
    /// Live graph built, producer not running
    LivePrepared,
    /// Producer thread pulling blocks into the output device
    LiveRunning,
    /// Manual-rendering graph built, player not started
    OfflinePrepared,
    /// Manual rendering in progress
    OfflineRunning,
}

impl EngineState {
    /// A live graph exists
    pub fn is_live(&self) -> bool {
        matches!(self, EngineState::LivePrepared | EngineState::LiveRunning)
    }

    /// A manual-rendering graph exists
    pub fn is_offline(&self) -> bool {
        matches!(
            self,
            EngineState::OfflinePrepared | EngineState::OfflineRunning
        )
    }

    /// Audio is being produced
    pub fn is_running(&self) -> bool {
        matches!(self, EngineState::LiveRunning | EngineState::OfflineRunning)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Idle => write!(f, "Idle"),
            EngineState::LivePrepared => write!(f, "LivePrepared"),
            EngineState::LiveRunning => write!(f, "LiveRunning"),
            EngineState::OfflinePrepared => write!(f, "OfflinePrepared"),
            EngineState::OfflineRunning => write!(f, "OfflineRunning"),
        }
    }
}

/// Outcome of one `render_next_block` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderStatus {
    /// `n >= 1` frames were rendered into the buffer
    Rendered(usize),
    /// The source has no more frames
    EndOfSource,
    /// The source could not deliver right now; nothing was consumed
    TransientUnderrun,
    /// The graph failed and cannot continue
    Fatal(String),
}

impl fmt::Display for RenderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderStatus::Rendered(n) => write!(f, "Rendered({})", n),
            RenderStatus::EndOfSource => write!(f, "EndOfSource"),
            RenderStatus::TransientUnderrun => write!(f, "TransientUnderrun"),
            RenderStatus::Fatal(reason) => write!(f, "Fatal({})", reason),
        }
    }
}
