//! Pipeline state machine
//!
//! ```text
//! Idle ──start──► Running ──stop──► Stopping ──► Stopped
//!  ▲                 │                 ▲            │
//!  │           grab failures         stop           │
//!  │                 ▼                 │            │
//!  ├────start──── Failed ──────────────┘            │
//!  └────────────────────────start───────────────────┘
//! ```
//!
//! `start` from `Stopped` or `Failed` passes back through `Idle`; nothing
//! restarts on its own.

use crate::error::PipelineError;

/// Pipeline lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// Not started; no device held
    Idle,
    /// Capture loop active, device open
    Running,
    /// Stop requested, waiting for the loop to exit
    Stopping,
    /// Loop exited, device released
    Stopped,
    /// Loop exited after an unrecoverable capture error
    Failed,
}

impl PipelineState {
    /// Whether `start` is allowed from this state
    pub fn check_start(self) -> Result<(), PipelineError> {
        match self {
            PipelineState::Idle | PipelineState::Stopped | PipelineState::Failed => Ok(()),
            PipelineState::Running => Err(PipelineError::Conflict("pipeline already running")),
            PipelineState::Stopping => Err(PipelineError::Conflict("pipeline is stopping")),
        }
    }

    /// Whether `stop` is allowed from this state
    pub fn check_stop(self) -> Result<(), PipelineError> {
        match self {
            PipelineState::Running | PipelineState::Failed => Ok(()),
            PipelineState::Stopping => Err(PipelineError::Conflict("pipeline is already stopping")),
            PipelineState::Idle | PipelineState::Stopped => {
                Err(PipelineError::Conflict("pipeline is not running"))
            }
        }
    }

    /// Whether a capture loop may exist in this state
    pub fn has_worker(self) -> bool {
        matches!(
            self,
            PipelineState::Running | PipelineState::Stopping | PipelineState::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Running => "running",
            PipelineState::Stopping => "stopping",
            PipelineState::Stopped => "stopped",
            PipelineState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
