//! Duties and their supervision
//!
//! The engine runs up to three duties, each an independent unit of work:
//!
//! - **Point**: threshold checks over a short window, forever
//! - **Train**: one training run, then done
//! - **Detect**: model inference over a rolling window, forever
//!
//! A duty is a boxed future. The [`supervisor::Supervisor`] decides how it is
//! executed (async task or dedicated thread), publishes its [`TaskState`]
//! and halts every duty as soon as one fails.
//!
//! ## Cycle policy
//!
//! Looping duties run each cycle to completion and pass its error, if any,
//! through [`settle`]. Only errors whose [`Disposition`] is fatal end the
//! duty; everything else is logged and the loop continues after `delay`.

pub mod detect;
pub mod point;
pub mod supervisor;
pub mod train;

use std::fmt;

use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::{error, warn};

use crate::error::{Disposition, EngineResult};

pub use detect::DetectDuty;
pub use point::PointDuty;
pub use supervisor::{HaltSignal, Running, Supervisor};
pub use train::TrainDuty;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DutyKind {
    Point,
    Train,
    Detect,
}

impl fmt::Display for DutyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DutyKind::Point => write!(f, "point"),
            DutyKind::Train => write!(f, "train"),
            DutyKind::Detect => write!(f, "detect"),
        }
    }
}

/// Lifecycle of one duty: `Idle -> Running -> {Completed | Failed}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
    Completed,
    Failed { reason: String },
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed { .. })
    }
}

/// Work unit handed to the supervisor
pub trait Duty: Send + 'static {
    fn kind(&self) -> DutyKind;

    fn run(self: Box<Self>) -> BoxFuture<'static, EngineResult<()>>;
}

/// Read side of a duty's state
#[derive(Debug, Clone)]
pub struct TaskHandle {
    kind: DutyKind,
    state: watch::Receiver<TaskState>,
}

impl TaskHandle {
    pub(crate) fn new(kind: DutyKind, state: watch::Receiver<TaskState>) -> Self {
        Self { kind, state }
    }

    pub fn kind(&self) -> DutyKind {
        self.kind
    }

    pub fn state(&self) -> TaskState {
        self.state.borrow().clone()
    }

    /// Wait until the duty reaches a terminal state.
    pub async fn finished(&mut self) -> TaskState {
        let reached = self
            .state
            .wait_for(TaskState::is_terminal)
            .await
            .map(|state| state.clone());
        match reached {
            Ok(state) => state,
            Err(_) => self.state.borrow().clone(),
        }
    }
}

/// Apply the cycle policy of `duty` to the outcome of one cycle.
pub fn settle(duty: DutyKind, result: EngineResult<()>) -> EngineResult<()> {
    let Err(e) = result else {
        return Ok(());
    };
    match e.disposition(duty) {
        Disposition::Fatal => Err(e),
        Disposition::SkipCycle => {
            warn!("{duty} cycle skipped: {e}");
            Ok(())
        }
        Disposition::NoAnomalies => {
            error!("{duty} cycle failed, reporting no anomalies: {e}");
            Ok(())
        }
    }
}
