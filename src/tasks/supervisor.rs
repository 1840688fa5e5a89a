use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use super::{Duty, DutyKind, TaskHandle, TaskState};
use crate::config::ExecutorKind;
use crate::error::{EngineError, EngineResult};

type Outcome = (DutyKind, EngineResult<()>);

/// Collects duties and starts them on the configured executor
pub struct Supervisor {
    executor: ExecutorKind,
    duties: Vec<Box<dyn Duty>>,
}

impl Supervisor {
    pub fn new(executor: ExecutorKind) -> Self {
        Self {
            executor,
            duties: Vec::new(),
        }
    }

    pub fn add(&mut self, duty: Box<dyn Duty>) {
        self.duties.push(duty);
    }

    /// Start every duty. Must be called from within a tokio runtime.
    pub fn start(self) -> Running {
        let (halt, _) = watch::channel(false);
        let mut set = JoinSet::new();
        let mut handles = Vec::with_capacity(self.duties.len());

        for duty in self.duties {
            let kind = duty.kind();
            let (state, receiver) = watch::channel(TaskState::Idle);
            handles.push(TaskHandle::new(kind, receiver));

            let guarded = guard(duty, state, halt.subscribe());
            match self.executor {
                ExecutorKind::Task => {
                    set.spawn(guarded);
                }
                ExecutorKind::Thread => {
                    let runtime = Handle::current();
                    set.spawn_blocking(move || runtime.block_on(guarded));
                }
            }
            debug!("started {kind} duty on {:?} executor", self.executor);
        }

        Running {
            handles,
            set,
            halt: HaltSignal(Arc::new(halt)),
        }
    }
}

/// Stops every duty of a [`Running`] set at its next await point
#[derive(Debug, Clone)]
pub struct HaltSignal(Arc<watch::Sender<bool>>);

impl HaltSignal {
    pub fn halt(&self) {
        self.0.send_replace(true);
    }
}

/// Duties in flight
pub struct Running {
    handles: Vec<TaskHandle>,
    set: JoinSet<Outcome>,
    halt: HaltSignal,
}

impl Running {
    pub fn handles(&self) -> &[TaskHandle] {
        &self.handles
    }

    /// Handle that outlives [`Running::wait`], e.g. for signal handlers.
    pub fn halt_signal(&self) -> HaltSignal {
        self.halt.clone()
    }

    pub fn halt(&self) {
        self.halt.halt();
    }

    /// Wait for every duty to end.
    ///
    /// The first failure halts the remaining duties and is returned once
    /// they are gone. Duties ended by a halt do not count as failures.
    pub async fn wait(mut self) -> EngineResult<()> {
        let mut first_failure = None;

        while let Some(joined) = self.set.join_next().await {
            let (kind, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    let e = EngineError::Task(format!("duty executor failed: {e}"));
                    error!("{e}");
                    self.halt();
                    if first_failure.is_none() {
                        first_failure = Some(e);
                    }
                    continue;
                }
            };

            match result {
                Ok(()) => info!("{kind} duty completed"),
                Err(EngineError::Halted) => debug!("{kind} duty halted"),
                Err(e) => {
                    error!("{kind} duty failed: {e}");
                    if first_failure.is_none() {
                        self.halt();
                        first_failure = Some(e);
                    }
                }
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run a duty while publishing its state and listening for the halt signal.
async fn guard(
    duty: Box<dyn Duty>,
    state: watch::Sender<TaskState>,
    mut halt: watch::Receiver<bool>,
) -> Outcome {
    let kind = duty.kind();
    state.send_replace(TaskState::Running);
    info!("{kind} duty running");

    let work = AssertUnwindSafe(duty.run()).catch_unwind();
    let result = tokio::select! {
        outcome = work => match outcome {
            Ok(result) => result,
            Err(panic) => Err(EngineError::Task(format!(
                "{kind} duty panicked: {}",
                panic_message(&*panic)
            ))),
        },
        Ok(()) = halt.wait_for(|halted| *halted).map(|r| r.map(drop)) => Err(EngineError::Halted),
    };

    let terminal = match &result {
        Ok(()) => TaskState::Completed,
        Err(EngineError::Halted) => TaskState::Failed {
            reason: "halted".to_string(),
        },
        Err(e) => TaskState::Failed {
            reason: e.to_string(),
        },
    };
    state.send_replace(terminal);
    (kind, result)
}
