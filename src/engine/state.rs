use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    Init = 0,
    Active = 1,
    Stopping = 2,
    Closed = 3,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RunState::Init,
            1 => RunState::Active,
            2 => RunState::Stopping,
            _ => RunState::Closed,
        }
    }
}

/// Run status shared by the engine and all workers.
///
/// Transitions only move forward and each one succeeds at most once.
#[derive(Debug)]
pub struct RunStateCell {
    state: AtomicU8,
    stop_requested: Notify,
}

impl Default for RunStateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStateCell {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(RunState::Init as u8),
            stop_requested: Notify::new(),
        }
    }

    pub fn get(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.get() == RunState::Active
    }

    fn transition(&self, from: RunState, to: RunState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn activate(&self) -> bool {
        self.transition(RunState::Init, RunState::Active)
    }

    /// Moves an initialising or active run to `Stopping`.
    ///
    /// Returns false when the run was already stopping or closed.
    pub fn request_stop(&self) -> bool {
        let stopped = self.transition(RunState::Active, RunState::Stopping)
            || self.transition(RunState::Init, RunState::Stopping);
        if stopped {
            self.stop_requested.notify_waiters();
        }
        stopped
    }

    pub fn close(&self) -> bool {
        self.transition(RunState::Stopping, RunState::Closed)
    }

    /// Resolves once the run has left `Init`/`Active`.
    pub async fn stopped(&self) {
        let notified = self.stop_requested.notified();
        tokio::pin!(notified);
        // register before checking so a stop in between is not missed
        notified.as_mut().enable();
        if matches!(self.get(), RunState::Stopping | RunState::Closed) {
            return;
        }
        notified.await;
    }
}
