//! Agent lifecycle state machine.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::{Result, ServiceWorkerError};

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Constructed, install not yet run.
    #[default]
    Parsed,
    /// Install event in progress.
    Installing,
    /// Installed, waiting to activate.
    Waiting,
    /// Activate event in progress.
    Activating,
    /// Active and controlling pages.
    Active,
    /// Install failed; the host may retry install.
    Redundant,
}

/// Tracks where the agent is in `Installing → Waiting → Activating → Active`.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: LifecycleState,
    skip_waiting: bool,
    state_changed_at: Instant,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Parsed,
            skip_waiting: false,
            state_changed_at: Instant::now(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// When the last transition happened.
    pub fn state_changed_at(&self) -> Instant {
        self.state_changed_at
    }

    pub fn is_active(&self) -> bool {
        self.state == LifecycleState::Active
    }

    /// Whether skip-waiting has been requested.
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting
    }

    /// Waiting with skip-waiting requested: the host should activate without waiting for
    /// old pages to close.
    pub fn should_activate_now(&self) -> bool {
        self.state == LifecycleState::Waiting && self.skip_waiting
    }

    fn set_state(&mut self, state: LifecycleState) {
        self.state = state;
        self.state_changed_at = Instant::now();
    }

    /// Enter `Installing`. Allowed from `Parsed`, or from `Redundant` when retrying.
    pub fn begin_install(&mut self) -> Result<()> {
        match self.state {
            LifecycleState::Parsed | LifecycleState::Redundant => {
                self.skip_waiting = false;
                self.set_state(LifecycleState::Installing);
                Ok(())
            }
            other => Err(ServiceWorkerError::StateError(format!(
                "cannot install from {:?}",
                other
            ))),
        }
    }

    /// `Installing → Waiting`.
    pub fn install_succeeded(&mut self) {
        if self.state == LifecycleState::Installing {
            self.set_state(LifecycleState::Waiting);
        }
    }

    /// `Installing → Redundant`.
    pub fn install_failed(&mut self) {
        if self.state == LifecycleState::Installing {
            self.skip_waiting = false;
            self.set_state(LifecycleState::Redundant);
        }
    }

    /// Request skipping the waiting period.
    pub fn skip_waiting(&mut self) {
        self.skip_waiting = true;
    }

    /// `Waiting → Activating`.
    pub fn begin_activate(&mut self) -> Result<()> {
        if self.state != LifecycleState::Waiting {
            return Err(ServiceWorkerError::StateError(format!(
                "cannot activate from {:?}",
                self.state
            )));
        }
        self.set_state(LifecycleState::Activating);
        Ok(())
    }

    /// `Activating → Active`.
    pub fn activated(&mut self) {
        if self.state == LifecycleState::Activating {
            self.set_state(LifecycleState::Active);
        }
    }
}
