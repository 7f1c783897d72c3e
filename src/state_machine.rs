//! Pipeline status: Disconnected → Acquiring → Halted.
//! Halted is terminal: only a power cycle leaves it.

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::acquisition::HaltReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PipelineStatus {
    Disconnected,
    Acquiring,
    Halted,
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStatus::Disconnected => write!(f, "Disconnected"),
            PipelineStatus::Acquiring => write!(f, "Acquiring"),
            PipelineStatus::Halted => write!(f, "Halted"),
        }
    }
}

impl PipelineStatus {
    /// Returns whether moving from `self` to `next` is valid.
    pub fn can_transition_to(self, next: PipelineStatus) -> bool {
        matches!(
            (self, next),
            (PipelineStatus::Disconnected, PipelineStatus::Acquiring)
                | (PipelineStatus::Acquiring, PipelineStatus::Acquiring) // reconnect
                | (PipelineStatus::Acquiring, PipelineStatus::Disconnected)
                | (PipelineStatus::Disconnected, PipelineStatus::Halted)
                | (PipelineStatus::Acquiring, PipelineStatus::Halted)
        )
    }
}

/// Status holder with a watch channel for subscribers (operator display, host UI).
pub struct StatusMachine {
    status: RwLock<PipelineStatus>,
    status_tx: watch::Sender<PipelineStatus>,
}

impl StatusMachine {
    pub fn new() -> Self {
        let (status_tx, _) = watch::channel(PipelineStatus::Disconnected);
        Self {
            status: RwLock::new(PipelineStatus::Disconnected),
            status_tx,
        }
    }

    pub fn current(&self) -> PipelineStatus {
        *self.status.read()
    }

    /// Attempt a transition. Returns Ok(new_status) or Err with reason.
    pub fn transition(&self, next: PipelineStatus) -> Result<PipelineStatus, String> {
        let mut status = self.status.write();
        let current = *status;
        if !current.can_transition_to(next) {
            let msg = format!("invalid transition: {current} -> {next}");
            warn!("{}", msg);
            return Err(msg);
        }
        *status = next;
        self.status_tx.send_replace(next);
        info!(from = %current, to = %next, "status_transition");
        Ok(next)
    }

    /// Enter Halted from any live state. No-op if already halted.
    pub fn halt(&self, reason: HaltReason) {
        let mut status = self.status.write();
        if *status == PipelineStatus::Halted {
            return;
        }
        let prev = *status;
        *status = PipelineStatus::Halted;
        self.status_tx.send_replace(PipelineStatus::Halted);
        error!(from = %prev, %reason, "pipeline_halted");
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineStatus> {
        self.status_tx.subscribe()
    }
}

impl Default for StatusMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_and_reconnect_are_valid() {
        let sm = StatusMachine::new();
        assert_eq!(sm.current(), PipelineStatus::Disconnected);
        assert_eq!(sm.transition(PipelineStatus::Acquiring), Ok(PipelineStatus::Acquiring));
        assert_eq!(sm.transition(PipelineStatus::Acquiring), Ok(PipelineStatus::Acquiring));
        assert!(sm.transition(PipelineStatus::Disconnected).is_ok());
    }

    #[test]
    fn halted_is_terminal() {
        let sm = StatusMachine::new();
        sm.transition(PipelineStatus::Acquiring).unwrap();
        sm.halt(HaltReason::RawPayloadLength(3));
        assert_eq!(sm.current(), PipelineStatus::Halted);
        assert!(sm.transition(PipelineStatus::Acquiring).is_err());
        assert!(sm.transition(PipelineStatus::Disconnected).is_err());
        assert_eq!(sm.current(), PipelineStatus::Halted);
    }

    #[test]
    fn subscribers_see_latest_status() {
        let sm = StatusMachine::new();
        let mut rx = sm.subscribe();
        assert_eq!(*rx.borrow(), PipelineStatus::Disconnected);

        sm.transition(PipelineStatus::Acquiring).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), PipelineStatus::Acquiring);

        sm.halt(HaltReason::RawPayloadLength(0));
        assert_eq!(*rx.borrow_and_update(), PipelineStatus::Halted);
    }
}
