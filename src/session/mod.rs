//! Capture session: the controller plus the event loop that drives it.
//!
//! All state lives in one [`CaptureController`] owned by [`Session`]. Operator
//! commands, recognizer callbacks, query completions and timer ticks arrive
//! on a single channel and are applied one at a time.

use tokio::sync::mpsc;

pub mod controller;
pub mod types;

pub use controller::{CaptureController, Collaborators, ControllerConfig, LISTENER_RETRY_DELAY};
pub use types::*;

/// Cloneable sender for operator intents.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    /// Returns false once the session loop is gone.
    pub fn send(&self, command: SessionCommand) -> bool {
        self.tx.send(SessionEvent::Command(command)).is_ok()
    }

    pub fn trigger_capture(&self) -> bool {
        self.send(SessionCommand::TriggerCapture(CaptureOrigin::Manual))
    }

    pub fn shutdown(&self) -> bool {
        self.send(SessionCommand::Shutdown)
    }
}

pub struct Session {
    controller: CaptureController,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl Session {
    pub fn new(config: ControllerConfig, deps: Collaborators) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = CaptureController::new(config, deps, tx.clone());
        Self { controller, rx, tx }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn controller(&self) -> &CaptureController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut CaptureController {
        &mut self.controller
    }

    /// Wait for the next event and apply it. Returns false after shutdown.
    pub async fn step(&mut self) -> bool {
        match self.rx.recv().await {
            Some(event) => self.controller.handle_event(event).await,
            None => false,
        }
    }

    /// Apply every event already queued without waiting. Returns how many
    /// were handled.
    pub async fn step_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.rx.try_recv() {
            handled += 1;
            if !self.controller.handle_event(event).await {
                break;
            }
        }
        handled
    }

    /// Restore any stored credential, then process events until shutdown.
    pub async fn run(mut self) {
        self.controller.restore_credential().await;
        while self.step().await {}
        log::info!("Session loop ended");
    }
}
