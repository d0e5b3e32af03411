// presenter.rs — Boundary towards whatever renders the session (a web page,
// a tray app, a terminal) and towards the text-to-speech engine.

use serde::Serialize;

use crate::capture::CapabilityDescriptor;
use crate::session::CaptureOutcome;

/// Which user controls are currently usable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ControlState {
    pub capture_enabled: bool,
    pub auto_enabled: bool,
    pub auto_running: bool,
    pub listening: bool,
}

pub trait Presenter: Send + Sync {
    /// One-line status text.
    fn status(&self, text: &str);

    /// Result of a finished capture.
    fn answer(&self, outcome: &CaptureOutcome);

    fn controls(&self, controls: ControlState);

    /// Adjustable camera ranges for the current source.
    fn capabilities(&self, capabilities: &CapabilityDescriptor);
}

/// Text-to-speech, fire-and-forget.
pub trait SpeechSink: Send + Sync {
    fn speak(&self, text: &str);
}

/// Prints status lines to stdout and everything else to the log.
pub struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn status(&self, text: &str) {
        println!("{}", text);
    }

    fn answer(&self, outcome: &CaptureOutcome) {
        log::info!(
            "Capture #{} ({:?}) finished: {}",
            outcome.id,
            outcome.origin,
            if outcome.result.is_ok() { "ok" } else { "error" }
        );
    }

    fn controls(&self, controls: ControlState) {
        log::debug!("Controls: {:?}", controls);
    }

    fn capabilities(&self, capabilities: &CapabilityDescriptor) {
        match serde_json::to_string(capabilities) {
            Ok(json) => log::info!("Camera capabilities: {}", json),
            Err(e) => log::warn!("Could not serialise capabilities: {}", e),
        }
    }
}

/// Stands in for a speech engine by logging what would be spoken.
pub struct LogSpeechSink;

impl SpeechSink for LogSpeechSink {
    fn speak(&self, text: &str) {
        log::info!("🔊 {}", text);
    }
}
