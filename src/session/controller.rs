// controller.rs — The capture session state machine.
//
// Owns the camera source and the voice listener, dispatches captures from
// the button, voice triggers and the auto-loop timer, and guarantees that at
// most one capture is in flight. Asynchronous completions come back through
// the session channel as `SessionEvent`s and are checked against current
// intent (capture id, loop generation, listener generation) before acting.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::types::*;
use crate::ai::{Credential, VisionQuery};
use crate::capture::frame::encode_square;
use crate::capture::{
    CameraBackend, CameraSetting, CapabilityDescriptor, CaptureSource, DeviceInfo, DeviceSelector,
    FocusMode,
};
use crate::credential::CredentialStore;
use crate::presenter::{ControlState, Presenter, SpeechSink};
use crate::settings::Settings;
use crate::voice::{
    ListenerEvent, ListenerEventSink, ListenerOutcome, RecognizerFactory, TriggerPhrases,
    VoiceListener,
};

/// Pause before another attempt to start a recognizer that refused.
pub const LISTENER_RETRY_DELAY: Duration = Duration::from_secs(2);

/// External collaborators the controller talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub camera: Arc<dyn CameraBackend>,
    /// `None` when the platform has no speech engine.
    pub recognizers: Option<Arc<dyn RecognizerFactory>>,
    pub vision: Arc<dyn VisionQuery>,
    pub credentials: Arc<dyn CredentialStore>,
    pub presenter: Arc<dyn Presenter>,
    pub speech: Arc<dyn SpeechSink>,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub capture_size: u32,
    pub jpeg_quality: u8,
    pub triggers: TriggerPhrases,
    pub auto_loop_delay: Duration,
    pub auto_start: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig::from(&Settings::default())
    }
}

impl From<&Settings> for ControllerConfig {
    fn from(s: &Settings) -> Self {
        Self {
            capture_size: s.capture_size,
            jpeg_quality: s.jpeg_quality,
            triggers: s.trigger_phrases(),
            auto_loop_delay: s.auto_loop_delay(),
            auto_start: s.auto_start,
        }
    }
}

pub struct CaptureController {
    config: ControllerConfig,
    deps: Collaborators,
    events: mpsc::UnboundedSender<SessionEvent>,

    credential: Option<Credential>,
    source: Option<Box<dyn CaptureSource>>,
    capabilities: CapabilityDescriptor,

    listener: Option<VoiceListener>,
    listener_generation: u64,
    pending_retry: Option<JoinHandle<()>>,

    mode: SessionMode,
    in_flight: Option<u64>,
    next_capture_id: u64,

    loop_generation: u64,
    pending_tick: Option<JoinHandle<()>>,
}

impl CaptureController {
    pub fn new(
        config: ControllerConfig,
        deps: Collaborators,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            config,
            deps,
            events,
            credential: None,
            source: None,
            capabilities: CapabilityDescriptor::default(),
            listener: None,
            listener_generation: 0,
            pending_retry: None,
            mode: SessionMode::Idle,
            in_flight: None,
            next_capture_id: 1,
            loop_generation: 0,
            pending_tick: None,
        }
    }

    // ── Observable state ────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        if self.credential.is_none() {
            SessionState::NoCredential
        } else if self.in_flight.is_some() {
            SessionState::Capturing
        } else {
            SessionState::Ready {
                camera: self.camera_live(),
                listener: self.is_listening(),
            }
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    pub fn camera_live(&self) -> bool {
        self.source.as_ref().is_some_and(|s| s.is_live())
    }

    /// Current device id, if a source is held.
    pub fn device_id(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.device_id())
    }

    /// The intended-running flag of the current listener.
    pub fn is_listening(&self) -> bool {
        self.listener.as_ref().is_some_and(|l| l.intended_running())
    }

    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    pub fn capabilities(&self) -> &CapabilityDescriptor {
        &self.capabilities
    }

    pub fn auto_tick_pending(&self) -> bool {
        self.pending_tick.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn controls(&self) -> ControlState {
        let ready = self.credential.is_some() && self.camera_live();
        ControlState {
            capture_enabled: ready && self.in_flight.is_none(),
            auto_enabled: ready,
            auto_running: self.mode == SessionMode::AutoLoop,
            listening: self.is_listening(),
        }
    }

    fn publish_controls(&self) {
        self.deps.presenter.controls(self.controls());
    }

    fn status(&self, text: &str) {
        self.deps.presenter.status(text);
    }

    fn ready_hint(&self) -> String {
        match self.config.triggers.first() {
            Some(phrase) if self.deps.recognizers.is_some() => {
                format!("Say \"{}\" or press the button.", phrase)
            }
            _ => "Press the button to capture.".to_string(),
        }
    }

    // ── Credential ──────────────────────────────────────────────────────

    /// Pick up a credential persisted by an earlier run.
    pub async fn restore_credential(&mut self) -> bool {
        match self.deps.credentials.get() {
            Ok(Some(credential)) => {
                log::info!("Stored credential found");
                self.credential = Some(credential);
                if self.config.auto_start {
                    self.enable().await;
                } else {
                    self.status(&self.ready_hint());
                }
                self.publish_controls();
                true
            }
            Ok(None) => {
                self.status("Please enter your OpenAI API key to start.");
                self.publish_controls();
                false
            }
            Err(e) => {
                log::warn!("Could not read stored credential: {}", e);
                self.status("Please enter your OpenAI API key to start.");
                self.publish_controls();
                false
            }
        }
    }

    pub async fn set_credential(&mut self, token: &str) -> Result<(), SessionError> {
        let credential = Credential::new(token).ok_or(SessionError::CredentialMissing)?;
        if let Err(e) = self.deps.credentials.set(&credential) {
            // The key still works for this run.
            log::warn!("Could not persist credential: {}", e);
        }
        self.credential = Some(credential);
        log::info!("Credential set");

        if self.config.auto_start {
            self.status("Key saved.");
            self.enable().await;
        } else {
            self.status(&format!("Key saved. {}", self.ready_hint()));
        }
        self.publish_controls();
        Ok(())
    }

    pub fn clear_credential(&mut self) {
        if let Err(e) = self.deps.credentials.clear() {
            log::warn!("Could not remove stored credential: {}", e);
        }
        self.teardown();
        self.credential = None;
        log::info!("Credential cleared, session torn down");
        self.status("Key cleared. Enter a new key to continue.");
        self.publish_controls();
    }

    /// Bring up whatever is missing: the preferred camera and the listener.
    async fn enable(&mut self) {
        if self.source.is_none() {
            // Failures are already surfaced as status text.
            let _ = self.select(DeviceSelector::PreferRear).await;
        }
        if !self.is_listening() {
            match self.start_listening() {
                Ok(()) | Err(SessionError::ListenerUnsupported) => {}
                Err(e) => log::warn!("Listener not started: {}", e),
            }
        }
        if self.camera_live() {
            self.status(&self.ready_hint());
        }
    }

    // ── Camera ──────────────────────────────────────────────────────────

    pub async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, SessionError> {
        self.deps
            .camera
            .enumerate()
            .await
            .map_err(|e| SessionError::DeviceUnavailable(e.to_string()))
    }

    pub async fn select_device(&mut self, id: &str) -> Result<(), SessionError> {
        self.select(DeviceSelector::Id(id.to_string())).await
    }

    async fn select(&mut self, selector: DeviceSelector) -> Result<(), SessionError> {
        if self.credential.is_none() {
            return Err(SessionError::CredentialMissing);
        }
        self.release_source();

        let mut source = match self.deps.camera.acquire(&selector).await {
            Ok(source) => source,
            Err(e) => {
                log::error!("Camera acquisition failed for {:?}: {}", selector, e);
                // No automatic retry: that would re-open permission prompts.
                self.cancel_auto_loop();
                self.mode = SessionMode::Idle;
                self.status(&format!("Camera error: {}", e));
                self.deps.presenter.capabilities(&self.capabilities);
                self.publish_controls();
                return Err(SessionError::DeviceUnavailable(e.to_string()));
            }
        };

        self.capabilities = match source.capabilities() {
            Ok(caps) => caps,
            Err(e) => {
                log::warn!("Capability probe failed on {}: {}", source.device_id(), e);
                CapabilityDescriptor::default()
            }
        };
        if let Some(mode) = preferred_focus(&self.capabilities) {
            if let Err(e) = source.apply(CameraSetting::FocusMode(mode)) {
                log::warn!("Could not set focus mode {:?}: {}", mode, e);
            }
        }

        let (w, h) = source.native_size();
        log::info!("Camera '{}' live at {}x{}", source.device_id(), w, h);
        self.source = Some(source);
        self.deps.presenter.capabilities(&self.capabilities);
        self.publish_controls();
        Ok(())
    }

    /// Adjust zoom or focus on the live source. Failures never release it.
    pub fn apply_setting(&mut self, setting: CameraSetting) -> Result<(), SessionError> {
        let available = match setting {
            CameraSetting::Zoom(v) => self.capabilities.zoom.is_some_and(|r| r.contains(v)),
            CameraSetting::FocusMode(m) => self.capabilities.focus_modes.contains(&m),
            CameraSetting::FocusDistance(v) => {
                self.capabilities.focus_distance_available()
                    && self.capabilities.focus_distance.is_some_and(|r| r.contains(v))
            }
        };
        let source = self
            .source
            .as_mut()
            .filter(|s| s.is_live())
            .ok_or(SessionError::CaptureRejected(RejectReason::NoCamera))?;
        if !available {
            log::warn!("{:?} is outside the probed capabilities", setting);
            return Err(SessionError::DeviceDegraded(format!("{:?}", setting)));
        }
        if matches!(setting, CameraSetting::FocusDistance(_)) {
            source
                .apply(CameraSetting::FocusMode(FocusMode::Manual))
                .map_err(|e| SessionError::DeviceDegraded(e.to_string()))?;
        }
        source.apply(setting).map_err(|e| {
            log::warn!("Applying {:?} failed: {}", setting, e);
            SessionError::DeviceDegraded(e.to_string())
        })
    }

    fn release_source(&mut self) {
        if let Some(mut old) = self.source.take() {
            log::info!("Releasing camera '{}'", old.device_id());
            old.stop();
        }
        self.capabilities = CapabilityDescriptor::default();
    }

    // ── Voice listener ──────────────────────────────────────────────────

    pub fn start_listening(&mut self) -> Result<(), SessionError> {
        if self.credential.is_none() || self.is_listening() {
            return Ok(());
        }
        let factory = self
            .deps
            .recognizers
            .clone()
            .ok_or(SessionError::ListenerUnsupported)?;

        self.listener_generation += 1;
        let generation = self.listener_generation;
        let tx = self.events.clone();
        let sink = ListenerEventSink::new(move |event| {
            let _ = tx.send(SessionEvent::Listener { generation, event });
        });

        let recognizer = factory.create(sink).ok_or_else(|| {
            log::info!("No speech engine available; voice trigger disabled");
            SessionError::ListenerUnsupported
        })?;
        let mut listener = VoiceListener::new(recognizer, generation);
        let started = listener.start();
        self.listener = Some(listener);
        self.publish_controls();

        match started {
            Ok(()) => {
                log::info!("Voice listener #{} started", generation);
                Ok(())
            }
            Err(kind) => {
                let fatal = kind.is_fatal();
                log::warn!("Voice listener failed to start: {} (fatal={})", kind, fatal);
                if fatal {
                    self.listener = None;
                    self.status(&format!("Voice trigger unavailable: {}", kind));
                    self.publish_controls();
                } else {
                    self.schedule_listener_retry(generation);
                }
                Err(SessionError::ListenerFault { kind, fatal })
            }
        }
    }

    pub fn stop_listening(&mut self) {
        if let Some(retry) = self.pending_retry.take() {
            retry.abort();
        }
        if let Some(mut listener) = self.listener.take() {
            listener.stop();
            log::info!("Voice listener #{} stopped", listener.generation());
        }
        self.publish_controls();
    }

    fn on_listener_event(&mut self, generation: u64, event: ListenerEvent) {
        let listener = match self.listener.as_mut() {
            Some(l) if l.generation() == generation => l,
            _ => {
                log::debug!("Dropping event from retired listener #{}", generation);
                return;
            }
        };

        match event {
            ListenerEvent::Transcript { text, is_final } => {
                if !is_final {
                    return;
                }
                let Some(phrase) = self.config.triggers.find(&text) else {
                    log::debug!("Transcript without trigger: {:?}", text);
                    return;
                };
                log::info!("Trigger phrase '{}' heard", phrase);
                if let Err(e) = self.trigger_capture(CaptureOrigin::Voice) {
                    log::info!("Voice trigger ignored: {}", e);
                }
            }
            ListenerEvent::Ended => {
                let outcome = listener.on_ended();
                self.on_restart_outcome(generation, outcome);
            }
            ListenerEvent::Error(kind) => match listener.on_error(kind) {
                ListenerOutcome::Fatal(kind) => {
                    log::error!("Voice listener fatal error: {}", kind);
                    self.status(&format!("Voice trigger stopped: {}", kind));
                    self.publish_controls();
                }
                ListenerOutcome::Recoverable(kind) => {
                    log::debug!("Voice listener recoverable error: {}", kind)
                }
                _ => {}
            },
        }
    }

    fn on_listener_retry(&mut self, generation: u64) {
        self.pending_retry = None;
        let listener = match self.listener.as_mut() {
            Some(l) if l.generation() == generation => l,
            _ => {
                log::debug!("Dropping retry for retired listener #{}", generation);
                return;
            }
        };
        let outcome = listener.retry();
        self.on_restart_outcome(generation, outcome);
    }

    fn on_restart_outcome(&mut self, generation: u64, outcome: ListenerOutcome) {
        match outcome {
            ListenerOutcome::Resurrected => log::debug!("Voice listener #{} resurrected", generation),
            ListenerOutcome::RestartFailed(kind) => {
                log::warn!("Voice listener restart failed: {}; retrying", kind);
                self.schedule_listener_retry(generation);
            }
            ListenerOutcome::Fatal(kind) | ListenerOutcome::GaveUp(kind) => {
                log::error!("Voice listener #{} gave up: {}", generation, kind);
                self.listener = None;
                self.status(&format!("Voice trigger stopped: {}", kind));
                self.publish_controls();
            }
            _ => {}
        }
    }

    fn schedule_listener_retry(&mut self, generation: u64) {
        if let Some(retry) = self.pending_retry.take() {
            retry.abort();
        }
        let tx = self.events.clone();
        self.pending_retry = Some(tokio::spawn(async move {
            tokio::time::sleep(LISTENER_RETRY_DELAY).await;
            let _ = tx.send(SessionEvent::ListenerRetry { generation });
        }));
    }

    // ── Capture dispatch ────────────────────────────────────────────────

    /// Freeze one frame and send it upstream. Returns the capture id.
    pub fn trigger_capture(&mut self, origin: CaptureOrigin) -> Result<u64, SessionError> {
        let credential = self
            .credential
            .clone()
            .ok_or(SessionError::CredentialMissing)?;
        if self.in_flight.is_some() {
            log::debug!("{:?} capture rejected: one already in flight", origin);
            return Err(SessionError::CaptureRejected(RejectReason::InFlight));
        }
        let source = self
            .source
            .as_mut()
            .filter(|s| s.is_live())
            .ok_or(SessionError::CaptureRejected(RejectReason::NoCamera))?;

        self.deps.presenter.status("🔄 Capturing…");
        let frame = source.grab_frame().map_err(|e| {
            log::error!("Frame grab failed: {}", e);
            SessionError::DeviceUnavailable(e.to_string())
        });
        let native_size = source.native_size();
        let image = frame.and_then(|f| {
            encode_square(&f, self.config.capture_size, self.config.jpeg_quality)
                .map_err(|e| SessionError::DeviceUnavailable(e.to_string()))
        });
        let image = match image {
            Ok(image) => image,
            Err(e) => {
                self.status(&e.to_string());
                return Err(e);
            }
        };

        let id = self.next_capture_id;
        self.next_capture_id += 1;
        let request = CaptureRequest {
            id,
            origin,
            image,
            native_size,
        };

        self.in_flight = Some(id);
        if self.mode == SessionMode::Idle && origin != CaptureOrigin::Auto {
            self.mode = SessionMode::Manual;
        }
        log::info!("Capture #{} ({:?}) sent to {}", id, origin, self.deps.vision.name());
        self.status("📨 Sending to ChatGPT…");
        self.publish_controls();

        let vision = Arc::clone(&self.deps.vision);
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = vision.query(&request.image, &credential).await;
            let _ = tx.send(SessionEvent::CaptureFinished(CaptureOutcome {
                id: request.id,
                origin: request.origin,
                result,
            }));
        });
        Ok(id)
    }

    fn on_capture_finished(&mut self, outcome: CaptureOutcome) {
        if self.in_flight != Some(outcome.id) {
            log::warn!("Ignoring completion of unknown capture #{}", outcome.id);
            return;
        }
        self.in_flight = None;

        if self.credential.is_none() {
            log::info!("Capture #{} finished after the key was cleared", outcome.id);
            self.deps.presenter.answer(&outcome);
            self.publish_controls();
            return;
        }

        match &outcome.result {
            Ok(answer) => {
                log::info!("Capture #{} answered ({} chars)", outcome.id, answer.len());
                self.status(answer);
                self.deps.speech.speak(answer);
            }
            Err(e) => {
                log::error!("Capture #{} failed: {}", outcome.id, e);
                self.status(&format!("❌ {}", e));
            }
        }
        self.deps.presenter.answer(&outcome);

        if self.mode == SessionMode::AutoLoop {
            self.schedule_auto_tick();
        }
        self.publish_controls();
    }

    // ── Auto-loop ───────────────────────────────────────────────────────

    pub fn start_auto_loop(&mut self) -> Result<(), SessionError> {
        if self.credential.is_none() {
            return Err(SessionError::CredentialMissing);
        }
        if !self.camera_live() {
            return Err(SessionError::CaptureRejected(RejectReason::NoCamera));
        }
        if self.mode == SessionMode::AutoLoop {
            return Ok(());
        }

        self.loop_generation += 1;
        self.mode = SessionMode::AutoLoop;
        log::info!("Auto-loop #{} started", self.loop_generation);

        match self.trigger_capture(CaptureOrigin::Auto) {
            // The outstanding capture reschedules when it completes.
            Ok(_) | Err(SessionError::CaptureRejected(RejectReason::InFlight)) => {
                self.publish_controls();
                Ok(())
            }
            Err(e) => {
                self.cancel_auto_loop();
                self.publish_controls();
                Err(e)
            }
        }
    }

    pub fn stop_auto_loop(&mut self) {
        if self.mode != SessionMode::AutoLoop && self.pending_tick.is_none() {
            return;
        }
        self.cancel_auto_loop();
        log::info!("Auto-loop stopped");
        self.publish_controls();
    }

    fn cancel_auto_loop(&mut self) {
        if let Some(tick) = self.pending_tick.take() {
            tick.abort();
        }
        self.loop_generation += 1;
        if self.mode == SessionMode::AutoLoop {
            self.mode = SessionMode::Idle;
        }
    }

    fn schedule_auto_tick(&mut self) {
        if let Some(tick) = self.pending_tick.take() {
            tick.abort();
        }
        let generation = self.loop_generation;
        let delay = self.config.auto_loop_delay;
        let tx = self.events.clone();
        log::debug!("Next auto capture in {:?}", delay);
        self.pending_tick = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SessionEvent::AutoTick { generation });
        }));
    }

    fn on_auto_tick(&mut self, generation: u64) {
        if self.mode != SessionMode::AutoLoop || generation != self.loop_generation {
            log::debug!("Stale auto tick (generation {})", generation);
            return;
        }
        self.pending_tick = None;
        match self.trigger_capture(CaptureOrigin::Auto) {
            Ok(_) | Err(SessionError::CaptureRejected(RejectReason::InFlight)) => {}
            Err(e) => {
                log::warn!("Auto-loop halted: {}", e);
                self.cancel_auto_loop();
                self.status(&format!("Auto capture stopped: {}", e));
                self.publish_controls();
            }
        }
    }

    // ── Teardown & dispatch ─────────────────────────────────────────────

    fn teardown(&mut self) {
        self.cancel_auto_loop();
        self.stop_listening();
        self.release_source();
        self.mode = SessionMode::Idle;
    }

    /// Release every resource. The stored credential is kept.
    pub fn shutdown(&mut self) {
        self.teardown();
        log::info!("Capture session shut down");
    }

    /// Apply one event. Returns `false` once a shutdown was requested.
    pub async fn handle_event(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Command(command) => return self.handle_command(command).await,
            SessionEvent::Listener { generation, event } => self.on_listener_event(generation, event),
            SessionEvent::CaptureFinished(outcome) => self.on_capture_finished(outcome),
            SessionEvent::AutoTick { generation } => self.on_auto_tick(generation),
            SessionEvent::ListenerRetry { generation } => self.on_listener_retry(generation),
        }
        true
    }

    async fn handle_command(&mut self, command: SessionCommand) -> bool {
        log::debug!("Command: {:?}", command);
        let result = match command {
            SessionCommand::SetCredential(token) => self.set_credential(&token).await,
            SessionCommand::ClearCredential => {
                self.clear_credential();
                Ok(())
            }
            SessionCommand::SelectDevice(id) => self.select_device(&id).await,
            SessionCommand::ApplySetting(setting) => self.apply_setting(setting),
            SessionCommand::StartListening => self.start_listening(),
            SessionCommand::StopListening => {
                self.stop_listening();
                Ok(())
            }
            SessionCommand::TriggerCapture(origin) => self.trigger_capture(origin).map(|_| ()),
            SessionCommand::StartAutoLoop => self.start_auto_loop(),
            SessionCommand::StopAutoLoop => {
                self.stop_auto_loop();
                Ok(())
            }
            SessionCommand::Shutdown => {
                self.shutdown();
                return false;
            }
        };

        match result {
            Ok(()) => {}
            Err(SessionError::CredentialMissing) => {
                self.status("Enter your API key first!");
            }
            Err(SessionError::DeviceDegraded(what)) => {
                log::warn!("Control unavailable: {}", what);
            }
            Err(e) => log::info!("Command not applied: {}", e),
        }
        true
    }
}

/// Continuous focus when offered, then single-shot; manual stays manual.
fn preferred_focus(caps: &CapabilityDescriptor) -> Option<FocusMode> {
    [FocusMode::Continuous, FocusMode::Single]
        .into_iter()
        .find(|m| caps.focus_modes.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SettingRange;

    #[test]
    fn continuous_focus_preferred() {
        let caps = CapabilityDescriptor {
            focus_modes: vec![FocusMode::Manual, FocusMode::Single, FocusMode::Continuous],
            ..Default::default()
        };
        assert_eq!(preferred_focus(&caps), Some(FocusMode::Continuous));
    }

    #[test]
    fn manual_only_focus_left_alone() {
        let caps = CapabilityDescriptor {
            focus_modes: vec![FocusMode::Manual],
            focus_distance: Some(SettingRange {
                min: 0.0,
                max: 1.0,
                step: 0.1,
            }),
            ..Default::default()
        };
        assert_eq!(preferred_focus(&caps), None);
        assert!(caps.focus_distance_available());
    }

    #[test]
    fn config_follows_settings() {
        let mut s = Settings::default();
        s.auto_loop_delay_secs = 1.5;
        s.trigger_phrases = vec!["Capture Photo".into()];
        let c = ControllerConfig::from(&s);
        assert_eq!(c.auto_loop_delay, Duration::from_millis(1500));
        assert_eq!(c.triggers.find("please capture photo now"), Some("capture photo"));
    }
}
