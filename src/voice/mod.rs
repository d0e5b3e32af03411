//! Speech-trigger side of snapsight.
//!
//! The platform recognizer is an external collaborator behind
//! [`SpeechRecognizer`]. Continuous recognizers end their session on their own
//! from time to time; [`VoiceListener`] keeps the single "intended running"
//! flag that decides whether such an end is resurrected.

use std::sync::Arc;

pub mod console;
pub mod trigger;

pub use trigger::TriggerPhrases;

/// Coarse error kinds reported by a recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerErrorKind {
    NoSpeech,
    AudioCapture,
    NotAllowed,
    Network,
    ServiceNotAllowed,
    Aborted,
    Other(String),
}

impl ListenerErrorKind {
    /// Permission failures stop resurrection until the operator restarts.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ListenerErrorKind::NotAllowed | ListenerErrorKind::ServiceNotAllowed)
    }
}

impl std::fmt::Display for ListenerErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerErrorKind::NoSpeech => f.write_str("no-speech"),
            ListenerErrorKind::AudioCapture => f.write_str("audio-capture"),
            ListenerErrorKind::NotAllowed => f.write_str("not-allowed"),
            ListenerErrorKind::Network => f.write_str("network"),
            ListenerErrorKind::ServiceNotAllowed => f.write_str("service-not-allowed"),
            ListenerErrorKind::Aborted => f.write_str("aborted"),
            ListenerErrorKind::Other(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    /// A transcript fragment. Only finalized fragments are acted on.
    Transcript { text: String, is_final: bool },
    /// The recognition session ended (deliberately or spontaneously).
    Ended,
    Error(ListenerErrorKind),
}

/// Callback handed to a recognizer for delivering its events.
#[derive(Clone)]
pub struct ListenerEventSink {
    inner: Arc<dyn Fn(ListenerEvent) + Send + Sync>,
}

impl ListenerEventSink {
    pub fn new(f: impl Fn(ListenerEvent) + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(f) }
    }

    pub fn emit(&self, event: ListenerEvent) {
        (self.inner)(event)
    }
}

/// A continuous speech-recognition session.
pub trait SpeechRecognizer: Send {
    fn start(&mut self) -> Result<(), ListenerErrorKind>;

    /// Request the session to stop. An `Ended` event may still follow.
    fn stop(&mut self);
}

/// Builds recognizers. Returns `None` when the platform has no engine.
pub trait RecognizerFactory: Send + Sync {
    fn create(&self, sink: ListenerEventSink) -> Option<Box<dyn SpeechRecognizer>>;
}

/// What the controller should do after the listener saw an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerOutcome {
    Idle,
    Resurrected,
    /// Restart attempted but the engine refused. Still intended to run.
    RestartFailed(ListenerErrorKind),
    /// Too many restarts in a row failed; intent is cleared.
    GaveUp(ListenerErrorKind),
    Recoverable(ListenerErrorKind),
    Fatal(ListenerErrorKind),
}

/// Consecutive failed starts tolerated before the listener gives up.
pub const MAX_RESTART_ATTEMPTS: u32 = 3;

pub struct VoiceListener {
    recognizer: Box<dyn SpeechRecognizer>,
    intended_running: bool,
    generation: u64,
    failed_starts: u32,
}

impl VoiceListener {
    pub fn new(recognizer: Box<dyn SpeechRecognizer>, generation: u64) -> Self {
        Self {
            recognizer,
            intended_running: false,
            generation,
            failed_starts: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn intended_running(&self) -> bool {
        self.intended_running
    }

    /// A recoverable failure keeps intent set; the caller retries through
    /// [`VoiceListener::retry`].
    pub fn start(&mut self) -> Result<(), ListenerErrorKind> {
        self.intended_running = true;
        self.failed_starts = 0;
        match self.restart() {
            ListenerOutcome::Fatal(kind)
            | ListenerOutcome::RestartFailed(kind)
            | ListenerOutcome::GaveUp(kind) => Err(kind),
            _ => Ok(()),
        }
    }

    /// Intent is cleared before the engine is asked to stop, so the `Ended`
    /// event that follows is never resurrected.
    pub fn stop(&mut self) {
        self.intended_running = false;
        self.recognizer.stop();
    }

    pub fn on_ended(&mut self) -> ListenerOutcome {
        self.restart()
    }

    /// Another attempt after a failed start. No-op once intent is cleared.
    pub fn retry(&mut self) -> ListenerOutcome {
        self.restart()
    }

    fn restart(&mut self) -> ListenerOutcome {
        if !self.intended_running {
            return ListenerOutcome::Idle;
        }
        match self.recognizer.start() {
            Ok(()) => {
                self.failed_starts = 0;
                ListenerOutcome::Resurrected
            }
            Err(kind) if kind.is_fatal() => {
                self.intended_running = false;
                ListenerOutcome::Fatal(kind)
            }
            Err(kind) => {
                self.failed_starts += 1;
                if self.failed_starts >= MAX_RESTART_ATTEMPTS {
                    self.intended_running = false;
                    ListenerOutcome::GaveUp(kind)
                } else {
                    ListenerOutcome::RestartFailed(kind)
                }
            }
        }
    }

    pub fn on_error(&mut self, kind: ListenerErrorKind) -> ListenerOutcome {
        if kind.is_fatal() {
            self.intended_running = false;
            ListenerOutcome::Fatal(kind)
        } else {
            ListenerOutcome::Recoverable(kind)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Calls {
        starts: usize,
        stops: usize,
        fail_with: Option<ListenerErrorKind>,
    }

    struct FakeRecognizer(Arc<Mutex<Calls>>);

    impl SpeechRecognizer for FakeRecognizer {
        fn start(&mut self) -> Result<(), ListenerErrorKind> {
            let mut c = self.0.lock().unwrap();
            c.starts += 1;
            match c.fail_with.clone() {
                Some(kind) => Err(kind),
                None => Ok(()),
            }
        }

        fn stop(&mut self) {
            self.0.lock().unwrap().stops += 1;
        }
    }

    fn listener() -> (VoiceListener, Arc<Mutex<Calls>>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        (VoiceListener::new(Box::new(FakeRecognizer(Arc::clone(&calls))), 1), calls)
    }

    #[test]
    fn spontaneous_end_is_resurrected() {
        let (mut l, calls) = listener();
        l.start().unwrap();
        assert_eq!(l.on_ended(), ListenerOutcome::Resurrected);
        assert_eq!(calls.lock().unwrap().starts, 2);
    }

    #[test]
    fn end_after_stop_is_not_resurrected() {
        let (mut l, calls) = listener();
        l.start().unwrap();
        l.stop();
        assert!(!l.intended_running());
        assert_eq!(l.on_ended(), ListenerOutcome::Idle);
        assert_eq!(calls.lock().unwrap().starts, 1);
    }

    #[test]
    fn permission_error_clears_intent() {
        let (mut l, _) = listener();
        l.start().unwrap();
        assert!(matches!(l.on_error(ListenerErrorKind::NotAllowed), ListenerOutcome::Fatal(_)));
        assert!(!l.intended_running());
        assert_eq!(l.on_ended(), ListenerOutcome::Idle);
    }

    #[test]
    fn no_speech_keeps_listening() {
        let (mut l, _) = listener();
        l.start().unwrap();
        assert!(matches!(
            l.on_error(ListenerErrorKind::NoSpeech),
            ListenerOutcome::Recoverable(_)
        ));
        assert!(l.intended_running());
        assert_eq!(l.on_ended(), ListenerOutcome::Resurrected);
    }

    #[test]
    fn fatal_start_failure_clears_intent() {
        let (mut l, calls) = listener();
        calls.lock().unwrap().fail_with = Some(ListenerErrorKind::ServiceNotAllowed);
        assert!(l.start().is_err());
        assert!(!l.intended_running());
    }

    #[test]
    fn failed_restarts_retry_then_give_up() {
        let (mut l, calls) = listener();
        l.start().unwrap();
        calls.lock().unwrap().fail_with = Some(ListenerErrorKind::AudioCapture);

        assert_eq!(
            l.on_ended(),
            ListenerOutcome::RestartFailed(ListenerErrorKind::AudioCapture)
        );
        assert!(l.intended_running());
        assert!(matches!(l.retry(), ListenerOutcome::RestartFailed(_)));
        assert_eq!(l.retry(), ListenerOutcome::GaveUp(ListenerErrorKind::AudioCapture));
        assert!(!l.intended_running());
        assert_eq!(l.retry(), ListenerOutcome::Idle);
        assert_eq!(calls.lock().unwrap().starts, 1 + MAX_RESTART_ATTEMPTS as usize);
    }

    #[test]
    fn successful_retry_resets_failure_count() {
        let (mut l, calls) = listener();
        l.start().unwrap();
        calls.lock().unwrap().fail_with = Some(ListenerErrorKind::Network);
        assert!(matches!(l.on_ended(), ListenerOutcome::RestartFailed(_)));
        assert!(matches!(l.retry(), ListenerOutcome::RestartFailed(_)));

        calls.lock().unwrap().fail_with = None;
        assert_eq!(l.retry(), ListenerOutcome::Resurrected);

        calls.lock().unwrap().fail_with = Some(ListenerErrorKind::Network);
        assert!(matches!(l.on_ended(), ListenerOutcome::RestartFailed(_)));
        assert!(l.intended_running());
    }

    #[test]
    fn recoverable_start_failure_keeps_intent() {
        let (mut l, calls) = listener();
        calls.lock().unwrap().fail_with = Some(ListenerErrorKind::AudioCapture);
        assert_eq!(l.start(), Err(ListenerErrorKind::AudioCapture));
        assert!(l.intended_running());
    }
}
