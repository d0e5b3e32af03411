// console.rs — A recognizer fed by text lines, for terminals without a
// speech engine. Every fed line arrives as a finalized transcript.

use std::sync::{Arc, Mutex};

use super::{ListenerEvent, ListenerEventSink, ListenerErrorKind, RecognizerFactory, SpeechRecognizer};

#[derive(Clone, Default)]
pub struct LineRecognizerFactory {
    active: Arc<Mutex<Option<ListenerEventSink>>>,
}

impl LineRecognizerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `line` to the running recognizer. Returns false when nothing
    /// is listening.
    pub fn feed(&self, line: &str) -> bool {
        let sink = match self.active.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        match sink {
            Some(sink) => {
                sink.emit(ListenerEvent::Transcript {
                    text: line.to_string(),
                    is_final: true,
                });
                true
            }
            None => false,
        }
    }
}

impl RecognizerFactory for LineRecognizerFactory {
    fn create(&self, sink: ListenerEventSink) -> Option<Box<dyn SpeechRecognizer>> {
        Some(Box::new(LineRecognizer {
            active: Arc::clone(&self.active),
            sink,
        }))
    }
}

struct LineRecognizer {
    active: Arc<Mutex<Option<ListenerEventSink>>>,
    sink: ListenerEventSink,
}

impl SpeechRecognizer for LineRecognizer {
    fn start(&mut self) -> Result<(), ListenerErrorKind> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| ListenerErrorKind::Other("line recognizer poisoned".into()))?;
        *active = Some(self.sink.clone());
        Ok(())
    }

    fn stop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            *active = None;
        }
        self.sink.emit(ListenerEvent::Ended);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_reach_the_running_recognizer_only() {
        let factory = LineRecognizerFactory::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_w = Arc::clone(&seen);
        let sink = ListenerEventSink::new(move |ev| seen_w.lock().unwrap().push(ev));

        let mut rec = factory.create(sink).unwrap();
        assert!(!factory.feed("before start"));

        rec.start().unwrap();
        assert!(factory.feed("snap"));
        rec.stop();
        assert!(!factory.feed("after stop"));

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                ListenerEvent::Transcript {
                    text: "snap".into(),
                    is_final: true
                },
                ListenerEvent::Ended,
            ]
        );
    }
}
