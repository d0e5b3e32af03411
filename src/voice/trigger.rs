/// Case-insensitive trigger-phrase matcher for finalized transcripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerPhrases {
    phrases: Vec<String>,
}

impl TriggerPhrases {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases = phrases
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases }
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.phrases.first().map(String::as_str)
    }

    /// First configured phrase contained in `transcript`, if any.
    pub fn find(&self, transcript: &str) -> Option<&str> {
        let haystack = transcript.trim().to_lowercase();
        self.phrases
            .iter()
            .find(|p| haystack.contains(p.as_str()))
            .map(String::as_str)
    }
}

impl Default for TriggerPhrases {
    fn default() -> Self {
        Self::new(["snap"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_case_insensitively() {
        let t = TriggerPhrases::default();
        assert_eq!(t.find("Okay SNAP it"), Some("snap"));
        assert_eq!(t.find("nothing here"), None);
    }

    #[test]
    fn first_configured_phrase_wins() {
        let t = TriggerPhrases::new(["capture photo", "snap"]);
        assert_eq!(t.find("snap, no wait, capture photo"), Some("capture photo"));
    }

    #[test]
    fn blank_phrases_are_dropped() {
        let t = TriggerPhrases::new(["", "  "]);
        assert!(t.is_empty());
        assert_eq!(t.find("anything"), None);
    }
}
