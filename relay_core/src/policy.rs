//! Speech-dispatch policy.
//!
//! Nothing is spoken until the accumulated reply holds more than
//! `word_threshold` words; at that point the whole reply so far becomes the
//! first utterance. Every fragment after that is spoken on its own as soon as
//! it arrives.

#[derive(Debug, Clone)]
pub struct SpeechDispatchPolicy {
    word_threshold: usize,
    started: bool,
}

impl SpeechDispatchPolicy {
    pub fn new(word_threshold: usize) -> Self {
        Self { word_threshold, started: false }
    }

    pub fn started(&self) -> bool {
        self.started
    }

    /// Decide what to speak after `fragment` has been appended to
    /// `accumulated`. Returns `None` while still buffering.
    pub fn on_fragment<'a>(&mut self, accumulated: &'a str, fragment: &'a str) -> Option<&'a str> {
        if self.started {
            return Some(fragment);
        }
        if word_count(accumulated) > self.word_threshold {
            self.started = true;
            return Some(accumulated);
        }
        None
    }
}

/// Number of whitespace-separated words.
///
/// Leading and trailing whitespace never counts as a word, so a trailing
/// space alone does not push a reply over the threshold.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
