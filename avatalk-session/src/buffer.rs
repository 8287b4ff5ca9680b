//! Per-turn text accumulation for user and avatar speech.

/// Speech-recognition fragments of the current user turn.
#[derive(Debug, Clone)]
pub struct UtteranceBuffer {
    fragments: Vec<String>,
    separator: String,
    turn_active: bool,
}

impl UtteranceBuffer {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            fragments: Vec::new(),
            separator: separator.into(),
            turn_active: false,
        }
    }

    /// A new user turn discards whatever the previous one left behind.
    pub fn begin_turn(&mut self) {
        self.fragments.clear();
        self.turn_active = true;
    }

    pub fn end_turn(&mut self) {
        self.turn_active = false;
    }

    pub fn push(&mut self, fragment: &str) {
        self.fragments.push(fragment.to_string());
    }

    pub fn text(&self) -> String {
        self.fragments.join(&self.separator)
    }

    /// Read and clear.
    pub fn flush(&mut self) -> String {
        let text = self.text();
        self.fragments.clear();
        self.turn_active = false;
        text
    }

    pub fn clear(&mut self) {
        self.fragments.clear();
        self.turn_active = false;
    }

    pub fn is_turn_active(&self) -> bool {
        self.turn_active
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// Display-only accumulation of what the avatar is saying.
#[derive(Debug, Clone)]
pub struct ReplyBuffer {
    fragments: Vec<String>,
    separator: String,
    revision: u64,
}

impl ReplyBuffer {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            fragments: Vec::new(),
            separator: separator.into(),
            revision: 0,
        }
    }

    pub fn push(&mut self, fragment: &str) {
        self.fragments.push(fragment.to_string());
        self.revision += 1;
    }

    pub fn text(&self) -> String {
        self.fragments.join(&self.separator)
    }

    pub fn clear(&mut self) {
        self.fragments.clear();
    }

    /// Bumped on every push; a delayed clear only applies to the revision
    /// it was scheduled for.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}
