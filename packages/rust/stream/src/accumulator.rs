//! Running concatenation of content deltas.

/// Folds `ContentDelta` text into a growing answer buffer.
///
/// Deltas are appended strictly in arrival order; the upstream generator
/// emits in writing order, so nothing is reordered or deduplicated.
#[derive(Debug, Default, Clone)]
pub struct AnswerAccumulator {
    text: String,
    deltas: usize,
}

impl AnswerAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one delta and return the running total.
    pub fn push(&mut self, delta: &str) -> &str {
        self.text.push_str(delta);
        self.deltas += 1;
        &self.text
    }

    /// Text accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of deltas received, empty ones included.
    pub fn delta_count(&self) -> usize {
        self.deltas
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_text(self) -> String {
        self.text
    }
}
