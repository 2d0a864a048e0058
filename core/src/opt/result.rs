use serde::{Deserialize, Serialize};

/// Outcome of a single pass run, or of several runs merged together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassResult {
    pub changed: bool,
    pub change_count: usize,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub elapsed_ms: f64,
}

impl PassResult {
    /// Result for `change_count` edits; `changed` follows the count.
    pub fn from_count(change_count: usize) -> Self {
        Self { changed: change_count > 0, change_count, ..Self::default() }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Folds `other` into `self`: flags OR-ed, counts and times summed,
    /// warnings concatenated in order.
    pub fn merge(&mut self, other: &PassResult) {
        self.changed |= other.changed;
        self.change_count += other.change_count;
        self.elapsed_ms += other.elapsed_ms;
        self.warnings.extend(other.warnings.iter().cloned());
    }
}
