use serde::{Deserialize, Serialize};

/// One scored slice of a cached file body.
///
/// `start_line`/`end_line` are 1-based and inclusive. `relevance` is the
/// file-level score multiplied by the window's own occurrence count, so two
/// windows of the same file rank by local density.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchWindow {
    pub path: String,
    pub text: String,
    pub start_line: usize,
    pub end_line: usize,
    pub relevance: f64,
}

impl SearchWindow {
    /// Number of lines covered by this window.
    pub fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}
