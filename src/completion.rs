//! Completion marker detection

pub const DEFAULT_COMPLETION_MARKER: &str = "financial analysis completed";

/// Case-insensitive search for the canonical completion phrase.
#[derive(Debug, Clone)]
pub struct CompletionDetector {
    marker: String,
}

impl CompletionDetector {
    pub fn new(marker: impl AsRef<str>) -> Self {
        Self {
            marker: marker.as_ref().trim().to_lowercase(),
        }
    }

    pub fn is_complete(&self, text: Option<&str>) -> bool {
        match text {
            Some(text) if !text.trim().is_empty() && !self.marker.is_empty() => {
                text.to_lowercase().contains(&self.marker)
            }
            _ => false,
        }
    }
}

impl Default for CompletionDetector {
    fn default() -> Self {
        Self::new(DEFAULT_COMPLETION_MARKER)
    }
}
