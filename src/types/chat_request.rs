use serde::{Deserialize, Serialize};

/// Body of a request to the chat endpoint.
///
/// The prompt is the only field the endpoint accepts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    /// The text the user submitted.
    pub prompt: String,
}

impl ChatRequest {
    /// Create a new `ChatRequest` carrying `prompt`.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

impl From<&str> for ChatRequest {
    fn from(prompt: &str) -> Self {
        Self::new(prompt)
    }
}

impl From<String> for ChatRequest {
    fn from(prompt: String) -> Self {
        Self::new(prompt)
    }
}
