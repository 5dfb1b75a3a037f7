use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Text shown in place of a reply when the endpoint could not produce one.
pub const ERROR_MARKER: &str = "[error] The chat service could not be reached. Please try again.";

/// Who produced a message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// Text typed by the user.
    User,

    /// Text produced by the endpoint, or the error marker standing in for it.
    Assistant,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Assistant => write!(f, "assistant"),
        }
    }
}

/// One entry in the conversation log.
///
/// Messages are immutable once committed to a session log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Who produced this message.
    pub sender: Sender,

    /// The message text.
    pub text: String,

    /// When the message was created.
    #[serde(with = "crate::utils::time")]
    pub timestamp: OffsetDateTime,

    /// True only for the synthetic entry recorded when a request failed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl Message {
    /// Create a user message stamped with the current time.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text.into(), false)
    }

    /// Create an assistant message stamped with the current time.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Sender::Assistant, text.into(), false)
    }

    /// Create the assistant-role error entry stamped with the current time.
    pub fn error_marker() -> Self {
        Self::new(Sender::Assistant, ERROR_MARKER.to_string(), true)
    }

    fn new(sender: Sender, text: String, is_error: bool) -> Self {
        Self {
            sender,
            text,
            timestamp: OffsetDateTime::now_utc(),
            is_error,
        }
    }

    /// Returns true if this is a genuine reply from the endpoint.
    pub fn is_reply(&self) -> bool {
        self.sender == Sender::Assistant && !self.is_error
    }
}
