use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Body of a successful-status answer from the chat endpoint.
///
/// A healthy endpoint fills `response`.  An endpoint whose model failed to load
/// still answers with a success status but fills `error` instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatReply {
    /// The generated reply text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    /// An endpoint-side failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatReply {
    /// Create a reply carrying generated text.
    pub fn response(text: impl Into<String>) -> Self {
        Self {
            response: Some(text.into()),
            error: None,
        }
    }

    /// Create a reply carrying an endpoint-side error.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            response: None,
            error: Some(message.into()),
        }
    }

    /// Extract the reply text, failing closed on anything else.
    ///
    /// An `error` field wins over a `response` field.  A missing or empty
    /// response is a protocol error because it cannot be committed to the log.
    pub fn into_text(self) -> Result<String> {
        if let Some(error) = self.error {
            return Err(Error::protocol(format!("endpoint reported: {error}")));
        }
        match self.response {
            Some(text) if !text.is_empty() => Ok(text),
            Some(_) => Err(Error::protocol("endpoint returned an empty response")),
            None => Err(Error::protocol("endpoint reply is missing the response field")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::from_str;

    #[test]
    fn reply_with_response() {
        let reply: ChatReply = from_str(r#"{"response": "Hi there"}"#).unwrap();
        assert_eq!(reply.into_text().unwrap(), "Hi there");
    }

    #[test]
    fn reply_with_error_field() {
        let reply: ChatReply =
            from_str(r#"{"error": "Model failed to load. Check logs."}"#).unwrap();
        let err = reply.into_text().unwrap_err();
        assert!(err.is_protocol());
        assert!(err.to_string().contains("Model failed to load"));
    }

    #[test]
    fn reply_missing_fields() {
        let reply: ChatReply = from_str(r#"{"answer": "wrong key"}"#).unwrap();
        assert!(matches!(reply.into_text(), Err(Error::Protocol { .. })));
    }

    #[test]
    fn reply_empty_response() {
        let reply = ChatReply::response("");
        assert!(matches!(reply.into_text(), Err(Error::Protocol { .. })));
    }

    #[test]
    fn error_wins_over_response() {
        let reply = ChatReply {
            response: Some("text".to_string()),
            error: Some("boom".to_string()),
        };
        assert!(reply.into_text().is_err());
    }
}
