//! Logging trait for chat client operations.
//!
//! This module provides the [`ClientLogger`] trait that allows users to capture
//! every exchange passing through the [`ChatClient`](crate::ChatClient).

use crate::Error;
use crate::types::{ChatReply, ChatRequest};

/// A trait for logging chat client operations.
///
/// Implement this trait to record the raw traffic between the client and the
/// chat endpoint.  Calls happen on the task that issued the request.
///
/// # Example
///
/// ```rust,ignore
/// use chatterbox::{ChatReply, ChatRequest, ClientLogger, Error};
/// use std::sync::Mutex;
///
/// struct FileLogger {
///     file: Mutex<std::fs::File>,
/// }
///
/// impl ClientLogger for FileLogger {
///     fn log_request(&self, request: &ChatRequest) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Request: {}", serde_json::to_string(request).unwrap()).unwrap();
///     }
///
///     fn log_reply(&self, reply: &ChatReply) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Reply: {}", serde_json::to_string(reply).unwrap()).unwrap();
///     }
///
///     fn log_failure(&self, error: &Error) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Failure: {error}").unwrap();
///     }
/// }
/// ```
pub trait ClientLogger: Send + Sync {
    /// Log a request just before it is sent.
    fn log_request(&self, request: &ChatRequest);

    /// Log a decoded reply body.
    ///
    /// This is called for every success-status body that parsed, including
    /// bodies that carry an `error` field instead of a response.
    fn log_reply(&self, reply: &ChatReply);

    /// Log a failed exchange.
    ///
    /// This is called once per failed `complete` call with the error that the
    /// caller will receive.
    fn log_failure(&self, error: &Error);
}
