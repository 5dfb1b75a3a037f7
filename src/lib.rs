// Public modules
pub mod chat;
pub mod client;
pub mod client_logger;
pub mod error;
pub mod observability;
pub mod render;
pub mod types;
pub mod utils;

// Re-exports
pub use chat::{
    ChatSessionController, RejectReason, SessionEvent, SessionObserver, SessionState,
    SubmitOutcome,
};
pub use client::{ChatClient, ChatEndpoint};
pub use client_logger::ClientLogger;
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use render::{PlainTextRenderer, Renderer, SessionView};
pub use types::*;
