//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and configuration
//! structures for controlling chat behavior.

use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::client::{ChatClient, DEFAULT_CHAT_PATH, DEFAULT_TIMEOUT};
use crate::error::Result;

/// Command-line arguments for the chatterbox-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Base URL of the chat service.
    #[arrrg(
        optional,
        "Base URL of the chat service (default: $CHATTERBOX_BASE_URL or http://127.0.0.1:8000)",
        "URL"
    )]
    pub base_url: Option<String>,

    /// Path of the chat route under the base URL.
    #[arrrg(optional, "Chat route under the base URL (default: /chat)", "PATH")]
    pub chat_path: Option<String>,

    /// Transport timeout in seconds.  Zero means the default.
    #[arrrg(optional, "Request timeout in seconds (default: 60)", "SECONDS")]
    pub timeout_secs: Option<u64>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Emit debug diagnostics on stderr.
    #[arrrg(flag, "Log debug diagnostics to stderr")]
    pub verbose: bool,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments with appropriate defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Base URL of the chat service.  `None` defers to the environment.
    pub base_url: Option<String>,

    /// Path of the chat route under the base URL.
    pub chat_path: String,

    /// Transport timeout for each request.
    pub timeout: Duration,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Whether to emit debug diagnostics.
    pub verbose: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Base URL: from the environment, else http://127.0.0.1:8000
    /// - Chat path: /chat
    /// - Timeout: 60 seconds
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            base_url: None,
            chat_path: DEFAULT_CHAT_PATH.to_string(),
            timeout: DEFAULT_TIMEOUT,
            use_color: true,
            verbose: false,
        }
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the chat path.
    pub fn with_chat_path(mut self, chat_path: impl Into<String>) -> Self {
        self.chat_path = chat_path.into();
        self
    }

    /// Sets the transport timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Enables debug diagnostics.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Builds the HTTP client this configuration describes.
    pub fn client(&self) -> Result<ChatClient> {
        ChatClient::with_options(
            self.base_url.clone(),
            Some(self.chat_path.clone()),
            Some(self.timeout),
        )
    }

    /// The default `tracing` filter directive when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "chatterbox=debug,info"
        } else {
            "warn"
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatArgs> for ChatConfig {
    fn from(args: ChatArgs) -> Self {
        let defaults = ChatConfig::new();
        ChatConfig {
            base_url: args.base_url,
            chat_path: args.chat_path.unwrap_or(defaults.chat_path),
            timeout: args
                .timeout_secs
                .filter(|&secs| secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            use_color: !args.no_color,
            verbose: args.verbose,
        }
    }
}
