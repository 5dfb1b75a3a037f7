use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;
use url::Url;

use crate::client_logger::ClientLogger;
use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::types::{ChatReply, ChatRequest};

/// Base URL used when neither an explicit URL nor `CHATTERBOX_BASE_URL` is given.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
/// Path appended to the base URL for chat requests.
pub const DEFAULT_CHAT_PATH: &str = "/chat";
/// Transport timeout applied to every request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const BASE_URL_ENV: &str = "CHATTERBOX_BASE_URL";

/// The outbound half of a chat session.
///
/// The session controller only ever asks for one completion at a time and
/// treats every `Err` the same way, so implementations are free to use the
/// full [`Error`] taxonomy for diagnostics.
#[async_trait::async_trait]
pub trait ChatEndpoint: Send + Sync {
    /// Send `prompt` and return the reply text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[async_trait::async_trait]
impl<E: ChatEndpoint + ?Sized> ChatEndpoint for Arc<E> {
    async fn complete(&self, prompt: &str) -> Result<String> {
        (**self).complete(prompt).await
    }
}

/// HTTP client for the chat endpoint.
#[derive(Clone)]
pub struct ChatClient {
    client: ReqwestClient,
    endpoint: Url,
    timeout: Duration,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl ChatClient {
    /// Create a new chat client.
    ///
    /// The base URL can be provided directly or read from the
    /// CHATTERBOX_BASE_URL environment variable; it falls back to
    /// [`DEFAULT_BASE_URL`].
    pub fn new(base_url: Option<String>) -> Result<Self> {
        Self::with_options(base_url, None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        base_url: Option<String>,
        chat_path: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let base_url = base_url
            .or_else(|| env::var(BASE_URL_ENV).ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let chat_path = chat_path.unwrap_or_else(|| DEFAULT_CHAT_PATH.to_string());
        let endpoint = chat_url(&base_url, &chat_path)?;

        let timeout = timeout
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            endpoint,
            timeout,
            logger: None,
        })
    }

    /// Attach a logger that sees every request, reply, and failure.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The fully resolved chat URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The transport timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Create and return default headers for chat requests.
    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    /// Process a non-success response and convert it to our Error type.
    async fn process_error_response(response: Response) -> Error {
        let status = response.status();
        let status_code = status.as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        // Servers report either {"error": "..."} or, for validation failures,
        // {"detail": ...}.
        #[derive(Deserialize)]
        struct ErrorResponse {
            error: Option<serde_json::Value>,
            detail: Option<serde_json::Value>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {}", e),
                    Some(Box::new(e)),
                );
            }
        };

        let error_message = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.error.or(e.detail))
            .map(|value| match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .unwrap_or_else(|| {
                if error_body.is_empty() {
                    status.to_string()
                } else {
                    error_body.clone()
                }
            });

        match status_code {
            400 | 422 => Error::bad_request(error_message),
            404 => Error::not_found(error_message),
            408 => Error::timeout(error_message, None),
            429 => Error::rate_limit(error_message, retry_after),
            500 => Error::internal_server(error_message),
            502..=504 => Error::service_unavailable(error_message, retry_after),
            _ => Error::api(status_code, error_message),
        }
    }

    /// Send a request and decode the reply body.
    ///
    /// A success status with an undecodable body is a serialization error.  A
    /// decodable body is returned as-is, even when it carries an `error` field;
    /// use [`ChatReply::into_text`] to fail closed on it.
    pub async fn send(&self, request: &ChatRequest) -> Result<ChatReply> {
        if let Some(logger) = &self.logger {
            logger.log_request(request);
        }

        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(self.default_headers())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(
                        format!("Request timed out: {}", e),
                        Some(self.timeout.as_secs_f64()),
                    )
                } else if e.is_connect() {
                    Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
                }
            })?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        let reply = response.json::<ChatReply>().await.map_err(|e| {
            if e.is_timeout() {
                Error::timeout(
                    format!("Timed out reading response: {}", e),
                    Some(self.timeout.as_secs_f64()),
                )
            } else {
                Error::serialization(
                    format!("Failed to parse response: {}", e),
                    Some(Box::new(e)),
                )
            }
        })?;

        if let Some(logger) = &self.logger {
            logger.log_reply(&reply);
        }
        Ok(reply)
    }
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("timeout", &self.timeout)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

#[async_trait::async_trait]
impl ChatEndpoint for ChatClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        tracing::debug!(endpoint = %self.endpoint, prompt_len = prompt.len(), "sending chat request");

        let result = self
            .send(&ChatRequest::new(prompt))
            .await
            .and_then(ChatReply::into_text);
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        if let Err(err) = &result {
            CLIENT_REQUEST_ERRORS.click();
            if let Some(logger) = &self.logger {
                logger.log_failure(err);
            }
        }
        result
    }
}

/// Join a base URL and a chat path into the request URL.
///
/// Unlike `Url::join`, any path already on the base is kept, so a base of
/// `http://host/api` and a path of `/chat` give `http://host/api/chat`.
pub fn chat_url(base_url: &str, chat_path: &str) -> Result<Url> {
    let base = base_url.trim().trim_end_matches('/');
    let path = chat_path.trim().trim_start_matches('/');
    let url = Url::parse(&format!("{base}/{path}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(Error::url(
            format!("unsupported scheme {scheme:?} in {base_url}"),
            None,
        )),
    }
}
