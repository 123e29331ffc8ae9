use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Shown when no response arrived at all.
pub const NETWORK_MESSAGE: &str = "Network error. Please check your internet connection.";

/// Shown when the request could not be built or sent.
pub const SEND_FAILED_MESSAGE: &str = "Request failed to send.";

/// Maximum length for server-provided error messages
const MAX_ERROR_MESSAGE_LENGTH: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// No response received (connection refused, DNS failure, timeout)
    Network,
    /// 401; the session has been dropped
    Unauthorized,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 5xx
    ServerError,
    /// Any other failure
    RequestFailed,
}

impl ErrorKind {
    /// Classification for a non-2xx status.
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            401 => ErrorKind::Unauthorized,
            403 => ErrorKind::Forbidden,
            404 => ErrorKind::NotFound,
            500..=u16::MAX => ErrorKind::ServerError,
            _ => ErrorKind::RequestFailed,
        }
    }
}

/// Normalized failure of an API call. Transport errors never escape past this.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HttpError {
    pub kind: ErrorKind,
    pub http_status: Option<u16>,
    pub message: String,
}

impl HttpError {
    pub fn network() -> Self {
        Self {
            kind: ErrorKind::Network,
            http_status: None,
            message: NETWORK_MESSAGE.to_string(),
        }
    }

    pub fn send_failed() -> Self {
        Self {
            kind: ErrorKind::RequestFailed,
            http_status: None,
            message: SEND_FAILED_MESSAGE.to_string(),
        }
    }

    /// A request refused before sending because its input cannot form a URL.
    pub fn invalid_request(detail: impl std::fmt::Display) -> Self {
        Self {
            kind: ErrorKind::RequestFailed,
            http_status: None,
            message: format!("Invalid request: {}", detail),
        }
    }

    /// A response that arrived with a non-2xx status.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        Self {
            kind: ErrorKind::from_status(status),
            http_status: Some(status.as_u16()),
            message: message_from_body(body)
                .unwrap_or_else(|| format!("HTTP Error {}", status.as_u16())),
        }
    }

    /// A 2xx response whose body could not be read or decoded.
    pub fn invalid_response(status: StatusCode, detail: impl std::fmt::Display) -> Self {
        Self {
            kind: ErrorKind::RequestFailed,
            http_status: Some(status.as_u16()),
            message: format!("Invalid response: {}", detail),
        }
    }

    /// An error raised by the transport before any response arrived.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_builder() {
            Self::send_failed()
        } else {
            Self::network()
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind == ErrorKind::Unauthorized
    }
}

/// The body's `error` field, else its `message` field.
fn message_from_body(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let message = ["error", "message"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|m| !m.is_empty())?;
    Some(truncate(message))
}

fn truncate(message: &str) -> String {
    if message.len() <= MAX_ERROR_MESSAGE_LENGTH {
        return message.to_string();
    }
    let mut end = MAX_ERROR_MESSAGE_LENGTH;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &message[..end])
}
