use http::{Method, StatusCode};
use thiserror::Error;

use crate::response::Response;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportErrorKind {
    Dns,
    Connect,
    Tls,
    Read,
    Closed,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::Tls => "tls",
            Self::Read => "read",
            Self::Closed => "closed",
            Self::Other => "other",
        };
        formatter.write_str(text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    InvalidUri,
    InvalidHeaderName,
    InvalidHeaderValue,
    RequestBuild,
    Serialize,
    SerializeQuery,
    NoFormatter,
    Transport,
    Timeout,
    HttpStatus,
    ReadBody,
    Deserialize,
    ContentAlreadyConsumed,
    InvalidState,
    Cancelled,
    TlsInit,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUri => "invalid_uri",
            Self::InvalidHeaderName => "invalid_header_name",
            Self::InvalidHeaderValue => "invalid_header_value",
            Self::RequestBuild => "request_build",
            Self::Serialize => "serialize",
            Self::SerializeQuery => "serialize_query",
            Self::NoFormatter => "no_formatter",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::HttpStatus => "http_status",
            Self::ReadBody => "read_body",
            Self::Deserialize => "deserialize",
            Self::ContentAlreadyConsumed => "content_already_consumed",
            Self::InvalidState => "invalid_state",
            Self::Cancelled => "cancelled",
            Self::TlsInit => "tls_init",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid request uri: {uri}")]
    InvalidUri { uri: String },
    #[error("invalid header name {name}: {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: http::header::InvalidHeaderName,
    },
    #[error("invalid header value for {name}: {source}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    #[error("failed to build http request: {source}")]
    RequestBuild {
        #[source]
        source: http::Error,
    },
    #[error("failed to encode request body as {content_type}: {source}")]
    Serialize {
        content_type: String,
        #[source]
        source: BoxError,
    },
    #[error("failed to encode request arguments: {message}")]
    SerializeQuery { message: String },
    #[error("no formatter can {direction} content type {content_type}")]
    NoFormatter {
        direction: &'static str,
        content_type: String,
    },
    #[error("http transport error ({kind}) for {method} {uri}: {source}")]
    Transport {
        kind: TransportErrorKind,
        method: Method,
        uri: String,
        #[source]
        source: BoxError,
    },
    #[error("http request timed out after {timeout_ms}ms for {method} {uri}")]
    Timeout {
        timeout_ms: u128,
        method: Method,
        uri: String,
    },
    #[error("http status error {status} for {method} {uri}")]
    HttpStatus {
        status: u16,
        method: Method,
        uri: String,
        response: Box<Response>,
    },
    #[error("failed to read response body: {source}")]
    ReadBody {
        #[source]
        source: BoxError,
    },
    #[error("failed to decode response body as {target}: {source}; body={body}")]
    Deserialize {
        target: &'static str,
        body: String,
        #[source]
        source: BoxError,
    },
    #[error("response content was already consumed; cannot read it as {accessor}")]
    ContentAlreadyConsumed { accessor: &'static str },
    #[error("invalid state: {message}")]
    InvalidState { message: String },
    #[error("http request was cancelled for {method} {uri}")]
    Cancelled { method: Method, uri: String },
    #[error("failed to initialize tls: {message}")]
    TlsInit { message: String },
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidUri { .. } => ErrorCode::InvalidUri,
            Self::InvalidHeaderName { .. } => ErrorCode::InvalidHeaderName,
            Self::InvalidHeaderValue { .. } => ErrorCode::InvalidHeaderValue,
            Self::RequestBuild { .. } => ErrorCode::RequestBuild,
            Self::Serialize { .. } => ErrorCode::Serialize,
            Self::SerializeQuery { .. } => ErrorCode::SerializeQuery,
            Self::NoFormatter { .. } => ErrorCode::NoFormatter,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::HttpStatus { .. } => ErrorCode::HttpStatus,
            Self::ReadBody { .. } => ErrorCode::ReadBody,
            Self::Deserialize { .. } => ErrorCode::Deserialize,
            Self::ContentAlreadyConsumed { .. } => ErrorCode::ContentAlreadyConsumed,
            Self::InvalidState { .. } => ErrorCode::InvalidState,
            Self::Cancelled { .. } => ErrorCode::Cancelled,
            Self::TlsInit { .. } => ErrorCode::TlsInit,
        }
    }

    /// Connection-level failures, including per-attempt timeouts.
    pub const fn is_transport_failure(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }

    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Self::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::HttpStatus { response, .. } => Some(response.status()),
            _ => None,
        }
    }

    /// The failing response carried by an HTTP status error.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::HttpStatus { response, .. } => Some(response),
            _ => None,
        }
    }

    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }
}
