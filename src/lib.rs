//! `reqflow` is a fluent HTTP client layer: chained request configuration,
//! per-attempt filters, pluggable retry coordination and content-negotiated
//! bodies with lazy, memoized response materialization.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use reqflow::prelude::{Client, RetryPolicy};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::builder()
//!         .base_url("https://api.example.com/v1")
//!         .client_name("users-sdk")
//!         .request_timeout(Some(Duration::from_secs(5)))
//!         .try_build()?;
//!     client
//!         .set_bearer_auth("token")?
//!         .set_request_coordinator(RetryPolicy::standard().max_attempts(3));
//!
//!     let user = client.get("users/42")?.as_type::<User>().await?;
//!     println!("{} {}", user.id, user.name);
//!
//!     let response = client.get("users/43")?.with_ignore_http_errors(true).await?;
//!     if !response.is_success() {
//!         println!("lookup failed: {}", response.as_string().await?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Retries
//!
//! The attempt loop has no ceiling of its own. It stops when the request's
//! [`RetryCoordinator`] returns [`RetryDecision::Stop`] or
//! [`RetryDecision::StopWithFailure`], or when the request is cancelled.
//! Without a coordinator every dispatch makes exactly one attempt.

pub(crate) const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

mod client;
mod coordinator;
mod delegating;
mod dispatch;
mod error;
mod filter;
mod formatter;
mod options;
mod request;
mod response;
mod retry;
mod transport;
mod util;

pub use crate::client::{Client, ClientBuilder, TransportOwnership};
pub use crate::coordinator::{FnCoordinator, NoRetry, Outcome, RetryCoordinator, RetryDecision, retry_fn};
pub use crate::delegating::{ApiResponse, ApiResponseExt, DelegatingResponse, TracedResponse};
pub use crate::error::{BoxError, Error, ErrorCode, TransportErrorKind};
pub use crate::filter::{DefaultErrorFilter, FilterChain, HttpFilter, RequestContext};
pub use crate::formatter::{
    APPLICATION_FORM, APPLICATION_JSON, FormUrlEncodedFormatter, Formatter, FormatterRegistry,
    JsonFormatter, PlainTextFormatter, TEXT_PLAIN, media_type_essence,
};
pub use crate::options::{CompletionMode, RequestOptions};
pub use crate::request::Request;
pub use crate::response::{Response, TypedDecoder};
pub use crate::retry::{RetryAttempt, RetryClassifier, RetryPolicy};
pub use crate::transport::{
    BodyStream, HyperTransport, Transport, TransportBody, TransportError, TransportResponse,
};

pub type Result<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::{
        ApiResponse, ApiResponseExt, Client, ClientBuilder, CompletionMode, Error, ErrorCode,
        FilterChain, Formatter, FormatterRegistry, HttpFilter, NoRetry, Request, RequestContext,
        RequestOptions, Response, Result, RetryCoordinator, RetryDecision, RetryPolicy,
        TransportErrorKind, TransportOwnership, retry_fn,
    };
}
