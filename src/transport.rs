use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use futures_util::TryStreamExt;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{BoxError, Error, TransportErrorKind};
use crate::options::CompletionMode;
use crate::util::{classify_transport_error, lock_unpoisoned};

pub(crate) const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
pub(crate) const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 8;

pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// Response content as handed over by a transport.
pub enum TransportBody {
    Buffered(Bytes),
    Streaming(BodyStream),
}

impl TransportBody {
    pub fn empty() -> Self {
        Self::Buffered(Bytes::new())
    }
}

impl std::fmt::Debug for TransportBody {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffered(body) => formatter
                .debug_tuple("Buffered")
                .field(&body.len())
                .finish(),
            Self::Streaming(_) => formatter.write_str("Streaming(..)"),
        }
    }
}

pub type TransportResponse = Response<TransportBody>;

#[derive(Debug)]
pub struct TransportError {
    kind: TransportErrorKind,
    source: BoxError,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, source: impl Into<BoxError>) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub(crate) fn into_parts(self) -> (TransportErrorKind, BoxError) {
        (self.kind, self.source)
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{} transport error: {}", self.kind, self.source)
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// The capability that physically sends a request.
///
/// Implementations receive a fresh wire message per attempt and must not
/// interpret the status code; error translation happens in the filter chain.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: Request<Bytes>,
        completion: CompletionMode,
        cancellation: &CancellationToken,
    ) -> Result<TransportResponse, TransportError>;

    /// Releases pooled resources. Only called by a client that owns the
    /// transport.
    fn shutdown(&self) {}
}

type HyperClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Default transport: a pooled hyper client over rustls with webpki roots.
pub struct HyperTransport {
    client: Mutex<Option<HyperClient>>,
}

impl HyperTransport {
    pub fn new() -> Result<Self, Error> {
        Self::with_pool(DEFAULT_POOL_IDLE_TIMEOUT, DEFAULT_POOL_MAX_IDLE_PER_HOST)
    }

    pub fn with_pool(
        pool_idle_timeout: Duration,
        pool_max_idle_per_host: usize,
    ) -> Result<Self, Error> {
        let https = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
            .map_err(|source| Error::TlsInit {
                message: source.to_string(),
            })?
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(pool_idle_timeout.max(Duration::from_millis(1)))
            .pool_max_idle_per_host(pool_max_idle_per_host.max(1))
            .build(https);
        Ok(Self {
            client: Mutex::new(Some(client)),
        })
    }

    pub fn is_shut_down(&self) -> bool {
        lock_unpoisoned(&self.client).is_none()
    }
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HyperTransport")
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(
        &self,
        request: Request<Bytes>,
        completion: CompletionMode,
        _cancellation: &CancellationToken,
    ) -> Result<TransportResponse, TransportError> {
        let client = lock_unpoisoned(&self.client).clone().ok_or_else(|| {
            TransportError::new(TransportErrorKind::Closed, "transport has been shut down")
        })?;

        let (parts, body) = request.into_parts();
        let response = client
            .request(Request::from_parts(parts, Full::new(body)))
            .await
            .map_err(|source| TransportError::new(classify_transport_error(&source), source))?;

        let (parts, incoming) = response.into_parts();
        let body = match completion {
            CompletionMode::Buffered => {
                let collected = incoming
                    .collect()
                    .await
                    .map_err(|source| TransportError::new(TransportErrorKind::Read, source))?;
                TransportBody::Buffered(collected.to_bytes())
            }
            CompletionMode::Streaming => TransportBody::Streaming(Box::pin(
                incoming
                    .into_data_stream()
                    .map_err(|source| Box::new(source) as BoxError),
            )),
        };
        Ok(Response::from_parts(parts, body))
    }

    fn shutdown(&self) {
        if lock_unpoisoned(&self.client).take().is_some() {
            debug!("hyper transport connection pool released");
        }
    }
}
