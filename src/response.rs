use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, StatusCode, Version};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::Result;
use crate::error::Error;
use crate::formatter::FormatterRegistry;
use crate::request::Request;
use crate::transport::{BodyStream, TransportBody, TransportResponse};
use crate::util::{lock_unpoisoned, redact_uri_for_logs, truncate_body};

/// Type-erased decoder from the response document to a typed value.
pub type TypedDecoder = fn(&Value) -> Result<Arc<dyn Any + Send + Sync>>;

/// A completed transport response tied to the request that produced it.
///
/// Body accessors are lazy and memoized. The content is read from the
/// transport at most once, decoded by the request's formatter registry at
/// most once, and each typed view is built at most once per target type.
/// Repeated calls return the cached value; typed accessors hand back the
/// same `Arc` every time.
///
/// [`as_stream`](Self::as_stream) takes the raw content without buffering.
/// It can only be taken once and only before any buffered accessor; mixing
/// the two in either order fails with [`Error::ContentAlreadyConsumed`].
///
/// Cloning is cheap and clones share the same memoized state.
#[derive(Clone)]
pub struct Response {
    inner: Arc<ResponseInner>,
}

struct ResponseInner {
    request: Request,
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    source: Mutex<Option<TransportBody>>,
    streamed: AtomicBool,
    bytes: OnceCell<Bytes>,
    text: OnceCell<Arc<str>>,
    document: OnceCell<Arc<Value>>,
    typed: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Response {
    pub(crate) fn new(request: Request, response: TransportResponse) -> Self {
        let (parts, body) = response.into_parts();
        Self {
            inner: Arc::new(ResponseInner {
                request,
                status: parts.status,
                version: parts.version,
                headers: parts.headers,
                source: Mutex::new(Some(body)),
                streamed: AtomicBool::new(false),
                bytes: OnceCell::new(),
                text: OnceCell::new(),
                document: OnceCell::new(),
                typed: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn request(&self) -> &Request {
        &self.inner.request
    }

    pub fn status(&self) -> StatusCode {
        self.inner.status
    }

    pub fn version(&self) -> Version {
        self.inner.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    pub fn content_type(&self) -> Option<&str> {
        self.inner
            .headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    pub fn is_success(&self) -> bool {
        self.inner.status.is_success()
    }

    /// Whether a non-success status is turned into [`Error::HttpStatus`].
    pub fn throws_on_error(&self) -> bool {
        !self.inner.request.options().ignores_http_errors()
    }

    pub fn formatters(&self) -> &FormatterRegistry {
        self.inner.request.formatters()
    }

    /// Returns true when `other` shares this response's memoized state.
    pub fn ptr_eq(&self, other: &Response) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub async fn as_bytes(&self) -> Result<Bytes> {
        if self.inner.streamed.load(Ordering::Acquire) {
            return Err(Error::ContentAlreadyConsumed { accessor: "bytes" });
        }
        self.inner
            .bytes
            .get_or_try_init(|| self.read_source())
            .await
            .cloned()
    }

    /// Content as text; invalid UTF-8 is replaced.
    pub async fn as_string(&self) -> Result<Arc<str>> {
        self.inner
            .text
            .get_or_try_init(|| async {
                let bytes = self.as_bytes().await?;
                Ok(Arc::<str>::from(String::from_utf8_lossy(&bytes).into_owned()))
            })
            .await
            .cloned()
    }

    /// Content decoded by the formatter matching the response content type.
    pub async fn as_document(&self) -> Result<Arc<Value>> {
        self.inner
            .document
            .get_or_try_init(|| async {
                let bytes = self.as_bytes().await?;
                let content_type = self.content_type();
                let formatter = self.formatters().reader_for(content_type).ok_or_else(|| {
                    Error::NoFormatter {
                        direction: "read",
                        content_type: content_type.unwrap_or("<none>").to_owned(),
                    }
                })?;
                let document = formatter.decode(&bytes).map_err(|source| Error::Deserialize {
                    target: "document",
                    body: truncate_body(&bytes),
                    source,
                })?;
                Ok(Arc::new(document))
            })
            .await
            .cloned()
    }

    pub async fn as_type<T>(&self) -> Result<Arc<T>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let value = self.materialize(TypeId::of::<T>(), decode_typed::<T>).await?;
        value
            .downcast::<T>()
            .map_err(|_| Error::invalid_state("memoized response value has an unexpected type"))
    }

    pub async fn as_list<T>(&self) -> Result<Arc<Vec<T>>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.as_type::<Vec<T>>().await
    }

    /// Returns the cached value for `type_id`, decoding it on first use.
    /// When two callers race, the first stored value wins.
    pub async fn materialize(
        &self,
        type_id: TypeId,
        decode: TypedDecoder,
    ) -> Result<Arc<dyn Any + Send + Sync>> {
        let cached = lock_unpoisoned(&self.inner.typed).get(&type_id).cloned();
        if let Some(cached) = cached {
            return Ok(cached);
        }

        let document = self.as_document().await?;
        let decoded = decode(&document)?;
        let mut typed = lock_unpoisoned(&self.inner.typed);
        Ok(typed.entry(type_id).or_insert(decoded).clone())
    }

    /// Takes the raw content without buffering it.
    pub async fn as_stream(&self) -> Result<BodyStream> {
        if self.inner.bytes.initialized() {
            return Err(Error::ContentAlreadyConsumed { accessor: "stream" });
        }
        let source = lock_unpoisoned(&self.inner.source).take();
        let stream: BodyStream = match source {
            Some(TransportBody::Streaming(stream)) => stream,
            Some(TransportBody::Buffered(bytes)) => {
                Box::pin(futures_util::stream::once(async move { Ok(bytes) }))
            }
            None => return Err(Error::ContentAlreadyConsumed { accessor: "stream" }),
        };
        self.inner.streamed.store(true, Ordering::Release);
        Ok(stream)
    }

    /// Status line, headers and buffered content as a plain `http` message.
    pub async fn as_message(&self) -> Result<http::Response<Bytes>> {
        let body = self.as_bytes().await?;
        let mut message = http::Response::new(body);
        *message.status_mut() = self.inner.status;
        *message.version_mut() = self.inner.version;
        *message.headers_mut() = self.inner.headers.clone();
        Ok(message)
    }

    async fn read_source(&self) -> Result<Bytes> {
        let source = lock_unpoisoned(&self.inner.source).take();
        match source {
            Some(TransportBody::Buffered(bytes)) => Ok(bytes),
            Some(TransportBody::Streaming(stream)) => self.collect_stream(stream).await,
            None => Err(Error::ContentAlreadyConsumed { accessor: "bytes" }),
        }
    }

    async fn collect_stream(&self, mut stream: BodyStream) -> Result<Bytes> {
        let cancellation = self.inner.request.cancellation().clone();
        let mut buffer = BytesMut::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    return Err(Error::Cancelled {
                        method: self.inner.request.method().clone(),
                        uri: redact_uri_for_logs(&self.inner.request.uri().to_string()),
                    });
                }
                next = stream.next() => next,
            };
            match next {
                Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                Some(Err(source)) => return Err(Error::ReadBody { source }),
                None => return Ok(buffer.freeze()),
            }
        }
    }
}

pub(crate) fn decode_typed<T>(document: &Value) -> Result<Arc<dyn Any + Send + Sync>>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    let value = T::deserialize(document).map_err(|source| Error::Deserialize {
        target: std::any::type_name::<T>(),
        body: truncate_body(document.to_string().as_bytes()),
        source: Box::new(source),
    })?;
    Ok(Arc::new(value))
}

impl std::fmt::Debug for Response {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Response")
            .field("method", self.inner.request.method())
            .field("uri", &redact_uri_for_logs(&self.inner.request.uri().to_string()))
            .field("status", &self.inner.status)
            .field("version", &self.inner.version)
            .field("headers", &self.inner.headers)
            .field("buffered", &self.inner.bytes.initialized())
            .field("streamed", &self.inner.streamed.load(Ordering::Acquire))
            .finish()
    }
}
