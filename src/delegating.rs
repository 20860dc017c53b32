use std::any::{Any, TypeId};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::Result;
use crate::error::Error;
use crate::formatter::FormatterRegistry;
use crate::request::Request;
use crate::response::{Response, TypedDecoder, decode_typed};
use crate::transport::BodyStream;

/// Accessor surface shared by [`Response`] and its decorators.
#[async_trait]
pub trait ApiResponse: Send + Sync {
    fn request(&self) -> &Request;

    fn status(&self) -> StatusCode;

    fn headers(&self) -> &HeaderMap;

    fn throws_on_error(&self) -> bool;

    fn formatters(&self) -> &FormatterRegistry;

    async fn as_message(&self) -> Result<http::Response<Bytes>>;

    async fn as_bytes(&self) -> Result<Bytes>;

    async fn as_string(&self) -> Result<Arc<str>>;

    async fn as_stream(&self) -> Result<BodyStream>;

    async fn as_document(&self) -> Result<Arc<Value>>;

    async fn materialize(
        &self,
        type_id: TypeId,
        decode: TypedDecoder,
    ) -> Result<Arc<dyn Any + Send + Sync>>;
}

#[async_trait]
impl ApiResponse for Response {
    fn request(&self) -> &Request {
        Response::request(self)
    }

    fn status(&self) -> StatusCode {
        Response::status(self)
    }

    fn headers(&self) -> &HeaderMap {
        Response::headers(self)
    }

    fn throws_on_error(&self) -> bool {
        Response::throws_on_error(self)
    }

    fn formatters(&self) -> &FormatterRegistry {
        Response::formatters(self)
    }

    async fn as_message(&self) -> Result<http::Response<Bytes>> {
        Response::as_message(self).await
    }

    async fn as_bytes(&self) -> Result<Bytes> {
        Response::as_bytes(self).await
    }

    async fn as_string(&self) -> Result<Arc<str>> {
        Response::as_string(self).await
    }

    async fn as_stream(&self) -> Result<BodyStream> {
        Response::as_stream(self).await
    }

    async fn as_document(&self) -> Result<Arc<Value>> {
        Response::as_document(self).await
    }

    async fn materialize(
        &self,
        type_id: TypeId,
        decode: TypedDecoder,
    ) -> Result<Arc<dyn Any + Send + Sync>> {
        Response::materialize(self, type_id, decode).await
    }
}

/// Decorator base for responses.
///
/// Implementors only supply [`inner`](Self::inner); every accessor forwards
/// to it unless overridden. Any type implementing this trait is an
/// [`ApiResponse`], so decorators nest. Forwarding always reaches the
/// innermost [`Response`], which keeps its decode-once memoization no matter
/// how many layers sit on top.
#[async_trait]
pub trait DelegatingResponse: Send + Sync {
    fn inner(&self) -> &dyn ApiResponse;

    fn request(&self) -> &Request {
        self.inner().request()
    }

    fn status(&self) -> StatusCode {
        self.inner().status()
    }

    fn headers(&self) -> &HeaderMap {
        self.inner().headers()
    }

    fn throws_on_error(&self) -> bool {
        self.inner().throws_on_error()
    }

    fn formatters(&self) -> &FormatterRegistry {
        self.inner().formatters()
    }

    async fn as_message(&self) -> Result<http::Response<Bytes>> {
        self.inner().as_message().await
    }

    async fn as_bytes(&self) -> Result<Bytes> {
        self.inner().as_bytes().await
    }

    async fn as_string(&self) -> Result<Arc<str>> {
        self.inner().as_string().await
    }

    async fn as_stream(&self) -> Result<BodyStream> {
        self.inner().as_stream().await
    }

    async fn as_document(&self) -> Result<Arc<Value>> {
        self.inner().as_document().await
    }

    async fn materialize(
        &self,
        type_id: TypeId,
        decode: TypedDecoder,
    ) -> Result<Arc<dyn Any + Send + Sync>> {
        self.inner().materialize(type_id, decode).await
    }
}

#[async_trait]
impl<D> ApiResponse for D
where
    D: DelegatingResponse,
{
    fn request(&self) -> &Request {
        DelegatingResponse::request(self)
    }

    fn status(&self) -> StatusCode {
        DelegatingResponse::status(self)
    }

    fn headers(&self) -> &HeaderMap {
        DelegatingResponse::headers(self)
    }

    fn throws_on_error(&self) -> bool {
        DelegatingResponse::throws_on_error(self)
    }

    fn formatters(&self) -> &FormatterRegistry {
        DelegatingResponse::formatters(self)
    }

    async fn as_message(&self) -> Result<http::Response<Bytes>> {
        DelegatingResponse::as_message(self).await
    }

    async fn as_bytes(&self) -> Result<Bytes> {
        DelegatingResponse::as_bytes(self).await
    }

    async fn as_string(&self) -> Result<Arc<str>> {
        DelegatingResponse::as_string(self).await
    }

    async fn as_stream(&self) -> Result<BodyStream> {
        DelegatingResponse::as_stream(self).await
    }

    async fn as_document(&self) -> Result<Arc<Value>> {
        DelegatingResponse::as_document(self).await
    }

    async fn materialize(
        &self,
        type_id: TypeId,
        decode: TypedDecoder,
    ) -> Result<Arc<dyn Any + Send + Sync>> {
        DelegatingResponse::materialize(self, type_id, decode).await
    }
}

/// Typed accessors for any [`ApiResponse`], including trait objects.
#[async_trait]
pub trait ApiResponseExt: ApiResponse {
    async fn as_type<T>(&self) -> Result<Arc<T>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let value = self.materialize(TypeId::of::<T>(), decode_typed::<T>).await?;
        value
            .downcast::<T>()
            .map_err(|_| Error::invalid_state("memoized response value has an unexpected type"))
    }

    async fn as_list<T>(&self) -> Result<Arc<Vec<T>>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.as_type::<Vec<T>>().await
    }
}

impl<R: ApiResponse + ?Sized> ApiResponseExt for R {}

/// Decorator that logs each body materialization at debug level.
pub struct TracedResponse<R> {
    inner: R,
}

impl<R: ApiResponse> TracedResponse<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn record<T>(&self, accessor: &'static str, started: Instant, result: &Result<T>) {
        debug!(
            status = self.inner.status().as_u16(),
            accessor,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "response content materialized"
        );
    }
}

#[async_trait]
impl<R: ApiResponse> DelegatingResponse for TracedResponse<R> {
    fn inner(&self) -> &dyn ApiResponse {
        &self.inner
    }

    async fn as_bytes(&self) -> Result<Bytes> {
        let started = Instant::now();
        let result = self.inner.as_bytes().await;
        self.record("bytes", started, &result);
        result
    }

    async fn as_string(&self) -> Result<Arc<str>> {
        let started = Instant::now();
        let result = self.inner.as_string().await;
        self.record("string", started, &result);
        result
    }

    async fn as_document(&self) -> Result<Arc<Value>> {
        let started = Instant::now();
        let result = self.inner.as_document().await;
        self.record("document", started, &result);
        result
    }

    async fn materialize(
        &self,
        type_id: TypeId,
        decode: TypedDecoder,
    ) -> Result<Arc<dyn Any + Send + Sync>> {
        let started = Instant::now();
        let result = self.inner.materialize(type_id, decode).await;
        self.record("typed", started, &result);
        result
    }
}

impl<R: ApiResponse> std::fmt::Debug for TracedResponse<R> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TracedResponse")
            .field("status", &self.inner.status())
            .finish()
    }
}
