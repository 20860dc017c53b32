use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method, Uri};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio_util::sync::CancellationToken;

use crate::coordinator::{NoRetry, RetryCoordinator};
use crate::dispatch::{self, Dispatcher};
use crate::error::Error;
use crate::filter::{FilterChain, HttpFilter};
use crate::formatter::{Formatter, FormatterRegistry, flatten_pairs};
use crate::options::{CompletionMode, RequestOptions};
use crate::response::Response;
use crate::util::{append_query_pairs, parse_header_name, parse_header_value, sensitive_header_value};
use crate::{IDEMPOTENCY_KEY_HEADER, Result};

/// Client-scoped values copied into each new request.
pub(crate) struct RequestDefaults {
    pub(crate) headers: HeaderMap,
    pub(crate) options: RequestOptions,
    pub(crate) formatters: FormatterRegistry,
    pub(crate) filters: FilterChain,
    pub(crate) coordinator: Option<Arc<dyn RetryCoordinator>>,
}

/// One logical outbound call.
///
/// Configuration methods consume and return the request. Dispatching only
/// borrows it: every physical attempt builds a fresh wire message from the
/// current configuration, so the same request can be sent any number of
/// times and is never altered by retries or filters.
///
/// Awaiting a request sends it:
///
/// ```no_run
/// # async fn run(client: &reqflow::Client) -> reqflow::Result<()> {
/// let response = client.get("users/42")?.with_argument("expand", "teams").await?;
/// println!("{}", response.status());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Request {
    dispatcher: Arc<Dispatcher>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    arguments: Vec<(String, Option<String>)>,
    body: Option<Bytes>,
    options: RequestOptions,
    cancellation: CancellationToken,
    formatters: FormatterRegistry,
    filters: FilterChain,
    coordinator: Option<Arc<dyn RetryCoordinator>>,
}

impl Request {
    pub(crate) fn new(
        dispatcher: Arc<Dispatcher>,
        method: Method,
        uri: Uri,
        defaults: RequestDefaults,
    ) -> Self {
        Self {
            dispatcher,
            method,
            uri,
            headers: defaults.headers,
            arguments: Vec::new(),
            body: None,
            options: defaults.options,
            cancellation: CancellationToken::new(),
            formatters: defaults.formatters,
            filters: defaults.filters,
            coordinator: defaults.coordinator,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Target URI before query arguments are appended.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn arguments(&self) -> &[(String, Option<String>)] {
        &self.arguments
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn formatters(&self) -> &FormatterRegistry {
        &self.formatters
    }

    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    pub fn coordinator(&self) -> Option<&Arc<dyn RetryCoordinator>> {
        self.coordinator.as_ref()
    }

    pub(crate) fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn try_header(self, name: &str, value: &str) -> Result<Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.with_header(name, value))
    }

    pub fn without_header(mut self, name: &str) -> Self {
        self.headers.remove(name);
        self
    }

    pub fn with_authentication(self, scheme: &str, parameter: &str) -> Result<Self> {
        let value = sensitive_header_value(AUTHORIZATION.as_str(), &format!("{scheme} {parameter}"))?;
        Ok(self.with_header(AUTHORIZATION, value))
    }

    pub fn with_bearer_auth(self, token: &str) -> Result<Self> {
        self.with_authentication("Bearer", token)
    }

    pub fn with_idempotency_key(self, key: &str) -> Result<Self> {
        self.try_header(IDEMPOTENCY_KEY_HEADER, key)
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.push((name.into(), Some(value.into())));
        self
    }

    /// A `None` value is a null argument: omitted or sent empty depending on
    /// [`RequestOptions::ignore_null_arguments`].
    pub fn with_optional_argument<V: Into<String>>(
        mut self,
        name: impl Into<String>,
        value: Option<V>,
    ) -> Self {
        self.arguments.push((name.into(), value.map(Into::into)));
        self
    }

    pub fn with_arguments<K, V, I>(mut self, pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.arguments.extend(
            pairs
                .into_iter()
                .map(|(name, value)| (name.into(), Some(value.into()))),
        );
        self
    }

    /// Adds the fields of a flat structured value as query arguments.
    /// `null` fields become null arguments; arrays repeat the name.
    pub fn with_query<T>(mut self, arguments: &T) -> Result<Self>
    where
        T: Serialize + ?Sized,
    {
        let document = serde_json::to_value(arguments).map_err(|source| Error::SerializeQuery {
            message: source.to_string(),
        })?;
        let pairs = flatten_pairs(&document).map_err(|source| Error::SerializeQuery {
            message: source.to_string(),
        })?;
        self.arguments.extend(pairs);
        Ok(self)
    }

    /// Encodes the body with the formatter matching the request's
    /// `content-type`, or the registry's first formatter when none is set.
    pub fn with_body<T>(self, value: &T) -> Result<Self>
    where
        T: Serialize + ?Sized,
    {
        let content_type = self.content_type();
        let formatter = self
            .formatters
            .writer_for(content_type.as_deref())
            .cloned()
            .ok_or_else(|| Error::NoFormatter {
                direction: "write",
                content_type: content_type.unwrap_or_else(|| "<none>".to_owned()),
            })?;
        self.with_body_as(value, formatter.as_ref())
    }

    pub fn with_body_as<T>(mut self, value: &T, formatter: &dyn Formatter) -> Result<Self>
    where
        T: Serialize + ?Sized,
    {
        let serialize_error = |source| Error::Serialize {
            content_type: formatter.media_type().to_owned(),
            source,
        };
        let document = serde_json::to_value(value).map_err(|source| serialize_error(source.into()))?;
        let encoded = formatter.encode(&document).map_err(serialize_error)?;

        let keeps_content_type = self
            .content_type()
            .is_some_and(|content_type| formatter.can_write(&content_type));
        if !keeps_content_type {
            self.headers
                .insert(CONTENT_TYPE, HeaderValue::from_static(formatter.media_type()));
        }
        self.body = Some(encoded);
        Ok(self)
    }

    /// Sends the bytes as-is; set `content-type` separately if needed.
    pub fn with_raw_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Values set in `options` override the ones already on the request.
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options.merged_over(&self.options);
        self
    }

    pub fn with_ignore_http_errors(self, ignore: bool) -> Self {
        self.with_options(RequestOptions::new().with_ignore_http_errors(ignore))
    }

    pub fn with_completion(self, completion: CompletionMode) -> Self {
        self.with_options(RequestOptions::new().with_completion(completion))
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_retry_coordinator(mut self, coordinator: impl RetryCoordinator + 'static) -> Self {
        self.coordinator = Some(Arc::new(coordinator));
        self
    }

    pub fn with_retry_coordinator_arc(mut self, coordinator: Arc<dyn RetryCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn without_retry(self) -> Self {
        self.with_retry_coordinator(NoRetry)
    }

    pub fn with_filter(mut self, filter: impl HttpFilter + 'static) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn without_filter<F: HttpFilter>(mut self) -> Self {
        self.filters.remove::<F>();
        self
    }

    fn content_type(&self) -> Option<String> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(ToOwned::to_owned)
    }

    /// Query pairs after applying the null-argument option.
    pub(crate) fn resolved_arguments(&self) -> Vec<(String, String)> {
        let ignore_null = self.options.ignores_null_arguments();
        self.arguments
            .iter()
            .filter_map(|(name, value)| match value {
                Some(value) => Some((name.clone(), value.clone())),
                None if ignore_null => None,
                None => Some((name.clone(), String::new())),
            })
            .collect()
    }

    /// Builds an independent wire message for one physical attempt.
    pub fn to_wire(&self) -> Result<http::Request<Bytes>> {
        let uri = append_query_pairs(&self.uri, &self.resolved_arguments())?;
        let mut request = http::Request::builder()
            .method(self.method.clone())
            .uri(uri)
            .body(self.body.clone().unwrap_or_default())
            .map_err(|source| Error::RequestBuild { source })?;
        *request.headers_mut() = self.headers.clone();
        Ok(request)
    }

    pub async fn send(&self) -> Result<Response> {
        dispatch::execute(self).await
    }

    pub async fn as_type<T>(&self) -> Result<Arc<T>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.send().await?.as_type::<T>().await
    }

    pub async fn as_list<T>(&self) -> Result<Arc<Vec<T>>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.send().await?.as_list::<T>().await
    }

    pub async fn as_bytes(&self) -> Result<Bytes> {
        self.send().await?.as_bytes().await
    }

    pub async fn as_string(&self) -> Result<Arc<str>> {
        self.send().await?.as_string().await
    }

    /// Blocks the calling thread until the dispatch completes.
    ///
    /// Inside a multi-thread runtime the worker is handed off with
    /// `block_in_place`; outside any runtime a private current-thread runtime
    /// drives the dispatch. Calling this from a current-thread runtime fails
    /// with [`Error::InvalidState`] since it would stall that runtime.
    pub fn wait(&self) -> Result<Response> {
        match Handle::try_current() {
            Ok(handle) => match handle.runtime_flavor() {
                RuntimeFlavor::CurrentThread => Err(Error::invalid_state(
                    "wait() cannot block a current-thread runtime; await the request instead",
                )),
                _ => tokio::task::block_in_place(|| handle.block_on(self.send())),
            },
            Err(_) => {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|source| {
                        Error::invalid_state(format!("failed to start blocking runtime: {source}"))
                    })?;
                runtime.block_on(self.send())
            }
        }
    }
}

impl IntoFuture for Request {
    type Output = Result<Response>;
    type IntoFuture = Pin<Box<dyn Future<Output = Result<Response>> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.send().await })
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Request")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("headers", &self.headers)
            .field("arguments", &self.arguments)
            .field("body_len", &self.body.as_ref().map(Bytes::len))
            .field("options", &self.options)
            .field("filters", &self.filters)
            .field("has_coordinator", &self.coordinator.is_some())
            .finish()
    }
}
