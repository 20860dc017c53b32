use std::sync::Arc;
use std::time::Duration;

use http::header::{AUTHORIZATION, HeaderName, HeaderValue, USER_AGENT};
use http::{HeaderMap, Method};

use crate::Result;
use crate::coordinator::RetryCoordinator;
use crate::dispatch::Dispatcher;
use crate::filter::FilterChain;
use crate::formatter::FormatterRegistry;
use crate::options::RequestOptions;
use crate::request::{Request, RequestDefaults};
use crate::transport::{
    DEFAULT_POOL_IDLE_TIMEOUT, DEFAULT_POOL_MAX_IDLE_PER_HOST, HyperTransport, Transport,
};
use crate::util::{
    parse_header_name, parse_header_value, resolve_uri, sensitive_header_value, validate_base_url,
};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CLIENT_NAME: &str = "reqflow";
const DEFAULT_USER_AGENT: &str = concat!("reqflow/", env!("CARGO_PKG_VERSION"));

/// Whether disposing a client also shuts down its transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportOwnership {
    Owned,
    Borrowed,
}

impl TransportOwnership {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Owned => "owned",
            Self::Borrowed => "borrowed",
        }
    }
}

type RequestMutator = Arc<dyn Fn(Request) -> Request + Send + Sync>;

pub struct ClientBuilder {
    base_url: Option<String>,
    client_name: String,
    default_headers: HeaderMap,
    options: RequestOptions,
    coordinator: Option<Arc<dyn RetryCoordinator>>,
    request_timeout: Option<Duration>,
    pool_idle_timeout: Duration,
    pool_max_idle_per_host: usize,
    transport: Option<(Arc<dyn Transport>, TransportOwnership)>,
    formatters: FormatterRegistry,
    filters: FilterChain,
}

impl ClientBuilder {
    pub(crate) fn new() -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        Self {
            base_url: None,
            client_name: DEFAULT_CLIENT_NAME.to_owned(),
            default_headers,
            options: RequestOptions::new(),
            coordinator: None,
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            pool_idle_timeout: DEFAULT_POOL_IDLE_TIMEOUT,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            transport: None,
            formatters: FormatterRegistry::default(),
            filters: FilterChain::new(),
        }
    }

    /// Relative request targets are resolved against this URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Name recorded on every request span.
    pub fn client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = client_name.into();
        self
    }

    pub fn user_agent(mut self, user_agent: HeaderValue) -> Self {
        self.default_headers.insert(USER_AGENT, user_agent);
        self
    }

    pub fn default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    pub fn try_default_header(self, name: &str, value: &str) -> Result<Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.default_header(name, value))
    }

    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options.merged_over(&self.options);
        self
    }

    pub fn retry_coordinator(mut self, coordinator: impl RetryCoordinator + 'static) -> Self {
        self.coordinator = Some(Arc::new(coordinator));
        self
    }

    /// Per-attempt limit on the transport call; `None` disables it.
    pub fn request_timeout(mut self, request_timeout: Option<Duration>) -> Self {
        self.request_timeout = request_timeout.map(|timeout| timeout.max(Duration::from_millis(1)));
        self
    }

    pub fn pool_idle_timeout(mut self, pool_idle_timeout: Duration) -> Self {
        self.pool_idle_timeout = pool_idle_timeout;
        self
    }

    pub fn pool_max_idle_per_host(mut self, pool_max_idle_per_host: usize) -> Self {
        self.pool_max_idle_per_host = pool_max_idle_per_host;
        self
    }

    /// Uses `transport` instead of building a [`HyperTransport`]. A borrowed
    /// transport is never shut down by the client.
    pub fn transport(mut self, transport: Arc<dyn Transport>, ownership: TransportOwnership) -> Self {
        self.transport = Some((transport, ownership));
        self
    }

    pub fn formatters(mut self, formatters: FormatterRegistry) -> Self {
        self.formatters = formatters;
        self
    }

    pub fn filters(mut self, filters: FilterChain) -> Self {
        self.filters = filters;
        self
    }

    pub fn try_build(self) -> Result<Client> {
        if let Some(base_url) = &self.base_url {
            validate_base_url(base_url)?;
        }
        let (transport, ownership) = match self.transport {
            Some(injected) => injected,
            None => {
                let transport: Arc<dyn Transport> = Arc::new(HyperTransport::with_pool(
                    self.pool_idle_timeout,
                    self.pool_max_idle_per_host,
                )?);
                (transport, TransportOwnership::Owned)
            }
        };

        Ok(Client {
            base_url: self.base_url,
            dispatcher: Arc::new(Dispatcher::new(
                transport,
                ownership,
                self.client_name,
                self.request_timeout,
            )),
            default_headers: self.default_headers,
            options: self.options,
            coordinator: self.coordinator,
            formatters: self.formatters,
            filters: self.filters,
            defaults: Vec::new(),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Factory for [`Request`]s and owner of their shared configuration.
///
/// Setters change client-scoped defaults only. Every request snapshots the
/// headers, options, coordinator, formatters and filters at creation, so
/// later changes never reach requests that already exist.
///
/// Dropping the client disposes it.
pub struct Client {
    base_url: Option<String>,
    dispatcher: Arc<Dispatcher>,
    default_headers: HeaderMap,
    options: RequestOptions,
    coordinator: Option<Arc<dyn RetryCoordinator>>,
    formatters: FormatterRegistry,
    filters: FilterChain,
    defaults: Vec<RequestMutator>,
}

impl Client {
    /// Client without a base URL over an owned default transport.
    pub fn new() -> Result<Self> {
        ClientBuilder::new().try_build()
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        ClientBuilder::new().base_url(base_url).try_build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn client_name(&self) -> &str {
        self.dispatcher.client_name()
    }

    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    pub fn formatters(&self) -> &FormatterRegistry {
        &self.formatters
    }

    pub fn formatters_mut(&mut self) -> &mut FormatterRegistry {
        &mut self.formatters
    }

    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut FilterChain {
        &mut self.filters
    }

    /// Sends `Authorization: <scheme> <parameter>` on every new request.
    pub fn set_authentication(&mut self, scheme: &str, parameter: &str) -> Result<&mut Self> {
        let value = sensitive_header_value(AUTHORIZATION.as_str(), &format!("{scheme} {parameter}"))?;
        self.default_headers.insert(AUTHORIZATION, value);
        Ok(self)
    }

    pub fn set_bearer_auth(&mut self, token: &str) -> Result<&mut Self> {
        self.set_authentication("Bearer", token)
    }

    pub fn set_user_agent(&mut self, user_agent: &str) -> Result<&mut Self> {
        let value = parse_header_value(USER_AGENT.as_str(), user_agent)?;
        self.default_headers.insert(USER_AGENT, value);
        Ok(self)
    }

    pub fn set_default_header(&mut self, name: &str, value: &str) -> Result<&mut Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Values set in `options` override the current client defaults.
    pub fn set_options(&mut self, options: RequestOptions) -> &mut Self {
        self.options = options.merged_over(&self.options);
        self
    }

    pub fn set_request_coordinator(
        &mut self,
        coordinator: impl RetryCoordinator + 'static,
    ) -> &mut Self {
        self.coordinator = Some(Arc::new(coordinator));
        self
    }

    pub fn clear_request_coordinator(&mut self) -> &mut Self {
        self.coordinator = None;
        self
    }

    /// Registers a transformation applied to every new request, after the
    /// client defaults and before the caller sees it.
    pub fn add_default<F>(&mut self, mutator: F) -> &mut Self
    where
        F: Fn(Request) -> Request + Send + Sync + 'static,
    {
        self.defaults.push(Arc::new(mutator));
        self
    }

    pub fn new_request(&self, method: Method, uri: impl AsRef<str>) -> Result<Request> {
        self.dispatcher.ensure_active()?;
        let uri = resolve_uri(self.base_url.as_deref(), uri.as_ref())?;
        let defaults = RequestDefaults {
            headers: self.default_headers.clone(),
            options: self.options,
            formatters: self.formatters.clone(),
            filters: self.filters.clone(),
            coordinator: self.coordinator.clone(),
        };
        let request = Request::new(Arc::clone(&self.dispatcher), method, uri, defaults);
        Ok(self
            .defaults
            .iter()
            .fold(request, |request, mutator| mutator(request)))
    }

    pub fn get(&self, uri: impl AsRef<str>) -> Result<Request> {
        self.new_request(Method::GET, uri)
    }

    pub fn post(&self, uri: impl AsRef<str>) -> Result<Request> {
        self.new_request(Method::POST, uri)
    }

    pub fn put(&self, uri: impl AsRef<str>) -> Result<Request> {
        self.new_request(Method::PUT, uri)
    }

    pub fn patch(&self, uri: impl AsRef<str>) -> Result<Request> {
        self.new_request(Method::PATCH, uri)
    }

    pub fn delete(&self, uri: impl AsRef<str>) -> Result<Request> {
        self.new_request(Method::DELETE, uri)
    }

    pub fn head(&self, uri: impl AsRef<str>) -> Result<Request> {
        self.new_request(Method::HEAD, uri)
    }

    /// Idempotent. Shuts the transport down only when the client owns it.
    /// Requests created earlier fail with [`crate::Error::InvalidState`]
    /// when dispatched afterwards.
    pub fn dispose(&self) {
        self.dispatcher.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.dispatcher.is_disposed()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Client")
            .field("client_name", &self.client_name())
            .field("base_url", &self.base_url)
            .field("options", &self.options)
            .field("formatters", &self.formatters)
            .field("filters", &self.filters)
            .field("has_coordinator", &self.coordinator.is_some())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
