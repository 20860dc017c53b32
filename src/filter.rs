use std::any::Any;
use std::sync::Arc;

use bytes::Bytes;
use http::Method;

use crate::Result;
use crate::error::Error;
use crate::response::Response;

/// Per-attempt information handed to filters.
#[derive(Clone, Debug)]
pub struct RequestContext {
    method: Method,
    uri: String,
    attempt: usize,
    http_errors_ignored: bool,
}

impl RequestContext {
    pub(crate) fn new(method: Method, uri: String, attempt: usize, http_errors_ignored: bool) -> Self {
        Self {
            method,
            uri,
            attempt,
            http_errors_ignored,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Target URI with credentials and query removed.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// One-based physical attempt number.
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    pub fn http_errors_ignored(&self) -> bool {
        self.http_errors_ignored
    }
}

/// Hooks run around every physical attempt, in registration order.
///
/// `on_request` may mutate the outbound wire message (e.g. to refresh
/// credentials). `on_response` may reject a response by returning an error;
/// that error becomes the attempt's outcome and is seen by the retry
/// coordinator.
pub trait HttpFilter: Any + Send + Sync {
    fn on_request(&self, _context: &RequestContext, _request: &mut http::Request<Bytes>) -> Result<()> {
        Ok(())
    }

    fn on_response(&self, _context: &RequestContext, _response: &Response) -> Result<()> {
        Ok(())
    }

    fn on_error(&self, _context: &RequestContext, _error: &Error) {}

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Turns non-success status codes into [`Error::HttpStatus`] unless the
/// request ignores HTTP errors.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultErrorFilter;

impl HttpFilter for DefaultErrorFilter {
    fn on_response(&self, context: &RequestContext, response: &Response) -> Result<()> {
        if context.http_errors_ignored() || response.status().is_success() {
            return Ok(());
        }
        Err(Error::HttpStatus {
            status: response.status().as_u16(),
            method: context.method().clone(),
            uri: context.uri().to_owned(),
            response: Box::new(response.clone()),
        })
    }
}

/// Ordered filter list. A new chain starts with [`DefaultErrorFilter`].
#[derive(Clone)]
pub struct FilterChain {
    filters: Vec<Arc<dyn HttpFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self {
            filters: vec![Arc::new(DefaultErrorFilter)],
        }
    }

    pub fn empty() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    pub fn push(&mut self, filter: impl HttpFilter + 'static) -> &mut Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn push_arc(&mut self, filter: Arc<dyn HttpFilter>) -> &mut Self {
        self.filters.push(filter);
        self
    }

    /// Removes every filter of type `F`; returns whether any was removed.
    pub fn remove<F: HttpFilter>(&mut self) -> bool {
        let before = self.filters.len();
        self.filters.retain(|filter| !is_filter::<F>(filter));
        before != self.filters.len()
    }

    pub fn contains<F: HttpFilter>(&self) -> bool {
        self.filters.iter().any(is_filter::<F>)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn HttpFilter>> {
        self.filters.iter()
    }

    pub(crate) fn run_request(
        &self,
        context: &RequestContext,
        request: &mut http::Request<Bytes>,
    ) -> Result<()> {
        for filter in &self.filters {
            filter.on_request(context, request)?;
        }
        Ok(())
    }

    pub(crate) fn run_response(&self, context: &RequestContext, response: &Response) -> Result<()> {
        for filter in &self.filters {
            filter.on_response(context, response)?;
        }
        Ok(())
    }

    pub(crate) fn run_error(&self, context: &RequestContext, error: &Error) {
        for filter in &self.filters {
            filter.on_error(context, error);
        }
    }
}

fn is_filter<F: HttpFilter>(filter: &Arc<dyn HttpFilter>) -> bool {
    let filter: &dyn Any = &**filter;
    filter.is::<F>()
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_list()
            .entries(self.filters.iter().map(|filter| filter.name()))
            .finish()
    }
}
