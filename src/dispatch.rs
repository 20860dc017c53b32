use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{Instrument, debug, info_span, warn};

use crate::Result;
use crate::client::TransportOwnership;
use crate::coordinator::RetryDecision;
use crate::error::Error;
use crate::filter::RequestContext;
use crate::request::Request;
use crate::response::Response;
use crate::transport::Transport;
use crate::util::redact_uri_for_logs;

/// Terminal dispatcher shared by a client and every request it creates.
pub(crate) struct Dispatcher {
    transport: Arc<dyn Transport>,
    ownership: TransportOwnership,
    disposed: AtomicBool,
    client_name: String,
    request_timeout: Option<Duration>,
}

impl Dispatcher {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        ownership: TransportOwnership,
        client_name: String,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            transport,
            ownership,
            disposed: AtomicBool::new(false),
            client_name,
            request_timeout,
        }
    }

    pub(crate) fn client_name(&self) -> &str {
        &self.client_name
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::invalid_state(format!(
                "client {} has been disposed",
                self.client_name
            )));
        }
        Ok(())
    }

    /// Returns true only for the call that performed the disposal.
    pub(crate) fn dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        if self.ownership == TransportOwnership::Owned {
            self.transport.shutdown();
        }
        debug!(
            client = %self.client_name,
            ownership = self.ownership.as_str(),
            "client disposed"
        );
        true
    }

    /// One physical attempt. The status code is not interpreted here.
    async fn send(&self, request: &Request, wire: http::Request<Bytes>) -> Result<Response> {
        self.ensure_active()?;
        let redacted_uri = redact_uri_for_logs(&wire.uri().to_string());
        let cancellation = request.cancellation();
        let completion = request.options().completion_mode();
        let transport_call = self.transport.send(wire, completion, cancellation);

        let outcome = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                return Err(Error::Cancelled {
                    method: request.method().clone(),
                    uri: redacted_uri,
                });
            }
            outcome = async {
                match self.request_timeout {
                    Some(limit) => tokio::time::timeout(limit, transport_call).await.ok(),
                    None => Some(transport_call.await),
                }
            } => outcome,
        };

        let Some(outcome) = outcome else {
            return Err(Error::Timeout {
                timeout_ms: self.request_timeout.unwrap_or_default().as_millis(),
                method: request.method().clone(),
                uri: redacted_uri,
            });
        };
        let transport_response = outcome.map_err(|source| {
            let (kind, source) = source.into_parts();
            Error::Transport {
                kind,
                method: request.method().clone(),
                uri: redacted_uri.clone(),
                source,
            }
        })?;
        Ok(Response::new(request.clone(), transport_response))
    }
}

/// Drives the attempt loop for one dispatch of `request`.
///
/// Attempts run strictly one after another. The loop stops only when the
/// coordinator says so or the request is cancelled.
pub(crate) async fn execute(request: &Request) -> Result<Response> {
    let dispatcher = request.dispatcher();
    let redacted_uri = redact_uri_for_logs(&request.uri().to_string());
    let mut attempt = 0_usize;

    loop {
        attempt += 1;
        let span = info_span!(
            "reqflow.request",
            client = %dispatcher.client_name(),
            method = %request.method(),
            uri = %redacted_uri,
            attempt = attempt
        );
        let context = RequestContext::new(
            request.method().clone(),
            redacted_uri.clone(),
            attempt,
            request.options().ignores_http_errors(),
        );

        let outcome = run_attempt(request, &context).instrument(span.clone()).await;
        if let Err(error) = &outcome {
            request.filters().run_error(&context, error);
            if matches!(error, Error::Cancelled { .. }) {
                return outcome;
            }
        }

        let decision = match request.coordinator() {
            Some(coordinator) => coordinator.decide(attempt, request, outcome.as_ref()),
            None => RetryDecision::Stop,
        };
        match decision {
            RetryDecision::Stop => return outcome,
            RetryDecision::StopWithFailure(error) => return Err(error),
            RetryDecision::RetryAfter(delay) => {
                span.in_scope(|| match &outcome {
                    Ok(response) => warn!(
                        delay_ms = delay.as_millis() as u64,
                        status = response.status().as_u16(),
                        "retrying request after response"
                    ),
                    Err(error) => warn!(
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying request after failure"
                    ),
                });
                drop(outcome);
                wait_before_retry(request, &redacted_uri, delay).await?;
            }
        }
    }
}

async fn run_attempt(request: &Request, context: &RequestContext) -> Result<Response> {
    let started = Instant::now();
    let mut wire = request.to_wire()?;
    request.filters().run_request(context, &mut wire)?;

    debug!("sending request");
    let response = request.dispatcher().send(request, wire).await?;
    debug!(
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "received response"
    );
    request.filters().run_response(context, &response)?;
    Ok(response)
}

async fn wait_before_retry(request: &Request, redacted_uri: &str, delay: Duration) -> Result<()> {
    if delay.is_zero() && !request.cancellation().is_cancelled() {
        return Ok(());
    }
    tokio::select! {
        biased;
        _ = request.cancellation().cancelled() => Err(Error::Cancelled {
            method: request.method().clone(),
            uri: redacted_uri.to_owned(),
        }),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
