use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use http::{HeaderMap, Method, StatusCode};
use rand::Rng;

use crate::IDEMPOTENCY_KEY_HEADER;
use crate::coordinator::{Outcome, RetryCoordinator, RetryDecision};
use crate::error::{Error, TransportErrorKind};
use crate::request::Request;
use crate::util::parse_retry_after;

/// Classified view of one attempt, as seen by a [`RetryClassifier`].
#[derive(Clone, Debug)]
pub struct RetryAttempt {
    pub attempt: usize,
    pub max_attempts: usize,
    pub method: Method,
    pub status: Option<StatusCode>,
    pub transport_error_kind: Option<TransportErrorKind>,
    pub timed_out: bool,
}

pub trait RetryClassifier: Send + Sync {
    fn should_retry(&self, attempt: &RetryAttempt) -> bool;
}

/// Bounded exponential backoff with jitter.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_backoff: Duration,
    max_backoff: Duration,
    jitter_ratio: f64,
    retryable_status_codes: BTreeSet<u16>,
    retryable_transport_error_kinds: BTreeSet<TransportErrorKind>,
    retry_on_timeout: bool,
    respect_retry_after: bool,
    retry_non_idempotent: bool,
    retry_classifier: Option<Arc<dyn RetryClassifier>>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_backoff", &self.base_backoff)
            .field("max_backoff", &self.max_backoff)
            .field("jitter_ratio", &self.jitter_ratio)
            .field("retryable_status_codes", &self.retryable_status_codes)
            .field(
                "retryable_transport_error_kinds",
                &self.retryable_transport_error_kinds,
            )
            .field("retry_on_timeout", &self.retry_on_timeout)
            .field("respect_retry_after", &self.respect_retry_after)
            .field("retry_non_idempotent", &self.retry_non_idempotent)
            .finish()
    }
}

impl RetryPolicy {
    pub fn standard() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            jitter_ratio: 0.2,
            retryable_status_codes: default_retryable_status_codes(),
            retryable_transport_error_kinds: default_retryable_transport_error_kinds(),
            retry_on_timeout: true,
            respect_retry_after: true,
            retry_non_idempotent: false,
            retry_classifier: None,
        }
    }

    /// Total attempts including the first one.
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn base_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff = base_backoff.max(Duration::from_millis(1));
        if self.max_backoff < self.base_backoff {
            self.max_backoff = self.base_backoff;
        }
        self
    }

    pub fn max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff.max(self.base_backoff);
        self
    }

    pub fn jitter_ratio(mut self, jitter_ratio: f64) -> Self {
        self.jitter_ratio = jitter_ratio.clamp(0.0, 1.0);
        self
    }

    pub fn retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }

    pub fn retryable_transport_error_kinds(
        mut self,
        kinds: impl IntoIterator<Item = TransportErrorKind>,
    ) -> Self {
        self.retryable_transport_error_kinds = kinds.into_iter().collect();
        self
    }

    pub fn retry_on_timeout(mut self, retry: bool) -> Self {
        self.retry_on_timeout = retry;
        self
    }

    pub fn respect_retry_after(mut self, respect: bool) -> Self {
        self.respect_retry_after = respect;
        self
    }

    /// Allow retrying methods that are not idempotent and carry no
    /// `idempotency-key` header.
    pub fn retry_non_idempotent(mut self, allow: bool) -> Self {
        self.retry_non_idempotent = allow;
        self
    }

    pub fn retry_classifier(mut self, retry_classifier: Arc<dyn RetryClassifier>) -> Self {
        self.retry_classifier = Some(retry_classifier);
        self
    }

    pub fn configured_max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub(crate) fn should_retry_attempt(&self, attempt: &RetryAttempt) -> bool {
        if let Some(retry_classifier) = &self.retry_classifier {
            return retry_classifier.should_retry(attempt);
        }
        if let Some(status) = attempt.status {
            return self.retryable_status_codes.contains(&status.as_u16());
        }
        if let Some(kind) = attempt.transport_error_kind {
            return self.retryable_transport_error_kinds.contains(&kind);
        }
        if attempt.timed_out {
            return self.retry_on_timeout;
        }
        false
    }

    pub(crate) fn backoff_for_retry(&self, retry_index: usize) -> Duration {
        let capped_exponent = retry_index.saturating_sub(1).min(31) as u32;
        let multiplier = 1_u128 << capped_exponent;
        let base_ms = self.base_backoff.as_millis().max(1);
        let max_ms = self.max_backoff.as_millis().max(base_ms);
        let delay_ms = base_ms
            .saturating_mul(multiplier)
            .min(max_ms)
            .min(u64::MAX as u128) as u64;
        self.apply_jitter(Duration::from_millis(delay_ms))
    }

    fn apply_jitter(&self, backoff: Duration) -> Duration {
        if self.jitter_ratio <= f64::EPSILON {
            return backoff;
        }

        let backoff_ms = backoff.as_millis().min(u64::MAX as u128) as u64;
        if backoff_ms <= 1 {
            return backoff;
        }
        let max_backoff_ms = self.max_backoff.as_millis().min(u64::MAX as u128) as u64;

        let jitter_span = ((backoff_ms as f64) * self.jitter_ratio).round().max(1.0) as u64;
        let low = backoff_ms.saturating_sub(jitter_span);
        let high = backoff_ms.saturating_add(jitter_span).max(low);
        let sampled_ms = rand::rng()
            .random_range(low..=high)
            .min(max_backoff_ms.max(1));
        Duration::from_millis(sampled_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl RetryCoordinator for RetryPolicy {
    fn decide(&self, attempt: usize, request: &Request, outcome: Outcome<'_>) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::Stop;
        }
        if !self.retry_non_idempotent && !request_supports_retry(request.method(), request.headers())
        {
            return RetryDecision::Stop;
        }

        let (status, failing_headers) = match outcome {
            Ok(response) if response.status().is_success() => return RetryDecision::Stop,
            Ok(response) => (Some(response.status()), Some(response.headers())),
            Err(error) => (
                error.status(),
                error.response().map(|response| response.headers()),
            ),
        };
        let (transport_error_kind, timed_out) = match outcome {
            Err(error) => (error.transport_kind(), matches!(error, Error::Timeout { .. })),
            Ok(_) => (None, false),
        };
        let classified = RetryAttempt {
            attempt,
            max_attempts: self.max_attempts,
            method: request.method().clone(),
            status,
            transport_error_kind,
            timed_out,
        };
        if !self.should_retry_attempt(&classified) {
            return RetryDecision::Stop;
        }

        let backoff = self.backoff_for_retry(attempt);
        let delay = match failing_headers {
            Some(headers) if self.respect_retry_after => {
                parse_retry_after(headers, SystemTime::now()).unwrap_or(backoff)
            }
            _ => backoff,
        };
        RetryDecision::RetryAfter(delay)
    }
}

fn default_retryable_status_codes() -> BTreeSet<u16> {
    [429_u16, 500, 502, 503, 504].into_iter().collect()
}

fn default_retryable_transport_error_kinds() -> BTreeSet<TransportErrorKind> {
    [
        TransportErrorKind::Dns,
        TransportErrorKind::Connect,
        TransportErrorKind::Read,
    ]
    .into_iter()
    .collect()
}

pub(crate) fn request_supports_retry(method: &Method, headers: &HeaderMap) -> bool {
    is_method_idempotent(method) || headers.get(IDEMPOTENCY_KEY_HEADER).is_some()
}

fn is_method_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS | Method::TRACE
    )
}
