use std::time::Duration;

use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

/// What one physical attempt produced: a response that passed the filter
/// chain, or the failure raised by the transport or a filter.
pub type Outcome<'a> = std::result::Result<&'a Response, &'a Error>;

#[derive(Debug)]
pub enum RetryDecision {
    /// Hand the attempt's own outcome back to the caller.
    Stop,
    /// Fail the dispatch with this error instead of the attempt's outcome.
    StopWithFailure(Error),
    /// Issue another attempt after the delay.
    RetryAfter(Duration),
}

/// Decides after every physical attempt whether the dispatch continues.
///
/// The attempt counter starts at 1 for each dispatch and grows by one per
/// attempt. The dispatch loop has no attempt ceiling of its own: a
/// coordinator that never returns [`RetryDecision::Stop`] retries forever.
/// One coordinator may serve many concurrent requests, so implementations
/// must not keep per-dispatch state.
pub trait RetryCoordinator: Send + Sync {
    fn decide(&self, attempt: usize, request: &Request, outcome: Outcome<'_>) -> RetryDecision;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoRetry;

impl RetryCoordinator for NoRetry {
    fn decide(&self, _attempt: usize, _request: &Request, _outcome: Outcome<'_>) -> RetryDecision {
        RetryDecision::Stop
    }
}

/// Coordinator backed by a closure; build one with [`retry_fn`].
#[derive(Clone)]
pub struct FnCoordinator<F> {
    decide: F,
}

/// ```
/// use std::time::Duration;
/// use reqflow::{RetryDecision, retry_fn};
///
/// let coordinator = retry_fn(|attempt, _request, outcome| match outcome {
///     Err(error) if error.is_transport_failure() && attempt < 3 => {
///         RetryDecision::RetryAfter(Duration::from_millis(50))
///     }
///     _ => RetryDecision::Stop,
/// });
/// # let _ = coordinator;
/// ```
pub fn retry_fn<F>(decide: F) -> FnCoordinator<F>
where
    F: Fn(usize, &Request, Outcome<'_>) -> RetryDecision + Send + Sync,
{
    FnCoordinator { decide }
}

impl<F> RetryCoordinator for FnCoordinator<F>
where
    F: Fn(usize, &Request, Outcome<'_>) -> RetryDecision + Send + Sync,
{
    fn decide(&self, attempt: usize, request: &Request, outcome: Outcome<'_>) -> RetryDecision {
        (self.decide)(attempt, request, outcome)
    }
}

impl<F> std::fmt::Debug for FnCoordinator<F> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("FnCoordinator")
    }
}
