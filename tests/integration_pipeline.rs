use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use reqflow::{
    ApiResponse, ApiResponseExt, BoxError, Client, CompletionMode, DelegatingResponse, Error,
    ErrorCode, HttpFilter, RequestContext, Response, RetryDecision, RetryPolicy, Transport,
    TransportBody, TransportError, TransportErrorKind, TransportOwnership, TransportResponse,
    TracedResponse, retry_fn,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
}

enum Step {
    Respond {
        status: u16,
        headers: Vec<(&'static str, &'static str)>,
        chunks: Vec<&'static str>,
    },
    Fail(TransportErrorKind),
    Echo,
    Hang,
}

impl Step {
    fn json(status: u16, body: &'static str) -> Self {
        Self::Respond {
            status,
            headers: vec![("content-type", "application/json")],
            chunks: vec![body],
        }
    }
}

#[derive(Clone, Debug)]
struct CapturedRequest {
    method: Method,
    uri: String,
    headers: HeaderMap,
    body: Bytes,
}

struct StubTransport {
    steps: Mutex<VecDeque<Step>>,
    captured: Mutex<Vec<CapturedRequest>>,
    shutdowns: AtomicUsize,
}

impl StubTransport {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            captured: Mutex::new(Vec::new()),
            shutdowns: AtomicUsize::new(0),
        })
    }

    fn requests(&self) -> Vec<CapturedRequest> {
        self.captured.lock().expect("lock captured requests").clone()
    }

    fn attempts(&self) -> usize {
        self.captured.lock().expect("lock captured requests").len()
    }

    fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

fn body_for(completion: CompletionMode, chunks: Vec<Bytes>) -> TransportBody {
    match completion {
        CompletionMode::Buffered => TransportBody::Buffered(chunks.concat().into()),
        CompletionMode::Streaming => TransportBody::Streaming(Box::pin(futures_util::stream::iter(
            chunks.into_iter().map(Ok::<_, BoxError>),
        ))),
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(
        &self,
        request: http::Request<Bytes>,
        completion: CompletionMode,
        _cancellation: &CancellationToken,
    ) -> Result<TransportResponse, TransportError> {
        self.captured
            .lock()
            .expect("lock captured requests")
            .push(CapturedRequest {
                method: request.method().clone(),
                uri: request.uri().to_string(),
                headers: request.headers().clone(),
                body: request.body().clone(),
            });
        let step = self.steps.lock().expect("lock scripted steps").pop_front();

        match step {
            Some(Step::Respond {
                status,
                headers,
                chunks,
            }) => {
                let mut builder = http::Response::builder().status(status);
                for (name, value) in headers {
                    builder = builder.header(name, value);
                }
                let chunks = chunks
                    .into_iter()
                    .map(|chunk| Bytes::from_static(chunk.as_bytes()))
                    .collect();
                Ok(builder
                    .body(body_for(completion, chunks))
                    .expect("build stub response"))
            }
            Some(Step::Fail(kind)) => Err(TransportError::new(kind, "scripted transport failure")),
            Some(Step::Echo) => {
                let mut response = http::Response::new(body_for(
                    completion,
                    vec![request.body().clone()],
                ));
                if let Some(content_type) = request.headers().get(CONTENT_TYPE) {
                    response
                        .headers_mut()
                        .insert(CONTENT_TYPE, content_type.clone());
                }
                Ok(response)
            }
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(TransportError::new(TransportErrorKind::Other, "hang elapsed"))
            }
            None => Err(TransportError::new(
                TransportErrorKind::Other,
                "stub script exhausted",
            )),
        }
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

fn client_with(transport: &Arc<StubTransport>) -> Client {
    Client::builder()
        .base_url("https://api.example.com")
        .transport(transport.clone(), TransportOwnership::Borrowed)
        .try_build()
        .expect("client should build")
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fast_retry_policy() -> RetryPolicy {
    RetryPolicy::standard()
        .max_attempts(3)
        .base_backoff(Duration::from_millis(1))
        .max_backoff(Duration::from_millis(5))
        .jitter_ratio(0.0)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn get_user_decodes_typed_value() {
    let transport = StubTransport::new(vec![Step::json(200, r#"{"id":42,"name":"Ada"}"#)]);
    let client = client_with(&transport);

    let user = client
        .get("/users/42")
        .expect("request")
        .as_type::<User>()
        .await
        .expect("user should decode");

    assert_eq!(
        *user,
        User {
            id: 42,
            name: "Ada".to_owned()
        }
    );
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::GET);
    assert_eq!(requests[0].uri, "https://api.example.com/users/42");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repeated_accessors_return_memoized_values() {
    let transport = StubTransport::new(vec![Step::json(200, r#"{"id":42,"name":"Ada"}"#)]);
    let client = client_with(&transport);
    let response = client.get("users/42").expect("request").await.expect("response");

    let first = response.as_type::<User>().await.expect("first decode");
    let second = response.as_type::<User>().await.expect("second decode");
    assert!(Arc::ptr_eq(&first, &second));

    let text = response.as_string().await.expect("text");
    let text_again = response.as_string().await.expect("text again");
    assert!(Arc::ptr_eq(&text, &text_again));
    assert_eq!(&*text, r#"{"id":42,"name":"Ada"}"#);

    let document = response.as_document().await.expect("document");
    assert_eq!(*document, json!({ "id": 42, "name": "Ada" }));

    let clone = response.clone();
    assert!(clone.ptr_eq(&response));
    let from_clone = clone.as_type::<User>().await.expect("decode from clone");
    assert!(Arc::ptr_eq(&first, &from_clone));
    assert_eq!(transport.attempts(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn list_accessor_decodes_arrays() {
    let transport = StubTransport::new(vec![Step::json(
        200,
        r#"[{"id":1,"name":"Ada"},{"id":2,"name":"Grace"}]"#,
    )]);
    let client = client_with(&transport);

    let users = client
        .get("users")
        .expect("request")
        .as_list::<User>()
        .await
        .expect("users should decode");
    assert_eq!(users.len(), 2);
    assert_eq!(users[1].name, "Grace");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn not_found_surfaces_http_status_error_with_response() {
    let transport = StubTransport::new(vec![Step::Respond {
        status: 404,
        headers: vec![("content-type", "text/plain")],
        chunks: vec!["no such user"],
    }]);
    let client = client_with(&transport);

    let error = client
        .get("users/7")
        .expect("request")
        .send()
        .await
        .expect_err("404 should fail by default");

    assert_eq!(error.code(), ErrorCode::HttpStatus);
    assert_eq!(error.status(), Some(StatusCode::NOT_FOUND));
    assert!(!error.is_transport_failure());
    let response = error.response().expect("error carries response");
    assert_eq!(
        &*response.as_string().await.expect("body"),
        "no such user"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ignore_http_errors_returns_failing_response() {
    let transport = StubTransport::new(vec![Step::json(404, r#"{"error":"missing"}"#)]);
    let client = client_with(&transport);

    let response = client
        .get("users/7")
        .expect("request")
        .with_ignore_http_errors(true)
        .await
        .expect("404 should be handed back");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(!response.throws_on_error());
    let document = response.as_document().await.expect("document");
    assert_eq!(document["error"], "missing");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn coordinator_retries_transport_failures_then_succeeds() {
    let transport = StubTransport::new(vec![
        Step::Fail(TransportErrorKind::Connect),
        Step::Fail(TransportErrorKind::Connect),
        Step::json(200, r#"{"id":1,"name":"Ada"}"#),
    ]);
    let client = client_with(&transport);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_by_coordinator = Arc::clone(&seen);

    let request = client
        .post("users")
        .expect("request")
        .with_body(&json!({ "name": "Ada" }))
        .expect("body")
        .with_retry_coordinator(retry_fn(move |attempt, _request, outcome| {
            seen_by_coordinator
                .lock()
                .expect("lock attempts")
                .push(attempt);
            match outcome {
                Err(error) if error.is_transport_failure() && attempt <= 2 => {
                    RetryDecision::RetryAfter(Duration::from_millis(1))
                }
                _ => RetryDecision::Stop,
            }
        }));
    let headers_before = request.headers().clone();
    let body_before = request.body().cloned();
    let uri_before = request.uri().clone();

    let response = request.send().await.expect("third attempt should succeed");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(transport.attempts(), 3);
    assert_eq!(*seen.lock().expect("lock attempts"), vec![1, 2, 3]);
    assert_eq!(request.headers(), &headers_before);
    assert_eq!(request.body().cloned(), body_before);
    assert_eq!(request.uri(), &uri_before);
    for captured in transport.requests() {
        assert_eq!(captured.body, Bytes::from_static(br#"{"name":"Ada"}"#));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn default_coordinator_makes_exactly_one_attempt() {
    let transport = StubTransport::new(vec![
        Step::Fail(TransportErrorKind::Connect),
        Step::json(200, "{}"),
    ]);
    let client = client_with(&transport);

    let error = client
        .get("users")
        .expect("request")
        .send()
        .await
        .expect_err("transport failure should surface");

    assert_eq!(error.code(), ErrorCode::Transport);
    assert_eq!(error.transport_kind(), Some(TransportErrorKind::Connect));
    assert!(error.is_transport_failure());
    assert_eq!(transport.attempts(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn retry_policy_retries_retryable_status_for_idempotent_method() {
    let transport = StubTransport::new(vec![
        Step::Respond {
            status: 503,
            headers: vec![("retry-after", "0")],
            chunks: vec!["busy"],
        },
        Step::json(200, r#"{"id":1,"name":"Ada"}"#),
    ]);
    let mut client = client_with(&transport);
    client.set_request_coordinator(fast_retry_policy());

    let user = client
        .get("users/1")
        .expect("request")
        .as_type::<User>()
        .await
        .expect("retry should recover");
    assert_eq!(user.id, 1);
    assert_eq!(transport.attempts(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn retry_policy_skips_post_without_idempotency_key() {
    let transport = StubTransport::new(vec![
        Step::json(503, "{}"),
        Step::json(503, "{}"),
        Step::json(200, "{}"),
    ]);
    let mut client = client_with(&transport);
    client.set_request_coordinator(fast_retry_policy());

    let error = client
        .post("orders")
        .expect("request")
        .send()
        .await
        .expect_err("post must not be retried");
    assert_eq!(error.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(transport.attempts(), 1);

    let response = client
        .post("orders")
        .expect("request")
        .with_idempotency_key("order-1")
        .expect("idempotency key")
        .send()
        .await
        .expect("keyed post should be retried");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(transport.attempts(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_with_failure_replaces_attempt_outcome() {
    let transport = StubTransport::new(vec![Step::json(200, "{}")]);
    let client = client_with(&transport);

    let error = client
        .get("users")
        .expect("request")
        .with_retry_coordinator(retry_fn(|_attempt, _request, _outcome| {
            RetryDecision::StopWithFailure(Error::InvalidState {
                message: "quota exhausted".to_owned(),
            })
        }))
        .send()
        .await
        .expect_err("coordinator failure should win");
    assert_eq!(error.code(), ErrorCode::InvalidState);
    assert_eq!(transport.attempts(), 1);
}

struct Recording {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl Recording {
    fn push(&self, entry: String) {
        self.log.lock().expect("lock filter log").push(entry);
    }
}

impl HttpFilter for Recording {
    fn on_request(
        &self,
        context: &RequestContext,
        request: &mut http::Request<Bytes>,
    ) -> reqflow::Result<()> {
        let authorized = request.headers().contains_key("x-auth");
        self.push(format!(
            "{}:request:{}:{}",
            self.name,
            context.attempt(),
            authorized
        ));
        if self.name == "auth" {
            request
                .headers_mut()
                .insert("x-auth", HeaderValue::from_static("token"));
        }
        Ok(())
    }

    fn on_response(&self, context: &RequestContext, _response: &Response) -> reqflow::Result<()> {
        self.push(format!("{}:response:{}", self.name, context.attempt()));
        Ok(())
    }

    fn on_error(&self, context: &RequestContext, _error: &Error) {
        self.push(format!("{}:error:{}", self.name, context.attempt()));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn filters_run_per_attempt_in_registration_order() {
    init_tracing();
    let transport = StubTransport::new(vec![
        Step::Fail(TransportErrorKind::Read),
        Step::json(200, "{}"),
    ]);
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut client = client_with(&transport);
    client
        .filters_mut()
        .push(Recording {
            name: "auth",
            log: Arc::clone(&log),
        })
        .push(Recording {
            name: "log",
            log: Arc::clone(&log),
        });

    let request = client
        .get("me")
        .expect("request")
        .with_retry_coordinator(retry_fn(|attempt, _request, outcome| match outcome {
            Err(_) if attempt == 1 => RetryDecision::RetryAfter(Duration::ZERO),
            _ => RetryDecision::Stop,
        }));
    request.send().await.expect("second attempt succeeds");

    assert_eq!(
        *log.lock().expect("lock filter log"),
        vec![
            "auth:request:1:false",
            "log:request:1:true",
            "auth:error:1",
            "log:error:1",
            "auth:request:2:false",
            "log:request:2:true",
            "auth:response:2",
            "log:response:2",
        ]
    );
    assert!(request.headers().get("x-auth").is_none());
    assert!(transport
        .requests()
        .iter()
        .all(|captured| captured.headers.contains_key("x-auth")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_interrupts_in_flight_transport_call() {
    let transport = StubTransport::new(vec![Step::Hang]);
    let client = client_with(&transport);
    let token = CancellationToken::new();
    let request = client
        .get("slow")
        .expect("request")
        .with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });
    let started = Instant::now();
    let error = request.send().await.expect_err("dispatch should be cancelled");

    assert!(matches!(error, Error::Cancelled { .. }));
    assert_eq!(error.code(), ErrorCode::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(5));
    canceller.await.expect("canceller task");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_interrupts_retry_delay() {
    let transport = StubTransport::new(vec![Step::Fail(TransportErrorKind::Connect)]);
    let client = client_with(&transport);
    let token = CancellationToken::new();
    let request = client
        .get("flaky")
        .expect("request")
        .with_cancellation(token.clone())
        .with_retry_coordinator(retry_fn(|_attempt, _request, _outcome| {
            RetryDecision::RetryAfter(Duration::from_secs(60))
        }));

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });
    let started = Instant::now();
    let error = request.send().await.expect_err("delay should be cancelled");

    assert_eq!(error.code(), ErrorCode::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(transport.attempts(), 1);
    canceller.await.expect("canceller task");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn request_timeout_is_a_transport_failure() {
    let transport = StubTransport::new(vec![Step::Hang]);
    let client = Client::builder()
        .base_url("https://api.example.com")
        .transport(transport.clone(), TransportOwnership::Borrowed)
        .request_timeout(Some(Duration::from_millis(50)))
        .try_build()
        .expect("client should build");

    let error = client
        .get("slow")
        .expect("request")
        .send()
        .await
        .expect_err("attempt should time out");
    assert_eq!(error.code(), ErrorCode::Timeout);
    assert!(error.is_transport_failure());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stream_then_buffered_accessor_is_rejected() {
    let transport = StubTransport::new(vec![Step::Respond {
        status: 200,
        headers: vec![("content-type", "text/plain")],
        chunks: vec!["hel", "lo"],
    }]);
    let client = client_with(&transport);
    let response = client
        .get("stream")
        .expect("request")
        .with_completion(CompletionMode::Streaming)
        .await
        .expect("response");

    let mut stream = response.as_stream().await.expect("stream");
    let mut collected = Vec::new();
    while let Some(chunk) = stream.next().await {
        collected.extend_from_slice(&chunk.expect("chunk"));
    }
    assert_eq!(collected, b"hello");

    let error = response.as_bytes().await.expect_err("content was streamed");
    assert_eq!(error.code(), ErrorCode::ContentAlreadyConsumed);
    let error = response.as_stream().await.err().expect("stream taken twice");
    assert_eq!(error.code(), ErrorCode::ContentAlreadyConsumed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn buffered_then_stream_accessor_is_rejected() {
    let transport = StubTransport::new(vec![Step::Respond {
        status: 200,
        headers: vec![("content-type", "text/plain")],
        chunks: vec!["hel", "lo"],
    }]);
    let client = client_with(&transport);
    let response = client
        .get("stream")
        .expect("request")
        .with_completion(CompletionMode::Streaming)
        .await
        .expect("response");

    assert_eq!(&*response.as_string().await.expect("text"), "hello");
    let document = response.as_document().await.expect("plain text document");
    assert_eq!(*document, json!("hello"));
    let error = response.as_stream().await.err().expect("content was buffered");
    assert_eq!(error.code(), ErrorCode::ContentAlreadyConsumed);
    assert_eq!(
        response.as_bytes().await.expect("buffered bytes stay available"),
        Bytes::from_static(b"hello")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn json_body_round_trips_through_echo() {
    let transport = StubTransport::new(vec![Step::Echo]);
    let client = client_with(&transport);
    let user = User {
        id: 7,
        name: "Grace".to_owned(),
    };

    let echoed = client
        .post("echo")
        .expect("request")
        .with_body(&user)
        .expect("body")
        .as_type::<User>()
        .await
        .expect("echo should decode");
    assert_eq!(*echoed, user);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn message_accessor_exposes_status_headers_and_body() {
    let transport = StubTransport::new(vec![Step::json(201, r#"{"id":3,"name":"Lin"}"#)]);
    let client = client_with(&transport);
    let response = client.post("users").expect("request").await.expect("response");

    let message = response.as_message().await.expect("message");
    assert_eq!(message.status(), StatusCode::CREATED);
    assert_eq!(
        message.headers().get(CONTENT_TYPE),
        Some(&HeaderValue::from_static("application/json"))
    );
    assert_eq!(message.body(), &Bytes::from_static(br#"{"id":3,"name":"Lin"}"#));
}

struct Shouting {
    inner: Response,
}

#[async_trait]
impl DelegatingResponse for Shouting {
    fn inner(&self) -> &dyn ApiResponse {
        &self.inner
    }

    async fn as_string(&self) -> reqflow::Result<Arc<str>> {
        let text = self.inner.as_string().await?;
        Ok(Arc::from(text.to_uppercase()))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delegating_response_forwards_and_keeps_memoization() {
    init_tracing();
    let transport = StubTransport::new(vec![Step::json(200, r#"{"id":42,"name":"Ada"}"#)]);
    let client = client_with(&transport);
    let response = client.get("users/42").expect("request").await.expect("response");

    let decorated = TracedResponse::new(Shouting {
        inner: response.clone(),
    });
    let view: &dyn ApiResponse = &decorated;

    assert_eq!(view.status(), StatusCode::OK);
    assert_eq!(view.request().uri().path(), "/users/42");
    assert_eq!(
        &*view.as_string().await.expect("overridden text"),
        r#"{"ID":42,"NAME":"ADA"}"#
    );

    let through_decorators = view.as_type::<User>().await.expect("typed through decorators");
    let direct = response.as_type::<User>().await.expect("typed directly");
    assert!(Arc::ptr_eq(&through_decorators, &direct));
    assert_eq!(&*response.as_string().await.expect("inner text"), r#"{"id":42,"name":"Ada"}"#);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disposed_client_rejects_dispatch_and_releases_owned_transport() {
    let transport = StubTransport::new(vec![Step::json(200, "{}")]);
    let client = Client::builder()
        .transport(transport.clone(), TransportOwnership::Owned)
        .try_build()
        .expect("client should build");
    let request = client
        .get("https://api.example.com/users")
        .expect("absolute uri needs no base url");

    client.dispose();
    client.dispose();
    assert_eq!(transport.shutdowns(), 1);

    let error = request.send().await.expect_err("disposed client must not send");
    assert_eq!(error.code(), ErrorCode::InvalidState);
    assert_eq!(transport.attempts(), 0);
    drop(client);
    assert_eq!(transport.shutdowns(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wait_blocks_inside_multi_thread_runtime() {
    let transport = StubTransport::new(vec![Step::json(200, r#"{"id":1,"name":"Ada"}"#)]);
    let client = client_with(&transport);

    let response = client.get("users/1").expect("request").wait().expect("wait");
    assert_eq!(response.status(), StatusCode::OK);
    let user = response.as_type::<User>().await.expect("user");
    assert_eq!(user.name, "Ada");
}

#[tokio::test]
async fn wait_refuses_current_thread_runtime() {
    let transport = StubTransport::new(vec![Step::json(200, "{}")]);
    let client = client_with(&transport);

    let error = client
        .get("users/1")
        .expect("request")
        .wait()
        .expect_err("current-thread runtime cannot block");
    assert_eq!(error.code(), ErrorCode::InvalidState);
    assert_eq!(transport.attempts(), 0);
}

#[test]
fn wait_drives_dispatch_without_runtime() {
    let transport = StubTransport::new(vec![Step::json(404, r#"{"error":"missing"}"#)]);
    let client = client_with(&transport);

    let error = client
        .get("users/1")
        .expect("request")
        .wait()
        .expect_err("404 should propagate synchronously");
    assert_eq!(error.status(), Some(StatusCode::NOT_FOUND));
}
