//! Network transport abstraction and the intercepting wrapper.
//!
//! Two call styles are modelled, matching the two ways a host issues
//! requests: an awaitable [`Transport::fetch`] and a completion-callback
//! [`CallbackTransport::send`]. [`InterceptingTransport`] wraps either one,
//! delegates every call unchanged, and hands a copy of each matching
//! successful response body to the registered hooks.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::types::PayloadBody;

/// An outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: Some(body.into()),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Response delivered to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Original requested URL.
    pub url: String,
    /// Final URL after redirects.
    pub final_url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Response body as text.
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failures surfaced by a transport.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("no async runtime available to drive the request")]
    NoRuntime,
}

/// Awaitable request style.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Completion callback for [`CallbackTransport::send`].
pub type Completion = Box<dyn FnOnce(Result<HttpResponse, TransportError>) + Send + 'static>;

/// Completion-callback request style.
pub trait CallbackTransport: Send + Sync {
    fn send(&self, request: HttpRequest, on_complete: Completion);
}

// ── reqwest ─────────────────────────────────────────────────────

/// Transport backed by `reqwest`. No retries: the next trigger is the retry.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a browser user-agent and the given timeout.
    pub fn new(timeout_ms: u64) -> Self {
        let ua = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                  AppleWebKit/537.36 (KHTML, like Gecko) \
                  Chrome/131.0.0.0 Safari/537.36";

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(ua)
            .build()
            .unwrap_or_default();

        Self { client }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_builder() {
        TransportError::InvalidRequest(e.to_string())
    } else {
        TransportError::Network(e.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let r = builder.send().await.map_err(map_reqwest_error)?;
        let status = r.status().as_u16();
        let final_url = r.url().to_string();
        let headers: Vec<(String, String)> = r
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        let body = r.text().await.map_err(map_reqwest_error)?;

        Ok(HttpResponse {
            url: request.url,
            final_url,
            status,
            headers,
            body,
        })
    }
}

impl CallbackTransport for ReqwestTransport {
    fn send(&self, request: HttpRequest, on_complete: Completion) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                on_complete(Err(TransportError::NoRuntime));
                return;
            }
        };
        let transport = self.clone();
        handle.spawn(async move {
            let result = transport.fetch(request).await;
            on_complete(result);
        });
    }
}

// ── Interception ────────────────────────────────────────────────

/// URL predicate for an intercept hook.
pub type UrlPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Receives `(request url, decoded body)` for every captured response.
pub type BodyHandler = Arc<dyn Fn(&str, PayloadBody) + Send + Sync>;

struct Hook {
    predicate: UrlPredicate,
    on_body: BodyHandler,
}

/// Predicate matching URLs that contain `fragment`.
pub fn endpoint_contains(fragment: impl Into<String>) -> impl Fn(&str) -> bool + Send + Sync {
    let fragment = fragment.into();
    move |url: &str| url.contains(&fragment)
}

/// Behaviour-preserving wrapper around an inner transport.
///
/// Callers receive exactly what the inner transport produced. Hooks only
/// ever see a copy of the body, and a panicking hook is contained.
pub struct InterceptingTransport<T> {
    inner: T,
    hooks: RwLock<Vec<Hook>>,
}

impl<T> InterceptingTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            hooks: RwLock::new(Vec::new()),
        }
    }

    /// Register a hook for successful responses whose request URL matches.
    pub fn intercept<P, H>(&self, predicate: P, on_body: H)
    where
        P: Fn(&str) -> bool + Send + Sync + 'static,
        H: Fn(&str, PayloadBody) + Send + Sync + 'static,
    {
        let mut hooks = self.hooks.write().unwrap_or_else(|e| e.into_inner());
        hooks.push(Hook {
            predicate: Arc::new(predicate),
            on_body: Arc::new(on_body),
        });
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn handlers_for(&self, url: &str) -> Vec<BodyHandler> {
        let hooks = self.hooks.read().unwrap_or_else(|e| e.into_inner());
        hooks
            .iter()
            .filter(|h| {
                catch_unwind(AssertUnwindSafe(|| (h.predicate)(url))).unwrap_or(false)
            })
            .map(|h| Arc::clone(&h.on_body))
            .collect()
    }
}

/// Hand a copy of the response body to every handler.
fn deliver(handlers: &[BodyHandler], url: &str, result: &Result<HttpResponse, TransportError>) {
    let response = match result {
        Ok(response) if response.is_success() => response,
        Ok(response) => {
            tracing::debug!(url, status = response.status, "non-success response, no capture");
            return;
        }
        Err(e) => {
            tracing::debug!(url, error = %e, "transport failure, no capture");
            return;
        }
    };

    let body = PayloadBody::from_text(&response.body);
    tracing::info!(url, kind = body.kind(), "captured feed response");
    for handler in handlers {
        let outcome = catch_unwind(AssertUnwindSafe(|| handler(url, body.clone())));
        if outcome.is_err() {
            tracing::warn!(url, "intercept hook panicked");
        }
    }
}

#[async_trait]
impl<T: Transport> Transport for InterceptingTransport<T> {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let handlers = self.handlers_for(&request.url);
        if handlers.is_empty() {
            return self.inner.fetch(request).await;
        }

        let url = request.url.clone();
        tracing::debug!(url = %url, "intercepting fetch");
        let result = self.inner.fetch(request).await;
        deliver(&handlers, &url, &result);
        result
    }
}

impl<T: CallbackTransport> CallbackTransport for InterceptingTransport<T> {
    fn send(&self, request: HttpRequest, on_complete: Completion) {
        let handlers = self.handlers_for(&request.url);
        if handlers.is_empty() {
            self.inner.send(request, on_complete);
            return;
        }

        let url = request.url.clone();
        tracing::debug!(url = %url, "intercepting callback request");
        self.inner.send(
            request,
            Box::new(move |result| {
                deliver(&handlers, &url, &result);
                on_complete(result);
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Answers every request with a fixed status and body.
    struct StubTransport {
        status: u16,
        body: String,
    }

    impl StubTransport {
        fn respond(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            Ok(HttpResponse {
                url: request.url.clone(),
                final_url: request.url.clone(),
                status: self.status,
                headers: vec![("content-type".into(), "application/json".into())],
                body: self.body.clone(),
            })
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.respond(&request)
        }
    }

    impl CallbackTransport for StubTransport {
        fn send(&self, request: HttpRequest, on_complete: Completion) {
            on_complete(self.respond(&request));
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl Transport for FailingTransport {
        async fn fetch(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError::Network("connection refused".into()))
        }
    }

    fn recording(
        transport: &InterceptingTransport<impl Send + Sync>,
    ) -> Arc<Mutex<Vec<(String, PayloadBody)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        transport.intercept(endpoint_contains("/feed/firehose"), move |url, body| {
            sink.lock().unwrap().push((url.to_string(), body));
        });
        seen
    }

    fn stub(status: u16, body: &str) -> StubTransport {
        StubTransport {
            status,
            body: body.to_string(),
        }
    }

    #[tokio::test]
    async fn test_fetch_capture_is_transparent() {
        let transport = InterceptingTransport::new(stub(200, r#"{"results":[{"id":1}]}"#));
        let seen = recording(&transport);

        let request = HttpRequest::get("https://host.test/feed/firehose?page=1");
        let direct = stub(200, r#"{"results":[{"id":1}]}"#)
            .fetch(request.clone())
            .await
            .unwrap();
        let wrapped = transport.fetch(request).await.unwrap();

        assert_eq!(wrapped, direct);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "https://host.test/feed/firehose?page=1");
        assert_eq!(seen[0].1.kind(), "object");
    }

    #[tokio::test]
    async fn test_unrelated_urls_are_not_captured() {
        let transport = InterceptingTransport::new(stub(200, "[]"));
        let seen = recording(&transport);

        transport
            .fetch(HttpRequest::get("https://host.test/api/profile"))
            .await
            .unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_status_is_not_captured() {
        let transport = InterceptingTransport::new(stub(503, "unavailable"));
        let seen = recording(&transport);

        let resp = transport
            .fetch(HttpRequest::get("https://host.test/feed/firehose"))
            .await
            .unwrap();
        assert_eq!(resp.status, 503);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_reaches_caller_unchanged() {
        let transport = InterceptingTransport::new(FailingTransport);
        let seen = recording(&transport);

        let err = transport
            .fetch(HttpRequest::get("https://host.test/feed/firehose"))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Network("connection refused".into()));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_captured_as_raw() {
        let transport = InterceptingTransport::new(stub(200, "<html>login</html>"));
        let seen = recording(&transport);

        let resp = transport
            .fetch(HttpRequest::get("https://host.test/feed/firehose"))
            .await
            .unwrap();
        assert_eq!(resp.body, "<html>login</html>");
        assert_eq!(
            seen.lock().unwrap()[0].1,
            PayloadBody::Raw("<html>login</html>".into())
        );
    }

    #[tokio::test]
    async fn test_panicking_hook_does_not_reach_caller() {
        let transport = InterceptingTransport::new(stub(200, "[]"));
        transport.intercept(endpoint_contains("/feed/firehose"), |_, _| {
            panic!("hook failure");
        });
        let seen = recording(&transport);

        let resp = transport
            .fetch(HttpRequest::get("https://host.test/feed/firehose"))
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_callback_style_is_intercepted() {
        let transport = InterceptingTransport::new(stub(200, r#"[{"workNumber":"500123"}]"#));
        let seen = recording(&transport);

        let delivered = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&delivered);
        transport.send(
            HttpRequest::get("https://host.test/feed/firehose"),
            Box::new(move |result| {
                *slot.lock().unwrap() = Some(result);
            }),
        );

        let result = delivered.lock().unwrap().take().unwrap().unwrap();
        assert_eq!(result.body, r#"[{"workNumber":"500123"}]"#);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_reqwest_send_without_runtime_reports_error() {
        let transport = ReqwestTransport::new(1000);
        let delivered = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&delivered);
        transport.send(
            HttpRequest::get("http://127.0.0.1:9/feed/firehose"),
            Box::new(move |result| {
                *slot.lock().unwrap() = Some(result);
            }),
        );
        assert_eq!(
            delivered.lock().unwrap().take().unwrap().unwrap_err(),
            TransportError::NoRuntime
        );
    }
}
