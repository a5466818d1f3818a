//! Counting signer backend for policy and authenticator tests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use oci_auth::{BackendKind, RefreshFuture, SignableRequest, SignerBackend};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Method, Url};

struct Shared {
    refreshes: AtomicUsize,
    fail_refresh: AtomicBool,
    delay_ms: AtomicU64,
}

/// Signs with `authorization: Test gen-<n>`, where `n` counts successful refreshes.
#[derive(Clone)]
pub(crate) struct MockBackend {
    shared: Arc<Shared>,
    generation: usize,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                refreshes: AtomicUsize::new(0),
                fail_refresh: AtomicBool::new(false),
                delay_ms: AtomicU64::new(0),
            }),
            generation: 0,
        }
    }

    pub(crate) fn with_refresh_delay(self, delay: Duration) -> Self {
        self.shared
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
        self
    }

    pub(crate) fn failing(self) -> Self {
        self.shared.fail_refresh.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn arc(&self) -> Arc<dyn SignerBackend> {
        Arc::new(self.clone())
    }

    /// Refresh attempts, successful or not.
    pub(crate) fn refresh_count(&self) -> usize {
        self.shared.refreshes.load(Ordering::SeqCst)
    }
}

impl SignerBackend for MockBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Session
    }

    fn sign(&self, _request: &SignableRequest<'_>) -> oci_auth::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let value = format!("Test gen-{}", self.generation);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&value).map_err(|e| oci_auth::Error::Signing(e.to_string()))?,
        );
        Ok(headers)
    }

    fn refresh(&self) -> RefreshFuture<'_> {
        Box::pin(async move {
            self.shared.refreshes.fetch_add(1, Ordering::SeqCst);
            let delay = self.shared.delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            if self.shared.fail_refresh.load(Ordering::SeqCst) {
                return Err(oci_auth::Error::Http("identity service unavailable".into()));
            }
            Ok(Arc::new(MockBackend {
                shared: self.shared.clone(),
                generation: self.generation + 1,
            }) as Arc<dyn SignerBackend>)
        })
    }
}

/// Read the generation a backend signs with.
pub(crate) fn generation(backend: &Arc<dyn SignerBackend>) -> usize {
    let url = Url::parse("https://example.com/").unwrap();
    let headers = HeaderMap::new();
    let signed = backend
        .sign(&SignableRequest {
            method: &Method::GET,
            url: &url,
            headers: &headers,
            body: b"",
        })
        .unwrap();
    signed[AUTHORIZATION]
        .to_str()
        .unwrap()
        .trim_start_matches("Test gen-")
        .parse()
        .unwrap()
}
