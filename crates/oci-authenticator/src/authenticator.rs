//! Request authenticator: refresh, sign, send, and retry once on 401
//!
//! Per request:
//! 1. refresh the signer if the policy says it is stale
//! 2. capture the body as bytes (signing needs its digest; a retry needs it again)
//! 3. sign with the current backend and send
//! 4. on 401, force a refresh under the policy lock, re-sign the captured
//!    request and send it exactly once more
//!
//! If the forced refresh fails, the original 401 response is returned as an
//! ordinary response. Transport errors pass through untouched.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::BodyExt;
use oci_auth::{BackendKind, SignableRequest, SignerBackend};
use provider::{AuthProvider, ProviderError, SendFuture};
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode, Url, Version};
use tracing::{debug, warn};

use crate::error::Result;
use crate::refresh::RefreshPolicy;
use crate::settings::{AuthSettings, build_backend};

/// A request reduced to owned parts so it can be signed and sent twice.
struct CapturedRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Bytes,
    timeout: Option<Duration>,
    version: Version,
}

impl CapturedRequest {
    async fn capture(mut request: reqwest::Request) -> provider::Result<Self> {
        let body = match request.body_mut().take() {
            None => Bytes::new(),
            Some(body) => match body.as_bytes() {
                Some(bytes) => Bytes::copy_from_slice(bytes),
                None => body
                    .collect()
                    .await
                    .map_err(|e| ProviderError::Body(e.to_string()))?
                    .to_bytes(),
            },
        };
        Ok(Self {
            timeout: request.timeout().copied(),
            version: request.version(),
            method: request.method().clone(),
            url: request.url().clone(),
            headers: std::mem::take(request.headers_mut()),
            body,
        })
    }

    /// A fresh `reqwest::Request` carrying the backend's signature headers.
    fn signed(&self, backend: &dyn SignerBackend) -> provider::Result<reqwest::Request> {
        let signature = backend
            .sign(&SignableRequest {
                method: &self.method,
                url: &self.url,
                headers: &self.headers,
                body: &self.body,
            })
            .map_err(|e| ProviderError::Auth(e.to_string()))?;

        let mut request = reqwest::Request::new(self.method.clone(), self.url.clone());
        *request.headers_mut() = self.headers.clone();
        request.headers_mut().extend(signature);
        if !self.body.is_empty() || self.method != Method::GET {
            *request.body_mut() = Some(self.body.clone().into());
        }
        *request.timeout_mut() = self.timeout;
        *request.version_mut() = self.version;
        Ok(request)
    }
}

/// Signs every outbound request with the current OCI signer backend.
///
/// Cheap to share: clone the `Arc` it is usually held in. Each instance owns
/// its own refresh policy and lock.
pub struct Authenticator {
    kind: BackendKind,
    policy: RefreshPolicy,
}

impl Authenticator {
    pub fn new(policy: RefreshPolicy, kind: BackendKind) -> Self {
        Self { kind, policy }
    }

    /// Build the configured backend and wrap it in a refresh policy.
    pub async fn from_settings(settings: &AuthSettings) -> Result<Self> {
        settings.validate()?;
        let backend = build_backend(settings).await?;
        let kind = backend.kind();
        Ok(Self::new(
            RefreshPolicy::new(backend, settings.refresh_interval()),
            kind,
        ))
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn authenticate_and_send(
        &self,
        client: &reqwest::Client,
        request: reqwest::Request,
    ) -> provider::Result<reqwest::Response> {
        self.policy.refresh_if_needed().await;
        let captured = CapturedRequest::capture(request).await?;

        let backend = self.policy.current().await;
        let response = client.execute(captured.signed(backend.as_ref())?).await?;
        debug!(
            backend = %self.kind,
            method = %captured.method,
            url = %captured.url,
            status = response.status().as_u16(),
            "signed request sent"
        );
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!(backend = %self.kind, url = %captured.url, "request rejected with 401, refreshing signer");
        let backend = match self.policy.force_refresh().await {
            Ok(backend) => backend,
            Err(e) => {
                warn!(backend = %self.kind, error = %e, "forced refresh failed, returning 401");
                return Ok(response);
            }
        };
        drop(response);

        metrics::counter!("oci_auth_unauthorized_retries_total", "backend" => self.kind.label())
            .increment(1);
        let retried = client.execute(captured.signed(backend.as_ref())?).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            warn!(backend = %self.kind, url = %captured.url, "retry also rejected with 401");
        }
        Ok(retried)
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("kind", &self.kind)
            .field("refresh_interval", &self.policy.refresh_interval())
            .finish()
    }
}

impl AuthProvider for Authenticator {
    fn id(&self) -> &str {
        self.kind.label()
    }

    fn send<'a>(&'a self, client: &'a reqwest::Client, request: reqwest::Request) -> SendFuture<'a> {
        Box::pin(self.authenticate_and_send(client, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBackend;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn authenticator(mock: &MockBackend) -> Authenticator {
        Authenticator::new(
            RefreshPolicy::new(mock.arc(), Duration::from_secs(3600)),
            BackendKind::Session,
        )
    }

    fn get(server: &MockServer, route: &str) -> reqwest::Request {
        reqwest::Request::new(
            Method::GET,
            Url::parse(&format!("{}{route}", server.uri())).unwrap(),
        )
    }

    #[tokio::test]
    async fn signs_and_forwards() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .and(header("authorization", "Test gen-0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mock = MockBackend::new();
        let auth = authenticator(&mock);
        let response = auth
            .send(&reqwest::Client::new(), get(&server, "/models"))
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(mock.refresh_count(), 0);
    }

    #[tokio::test]
    async fn stale_signer_is_refreshed_before_signing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Test gen-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mock = MockBackend::new();
        let auth = Authenticator::new(
            RefreshPolicy::new(mock.arc(), Duration::from_secs(3600)).with_last_refresh(None),
            BackendKind::Session,
        );
        let response = auth
            .send(&reqwest::Client::new(), get(&server, "/models"))
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(mock.refresh_count(), 1);
    }

    #[tokio::test]
    async fn unauthorized_triggers_one_refresh_and_one_resigned_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Test gen-0"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("authorization", "Test gen-1"))
            .and(body_string(r#"{"model":"openai.gpt-4o"}"#))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let mock = MockBackend::new();
        let auth = authenticator(&mock);
        let mut request = reqwest::Request::new(
            Method::POST,
            Url::parse(&format!("{}/chat/completions", server.uri())).unwrap(),
        );
        *request.body_mut() = Some(r#"{"model":"openai.gpt-4o"}"#.into());

        let response = auth.send(&reqwest::Client::new(), request).await.unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(mock.refresh_count(), 1);
        let output = handle.render();
        assert!(output.contains(r#"oci_auth_unauthorized_retries_total{backend="session"} 1"#));
        assert!(output.contains(r#"trigger="unauthorized""#));
    }

    #[tokio::test]
    async fn second_unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let mock = MockBackend::new();
        let auth = authenticator(&mock);
        let response = auth
            .send(&reqwest::Client::new(), get(&server, "/models"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(mock.refresh_count(), 1);
    }

    #[tokio::test]
    async fn failed_forced_refresh_returns_original_401() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("NotAuthenticated"))
            .expect(1)
            .mount(&server)
            .await;

        let mock = MockBackend::new().failing();
        let auth = authenticator(&mock);
        let response = auth
            .send(&reqwest::Client::new(), get(&server, "/models"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.text().await.unwrap(), "NotAuthenticated");
        assert_eq!(mock.refresh_count(), 1);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let mock = MockBackend::new();
        let auth = authenticator(&mock);
        let response = auth
            .send(&reqwest::Client::new(), get(&server, "/models"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(mock.refresh_count(), 0);
    }

    #[tokio::test]
    async fn caller_headers_survive_signing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("opc-compartment-id", "ocid1.compartment.oc1..c"))
            .and(header("authorization", "Test gen-0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mock = MockBackend::new();
        let auth = authenticator(&mock);
        let mut request = get(&server, "/models");
        request.headers_mut().insert(
            "opc-compartment-id",
            "ocid1.compartment.oc1..c".parse().unwrap(),
        );

        let response = auth.send(&reqwest::Client::new(), request).await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn transport_errors_pass_through() {
        let mock = MockBackend::new();
        let auth = authenticator(&mock);
        let request = reqwest::Request::new(
            Method::GET,
            Url::parse("http://127.0.0.1:1/models").unwrap(),
        );

        let err = auth.send(&reqwest::Client::new(), request).await.unwrap_err();
        assert!(matches!(err, ProviderError::Transport(_)));
    }

    #[tokio::test]
    async fn streamed_body_is_captured_once_and_resent_on_retry() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config");
        std::fs::write(
            &config,
            format!(
                "[DEFAULT]\nuser=ocid1.user.oc1..aaaa\ntenancy=ocid1.tenancy.oc1..bbbb\n\
                 fingerprint=69:ed:ec:61:1b:ac:91:cc:3a:bb:f5:e7:22:47:de:5f\nkey_file={}\n",
                std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
                    .join("../oci-auth/tests/fixtures/api_key.pem")
                    .display()
            ),
        )
        .unwrap();
        let mut settings = AuthSettings::new(BackendKind::UserPrincipal);
        settings.config_file = Some(config);
        settings.profile = Some("DEFAULT".into());
        let auth = Authenticator::from_settings(&settings).await.unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let payload = r#"{"model":"m","stream":true}"#;
        let mut request = reqwest::Request::new(
            Method::POST,
            Url::parse(&format!("{}/chat/completions", server.uri())).unwrap(),
        );
        let streamed = reqwest::Body::wrap(http_body_util::Full::new(Bytes::from_static(
            payload.as_bytes(),
        )));
        assert!(streamed.as_bytes().is_none());
        *request.body_mut() = Some(streamed);

        let response = auth.send(&reqwest::Client::new(), request).await.unwrap();
        assert_eq!(response.status(), 200);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        for sent in &requests {
            assert_eq!(sent.body, payload.as_bytes());
            assert_eq!(sent.headers["content-length"], payload.len().to_string().as_str());
        }
        assert_eq!(
            requests[0].headers["x-content-sha256"],
            requests[1].headers["x-content-sha256"]
        );
    }

    #[test]
    fn id_is_backend_label() {
        let auth = authenticator(&MockBackend::new());
        assert_eq!(auth.id(), "session");
    }
}
