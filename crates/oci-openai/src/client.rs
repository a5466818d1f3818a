//! OpenAI-compatible client routed through an OCI auth provider

use std::sync::Arc;
use std::time::Duration;

use provider::AuthProvider;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use serde_json::Value;
use tracing::{debug, info};

use crate::endpoint::{build_headers, is_generative_ai, resolve_base_url};
use crate::error::{ClientError, Result};

const OPC_REQUEST_ID: HeaderName = HeaderName::from_static("opc-request-id");

/// Thin JSON client for OCI Generative AI and model deployment endpoints.
///
/// Every request carries the resolved routing headers and a fresh
/// `opc-request-id`, and is sent through the auth provider. Safe to share
/// across tasks.
#[derive(Clone)]
pub struct OciOpenAI {
    http: reqwest::Client,
    auth: Arc<dyn AuthProvider>,
    base_url: String,
    default_headers: HeaderMap,
}

impl std::fmt::Debug for OciOpenAI {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OciOpenAI")
            .field("auth", &self.auth.id())
            .field("base_url", &self.base_url)
            .field("default_headers", &self.default_headers)
            .finish()
    }
}

/// Builder for [`OciOpenAI`].
#[derive(Default)]
pub struct OciOpenAIBuilder {
    auth: Option<Arc<dyn AuthProvider>>,
    region: Option<String>,
    service_endpoint: Option<String>,
    base_url: Option<String>,
    compartment_id: Option<String>,
    conversation_store_id: Option<String>,
    timeout: Option<Duration>,
    headers: Vec<(String, String)>,
    http: Option<reqwest::Client>,
}

impl OciOpenAIBuilder {
    pub fn auth<A: AuthProvider + 'static>(self, auth: A) -> Self {
        self.shared_auth(Arc::new(auth))
    }

    pub fn shared_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn service_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.service_endpoint = Some(endpoint.into());
        self
    }

    /// Used verbatim; overrides region and service endpoint.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn compartment_id(mut self, id: impl Into<String>) -> Self {
        self.compartment_id = Some(id.into());
        self
    }

    pub fn conversation_store_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_store_id = Some(id.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Extra header sent on every request. Routing headers win on conflict.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Use a preconfigured HTTP client; `timeout` is then ignored.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    pub fn build(self) -> Result<OciOpenAI> {
        let auth = self
            .auth
            .ok_or_else(|| ClientError::Config("an auth provider is required".into()))?;
        let base_url = resolve_base_url(
            self.region.as_deref(),
            self.service_endpoint.as_deref(),
            self.base_url.as_deref(),
        )?;
        Url::parse(&base_url)
            .map_err(|e| ClientError::Config(format!("invalid base URL {base_url}: {e}")))?;

        let compartment = self.compartment_id.as_deref().filter(|v| !v.is_empty());
        if compartment.is_none() && is_generative_ai(&base_url) {
            return Err(ClientError::Config(
                "compartment_id is required for Generative AI endpoints".into(),
            ));
        }

        let mut default_headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::try_from(name.as_str())
                .map_err(|e| ClientError::Config(format!("invalid header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ClientError::Config(format!("invalid value for header {name}: {e}")))?;
            default_headers.insert(name, value);
        }
        default_headers.extend(build_headers(
            compartment,
            self.conversation_store_id.as_deref(),
        )?);

        let http = match self.http {
            Some(client) => client,
            None => {
                let mut builder = reqwest::Client::builder();
                if let Some(timeout) = self.timeout {
                    builder = builder.timeout(timeout);
                }
                builder
                    .build()
                    .map_err(|e| ClientError::Config(format!("building HTTP client: {e}")))?
            }
        };

        info!(%base_url, auth = auth.id(), "OCI OpenAI client ready");
        Ok(OciOpenAI {
            http,
            auth,
            base_url,
            default_headers,
        })
    }
}

impl OciOpenAI {
    pub fn builder() -> OciOpenAIBuilder {
        OciOpenAIBuilder::default()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    pub async fn chat_completions(&self, body: &Value) -> Result<Value> {
        self.send(Method::POST, "chat/completions", Some(body)).await
    }

    pub async fn completions(&self, body: &Value) -> Result<Value> {
        self.send(Method::POST, "completions", Some(body)).await
    }

    pub async fn responses(&self, body: &Value) -> Result<Value> {
        self.send(Method::POST, "responses", Some(body)).await
    }

    pub async fn conversations(&self, body: &Value) -> Result<Value> {
        self.send(Method::POST, "conversations", Some(body)).await
    }

    pub async fn models(&self) -> Result<Value> {
        self.send(Method::GET, "models", None).await
    }

    /// Send a JSON request to `path` under the base URL.
    ///
    /// Returns the decoded body, or `Value::Null` for an empty one. Non-2xx
    /// responses become [`ClientError::Api`].
    pub async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = self.url(path)?;
        let request_id = uuid::Uuid::new_v4().to_string();

        let mut request = reqwest::Request::new(method, url);
        let headers = request.headers_mut();
        headers.extend(self.default_headers.clone());
        headers.insert(
            OPC_REQUEST_ID,
            HeaderValue::from_str(&request_id)
                .map_err(|e| ClientError::Config(format!("request id: {e}")))?,
        );
        if let Some(body) = body {
            request
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            let bytes = serde_json::to_vec(body).map_err(|e| ClientError::Decode(e.to_string()))?;
            *request.body_mut() = Some(bytes.into());
        }

        debug!(
            %request_id,
            method = %request.method(),
            url = %request.url(),
            "sending request"
        );
        let response = self.auth.send(&self.http, request).await?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::Provider(e.into()))?;
        if !status.is_success() {
            debug!(%request_id, status = status.as_u16(), "request failed");
            return Err(ClientError::Api {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
    }

    fn url(&self, path: &str) -> Result<Url> {
        let joined = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| ClientError::Config(format!("invalid URL {joined}: {e}")))
    }
}
