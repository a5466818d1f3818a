//! HTTP request signature (draft-cavage, `rsa-sha256`)
//!
//! Every OCI request carries an `authorization` header of the form
//!
//! ```text
//! Signature version="1",headers="date (request-target) host",keyId="...",algorithm="rsa-sha256",signature="..."
//! ```
//!
//! The signature covers a newline-joined list of `name: value` lines for the
//! listed headers. Requests with a body additionally sign its length, content
//! type and SHA-256 digest. RSA PKCS#1 v1.5 is deterministic, so a fixed key
//! and fixed request content always produce the same headers.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::Secret;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use rsa::RsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::signature::{SignatureEncoding, Signer};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::constants::{
    BODY_SIGNED_HEADERS, GENERIC_SIGNED_HEADERS, SIGNATURE_ALGORITHM, SIGNATURE_VERSION,
};
use crate::error::{Error, Result};

/// Header lists covered by the signature.
///
/// Both lists are configurable so callers can sign additional headers (for
/// example `opc-compartment-id`). Listed headers other than the computed
/// ones must be present on the request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SigningOptions {
    /// Signed on every request
    pub generic_headers: Vec<String>,
    /// Signed additionally on POST, PUT and PATCH
    pub body_headers: Vec<String>,
}

impl Default for SigningOptions {
    fn default() -> Self {
        Self {
            generic_headers: GENERIC_SIGNED_HEADERS.iter().map(|s| s.to_string()).collect(),
            body_headers: BODY_SIGNED_HEADERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Borrowed view of an outbound request, with its body already materialized.
#[derive(Debug, Clone, Copy)]
pub struct SignableRequest<'a> {
    pub method: &'a Method,
    pub url: &'a Url,
    pub headers: &'a HeaderMap,
    pub body: &'a [u8],
}

/// Stateless signer over one key id and RSA key.
#[derive(Clone)]
pub struct RequestSigner {
    key_id: Secret<String>,
    signing_key: SigningKey<Sha256>,
    options: SigningOptions,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("key_id", &self.key_id)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl RequestSigner {
    pub fn new(key_id: String, private_key: RsaPrivateKey, options: SigningOptions) -> Self {
        Self {
            key_id: Secret::new(key_id),
            signing_key: SigningKey::<Sha256>::new(private_key),
            options,
        }
    }

    /// Compute the headers to merge into the request.
    ///
    /// Returns `authorization` plus every computed header that was absent
    /// from the request (`date`, `host`, and for body methods
    /// `content-length`, `content-type`, `x-content-sha256`).
    pub fn sign(&self, request: &SignableRequest<'_>) -> Result<HeaderMap> {
        let method = request.method.as_str().to_ascii_lowercase();
        let mut names: Vec<&str> = self
            .options
            .generic_headers
            .iter()
            .map(String::as_str)
            .collect();
        if carries_body(&method) {
            names.extend(self.options.body_headers.iter().map(String::as_str));
        }

        let mut signed = HeaderMap::new();
        let mut lines = Vec::with_capacity(names.len());

        for name in &names {
            let value = match *name {
                "(request-target)" => request_target(&method, request.url),
                "date" => existing_or(request.headers, name, &mut signed, http_date)?,
                "host" => existing_or(request.headers, name, &mut signed, || {
                    host_header(request.url)
                })?,
                "content-length" => existing_or(request.headers, name, &mut signed, || {
                    request.body.len().to_string()
                })?,
                "content-type" => existing_or(request.headers, name, &mut signed, || {
                    "application/json".to_string()
                })?,
                "x-content-sha256" => {
                    let digest = STANDARD.encode(Sha256::digest(request.body));
                    insert(&mut signed, name, &digest)?;
                    digest
                }
                other => request
                    .headers
                    .get(other)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        Error::Signing(format!(
                            "header `{other}` is configured for signing but missing from the request"
                        ))
                    })?,
            };
            lines.push(format!("{name}: {value}"));
        }

        let signing_string = lines.join("\n");
        let signature = self
            .signing_key
            .try_sign(signing_string.as_bytes())
            .map_err(|e| Error::Signing(format!("RSA signature failed: {e}")))?;

        let authorization = format!(
            "Signature version=\"{SIGNATURE_VERSION}\",headers=\"{}\",keyId=\"{}\",algorithm=\"{SIGNATURE_ALGORITHM}\",signature=\"{}\"",
            names.join(" "),
            self.key_id.expose_str(),
            STANDARD.encode(signature.to_bytes()),
        );
        let mut value = HeaderValue::from_str(&authorization)
            .map_err(|e| Error::Signing(format!("invalid authorization header: {e}")))?;
        value.set_sensitive(true);
        signed.insert(AUTHORIZATION, value);

        Ok(signed)
    }
}

fn carries_body(method: &str) -> bool {
    matches!(method, "post" | "put" | "patch")
}

fn request_target(method: &str, url: &Url) -> String {
    match url.query() {
        Some(q) => format!("{method} {}?{q}", url.path()),
        None => format!("{method} {}", url.path()),
    }
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// IMF-fixdate, e.g. `Thu, 05 Jan 2014 21:31:40 GMT`
fn http_date() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Use the request's header value, or compute one and add it to `signed`.
fn existing_or(
    headers: &HeaderMap,
    name: &str,
    signed: &mut HeaderMap,
    compute: impl FnOnce() -> String,
) -> Result<String> {
    if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
        return Ok(value.to_string());
    }
    let value = compute();
    insert(signed, name, &value)?;
    Ok(value)
}

fn insert(headers: &mut HeaderMap, name: &str, value: &str) -> Result<()> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| Error::Signing(format!("invalid header name `{name}`: {e}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| Error::Signing(format!("invalid value for `{name}`: {e}")))?;
    headers.insert(name, value);
    Ok(())
}
