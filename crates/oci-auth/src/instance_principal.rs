//! Instance principal signer (compute instance identity)
//!
//! The instance metadata service hands out an X.509 leaf certificate, its
//! private key and an intermediate certificate. Those are exchanged at the
//! identity federation endpoint for a short-lived security token bound to a
//! freshly generated session key:
//!
//! 1. GET `identity/cert.pem`, `identity/key.pem`, `identity/intermediate.pem`
//!    and `instance/region` from the metadata service
//! 2. read the tenancy OCID from the leaf certificate subject
//! 3. generate an RSA session key pair
//! 4. POST the certificates and session public key to `/v1/x509`, signed with
//!    the leaf key
//! 5. sign subsequent requests with `ST$<token>` and the session key
//!
//! Refresh repeats the whole exchange.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use rsa::RsaPrivateKey;
use rsa::pkcs8::EncodePublicKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use x509_cert::Certificate;
use x509_cert::der::DecodePem;
use x509_cert::der::asn1::ObjectIdentifier;

use crate::backend::{BackendKind, RefreshFuture, SignerBackend};
use crate::constants::{
    DEFAULT_IDENTITY_TIMEOUT_SECS, DEFAULT_REALM_DOMAIN, METADATA_AUTHORIZATION,
    METADATA_BASE_URL, SECURITY_TOKEN_KEY_PREFIX,
};
use crate::error::{Error, Result};
use crate::keys::parse_private_key;
use crate::signer::{RequestSigner, SignableRequest, SigningOptions};

/// X.520 organizationalUnitName
const OU_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");

const TENANT_PREFIX: &str = "opc-tenant:";

/// Short region codes returned by older metadata endpoints
const REGION_CODES: &[(&str, &str)] = &[
    ("ams", "eu-amsterdam-1"),
    ("bom", "ap-mumbai-1"),
    ("fra", "eu-frankfurt-1"),
    ("gru", "sa-saopaulo-1"),
    ("iad", "us-ashburn-1"),
    ("icn", "ap-seoul-1"),
    ("jed", "me-jeddah-1"),
    ("kix", "ap-osaka-1"),
    ("lhr", "uk-london-1"),
    ("nrt", "ap-tokyo-1"),
    ("ord", "us-chicago-1"),
    ("phx", "us-phoenix-1"),
    ("sjc", "us-sanjose-1"),
    ("syd", "ap-sydney-1"),
    ("yyz", "ca-toronto-1"),
    ("zrh", "eu-zurich-1"),
];

/// Metadata and federation settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InstancePrincipalOptions {
    /// Metadata service root, e.g. `http://169.254.169.254/opc/v2`
    pub metadata_base_url: String,
    /// Federation endpoint; derived from the region when unset
    pub federation_endpoint: Option<String>,
    /// Skips the metadata region lookup
    pub region: Option<String>,
    /// Skips reading the tenancy from the certificate
    pub tenancy_id: Option<String>,
    pub timeout_secs: u64,
    pub session_key_bits: usize,
}

impl Default for InstancePrincipalOptions {
    fn default() -> Self {
        Self {
            metadata_base_url: METADATA_BASE_URL.to_string(),
            federation_endpoint: None,
            region: None,
            tenancy_id: None,
            timeout_secs: DEFAULT_IDENTITY_TIMEOUT_SECS,
            session_key_bits: 2048,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FederationRequest {
    certificate: String,
    public_key: String,
    intermediate_certificates: Vec<String>,
    purpose: &'static str,
    fingerprint_algorithm: &'static str,
}

#[derive(Deserialize)]
struct FederationResponse {
    token: String,
}

/// Signs with a federated security token and an ephemeral session key.
pub struct InstancePrincipalBackend {
    options: InstancePrincipalOptions,
    signing: SigningOptions,
    region: String,
    tenancy_id: String,
    signer: RequestSigner,
}

impl std::fmt::Debug for InstancePrincipalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstancePrincipalBackend")
            .field("region", &self.region)
            .field("tenancy_id", &self.tenancy_id)
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

impl InstancePrincipalBackend {
    /// Run the metadata + federation exchange.
    pub async fn fetch(options: InstancePrincipalOptions, signing: SigningOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()
            .map_err(|e| Error::Http(format!("building identity client: {e}")))?;

        let leaf_pem = metadata_get(&client, &options, "identity/cert.pem").await?;
        let leaf_key_pem = metadata_get(&client, &options, "identity/key.pem").await?;
        let intermediate_pem = metadata_get(&client, &options, "identity/intermediate.pem").await?;
        let region = match &options.region {
            Some(region) => normalize_region(region),
            None => normalize_region(&metadata_get(&client, &options, "instance/region").await?),
        };

        let tenancy_id = match &options.tenancy_id {
            Some(id) => id.clone(),
            None => tenancy_from_certificate(&leaf_pem)?,
        };
        let leaf_der = pem_to_der(&leaf_pem)?;
        let intermediate_der = pem_to_der(&intermediate_pem)?;
        let leaf_key = parse_private_key(&leaf_key_pem, None)?;
        let fingerprint = sha256_fingerprint(&leaf_der);
        debug!(%region, %tenancy_id, %fingerprint, "fetched instance identity certificates");

        let bits = options.session_key_bits;
        let session_key = tokio::task::spawn_blocking(move || {
            RsaPrivateKey::new(&mut rsa::rand_core::OsRng, bits)
        })
        .await
        .map_err(|e| Error::KeyLoad(format!("session key task failed: {e}")))?
        .map_err(|e| Error::KeyLoad(format!("generating session key: {e}")))?;
        let public_der = session_key
            .to_public_key()
            .to_public_key_der()
            .map_err(|e| Error::KeyLoad(format!("encoding session public key: {e}")))?;

        let request = FederationRequest {
            certificate: STANDARD.encode(&leaf_der),
            public_key: STANDARD.encode(public_der.as_bytes()),
            intermediate_certificates: vec![STANDARD.encode(&intermediate_der)],
            purpose: "DEFAULT",
            fingerprint_algorithm: "SHA256",
        };
        let endpoint = options.federation_endpoint.clone().unwrap_or_else(|| {
            format!("https://auth.{region}.{DEFAULT_REALM_DOMAIN}/v1/x509")
        });
        let federation_signer = RequestSigner::new(
            format!("{tenancy_id}/fed-x509-sha256/{fingerprint}"),
            leaf_key,
            SigningOptions::default(),
        );
        let token = federate(&client, &endpoint, &federation_signer, &request).await?;

        info!(%region, %tenancy_id, "obtained instance principal security token");
        Ok(Self {
            signer: RequestSigner::new(
                format!("{SECURITY_TOKEN_KEY_PREFIX}{token}"),
                session_key,
                signing.clone(),
            ),
            options,
            signing,
            region,
            tenancy_id,
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn tenancy_id(&self) -> &str {
        &self.tenancy_id
    }
}

async fn metadata_get(
    client: &reqwest::Client,
    options: &InstancePrincipalOptions,
    path: &str,
) -> Result<String> {
    let url = format!("{}/{path}", options.metadata_base_url.trim_end_matches('/'));
    let response = client
        .get(&url)
        .header(reqwest::header::AUTHORIZATION, METADATA_AUTHORIZATION)
        .send()
        .await
        .map_err(|e| Error::Http(format!("metadata request {path} failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Http(format!("metadata {path} returned {status}")));
    }
    let body = response
        .text()
        .await
        .map_err(|e| Error::Http(format!("reading metadata {path}: {e}")))?;
    Ok(body.trim().to_string())
}

async fn federate(
    client: &reqwest::Client,
    endpoint: &str,
    signer: &RequestSigner,
    request: &FederationRequest,
) -> Result<String> {
    let body = serde_json::to_vec(request)
        .map_err(|e| Error::Federation(format!("encoding federation request: {e}")))?;
    let mut http_request = client
        .post(endpoint)
        .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .body(body.clone())
        .build()
        .map_err(|e| Error::Federation(format!("building federation request: {e}")))?;

    let signed = signer.sign(&SignableRequest {
        method: http_request.method(),
        url: http_request.url(),
        headers: http_request.headers(),
        body: &body,
    })?;
    http_request.headers_mut().extend(signed);

    let response = client
        .execute(http_request)
        .await
        .map_err(|e| Error::Http(format!("federation request failed: {e}")))?;
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::Federation(format!(
            "federation endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<FederationResponse>()
        .await
        .map(|r| r.token)
        .map_err(|e| Error::Federation(format!("invalid federation response: {e}")))
}

/// Tenancy OCID from the `OU=opc-tenant:<ocid>` subject attribute.
pub fn tenancy_from_certificate(pem: &str) -> Result<String> {
    let cert = Certificate::from_pem(pem.as_bytes())
        .map_err(|e| Error::Federation(format!("parsing instance certificate: {e}")))?;

    for rdn in cert.tbs_certificate.subject.0.iter() {
        for attribute in rdn.0.iter() {
            if attribute.oid != OU_OID {
                continue;
            }
            if let Ok(value) = std::str::from_utf8(attribute.value.value())
                && let Some(tenancy) = value.strip_prefix(TENANT_PREFIX)
            {
                return Ok(tenancy.to_string());
            }
        }
    }
    Err(Error::Federation(
        "instance certificate has no opc-tenant subject attribute".into(),
    ))
}

fn pem_to_der(pem: &str) -> Result<Vec<u8>> {
    x509_cert::der::pem::decode_vec(pem.as_bytes())
        .map(|(_label, der)| der)
        .map_err(|e| Error::Federation(format!("decoding certificate PEM: {e}")))
}

/// Upper-case, colon separated SHA-256 of a DER certificate.
fn sha256_fingerprint(der: &[u8]) -> String {
    Sha256::digest(der)
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Expand three-letter region codes to full region identifiers.
pub fn normalize_region(region: &str) -> String {
    let region = region.trim().to_ascii_lowercase();
    REGION_CODES
        .iter()
        .find(|(code, _)| *code == region)
        .map(|(_, full)| full.to_string())
        .unwrap_or(region)
}

impl SignerBackend for InstancePrincipalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::InstancePrincipal
    }

    fn sign(&self, request: &SignableRequest<'_>) -> Result<HeaderMap> {
        self.signer.sign(request)
    }

    fn refresh(&self) -> RefreshFuture<'_> {
        let options = self.options.clone();
        let signing = self.signing.clone();
        Box::pin(async move {
            let backend = InstancePrincipalBackend::fetch(options, signing).await?;
            Ok(Arc::new(backend) as Arc<dyn SignerBackend>)
        })
    }
}
