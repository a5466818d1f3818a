//! Base URL resolution and OCI routing headers
//!
//! Precedence for the base URL: explicit `base_url`, then `service_endpoint`,
//! then an endpoint synthesized from `region`. Generative AI endpoints get the
//! OpenAI-compatible inference path appended once; model deployment endpoints
//! are used verbatim.

use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

use crate::error::{ClientError, Result};

/// Appended to bare Generative AI endpoints
pub const INFERENCE_PATH: &str = "/openai/v1";

/// Host fragment identifying the Generative AI service
const GENERATIVE_AI_MARKER: &str = "generativeai";

/// Legacy compartment header (`CompartmentId`)
pub const COMPARTMENT_ID: HeaderName = HeaderName::from_static("compartmentid");
pub const OPC_COMPARTMENT_ID: HeaderName = HeaderName::from_static("opc-compartment-id");
pub const OPC_CONVERSATION_STORE_ID: HeaderName =
    HeaderName::from_static("opc-conversation-store-id");

/// Generative AI inference endpoint for a region.
pub fn build_service_endpoint(region: &str) -> String {
    format!("https://inference.generativeai.{region}.oci.oraclecloud.com")
}

/// Normalize an endpoint and add the inference path when it is a bare
/// Generative AI host.
///
/// A bare host without a scheme is taken as `https://`.
pub fn build_base_url(service_endpoint: &str) -> String {
    let trimmed = service_endpoint
        .trim()
        .trim_end_matches(|c: char| c == '/' || c.is_whitespace());
    let endpoint = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        debug!(endpoint = trimmed, "service endpoint has no scheme, assuming https");
        format!("https://{trimmed}")
    };

    let bare_generative_ai = Url::parse(&endpoint)
        .ok()
        .filter(|url| {
            url.host_str()
                .is_some_and(|host| host.contains(GENERATIVE_AI_MARKER))
        })
        .is_some_and(|url| url.path().trim_matches('/').is_empty());

    if bare_generative_ai {
        let url = format!("{endpoint}{INFERENCE_PATH}");
        debug!(%url, "generative AI endpoint, appended inference path");
        url
    } else {
        debug!(url = %endpoint, "using service endpoint verbatim");
        endpoint
    }
}

/// Pick the base URL from the first input supplied.
///
/// Empty strings count as absent.
pub fn resolve_base_url(
    region: Option<&str>,
    service_endpoint: Option<&str>,
    base_url: Option<&str>,
) -> Result<String> {
    if let Some(url) = base_url.filter(|v| !v.trim().is_empty()) {
        return Ok(url.to_string());
    }
    if let Some(endpoint) = present(service_endpoint) {
        return Ok(build_base_url(endpoint));
    }
    if let Some(region) = present(region) {
        return Ok(build_base_url(&build_service_endpoint(region)));
    }
    Err(ClientError::Config(
        "one of region, service_endpoint or base_url must be provided".into(),
    ))
}

/// Whether requests to `url` go to the Generative AI service.
pub fn is_generative_ai(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.contains(GENERATIVE_AI_MARKER)))
        .unwrap_or(false)
}

/// Routing headers for the given ids. Absent or empty ids emit nothing.
pub fn build_headers(
    compartment_id: Option<&str>,
    conversation_store_id: Option<&str>,
) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Some(id) = compartment_id.filter(|v| !v.is_empty()) {
        let value = header_value("compartment_id", id)?;
        headers.insert(COMPARTMENT_ID, value.clone());
        headers.insert(OPC_COMPARTMENT_ID, value);
    }
    if let Some(id) = conversation_store_id.filter(|v| !v.is_empty()) {
        headers.insert(
            OPC_CONVERSATION_STORE_ID,
            header_value("conversation_store_id", id)?,
        );
    }
    Ok(headers)
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn header_value(field: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ClientError::Config(format!("{field} is not a valid header value: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPARTMENT: &str = "ocid1.compartment.oc1..exampleuniqueID";
    const CONVERSATION_STORE: &str = "ocid1.generativeaiconversationstore.oc1..exampleID";
    const CHICAGO: &str = "https://inference.generativeai.us-chicago-1.oci.oraclecloud.com/openai/v1";

    #[test]
    fn service_endpoint_from_region() {
        assert_eq!(
            build_service_endpoint("us-chicago-1"),
            "https://inference.generativeai.us-chicago-1.oci.oraclecloud.com"
        );
    }

    #[test]
    fn inference_path_appended_to_generative_ai_host() {
        let endpoint = "https://ppe.inference.generativeai.us-chicago-1.oci.oraclecloud.com";
        assert_eq!(build_base_url(endpoint), format!("{endpoint}/openai/v1"));
    }

    #[test]
    fn inference_path_appended_once() {
        assert_eq!(build_base_url(CHICAGO), CHICAGO);
        assert_eq!(
            build_base_url("https://inference.generativeai.us-chicago-1.oci.oraclecloud.com/ //"),
            CHICAGO
        );
        assert_eq!(
            build_base_url("https://inference.generativeai.us-chicago-1.oci.oraclecloud.com/ \n"),
            CHICAGO
        );
    }

    #[test]
    fn model_deployment_endpoint_is_verbatim() {
        let endpoint =
            "https://modeldeployment.us-ashburn-1.oci.customer-oci.com/ocid1.datasciencemodeldeployment.oc1..x/predict";
        assert_eq!(build_base_url(&format!("{endpoint}/")), endpoint);
    }

    #[test]
    fn scheme_less_endpoint_defaults_to_https() {
        assert_eq!(
            build_base_url("inference.generativeai.us-chicago-1.oci.oraclecloud.com"),
            CHICAGO
        );
        assert_eq!(
            resolve_base_url(None, Some(" inference.generativeai.us-chicago-1.oci.oraclecloud.com/"), None)
                .unwrap(),
            CHICAGO
        );
        assert_eq!(
            build_base_url("modeldeployment.us-ashburn-1.oci.customer-oci.com/md/predict"),
            "https://modeldeployment.us-ashburn-1.oci.customer-oci.com/md/predict"
        );
    }

    #[test]
    fn base_url_takes_precedence() {
        let url = "https://datascience.us-phoenix-1.oci.oraclecloud.com/20190101/actions/invokeEndpoint";
        assert_eq!(
            resolve_base_url(Some("any"), Some("any"), Some(url)).unwrap(),
            url
        );
    }

    #[test]
    fn service_endpoint_beats_region() {
        let endpoint = "https://inference.generativeai.us-chicago-1.oci.oraclecloud.com";
        assert_eq!(
            resolve_base_url(Some("eu-frankfurt-1"), Some(endpoint), None).unwrap(),
            CHICAGO
        );
    }

    #[test]
    fn region_alone_synthesizes_endpoint() {
        assert_eq!(resolve_base_url(Some("us-chicago-1"), None, None).unwrap(), CHICAGO);
    }

    #[test]
    fn nothing_supplied_is_a_config_error() {
        assert!(matches!(
            resolve_base_url(None, None, None),
            Err(ClientError::Config(_))
        ));
        assert!(matches!(
            resolve_base_url(Some(""), Some(" "), Some("")),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn no_ids_no_headers() {
        assert!(build_headers(None, None).unwrap().is_empty());
        assert!(build_headers(Some(""), Some("")).unwrap().is_empty());
    }

    #[test]
    fn conversation_store_only() {
        let headers = build_headers(None, Some(CONVERSATION_STORE)).unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["opc-conversation-store-id"], CONVERSATION_STORE);
        assert!(!headers.contains_key("CompartmentId"));
    }

    #[test]
    fn compartment_is_sent_under_both_names() {
        let headers = build_headers(Some(COMPARTMENT), None).unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers["CompartmentId"], COMPARTMENT);
        assert_eq!(headers["opc-compartment-id"], COMPARTMENT);
    }

    #[test]
    fn both_ids_give_three_headers() {
        let headers = build_headers(Some(COMPARTMENT), Some(CONVERSATION_STORE)).unwrap();
        assert_eq!(headers.len(), 3);
        assert_eq!(headers["opc-conversation-store-id"], CONVERSATION_STORE);
    }

    #[test]
    fn generative_ai_detection_uses_host() {
        assert!(is_generative_ai(CHICAGO));
        assert!(!is_generative_ai("https://example.com/generativeai/v1"));
        assert!(!is_generative_ai("not a url"));
    }
}
