//! OCI identity constants
//!
//! Well-known file locations, environment variable names and service
//! endpoints used by the signer backends. None of these are secrets.

/// Default identity configuration file (`~` is expanded at load time)
pub const DEFAULT_CONFIG_LOCATION: &str = "~/.oci/config";

/// Default profile section in the configuration file
pub const DEFAULT_PROFILE: &str = "DEFAULT";

/// Overrides the configuration file location
pub const CONFIG_FILE_ENV: &str = "OCI_CONFIG_FILE";

/// Overrides the profile name
pub const PROFILE_ENV: &str = "OCI_CLI_PROFILE";

/// Default proactive refresh interval in seconds
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 3600;

/// Signature scheme version emitted in the `authorization` header
pub const SIGNATURE_VERSION: &str = "1";

/// Signature algorithm emitted in the `authorization` header
pub const SIGNATURE_ALGORITHM: &str = "rsa-sha256";

/// Headers signed on every request
pub const GENERIC_SIGNED_HEADERS: &[&str] = &["date", "(request-target)", "host"];

/// Extra headers signed on requests that carry a body (POST, PUT, PATCH)
pub const BODY_SIGNED_HEADERS: &[&str] = &["content-length", "content-type", "x-content-sha256"];

/// keyId prefix for security-token based signers
pub const SECURITY_TOKEN_KEY_PREFIX: &str = "ST$";

/// Resource principal environment (version 2.2)
pub const RP_VERSION_ENV: &str = "OCI_RESOURCE_PRINCIPAL_VERSION";
pub const RP_RPST_ENV: &str = "OCI_RESOURCE_PRINCIPAL_RPST";
pub const RP_PRIVATE_PEM_ENV: &str = "OCI_RESOURCE_PRINCIPAL_PRIVATE_PEM";
pub const RP_PRIVATE_PEM_PASSPHRASE_ENV: &str = "OCI_RESOURCE_PRINCIPAL_PRIVATE_PEM_PASSPHRASE";
pub const RP_REGION_ENV: &str = "OCI_RESOURCE_PRINCIPAL_REGION";
pub const RP_SUPPORTED_VERSION: &str = "2.2";

/// Instance metadata service (v2) base URL
pub const METADATA_BASE_URL: &str = "http://169.254.169.254/opc/v2";

/// Authorization header value required by the metadata service
pub const METADATA_AUTHORIZATION: &str = "Bearer Oracle";

/// Default timeout for metadata and federation calls, in seconds
pub const DEFAULT_IDENTITY_TIMEOUT_SECS: u64 = 10;

/// Default realm domain for federation endpoints
pub const DEFAULT_REALM_DOMAIN: &str = "oraclecloud.com";
