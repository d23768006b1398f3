//! Azure backend configuration
//!
//! Two Azure services are supported: Data Lake Storage Gen1 (`adl://`) and
//! Blob Storage (`wasb://`). Both read their credentials from the
//! environment; neither has anything to fall back to, so missing
//! credentials are an error.

use std::fmt;

use crate::backend::BackendError;
use crate::env::{require_vars, EnvSource};

const AZURE_CLIENT_ID: &str = "AZURE_CLIENT_ID";
const AZURE_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";
const AZURE_TENANT_ID: &str = "AZURE_TENANT_ID";
const AZURE_STORAGE_ACCOUNT: &str = "AZURE_STORAGE_ACCOUNT";
const AZURE_STORAGE_KEY: &str = "AZURE_STORAGE_KEY";
const AZURE_STORAGE_SAS_TOKEN: &str = "AZURE_STORAGE_SAS_TOKEN";

const BLOB_HOST_SUFFIX: &str = ".blob.core.windows.net";

/// Service principal used to authorize ADLv1 requests
#[derive(Clone)]
pub struct AzureAuthorizer {
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
}

impl AzureAuthorizer {
    /// Read a service principal from `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`
    /// and `AZURE_TENANT_ID`.
    pub fn from_env(env: &impl EnvSource) -> Result<Self, BackendError> {
        let values = require_vars(env, &[AZURE_CLIENT_ID, AZURE_CLIENT_SECRET, AZURE_TENANT_ID])
            .map_err(|missing| {
                BackendError::AzureCredentials(format!(
                    "missing environment variables: {}",
                    missing.join(", ")
                ))
            })?;

        let [client_id, client_secret, tenant_id]: [String; 3] = values
            .try_into()
            .map_err(|_| BackendError::AzureCredentials("incomplete service principal".into()))?;

        Ok(Self {
            client_id,
            client_secret,
            tenant_id,
        })
    }

    /// OAuth token endpoint for this tenant
    pub fn token_endpoint(&self) -> String {
        format!(
            "https://login.microsoftonline.com/{}/oauth2/token",
            self.tenant_id
        )
    }
}

impl fmt::Debug for AzureAuthorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureAuthorizer")
            .field("client_id", &self.client_id)
            .field("tenant_id", &self.tenant_id)
            .finish_non_exhaustive()
    }
}

/// Azure Data Lake Storage Gen1 connection
#[derive(Debug, Clone)]
pub struct AdlV1Config {
    /// Account host, e.g. `myaccount.azuredatalakestore.net`
    pub endpoint: String,
    pub authorizer: AzureAuthorizer,
}

/// How blob requests are signed
#[derive(Clone)]
pub enum AzureBlobCredential {
    SharedKey(String),
    SasToken(String),
}

impl fmt::Debug for AzureBlobCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AzureBlobCredential::SharedKey(_) => write!(f, "SharedKey(<redacted>)"),
            AzureBlobCredential::SasToken(_) => write!(f, "SasToken(<redacted>)"),
        }
    }
}

/// Azure Blob Storage connection
#[derive(Debug, Clone)]
pub struct AzureBlobConfig {
    pub endpoint: String,
    pub account_name: String,
    pub credential: AzureBlobCredential,
    /// Container; filled in from the bucket identifier
    pub container: String,
    pub tls: bool,
}

impl AzureBlobConfig {
    /// Build a blob config from the configured endpoint.
    ///
    /// With an empty endpoint the account comes from `AZURE_STORAGE_ACCOUNT`
    /// and the public endpoint is used. Otherwise the account is the first
    /// label of the endpoint host. The key comes from `AZURE_STORAGE_KEY`,
    /// or a SAS token from `AZURE_STORAGE_SAS_TOKEN`.
    pub fn from_endpoint(endpoint: &str, env: &impl EnvSource) -> Result<Self, BackendError> {
        let (endpoint, account_name, tls) = if endpoint.is_empty() {
            let account = env.non_empty(AZURE_STORAGE_ACCOUNT).ok_or_else(|| {
                BackendError::AzureCredentials(format!(
                    "{} is not set and no endpoint configured",
                    AZURE_STORAGE_ACCOUNT
                ))
            })?;
            (
                format!("https://{}{}", account, BLOB_HOST_SUFFIX),
                account,
                true,
            )
        } else {
            let (tls, account) = parse_endpoint(endpoint)?;
            (endpoint.trim_end_matches('/').to_string(), account, tls)
        };

        let credential = if let Some(key) = env.non_empty(AZURE_STORAGE_KEY) {
            AzureBlobCredential::SharedKey(key)
        } else if let Some(sas) = env.non_empty(AZURE_STORAGE_SAS_TOKEN) {
            AzureBlobCredential::SasToken(sas.trim_start_matches('?').to_string())
        } else {
            return Err(BackendError::AzureCredentials(format!(
                "no {} or {} for account {}",
                AZURE_STORAGE_KEY, AZURE_STORAGE_SAS_TOKEN, account_name
            )));
        };

        Ok(Self {
            endpoint,
            account_name,
            credential,
            container: String::new(),
            tls,
        })
    }
}

/// Split an endpoint URL into (uses TLS, account name)
fn parse_endpoint(endpoint: &str) -> Result<(bool, String), BackendError> {
    let invalid = |reason: &str| BackendError::AzureEndpoint {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    };

    let (scheme, rest) = endpoint
        .split_once("://")
        .ok_or_else(|| invalid("missing scheme"))?;
    let tls = match scheme {
        "https" => true,
        "http" => false,
        _ => return Err(invalid("scheme must be http or https")),
    };

    let host = rest.split(['/', ':']).next().unwrap_or_default();
    let account = host.split('.').next().unwrap_or_default();
    if account.is_empty() {
        return Err(invalid("missing account host"));
    }

    Ok((tls, account.to_string()))
}
