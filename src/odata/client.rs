//! OData Client module
//!
//! HTTP client for the Microsoft Dynamics 365 Business Central OData and
//! REST APIs: company enumeration, table data, and the `$metadata` document.

use crate::config::EndpointKind;
use crate::metadata::{MetadataDocument, MetadataError};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Service root shared by every Business Central cloud environment.
const BASE_URL: &str = "https://api.businesscentral.dynamics.com/v2.0/";

/// OData client errors
#[derive(Error, Debug)]
pub enum ODataError {
    #[error("invalid endpoint type: {0} (expected \"ODataV4\" or \"v2\")")]
    InvalidConfig(String),

    #[error("table name is required")]
    InvalidInput,

    #[error("failed to retrieve data ({status}): {body}")]
    DataRetrieval { status: u16, body: String },

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

/// Company list extracted from an OData response envelope.
///
/// Keeps the raw payload alongside the records found under `value`; a
/// missing `value` field yields an empty list, not an error.
#[derive(Debug, Clone)]
pub struct CompanyList {
    raw: Value,
    companies: Vec<Value>,
}

impl CompanyList {
    fn from_json(raw: Value) -> Self {
        let companies = raw
            .get("value")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Self { raw, companies }
    }

    /// Raw response payload.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// The records of the `value` array.
    pub fn companies(&self) -> &[Value] {
        &self.companies
    }
}

/// Client for Business Central data endpoints.
///
/// Construction resolves the endpoint prefix once; afterwards the client is
/// immutable, so it can be shared across tasks without locking.
#[derive(Debug)]
pub struct BcClient {
    http_client: Client,
    endpoint_kind: EndpointKind,
    endpoint_prefix: String,
    token: String,
}

impl BcClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `tenant_id` - Azure tenant id of the Business Central instance
    /// * `environment` - Environment name, e.g. "Production"
    /// * `endpoint_type` - `"ODataV4"` or `"v2"`
    /// * `token` - Bearer token from [`crate::auth::BcTokenClient`]
    /// * `insecure_ssl` - Skip TLS certificate verification (opt-in only)
    pub fn new(
        tenant_id: &str,
        environment: &str,
        endpoint_type: &str,
        token: &str,
        insecure_ssl: bool,
    ) -> Result<Self, ODataError> {
        let endpoint_kind = EndpointKind::parse(endpoint_type)
            .ok_or_else(|| ODataError::InvalidConfig(endpoint_type.to_string()))?;

        let endpoint_prefix = format!(
            "{}{}/{}/{}",
            BASE_URL,
            tenant_id,
            environment,
            endpoint_kind.path_segment()
        );

        let http_client = if insecure_ssl {
            tracing::warn!("TLS certificate verification disabled for data requests");
            Client::builder()
                .timeout(Duration::from_secs(120)) // Longer timeout for large $metadata
                .danger_accept_invalid_certs(true)
                .build()
                .unwrap()
        } else {
            Client::builder()
                .timeout(Duration::from_secs(120)) // Longer timeout for large $metadata
                .build()
                .unwrap()
        };

        Ok(Self {
            http_client,
            endpoint_kind,
            endpoint_prefix,
            token: token.to_string(),
        })
    }

    /// List the companies of the environment.
    pub async fn get_companies(&self) -> Result<CompanyList, ODataError> {
        let url = format!(
            "{}{}",
            self.endpoint_prefix,
            self.endpoint_kind.companies_segment()
        );
        let response = self.execute(&url, "application/json").await?;
        let json: Value = response.json().await?;
        Ok(CompanyList::from_json(json))
    }

    /// Fetch rows of a table within a company.
    ///
    /// Returns the parsed response as-is; unlike [`Self::get_companies`] the
    /// `value` array is not unwrapped at this layer.
    pub async fn get_data(
        &self,
        company_name: &str,
        table_name: &str,
    ) -> Result<Value, ODataError> {
        if table_name.is_empty() {
            return Err(ODataError::InvalidInput);
        }

        let url = self.data_endpoint(company_name, table_name);
        let response = self.execute(&url, "application/json").await?;
        Ok(response.json().await?)
    }

    /// Fetch and parse the `$metadata` document.
    pub async fn get_metadata(&self) -> Result<MetadataDocument, ODataError> {
        let url = format!("{}$metadata", self.endpoint_prefix);
        let response = self.execute(&url, "application/xml").await?;

        // Read as bytes to handle large XML and encoding issues
        let bytes = response.bytes().await?;
        let xml = String::from_utf8_lossy(&bytes).to_string();

        Ok(MetadataDocument::parse(&xml)?)
    }

    /// Endpoint prefix all request URLs are built on.
    pub fn endpoint_prefix(&self) -> &str {
        &self.endpoint_prefix
    }

    /// The configured endpoint kind.
    pub fn endpoint_kind(&self) -> EndpointKind {
        self.endpoint_kind
    }

    fn data_endpoint(&self, company_name: &str, table_name: &str) -> String {
        format!(
            "{}Company('{}')/{}",
            self.endpoint_prefix, company_name, table_name
        )
    }

    /// Issue a single GET; a non-success status is terminal for the call.
    async fn execute(&self, url: &str, accept: &str) -> Result<reqwest::Response, ODataError> {
        tracing::debug!("Fetching: {}", url);

        let response = self
            .http_client
            .get(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", accept)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Request failed ({}): {}", status, body);
            return Err(ODataError::DataRetrieval {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}
