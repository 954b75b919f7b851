//! API client for the EcoMetrics backend.
//!
//! Every operation is one authenticated JSON round trip. Non-success
//! statuses become [`ApiError`]s carrying the server's message; transport
//! failures are returned as-is for the caller to retry or report.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{header, Client, Method, Url};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::auth::SessionData;
use crate::export::{to_csv, ExportFile, ExportFormat};
use crate::models::{decode_records, MetricRecord, User, DEFAULT_ELECTRICITY_PRICE};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Base URL used when neither config nor environment provide one
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";

/// HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Query string for list-style endpoints. Unset values are not sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    pub limit: Option<usize>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
    pub filters: BTreeMap<String, String>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>) -> Self {
        self.sort_by = Some(field.into());
        self
    }

    pub fn sort_order(mut self, order: SortOrder) -> Self {
        self.sort_order = Some(order);
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(ref sort_by) = self.sort_by {
            pairs.push(("sortBy".to_string(), sort_by.clone()));
        }
        if let Some(order) = self.sort_order {
            pairs.push(("sortOrder".to_string(), order.as_str().to_string()));
        }
        for (key, value) in &self.filters {
            pairs.push((key.clone(), value.clone()));
        }
        pairs
    }
}

#[derive(Debug, Deserialize)]
struct SuccessResponse {
    #[serde(default)]
    success: bool,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    data: LoginData,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    token: String,
    user: User,
}

/// Client for the authoritative store.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct RemoteClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self::parse_base(&base_url)?;
        debug!(base_url = %base_url, "API client created");

        Ok(Self {
            client,
            base_url,
            token: None,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    pub fn clear_token(&mut self) {
        self.token = None;
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Create a new client with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    fn parse_base(base_url: &str) -> Result<Url, ApiError> {
        let url = Url::parse(base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }
        Ok(url)
    }

    /// Base URL extended by `segments`, each percent-encoded as one path segment.
    fn endpoint_url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = Self::parse_base(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        if let Some(ref token) = self.token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::Unauthorized("Stored token is not a valid header value".to_string()))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!(%status, body = %ApiError::truncate_body(&body), "API returned an error status");
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn api_call<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&Value>,
        params: &QueryParams,
    ) -> Result<T, ApiError> {
        let endpoint = segments.join("/");
        let url = self.endpoint_url(segments)?;
        let pairs = params.to_pairs();

        let mut request = self.client.request(method.clone(), url).headers(self.headers()?);
        if !pairs.is_empty() {
            request = request.query(&pairs);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let result = async {
            let response = Self::check_response(request.send().await?).await?;
            let text = response.text().await?;
            serde_json::from_str::<T>(&text).map_err(|e| {
                ApiError::MalformedPayload(format!("{} {}: {}", method, endpoint, e))
            })
        }
        .await;

        if let Err(ref e) = result {
            error!(%method, endpoint = %endpoint, status = ?e.status(), error = %e, "API call failed");
        }
        result
    }

    fn records_at(value: &Value, pointer: &str) -> Result<Option<Vec<MetricRecord>>, ApiError> {
        match value.pointer(pointer) {
            Some(records) => decode_records(records.clone())
                .map(Some)
                .map_err(|e| ApiError::MalformedPayload(e.to_string())),
            None => Ok(None),
        }
    }

    // ===== Authentication =====

    /// Log in and return the session to persist. The client keeps the token.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<SessionData, ApiError> {
        let body = json!({ "username": username, "password": password });
        let response: LoginResponse = self
            .api_call(Method::POST, &["auth", "login"], Some(&body), &QueryParams::default())
            .await?;

        self.token = Some(response.data.token.clone());
        Ok(SessionData::new(response.data.token, response.data.user))
    }

    /// Tell the backend to drop the session. Local state is cleared even if
    /// the request fails.
    pub async fn logout(&mut self) {
        if self.token.is_some() {
            if let Err(e) = self
                .api_call::<Value>(Method::POST, &["auth", "logout"], None, &QueryParams::default())
                .await
            {
                warn!(error = %e, "Logout request failed");
            }
        }
        self.clear_token();
    }

    // ===== Records =====

    pub async fn get_data(&self, params: &QueryParams) -> Result<Vec<MetricRecord>, ApiError> {
        let response: Value = self.api_call(Method::GET, &["data"], None, params).await?;
        Ok(Self::records_at(&response, "/data/records")?.unwrap_or_default())
    }

    pub async fn save_entry(&self, record: &MetricRecord) -> Result<bool, ApiError> {
        let body = serde_json::to_value(record).map_err(|e| ApiError::MalformedPayload(e.to_string()))?;
        let response: SuccessResponse = self
            .api_call(Method::POST, &["data"], Some(&body), &QueryParams::default())
            .await?;
        Ok(response.success)
    }

    pub async fn update_entry(&self, id: &str, record: &MetricRecord) -> Result<bool, ApiError> {
        check_record_id(id)?;
        let body = serde_json::to_value(record).map_err(|e| ApiError::MalformedPayload(e.to_string()))?;
        let response: SuccessResponse = self
            .api_call(Method::PUT, &["data", id], Some(&body), &QueryParams::default())
            .await?;
        Ok(response.success)
    }

    pub async fn delete_entry(&self, id: &str) -> Result<bool, ApiError> {
        check_record_id(id)?;
        let response: SuccessResponse = self
            .api_call(Method::DELETE, &["data", id], None, &QueryParams::default())
            .await?;
        Ok(response.success)
    }

    /// Delete every record on the server. Refused locally unless `confirm`
    /// is set; the request always carries `{"confirm": true}`.
    pub async fn clear_all_data(&self, confirm: bool) -> Result<bool, ApiError> {
        if !confirm {
            return Err(ApiError::ConfirmationRequired);
        }
        let body = json!({ "confirm": true });
        let response: SuccessResponse = self
            .api_call(Method::DELETE, &["data"], Some(&body), &QueryParams::default())
            .await?;
        Ok(response.success)
    }

    pub async fn import_data(
        &self,
        records: &[MetricRecord],
        overwrite_existing: bool,
    ) -> Result<bool, ApiError> {
        let body = json!({
            "records": records,
            "overwriteExisting": overwrite_existing,
        });
        let response: SuccessResponse = self
            .api_call(Method::POST, &["data", "import"], Some(&body), &QueryParams::default())
            .await?;
        Ok(response.success)
    }

    /// Fetch an export from the server and render it as a file.
    ///
    /// JSON exports keep the server payload (its `data` member when present);
    /// CSV exports are rendered locally from the returned records.
    pub async fn export_data(
        &self,
        format: ExportFormat,
        filename: Option<&str>,
        params: &QueryParams,
    ) -> Result<ExportFile, ApiError> {
        let mut query = params.clone();
        query.filters.insert("format".to_string(), format.to_string());
        if let Some(name) = filename {
            query.filters.insert("filename".to_string(), name.to_string());
        }

        let response: Value = self.api_call(Method::GET, &["data", "export"], None, &query).await?;

        let contents = match format {
            ExportFormat::Json => {
                let payload = response.get("data").unwrap_or(&response);
                serde_json::to_string_pretty(payload)
                    .map_err(|e| ApiError::MalformedPayload(e.to_string()))?
            }
            ExportFormat::Csv => {
                let records = match Self::records_at(&response, "/data/records")? {
                    Some(records) => records,
                    None => Self::records_at(&response, "/records")?.unwrap_or_default(),
                };
                to_csv(&records)
            }
        };
        Ok(ExportFile::new(format, filename, contents))
    }

    // ===== Admin =====

    /// Operation log. The server rejects non-admin sessions with 403.
    pub async fn get_logs(&self, params: &QueryParams) -> Result<Value, ApiError> {
        let response: Value = self.api_call(Method::GET, &["logs"], None, params).await?;
        Ok(response.get("data").cloned().unwrap_or(Value::Null))
    }

    // ===== Price =====

    /// Price of the most recent record on the server, or the default on any failure.
    pub async fn get_electricity_price(&self) -> f64 {
        let params = QueryParams::new()
            .limit(1)
            .sort_by("date")
            .sort_order(SortOrder::Desc);
        match self.get_data(&params).await {
            Ok(records) => records
                .first()
                .and_then(|r| r.electricity_price)
                .unwrap_or(DEFAULT_ELECTRICITY_PRICE),
            Err(e) => {
                warn!(error = %e, "Failed to fetch electricity price, using default");
                DEFAULT_ELECTRICITY_PRICE
            }
        }
    }
}

/// Ids that would collapse into their parent path are refused before any request.
fn check_record_id(id: &str) -> Result<(), ApiError> {
    match id.trim() {
        "" | "." | ".." => Err(ApiError::InvalidRecordId(id.to_string())),
        _ => Ok(()),
    }
}
