//! Monthly search volume lookup against the keyword ads API.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Errors from the volume collaborator.
#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    #[error("volume API request failed: {0}")]
    Request(String),
}

/// Monthly query counts for a keyword.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchVolume {
    pub pc: i64,
    pub mobile: i64,
}

/// Source of monthly search volume figures.
#[async_trait]
pub trait VolumeLookup: Send + Sync {
    async fn monthly_volume(&self, keyword: &str) -> Result<SearchVolume, VolumeError>;
}

/// Always reports zero volume; used when no API credentials are configured.
pub struct NullVolumeLookup;

#[async_trait]
impl VolumeLookup for NullVolumeLookup {
    async fn monthly_volume(&self, _keyword: &str) -> Result<SearchVolume, VolumeError> {
        Ok(SearchVolume::default())
    }
}

/// Credentials for the keyword ads API.
#[derive(Debug, Clone, Deserialize)]
pub struct AdApiCredentials {
    pub api_key: String,
    pub secret_key: String,
    pub customer_id: String,
}

const DEFAULT_BASE_URL: &str = "https://api.naver.com";
const KEYWORD_TOOL_URI: &str = "/keywordstool";

/// Signed client for the keyword tool endpoint.
pub struct SearchAdClient {
    client: reqwest::Client,
    base_url: String,
    credentials: AdApiCredentials,
}

impl SearchAdClient {
    pub fn new(credentials: AdApiCredentials, timeout: Duration) -> Result<Self, VolumeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VolumeError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            credentials,
        })
    }

    /// Point the client at another host (tests, proxies).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Deserialize)]
struct KeywordToolResponse {
    #[serde(default, rename = "keywordList")]
    keyword_list: Vec<KeywordStat>,
}

#[derive(Debug, Deserialize)]
struct KeywordStat {
    #[serde(default, rename = "monthlyPcQcCnt")]
    monthly_pc: Option<serde_json::Value>,
    #[serde(default, rename = "monthlyMobileQcCnt")]
    monthly_mobile: Option<serde_json::Value>,
}

#[async_trait]
impl VolumeLookup for SearchAdClient {
    async fn monthly_volume(&self, keyword: &str) -> Result<SearchVolume, VolumeError> {
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let signature = sign(&timestamp, "GET", KEYWORD_TOOL_URI, &self.credentials.secret_key)?;
        let hint: String = keyword.chars().filter(|c| *c != ' ').collect();

        let response = self
            .client
            .get(format!("{}{}", self.base_url, KEYWORD_TOOL_URI))
            .query(&[("hintKeywords", hint.as_str()), ("showDetail", "1")])
            .header("Content-Type", "application/json; charset=UTF-8")
            .header("X-Timestamp", &timestamp)
            .header("X-API-KEY", &self.credentials.api_key)
            .header("X-Customer", &self.credentials.customer_id)
            .header("X-Signature", signature)
            .send()
            .await
            .map_err(|e| VolumeError::Request(e.to_string()))?;

        if !response.status().is_success() {
            debug!("Volume lookup for {} returned {}", keyword, response.status());
            return Ok(SearchVolume::default());
        }

        let body: KeywordToolResponse = response
            .json()
            .await
            .map_err(|e| VolumeError::Request(e.to_string()))?;

        Ok(body
            .keyword_list
            .first()
            .map(|stat| SearchVolume {
                pc: coerce_count(stat.monthly_pc.as_ref()),
                mobile: coerce_count(stat.monthly_mobile.as_ref()),
            })
            .unwrap_or_default())
    }
}

/// Turn an API count (number, or text like `"< 10"`) into a plain integer.
pub fn coerce_count(value: Option<&serde_json::Value>) -> i64 {
    match value {
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(serde_json::Value::String(s)) => s
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect::<String>()
            .parse()
            .unwrap_or(0),
        _ => 0,
    }
}

/// Request signature: base64 HMAC-SHA256 of `"{timestamp}.{method}.{uri}"`.
pub fn sign(timestamp: &str, method: &str, uri: &str, secret: &str) -> Result<String, VolumeError> {
    let message = format!("{}.{}.{}", timestamp, method, uri);
    let mac = hmac_sha256(secret.as_bytes(), message.as_bytes())?;
    Ok(base64::engine::general_purpose::STANDARD.encode(mac))
}

fn hmac_sha256(key: &[u8], message: &[u8]) -> Result<Vec<u8>, VolumeError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| VolumeError::Request(format!("invalid signing key: {}", e)))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}
