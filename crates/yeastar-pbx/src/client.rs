//! Yeastar P-Series OpenAPI client
//!
//! Authentication: `POST {base}{api_base_path}/get_token` with
//! `{"username": client_id, "password": client_secret}` and the header
//! `User-Agent: OpenAPI`. Tokens expire (30 minutes by default) and are
//! renewed through `/refresh_token` when a refresh token is held.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, ClientBuilder, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use yeastar_core::config::PbxConfig;

use crate::error::PbxError;

const USER_AGENT: &str = "OpenAPI";

/// Tokens are renewed this long before they expire
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

const DEFAULT_TOKEN_TTL_SECS: u64 = 1800;

/// Upper bound on a token lifetime reported by the PBX
const MAX_TOKEN_TTL_SECS: u64 = 86_400;

/// Operations the sync job needs from the PBX
#[async_trait]
pub trait PbxApi: Send + Sync {
    /// One page of the extension list (raw response)
    async fn fetch_extensions(&self, page: u32, page_size: u32) -> Result<JsonValue, PbxError>;

    /// One page of CDRs between `start` and `end` (raw response)
    async fn fetch_call_logs(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page: u32,
        page_size: u32,
    ) -> Result<JsonValue, PbxError>;
}

#[derive(Debug)]
struct TokenState {
    access_token: String,
    expires_at: Instant,
    refresh_token: Option<String>,
}

impl TokenState {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_MARGIN < self.expires_at
    }
}

/// HTTP client for the Yeastar OpenAPI
pub struct PbxClient {
    http_client: Client,
    api_url: String,
    client_id: String,
    client_secret: String,
    timeout_secs: u64,
    extensions_endpoint: String,
    call_logs_endpoint: String,
    token: Mutex<Option<TokenState>>,
}

impl PbxClient {
    /// Create a client from the `[pbx]` configuration section
    ///
    /// # Errors
    ///
    /// `PbxError::Config` when the base URL or credentials are missing
    pub fn from_config(config: &PbxConfig) -> Result<Self, PbxError> {
        if !config.has_credentials() {
            return Err(PbxError::Config(
                "pbx.base_url, pbx.client_id and pbx.client_secret are required".to_string(),
            ));
        }

        let base_url = config.base_url.as_deref().unwrap_or_default();
        let mut api_base_path = config.api_base_path.trim().to_string();
        if !api_base_path.starts_with('/') {
            api_base_path.insert(0, '/');
        }

        let http_client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| PbxError::Connection(e.to_string()))?;

        Ok(Self {
            http_client,
            api_url: format!(
                "{}{}",
                base_url.trim().trim_end_matches('/'),
                api_base_path.trim_end_matches('/')
            ),
            client_id: config.client_id.clone().unwrap_or_default().trim().to_string(),
            client_secret: config
                .client_secret
                .clone()
                .unwrap_or_default()
                .trim()
                .to_string(),
            timeout_secs: config.request_timeout_secs,
            extensions_endpoint: config.extensions_endpoint.clone(),
            call_logs_endpoint: config.call_logs_endpoint.clone(),
            token: Mutex::new(None),
        })
    }

    /// Absolute URL for an endpoint path
    fn url(&self, path: &str) -> String {
        let path = path.trim();
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{}", self.api_url, path)
        } else {
            format!("{}/{}", self.api_url, path)
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> PbxError {
        if e.is_timeout() {
            PbxError::Timeout(self.timeout_secs)
        } else {
            PbxError::Connection(e.to_string())
        }
    }

    /// Send a request and decode a JSON body, checking `errcode`
    async fn send(&self, request: RequestBuilder) -> Result<JsonValue, PbxError> {
        let response = request
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PbxError::ParseError(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            error!("PBX HTTP error: status={}", status);
            debug!("PBX error body: {}", truncate(&body));
            return Err(PbxError::HttpError(status.as_u16()));
        }

        if body.trim().is_empty() {
            return Ok(json!({}));
        }

        let payload: JsonValue = serde_json::from_str(&body).map_err(|e| {
            PbxError::ParseError(format!("Failed to parse JSON: {} - Body: {}", e, truncate(&body)))
        })?;

        check_errcode(&payload)?;
        Ok(payload)
    }

    #[instrument(skip(self))]
    async fn request_token(&self) -> Result<TokenState, PbxError> {
        debug!("Requesting PBX access token");

        let request = self.http_client.post(self.url("/get_token")).json(&json!({
            "username": self.client_id,
            "password": self.client_secret,
        }));

        let payload = self.send(request).await.map_err(|e| match e {
            PbxError::Api { message, .. } => PbxError::Auth(message),
            PbxError::HttpError(code) => PbxError::Auth(format!("token request failed: HTTP {}", code)),
            other => other,
        })?;

        let token = parse_token(&payload)?;
        info!("PBX access token obtained");
        Ok(token)
    }

    #[instrument(skip(self, refresh_token))]
    async fn refresh(&self, refresh_token: &str) -> Result<TokenState, PbxError> {
        debug!("Refreshing PBX access token");

        let request = self
            .http_client
            .post(self.url("/refresh_token"))
            .json(&json!({ "refresh_token": refresh_token }));

        let payload = self.send(request).await?;
        parse_token(&payload)
    }

    /// Current access token, renewing it when close to expiry
    async fn access_token(&self) -> Result<String, PbxError> {
        let mut guard = self.token.lock().await;

        if let Some(state) = guard.as_ref().filter(|s| s.is_fresh()) {
            return Ok(state.access_token.clone());
        }

        let refresh_token = guard.as_ref().and_then(|s| s.refresh_token.clone());
        let state = match refresh_token {
            Some(rt) => match self.refresh(&rt).await {
                Ok(state) => state,
                Err(e) => {
                    warn!("Token refresh failed, requesting a new token: {}", e);
                    self.request_token().await?
                }
            },
            None => self.request_token().await?,
        };

        let token = state.access_token.clone();
        *guard = Some(state);
        Ok(token)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// Authenticated GET against an endpoint
    ///
    /// A `401` drops the cached token and retries once with a new one.
    #[instrument(skip(self, params), fields(path = %path))]
    pub async fn get<Q: Serialize + Sync + ?Sized>(
        &self,
        path: &str,
        params: &Q,
    ) -> Result<JsonValue, PbxError> {
        let url = self.url(path);

        for attempt in 0..2 {
            let token = self.access_token().await?;
            let request = self
                .http_client
                .get(&url)
                .bearer_auth(&token)
                .query(&[("access_token", token.as_str())])
                .query(params);

            match self.send(request).await {
                Err(PbxError::HttpError(code))
                    if attempt == 0 && code == StatusCode::UNAUTHORIZED.as_u16() =>
                {
                    warn!("PBX rejected the access token, retrying with a new one");
                    self.invalidate_token().await;
                }
                result => return result,
            }
        }

        Err(PbxError::Auth("access token rejected".to_string()))
    }
}

#[async_trait]
impl PbxApi for PbxClient {
    async fn fetch_extensions(&self, page: u32, page_size: u32) -> Result<JsonValue, PbxError> {
        self.get(
            &self.extensions_endpoint,
            &[("page", page), ("page_size", page_size)],
        )
        .await
    }

    async fn fetch_call_logs(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page: u32,
        page_size: u32,
    ) -> Result<JsonValue, PbxError> {
        self.get(
            &self.call_logs_endpoint,
            &[
                ("start_time", start.timestamp()),
                ("end_time", end.timestamp()),
                ("page", i64::from(page)),
                ("page_size", i64::from(page_size)),
            ],
        )
        .await
    }
}

/// Fail on a non-zero `errcode` (number or string)
fn check_errcode(payload: &JsonValue) -> Result<(), PbxError> {
    let code = match payload.get("errcode") {
        None | Some(JsonValue::Null) => return Ok(()),
        Some(JsonValue::Number(n)) => n.to_string(),
        Some(JsonValue::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
    };

    if code.is_empty() || code == "0" {
        return Ok(());
    }

    let message = payload
        .get("errmsg")
        .and_then(JsonValue::as_str)
        .unwrap_or("unknown error")
        .to_string();
    Err(PbxError::Api { code, message })
}

fn parse_token(payload: &JsonValue) -> Result<TokenState, PbxError> {
    let access_token = payload
        .get("access_token")
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| PbxError::Auth("response carried no access_token".to_string()))?;

    let ttl = ["access_token_expire_time", "expires_in"]
        .iter()
        .find_map(|k| {
            payload.get(*k).and_then(|v| {
                v.as_u64()
                    .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
            })
        })
        .unwrap_or(DEFAULT_TOKEN_TTL_SECS)
        .min(MAX_TOKEN_TTL_SECS);

    let refresh_token = payload
        .get("refresh_token")
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from);

    Ok(TokenState {
        access_token: access_token.to_string(),
        expires_at: Instant::now() + Duration::from_secs(ttl),
        refresh_token,
    })
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(500) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PbxConfig {
        PbxConfig {
            base_url: Some("https://pbx.example.com:8088/".to_string()),
            api_base_path: "openapi/v1.0".to_string(),
            client_id: Some("client".to_string()),
            client_secret: Some("secret".to_string()),
            ..PbxConfig::default()
        }
    }

    #[test]
    fn test_from_config_requires_credentials() {
        assert!(matches!(
            PbxClient::from_config(&PbxConfig::default()),
            Err(PbxError::Config(_))
        ));
    }

    #[test]
    fn test_url_building() {
        let client = PbxClient::from_config(&config()).unwrap();
        assert_eq!(
            client.url("/extension/list"),
            "https://pbx.example.com:8088/openapi/v1.0/extension/list"
        );
        assert_eq!(
            client.url("cdr/list"),
            "https://pbx.example.com:8088/openapi/v1.0/cdr/list"
        );
        assert_eq!(client.url("https://other/x"), "https://other/x");
    }

    #[test]
    fn test_errcode_check() {
        assert!(check_errcode(&json!({"errcode": 0, "data": []})).is_ok());
        assert!(check_errcode(&json!({"errcode": "0"})).is_ok());
        assert!(check_errcode(&json!({"data": []})).is_ok());

        match check_errcode(&json!({"errcode": 10004, "errmsg": "INVALID TOKEN"})) {
            Err(PbxError::Api { code, message }) => {
                assert_eq!(code, "10004");
                assert_eq!(message, "INVALID TOKEN");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_parse_token() {
        let state = parse_token(&json!({
            "errcode": 0,
            "access_token": "abc",
            "access_token_expire_time": 1800,
            "refresh_token": "def"
        }))
        .unwrap();
        assert_eq!(state.access_token, "abc");
        assert_eq!(state.refresh_token.as_deref(), Some("def"));
        assert!(state.is_fresh());

        let short = parse_token(&json!({"access_token": "abc", "expires_in": "30"})).unwrap();
        assert!(!short.is_fresh());

        assert!(matches!(
            parse_token(&json!({"errcode": 0})),
            Err(PbxError::Auth(_))
        ));
    }

    #[test]
    fn test_parse_token_clamps_huge_lifetime() {
        let state = parse_token(&json!({
            "access_token": "abc",
            "expires_in": "18446744073709551615"
        }))
        .unwrap();
        assert!(state.is_fresh());
        assert!(state.expires_at <= Instant::now() + Duration::from_secs(MAX_TOKEN_TTL_SECS));
    }

    #[test]
    fn test_truncate_long_bodies() {
        let body = "x".repeat(2000);
        assert_eq!(truncate(&body).len(), 500);
        assert_eq!(truncate("short"), "short");
    }
}
