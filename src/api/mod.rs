// Thin wrapper around reqwest for the dealership REST API.
//
// Every endpoint answers with a JSON envelope carrying a `success` flag.
// Decoding that envelope is the only place responses are classified into
// success, rejection or unexpected shape.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Proxy, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use crate::config::Settings;
use crate::error::{ApiError, AppResult, ErrorCode};

mod appointments;
mod bidding;

pub use appointments::{AppointmentEnvelope, AppointmentPage};
pub use bidding::{BidReceipt, LeaderboardPayload, SessionList, SubmitBidPayload};

const USER_AGENT: &str = concat!("dealer-portal/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Debug)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    /// Builds the shared client: timeout, optional proxy and bearer token come from settings.
    pub fn new(settings: &Settings) -> AppResult<Self> {
        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(settings.request_timeout_secs));

        if let Some(token) = settings.api_token.as_deref().filter(|t| !t.is_empty()) {
            let mut auth_value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ApiError::Validation("API token contains invalid characters".into()))?;
            auth_value.set_sensitive(true);
            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, auth_value);
            builder = builder.default_headers(headers);
        }

        if let Some(proxy_url) = settings.proxy_url.as_deref().filter(|p| !p.is_empty()) {
            builder = builder.proxy(Proxy::all(proxy_url).map_err(ApiError::ClientBuild)?);
            tracing::info!("Routing API requests through configured proxy.");
        }

        let http = builder.build().map_err(ApiError::ClientBuild)?;
        Ok(Self {
            http,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_base_url(base_url: impl Into<String>) -> AppResult<Self> {
        Self::new(&Settings::for_base_url(base_url))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) fn get(&self, path: &str) -> RequestBuilder {
        self.http.get(self.url(path))
    }

    pub(crate) fn post(&self, path: &str) -> RequestBuilder {
        self.http.post(self.url(path))
    }

    pub(crate) fn delete(&self, path: &str) -> RequestBuilder {
        self.http.delete(self.url(path))
    }

    // Sends the request and decodes the envelope into `T`
    pub(crate) async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder, endpoint: &str) -> AppResult<T> {
        let response = request.send().await.map_err(|e| {
            tracing::error!(endpoint, error = %e, "Network error during request");
            ApiError::Transport(e)
        })?;

        let status = response.status();
        tracing::debug!(endpoint, status = %status, "Received response status");

        let body = response.bytes().await.map_err(|e| {
            tracing::error!(endpoint, status = %status, error = %e, "Failed to read response body");
            ApiError::Transport(e)
        })?;

        let decoded = decode_envelope(status, &body);
        if let Err(ref e) = decoded {
            tracing::warn!(endpoint, status = %status, error = %e, "Request did not succeed");
        }
        decoded
    }
}

/// Classifies a response body.
///
/// `success: true` on a 2xx deserializes the whole object as `T`.
/// `success: false` with a non-empty `message` is a rejection, whatever the HTTP status.
/// Everything else is an unexpected response.
pub(crate) fn decode_envelope<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> AppResult<T> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::UnexpectedResponse(format!("HTTP {status}: body is not JSON ({e})")))?;

    match value.get("success").and_then(Value::as_bool) {
        Some(true) if status.is_success() => serde_json::from_value(value)
            .map_err(|e| ApiError::UnexpectedResponse(format!("HTTP {status}: payload did not match ({e})"))),
        Some(false) => {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|m| !m.is_empty());
            match message {
                Some(message) => Err(ApiError::Rejected {
                    code: error_code(&value),
                    message: message.to_string(),
                    status,
                }),
                None => Err(ApiError::UnexpectedResponse(format!(
                    "HTTP {status}: failure response without a message"
                ))),
            }
        }
        _ => Err(ApiError::UnexpectedResponse(format!(
            "HTTP {status}: response has no usable success flag"
        ))),
    }
}

fn error_code(value: &Value) -> ErrorCode {
    match value.get("code") {
        None | Some(Value::Null) => ErrorCode::Unspecified,
        Some(code) => serde_json::from_value(code.clone()).unwrap_or(ErrorCode::Unknown),
    }
}
