use crate::action::OutboundCall;
use crate::errors::{RelayError, UpstreamError};
use async_trait::async_trait;
use hyper::body::Bytes;
use serde_json::Value as JsonValue;
use std::time::Duration;

/// Keys checked, in order, for a readable message in an upstream error body
const ERROR_MESSAGE_KEYS: [&str; 3] = ["error", "message", "error_message"];

/// Longest raw-body excerpt used as an error message
const ERROR_BODY_PREFIX_CHARS: usize = 500;

/// Longest raw-body excerpt written to the diagnostic log
const LOG_BODY_PREFIX_CHARS: usize = 1000;

const UNEXPECTED_RESPONSE: &str = "Unexpected response from the upstream API.";

/// Performs one call against the upstream routing API.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Returns the parsed JSON body of a successful response.
    async fn call(&self, call: &OutboundCall) -> Result<JsonValue, UpstreamError>;
}

/// [`Upstream`] over HTTPS with a fixed per-call timeout.
#[derive(Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(timeout: Duration) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn call(&self, call: &OutboundCall) -> Result<JsonValue, UpstreamError> {
        let mut request = self.client.request(call.method.clone(), call.url.clone());
        for (name, value) in &call.headers {
            request = request.header(name.clone(), value.as_str());
        }
        if let Some(body) = &call.body {
            request = request.body(body.clone());
        }

        // Errors carry the URL by default, and the geocode URL holds the key
        let response = request
            .send()
            .await
            .map_err(|e| UpstreamError::transport(e.without_url()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::transport(e.without_url()))?;

        tracing::debug!(
            status = status.as_u16(),
            body = %prefix(&String::from_utf8_lossy(&body), LOG_BODY_PREFIX_CHARS),
            "Upstream API response"
        );

        if status.as_u16() >= 400 {
            return Err(UpstreamError::http(status, &extract_error_message(&body)));
        }

        Ok(parse_success_body(&body))
    }
}

/// A success body that is not JSON yields `null`.
fn parse_success_body(body: &Bytes) -> JsonValue {
    serde_json::from_slice(body).unwrap_or(JsonValue::Null)
}

/// Picks a human readable message out of an upstream error body.
///
/// The first string among [`ERROR_MESSAGE_KEYS`] wins. When there is none, or
/// it is empty, the start of the raw body is used, or a generic message when
/// the body is empty too.
pub fn extract_error_message(body: &[u8]) -> String {
    if let Ok(JsonValue::Object(fields)) = serde_json::from_slice::<JsonValue>(body) {
        let message = ERROR_MESSAGE_KEYS
            .iter()
            .find_map(|key| fields.get(*key).and_then(JsonValue::as_str));
        if let Some(message) = message.filter(|message| !message.is_empty()) {
            return message.to_string();
        }
    }

    if body.is_empty() {
        return UNEXPECTED_RESPONSE.to_string();
    }

    prefix(&String::from_utf8_lossy(body), ERROR_BODY_PREFIX_CHARS)
}

fn prefix(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
