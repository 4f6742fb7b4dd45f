use crate::action::{Action, Endpoints, OutboundCall};
use crate::config::{ApiKey, UpstreamConfig};
use crate::errors::DispatchError;
use crate::metrics_defs::{KEYS_EXHAUSTED, UPSTREAM_ATTEMPTS};
use crate::upstream::Upstream;
use serde_json::Value as JsonValue;
use shared::counter;
use std::sync::Arc;

/// Validates client requests and relays them, rotating through the API keys.
///
/// Keys are tried strictly in configured order, one call at a time, with no
/// delay between attempts. The first success wins; a validation failure
/// never reaches the upstream.
pub struct Dispatcher {
    api_keys: Arc<[ApiKey]>,
    endpoints: Endpoints,
    upstream: Arc<dyn Upstream>,
}

impl Dispatcher {
    pub fn new(
        api_keys: Vec<ApiKey>,
        upstream_config: &UpstreamConfig,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        Self {
            api_keys: api_keys.into(),
            endpoints: Endpoints::new(upstream_config),
            upstream,
        }
    }

    pub fn has_api_keys(&self) -> bool {
        !self.api_keys.is_empty()
    }

    pub fn api_key_count(&self) -> usize {
        self.api_keys.len()
    }

    /// Relays a raw client body and returns the upstream payload unchanged.
    pub async fn dispatch(&self, raw_body: &[u8]) -> Result<JsonValue, DispatchError> {
        let action = Action::parse(raw_body)?;
        let total = self.api_keys.len();

        let mut last_error = DispatchError::NoApiKeys;
        for (index, key) in self.api_keys.iter().enumerate() {
            let call = OutboundCall::build(&action, &self.endpoints, key)?;

            match self.upstream.call(&call).await {
                Ok(payload) => {
                    counter!(UPSTREAM_ATTEMPTS, "action" => action.name(), "outcome" => "success")
                        .increment(1);
                    return Ok(payload);
                }
                Err(e) => {
                    counter!(UPSTREAM_ATTEMPTS, "action" => action.name(), "outcome" => "failure")
                        .increment(1);
                    tracing::warn!(
                        action = action.name(),
                        attempt = index + 1,
                        total,
                        error = %e,
                        "Upstream call failed"
                    );
                    last_error = DispatchError::KeysExhausted(format!(
                        "{e} (failed with key {}/{total})",
                        index + 1
                    ));
                }
            }
        }

        if total > 0 {
            counter!(KEYS_EXHAUSTED, "action" => action.name()).increment(1);
        }
        Err(last_error)
    }
}
