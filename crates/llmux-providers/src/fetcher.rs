//! Live model listing per vendor.
//!
//! A fetcher issues the vendor's `GET …/models` request through the shared
//! [`Transport`], maps the payload with the spec's `parse_models`, then fills
//! whatever the vendor left out from [`heuristics`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use llmux_core::config::ProviderConfig;
use llmux_core::types::ModelInfo;
use llmux_core::{Error, Result};

use crate::heuristics;
use crate::registry::{is_available, ProviderSpec};
use crate::transport::{send_checked, Payload, Transport};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct ModelFetcher {
    spec: &'static ProviderSpec,
    config: ProviderConfig,
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl std::fmt::Debug for ModelFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelFetcher")
            .field("provider", &self.spec.name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ModelFetcher {
    pub fn new(
        spec: &'static ProviderSpec,
        config: ProviderConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            spec,
            config,
            transport,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider(&self) -> &'static str {
        self.spec.name
    }

    /// Pure configuration check; no network access.
    pub fn is_available(&self) -> bool {
        is_available(self.spec, &self.config)
    }

    /// Fetch and enrich the vendor's model list.
    pub async fn fetch(&self) -> Result<Vec<ModelInfo>> {
        if !self.is_available() {
            return Err(Error::config(format!(
                "cannot list models: provider '{}' is not configured",
                self.spec.name
            )));
        }

        let request = self.spec.list_models_request(&self.config);
        let raw = match send_checked(self.transport.as_ref(), self.spec.name, &request, self.timeout)
            .await?
        {
            Payload::Json(value) => value,
            Payload::Malformed { reason, .. } => {
                return Err(Error::Provider {
                    provider: self.spec.name.to_string(),
                    status: 200,
                    body: format!("model listing is not JSON: {reason}"),
                })
            }
        };

        let mut models = (self.spec.parse_models)(&raw);
        for model in &mut models {
            heuristics::enrich(model);
        }
        models.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(provider = self.spec.name, count = models.len(), "models parsed");
        info!(provider = self.spec.display_name, count = models.len(), "fetched model list");
        Ok(models)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
