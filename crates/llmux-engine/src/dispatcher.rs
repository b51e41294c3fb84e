//! Concurrent fan-out of independent requests.
//!
//! One tokio task per item. Results come back in input order, and a failure
//! at index `i` (resolution error, provider error, or a panicking task)
//! becomes an error-bearing response at index `i`; it never aborts the batch.

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use llmux_core::types::CanonicalResponse;
use llmux_core::Result;

use crate::orchestrator::{Orchestrator, ResolvedRequest};
use crate::request::RequestBuilder;

enum Pending {
    Running {
        provider: Option<String>,
        model: Option<String>,
        handle: JoinHandle<Result<CanonicalResponse>>,
    },
    Failed(CanonicalResponse),
}

fn spawn(orchestrator: &Orchestrator, resolved: ResolvedRequest) -> Pending {
    let provider = Some(resolved.provider_name().to_string());
    let model = Some(resolved.model().to_string());
    let orchestrator = orchestrator.clone();
    Pending::Running {
        provider,
        model,
        handle: tokio::spawn(async move { orchestrator.execute(resolved).await }),
    }
}

async fn collect(pending: Vec<Pending>) -> Vec<CanonicalResponse> {
    join_all(pending.into_iter().enumerate().map(|(index, item)| async move {
        match item {
            Pending::Failed(response) => response,
            Pending::Running {
                provider,
                model,
                handle,
            } => {
                let response = match handle.await {
                    Ok(Ok(response)) => response,
                    Ok(Err(e)) => CanonicalResponse::failed(e.to_string()),
                    Err(join_err) if join_err.is_panic() => {
                        warn!(index, "request task panicked");
                        CanonicalResponse::failed("request task panicked")
                    }
                    Err(join_err) => CanonicalResponse::failed(format!("request task aborted: {join_err}")),
                };
                if response.provider.is_some() {
                    response
                } else {
                    response.attributed(provider.as_deref(), model.as_deref())
                }
            }
        }
    }))
    .await
}

/// Execute already-resolved requests concurrently on one orchestrator.
pub async fn dispatch_resolved(
    orchestrator: &Orchestrator,
    requests: Vec<ResolvedRequest>,
) -> Vec<CanonicalResponse> {
    debug!(count = requests.len(), "dispatching batch");
    let pending = requests
        .into_iter()
        .map(|resolved| spawn(orchestrator, resolved))
        .collect();
    collect(pending).await
}

/// Resolve and execute builders concurrently.
pub async fn dispatch(requests: &[RequestBuilder]) -> Vec<CanonicalResponse> {
    debug!(count = requests.len(), "dispatching batch");
    let pending = requests
        .iter()
        .enumerate()
        .map(|(index, builder)| match builder.resolve() {
            Ok(resolved) => spawn(builder.orchestrator(), resolved),
            Err(e) => {
                warn!(index, error = %e, "request failed to resolve");
                let fields = builder.fields();
                Pending::Failed(
                    CanonicalResponse::failed(e.to_string())
                        .attributed(fields.provider.as_deref(), fields.model.as_deref()),
                )
            }
        })
        .collect();
    collect(pending).await
}

/// Split a `provider[:model]` target.
pub fn parse_target(target: &str) -> (&str, Option<&str>) {
    match target.split_once(':') {
        Some((provider, model)) if !model.trim().is_empty() => (provider.trim(), Some(model.trim())),
        Some((provider, _)) => (provider.trim(), None),
        None => (target.trim(), None),
    }
}

/// Run one prompt against several `provider[:model]` targets.
pub async fn compare(base: &RequestBuilder, targets: &[&str]) -> Vec<CanonicalResponse> {
    let builders: Vec<RequestBuilder> = targets
        .iter()
        .map(|target| {
            let (provider, model) = parse_target(target);
            let builder = base.provider(provider);
            match model {
                Some(model) => builder.model(model),
                None => builder,
            }
        })
        .collect();
    dispatch(&builders).await
}
