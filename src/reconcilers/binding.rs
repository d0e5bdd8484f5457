// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! AcrPullBinding reconciler - keeps a registry pull secret fresh and attached to a service account.

use crate::authorizer::{AccessToken, Authorizer, IdentitySelector};
use crate::config::Config;
use crate::constants::{FINALIZER, OPERATOR_NAME, TOKEN_REFRESH_BUFFER};
use crate::error::{AcrPullError, Result};
use crate::kubernetes::{
    attach_pull_secret, build_pull_secret, detach_pull_secret, find_owned_pull_secret,
    render_docker_config, update_pull_secret,
};
use crate::reconcilers::backoff::ErrorBackoff;
use crate::types::{AcrPullBinding, AcrPullBindingSpec};
use chrono::{DateTime, SecondsFormat, Utc};
use futures::{Stream, StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use kube::{
    api::{Patch, PatchParams, PostParams},
    runtime::{
        controller::Action, predicates, reflector, watcher, Controller, WatchStreamExt,
    },
    Api, Client, ResourceExt,
};
use kube_runtime::watcher::Config as WatcherConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Identity and registry a binding resolves to after applying defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingTarget {
    pub selector: IdentitySelector,
    pub registry: String,
}

/// What a single reconciliation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// The binding no longer exists
    Absent,
    /// The finalizer was added; the refresh happens on the next pass
    FinalizerAdded,
    /// Cleanup finished and the finalizer was released
    Finalized,
    Refreshed {
        expires_on: DateTime<Utc>,
        requeue_after: Duration,
    },
}

impl Reconciled {
    pub fn action(&self) -> Action {
        match self {
            Reconciled::Absent | Reconciled::Finalized => Action::await_change(),
            Reconciled::FinalizerAdded => Action::requeue(Duration::ZERO),
            Reconciled::Refreshed { requeue_after, .. } => Action::requeue(*requeue_after),
        }
    }
}

pub struct BindingReconciler {
    client: Client,
    authorizer: Arc<dyn Authorizer>,
    config: Config,
    backoff: ErrorBackoff,
}

impl BindingReconciler {
    pub fn new(client: Client, authorizer: Arc<dyn Authorizer>, config: Config) -> Self {
        Self {
            client,
            authorizer,
            config,
            backoff: ErrorBackoff::default(),
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let bindings: Api<AcrPullBinding> = Api::all(self.client.clone());
        let secrets: Api<Secret> = Api::all(self.client.clone());

        // Status writes do not bump the generation, so they never retrigger a refresh
        let (reader, writer) = reflector::store();
        let binding_events = watcher(bindings, WatcherConfig::default())
            .default_backoff()
            .reflect(writer)
            .applied_objects()
            .predicate_filter(predicates::generation);

        let secret_events = pull_secret_triggers(
            watcher(secrets, WatcherConfig::default()).default_backoff(),
        );

        let context = Arc::new(self);

        Controller::for_stream(binding_events, reader)
            .owns_stream(secret_events)
            .shutdown_on_signal()
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled binding: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }

    /// Drive one binding through its lifecycle
    #[instrument(skip(self))]
    pub async fn reconcile_binding(&self, namespace: &str, name: &str) -> Result<Reconciled> {
        let bindings: Api<AcrPullBinding> = Api::namespaced(self.client.clone(), namespace);

        let Some(mut binding) = bindings.get_opt(name).await? else {
            info!("AcrPullBinding not found, assuming it was deleted");
            return Ok(Reconciled::Absent);
        };

        if binding.is_being_deleted() {
            self.finalize(&bindings, binding).await?;
            return Ok(Reconciled::Finalized);
        }

        if !binding.has_finalizer() {
            info!("Adding finalizer {}", FINALIZER);
            binding.finalizers_mut().push(FINALIZER.to_string());
            bindings
                .replace(name, &PostParams::default(), &binding)
                .await
                .inspect_err(|e| error!("Failed to add finalizer: {}", e))?;
            return Ok(Reconciled::FinalizerAdded);
        }

        match self.refresh(&binding).await {
            Ok(token) => {
                self.record_success(&bindings, name, &token).await;
                let requeue_after = token_refresh_duration(token.expires_on, Utc::now());
                info!(
                    "Pull secret refreshed, token expires at {}, next refresh in {}s",
                    token.expires_on,
                    requeue_after.as_secs()
                );
                Ok(Reconciled::Refreshed {
                    expires_on: token.expires_on,
                    requeue_after,
                })
            }
            Err(e) => {
                error!("Failed to refresh pull secret: {}", e);
                self.record_error(&bindings, name, &e).await;
                Err(e)
            }
        }
    }

    /// Acquire a fresh token, write it into the pull secret, and attach the secret
    async fn refresh(&self, binding: &AcrPullBinding) -> Result<AccessToken> {
        let namespace = binding.namespace().unwrap_or_default();
        let target = resolve_target(&binding.spec, &self.config)?;

        let token = match &target.selector {
            IdentitySelector::ClientId(id) => {
                self.authorizer
                    .acquire_with_client_id(id, &target.registry)
                    .await?
            }
            IdentitySelector::ResourceId(id) => {
                self.authorizer
                    .acquire_with_resource_id(id, &target.registry)
                    .await?
            }
        };

        let docker_config = render_docker_config(&target.registry, &token)?;
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);

        match find_owned_pull_secret(&secrets, binding).await? {
            None => {
                info!("Creating pull secret {}", binding.pull_secret_name());
                let secret = build_pull_secret(binding, &docker_config)?;
                secrets.create(&PostParams::default(), &secret).await?;
            }
            Some(existing) => {
                info!("Updating pull secret {}", existing.name_any());
                let secret_name = existing.name_any();
                let secret = update_pull_secret(existing, &docker_config);
                secrets
                    .replace(&secret_name, &PostParams::default(), &secret)
                    .await?;
            }
        }

        let service_accounts: Api<ServiceAccount> =
            Api::namespaced(self.client.clone(), &namespace);
        attach_pull_secret(
            &service_accounts,
            binding.service_account_name(),
            &binding.pull_secret_name(),
        )
        .await?;

        Ok(token)
    }

    /// Detach the pull secret and release the finalizer. The secret itself is
    /// garbage collected through its owner reference.
    async fn finalize(&self, bindings: &Api<AcrPullBinding>, mut binding: AcrPullBinding) -> Result<()> {
        if !binding.has_finalizer() {
            debug!("Binding is being deleted and holds no finalizer");
            return Ok(());
        }

        let namespace = binding.namespace().unwrap_or_default();
        let service_accounts: Api<ServiceAccount> = Api::namespaced(self.client.clone(), &namespace);
        detach_pull_secret(
            &service_accounts,
            binding.service_account_name(),
            &binding.pull_secret_name(),
        )
        .await?;

        let name = binding.name_any();
        binding.finalizers_mut().retain(|f| f != FINALIZER);
        bindings
            .replace(&name, &PostParams::default(), &binding)
            .await
            .inspect_err(|e| error!("Failed to remove finalizer: {}", e))?;

        info!("Removed finalizer {}", FINALIZER);
        Ok(())
    }

    async fn record_success(&self, bindings: &Api<AcrPullBinding>, name: &str, token: &AccessToken) {
        let status = serde_json::json!({
            "status": {
                "lastTokenRefreshTime": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                "tokenExpirationTime": token.expires_on.to_rfc3339_opts(SecondsFormat::Secs, true),
                "error": null,
            }
        });
        if let Err(e) = bindings
            .patch_status(name, &status_params(), &Patch::Merge(&status))
            .await
        {
            error!("Failed to update success status: {}", e);
        }
    }

    async fn record_error(&self, bindings: &Api<AcrPullBinding>, name: &str, err: &AcrPullError) {
        let status = serde_json::json!({
            "status": { "error": err.to_string() }
        });
        if let Err(e) = bindings
            .patch_status(name, &status_params(), &Patch::Merge(&status))
            .await
        {
            error!("Failed to update error status: {}", e);
        }
    }
}

fn status_params() -> PatchParams {
    PatchParams {
        field_manager: Some(OPERATOR_NAME.to_string()),
        ..Default::default()
    }
}

/// Secret events that wake the owning binding.
///
/// Only deletions pass. Every refresh rewrites the secret data, so letting
/// applies through would requeue the binding on its own writes.
pub fn pull_secret_triggers<S>(
    events: S,
) -> impl Stream<Item = std::result::Result<Secret, watcher::Error>> + Send + 'static
where
    S: Stream<Item = std::result::Result<watcher::Event<Secret>, watcher::Error>> + Send + 'static,
{
    events.try_filter_map(|event| async move {
        Ok(match event {
            watcher::Event::Delete(secret) => Some(secret),
            watcher::Event::Apply(_)
            | watcher::Event::Init
            | watcher::Event::InitApply(_)
            | watcher::Event::InitDone => None,
        })
    })
}

/// Pick the identity and registry for a binding.
///
/// Precedence: binding client id, binding resource id, default client id,
/// default resource id. The registry falls back to the configured default.
pub fn resolve_target(spec: &AcrPullBindingSpec, config: &Config) -> Result<BindingTarget> {
    let selector = non_empty(spec.managed_identity_client_id.as_deref())
        .map(|id| IdentitySelector::ClientId(id.to_string()))
        .or_else(|| {
            clean_resource_id(spec.managed_identity_resource_id.as_deref()).map(IdentitySelector::ResourceId)
        })
        .or_else(|| {
            non_empty(config.default_client_id.as_deref())
                .map(|id| IdentitySelector::ClientId(id.to_string()))
        })
        .or_else(|| clean_resource_id(config.default_resource_id.as_deref()).map(IdentitySelector::ResourceId))
        .ok_or_else(|| {
            AcrPullError::MissingTarget(
                "no managed identity on the binding and no default configured".to_string(),
            )
        })?;

    let registry = non_empty(spec.acr_server.as_deref())
        .or_else(|| non_empty(config.default_acr_server.as_deref()))
        .ok_or_else(|| {
            AcrPullError::MissingTarget(
                "no registry on the binding and no default configured".to_string(),
            )
        })?
        .to_string();

    Ok(BindingTarget { selector, registry })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Normalize a resource id path: drop empty and `.` segments and any trailing slash
fn clean_resource_id(raw: Option<&str>) -> Option<String> {
    let raw = non_empty(raw)?;
    let segments: Vec<&str> = raw
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    if segments.is_empty() {
        return None;
    }

    let joined = segments.join("/");
    Some(if raw.starts_with('/') {
        format!("/{}", joined)
    } else {
        joined
    })
}

/// Delay until the token should be renewed: expiry minus the refresh buffer, never negative
pub fn token_refresh_duration(expires_on: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (expires_on - now)
        .to_std()
        .ok()
        .and_then(|remaining| remaining.checked_sub(TOKEN_REFRESH_BUFFER))
        .unwrap_or(Duration::ZERO)
}

fn binding_key(binding: &AcrPullBinding) -> String {
    format!(
        "{}/{}",
        binding.namespace().unwrap_or_default(),
        binding.name_any()
    )
}

async fn reconcile(binding: Arc<AcrPullBinding>, ctx: Arc<BindingReconciler>) -> Result<Action> {
    let namespace = binding.namespace().unwrap_or_default();
    let name = binding.name_any();
    let key = binding_key(&binding);
    let timeout = ctx.config.reconcile_timeout;

    let outcome = tokio::time::timeout(timeout, ctx.reconcile_binding(&namespace, &name))
        .await
        .map_err(|_| {
            AcrPullError::Cancelled(format!(
                "reconciliation of {} exceeded {}s",
                key,
                timeout.as_secs()
            ))
        })??;

    ctx.backoff.reset(&key);
    Ok(outcome.action())
}

fn error_policy(
    binding: Arc<AcrPullBinding>,
    error: &AcrPullError,
    ctx: Arc<BindingReconciler>,
) -> Action {
    let key = binding_key(&binding);
    let delay = ctx.backoff.next_delay(&key);
    error!("Reconciliation of {} failed, retrying in {}s: {}", key, delay.as_secs(), error);
    Action::requeue(delay)
}
