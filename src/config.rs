// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::auth::{DEFAULT_IDENTITY_ENDPOINT, DEFAULT_REGISTRY_SCOPE};
use anyhow::{Context, Result};
use std::env;
use std::time::Duration;
use url::Url;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Identity used when a binding selects none
    pub default_resource_id: Option<String>,
    pub default_client_id: Option<String>,
    /// Registry used when a binding names none
    pub default_acr_server: Option<String>,
    /// Managed identity token endpoint
    pub identity_endpoint: Url,
    pub registry_scope: String,
    /// Upper bound for a single reconciliation
    pub reconcile_timeout: Duration,
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_resource_id: None,
            default_client_id: None,
            default_acr_server: None,
            identity_endpoint: Url::parse(DEFAULT_IDENTITY_ENDPOINT)
                .expect("default identity endpoint is a valid URL"),
            registry_scope: DEFAULT_REGISTRY_SCOPE.to_string(),
            reconcile_timeout: Duration::from_secs(300),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let identity_endpoint = match non_empty_var("IDENTITY_ENDPOINT") {
            Some(raw) => Url::parse(&raw)
                .with_context(|| format!("IDENTITY_ENDPOINT is not a valid URL: {}", raw))?,
            None => defaults.identity_endpoint,
        };

        Ok(Config {
            default_resource_id: non_empty_var("DEFAULT_MANAGED_IDENTITY_RESOURCE_ID"),
            default_client_id: non_empty_var("DEFAULT_MANAGED_IDENTITY_CLIENT_ID"),
            default_acr_server: non_empty_var("DEFAULT_ACR_SERVER"),
            identity_endpoint,
            registry_scope: non_empty_var("ACR_TOKEN_SCOPE").unwrap_or(defaults.registry_scope),
            reconcile_timeout: secs_var("RECONCILE_TIMEOUT_SECS")?
                .unwrap_or(defaults.reconcile_timeout),
            http_timeout: secs_var("HTTP_TIMEOUT_SECS")?.unwrap_or(defaults.http_timeout),
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn secs_var(key: &str) -> Result<Option<Duration>> {
    non_empty_var(key)
        .map(|raw| {
            raw.parse::<u64>()
                .map(Duration::from_secs)
                .with_context(|| format!("{} must be a number of seconds, got {}", key, raw))
        })
        .transpose()
}
