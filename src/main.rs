// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::Client;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use acrpull::authorizer::{AcrAuthorizer, ImdsTokenProvider, TokenExchanger};
use acrpull::config::Config;
use acrpull::kubernetes::wait_for_binding_crd;
use acrpull::reconcilers::BindingReconciler;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting acrpull controller");

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: default_acr_server={:?}, default identity configured={}, scope={}",
        config.default_acr_server,
        config.default_client_id.is_some() || config.default_resource_id.is_some(),
        config.registry_scope
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    info!("Waiting for AcrPullBinding CRD to become available...");
    wait_for_binding_crd(&client).await?;

    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()?;
    let identity = ImdsTokenProvider::new(http.clone(), config.identity_endpoint.clone());
    let exchanger = TokenExchanger::new(http).with_scope(config.registry_scope.clone());
    let authorizer = Arc::new(AcrAuthorizer::new(identity, exchanger));

    let reconciler = BindingReconciler::new(client, authorizer, config);

    info!("Starting reconciler...");
    reconciler.run().await?;

    info!("Controller shut down");
    Ok(())
}
