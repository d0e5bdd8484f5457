// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Startup gate on the AcrPullBinding CRD

use crate::constants::crd::POLL_INTERVAL_SECS;
use crate::error::Result;
use crate::types::AcrPullBinding;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{Api, Client, CustomResourceExt, Resource};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Block until the API server reports the AcrPullBinding CRD as established
/// and serving the version this controller speaks.
pub async fn wait_for_binding_crd(client: &Client) -> Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let name = AcrPullBinding::crd_name();
    let version = AcrPullBinding::version(&());

    let mut ticker = interval(Duration::from_secs(POLL_INTERVAL_SECS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match crds.get_opt(name).await {
            Ok(Some(crd)) if crd_ready(&crd, &version) => {
                info!("CRD {} is established, serving {}", name, version);
                return Ok(());
            }
            Ok(Some(_)) => debug!("CRD {} exists but is not established for {}", name, version),
            Ok(None) => info!("CRD {} not installed yet", name),
            Err(e) => warn!("Failed to read CRD {}: {}", name, e),
        }
    }
}

/// True once `Established` is set and `version` is served
pub fn crd_ready(crd: &CustomResourceDefinition, version: &str) -> bool {
    let established = crd
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == "Established" && c.status == "True")
        });

    established
        && crd
            .spec
            .versions
            .iter()
            .any(|v| v.name == version && v.served)
}
