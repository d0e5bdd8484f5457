// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Service account image pull secret references

use crate::error::{AcrPullError, Result};
use k8s_openapi::api::core::v1::{LocalObjectReference, ServiceAccount};
use kube::{api::PostParams, Api};
use tracing::{debug, info, instrument};

/// Add a pull secret reference unless it is already present. Returns whether the account changed.
pub fn add_pull_secret_ref(service_account: &mut ServiceAccount, secret_name: &str) -> bool {
    let refs = service_account.image_pull_secrets.get_or_insert_with(Vec::new);
    if refs.iter().any(|r| r.name == secret_name) {
        return false;
    }
    refs.push(LocalObjectReference {
        name: secret_name.to_string(),
    });
    true
}

/// Drop every reference to the pull secret. Returns whether the account changed.
pub fn remove_pull_secret_ref(service_account: &mut ServiceAccount, secret_name: &str) -> bool {
    let Some(refs) = service_account.image_pull_secrets.as_mut() else {
        return false;
    };
    let before = refs.len();
    refs.retain(|r| r.name != secret_name);
    refs.len() != before
}

/// Ensure the service account references the pull secret
#[instrument(skip(service_accounts))]
pub async fn attach_pull_secret(
    service_accounts: &Api<ServiceAccount>,
    service_account_name: &str,
    secret_name: &str,
) -> Result<()> {
    let Some(mut service_account) = service_accounts.get_opt(service_account_name).await? else {
        return Err(AcrPullError::NotFound(format!(
            "service account {}",
            service_account_name
        )));
    };

    if !add_pull_secret_ref(&mut service_account, secret_name) {
        debug!("Service account already references {}", secret_name);
        return Ok(());
    }

    info!("Adding pull secret {} to service account {}", secret_name, service_account_name);
    service_accounts
        .replace(service_account_name, &PostParams::default(), &service_account)
        .await?;
    Ok(())
}

/// Remove the pull secret reference, tolerating a service account that no longer exists
#[instrument(skip(service_accounts))]
pub async fn detach_pull_secret(
    service_accounts: &Api<ServiceAccount>,
    service_account_name: &str,
    secret_name: &str,
) -> Result<()> {
    let Some(mut service_account) = service_accounts.get_opt(service_account_name).await? else {
        info!(
            "Service account {} not found, nothing to detach",
            service_account_name
        );
        return Ok(());
    };

    if !remove_pull_secret_ref(&mut service_account, secret_name) {
        debug!("Service account does not reference {}", secret_name);
        return Ok(());
    }

    info!("Removing pull secret {} from service account {}", secret_name, service_account_name);
    service_accounts
        .replace(service_account_name, &PostParams::default(), &service_account)
        .await?;
    Ok(())
}
