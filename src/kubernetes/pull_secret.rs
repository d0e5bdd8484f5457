// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Docker config rendering and pull secret construction

use crate::authorizer::AccessToken;
use crate::constants::pull_secret::{DOCKER_CONFIG_KEY, SECRET_TYPE, TOKEN_USERNAME};
use crate::error::{AcrPullError, Result};
use crate::types::AcrPullBinding;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use k8s_openapi::ByteString;
use kube::{
    api::ObjectMeta,
    Api, Resource, ResourceExt,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

#[derive(Serialize)]
struct DockerConfig<'a> {
    auths: BTreeMap<&'a str, DockerAuth<'a>>,
}

#[derive(Serialize)]
struct DockerAuth<'a> {
    username: &'a str,
    password: &'a str,
    auth: String,
}

/// Render a `.dockerconfigjson` document with a single registry entry
pub fn render_docker_config(registry: &str, token: &AccessToken) -> Result<String> {
    let auth = STANDARD.encode(format!("{}:{}", TOKEN_USERNAME, token.token));
    let config = DockerConfig {
        auths: BTreeMap::from([(
            registry,
            DockerAuth {
                username: TOKEN_USERNAME,
                password: &token.token,
                auth,
            },
        )]),
    };

    serde_json::to_string(&config).map_err(|e| AcrPullError::Encode(e.to_string()))
}

/// Build a new pull secret owned by the binding
pub fn build_pull_secret(binding: &AcrPullBinding, docker_config: &str) -> Result<Secret> {
    let owner = binding.controller_owner_ref(&()).ok_or_else(|| {
        AcrPullError::Encode(format!(
            "binding {} has no uid to own its pull secret",
            binding.name_any()
        ))
    })?;

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(binding.pull_secret_name()),
            namespace: binding.namespace(),
            labels: Some(BTreeMap::new()),
            annotations: Some(BTreeMap::new()),
            owner_references: Some(vec![OwnerReference {
                block_owner_deletion: Some(true),
                ..owner
            }]),
            ..Default::default()
        },
        type_: Some(SECRET_TYPE.to_string()),
        data: Some(BTreeMap::from([(
            DOCKER_CONFIG_KEY.to_string(),
            ByteString(docker_config.as_bytes().to_vec()),
        )])),
        ..Default::default()
    })
}

/// Replace the docker config of an existing pull secret, leaving everything else intact
pub fn update_pull_secret(mut secret: Secret, docker_config: &str) -> Secret {
    secret.data.get_or_insert_with(BTreeMap::new).insert(
        DOCKER_CONFIG_KEY.to_string(),
        ByteString(docker_config.as_bytes().to_vec()),
    );
    secret
}

/// Name of the AcrPullBinding controlling this secret, if any
pub fn controller_owner_name(secret: &Secret) -> Option<&str> {
    let api_version = AcrPullBinding::api_version(&());
    let kind = AcrPullBinding::kind(&());

    secret
        .owner_references()
        .iter()
        .find(|o| o.controller == Some(true))
        .filter(|o| o.api_version == api_version && o.kind == kind)
        .map(|o| o.name.as_str())
}

/// Fetch the binding's pull secret, provided the binding controls it.
/// A same-named secret owned by anything else is treated as absent.
#[instrument(skip(secrets, binding), fields(binding = %binding.name_any()))]
pub async fn find_owned_pull_secret(
    secrets: &Api<Secret>,
    binding: &AcrPullBinding,
) -> Result<Option<Secret>> {
    let owner = binding.name_any();
    let name = binding.pull_secret_name();

    let found = secrets
        .get_opt(&name)
        .await?
        .filter(|s| controller_owner_name(s) == Some(owner.as_str()));

    debug!("Owned pull secret {} present: {}", name, found.is_some());
    Ok(found)
}
