// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Managed identity token acquisition

use crate::constants::auth::{IDENTITY_API_VERSION, MANAGEMENT_RESOURCE};
use crate::error::{AcrPullError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use tracing::{debug, instrument};
use url::Url;

/// Selects which managed identity a token is requested for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySelector {
    /// Full ARM resource id of a user-assigned identity
    ResourceId(String),
    ClientId(String),
}

impl fmt::Display for IdentitySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentitySelector::ResourceId(id) => write!(f, "resource id {}", id),
            IdentitySelector::ClientId(id) => write!(f, "client id {}", id),
        }
    }
}

/// Source of identity tokens for the resource-management audience
#[async_trait]
pub trait IdentityTokenProvider: Send + Sync {
    async fn acquire_token(&self, selector: &IdentitySelector) -> Result<String>;
}

/// Requests tokens from the instance metadata managed identity endpoint
#[derive(Debug, Clone)]
pub struct ImdsTokenProvider {
    http: reqwest::Client,
    endpoint: Url,
}

#[derive(Deserialize)]
struct ImdsTokenResponse {
    access_token: Option<String>,
}

impl ImdsTokenProvider {
    pub fn new(http: reqwest::Client, endpoint: Url) -> Self {
        Self { http, endpoint }
    }

    fn token_url(&self, selector: &IdentitySelector) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("api-version", IDENTITY_API_VERSION)
                .append_pair("resource", MANAGEMENT_RESOURCE);
            match selector {
                IdentitySelector::ResourceId(id) => query.append_pair("msi_res_id", id),
                IdentitySelector::ClientId(id) => query.append_pair("client_id", id),
            };
        }
        url
    }
}

#[async_trait]
impl IdentityTokenProvider for ImdsTokenProvider {
    #[instrument(skip(self))]
    async fn acquire_token(&self, selector: &IdentitySelector) -> Result<String> {
        let url = self.token_url(selector);
        debug!("Requesting managed identity token from {}", self.endpoint);

        let response = self
            .http
            .get(url)
            .header("Metadata", "true")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AcrPullError::IdentityAcquisition(format!("{}: {}", selector, e)))?;

        let body: ImdsTokenResponse = response
            .json()
            .await
            .map_err(|e| AcrPullError::IdentityAcquisition(format!("{}: {}", selector, e)))?;

        body.access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AcrPullError::IdentityAcquisition(format!(
                    "{}: identity endpoint returned no access token",
                    selector
                ))
            })
    }
}
