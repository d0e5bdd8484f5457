// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Registry access token acquisition for managed identities.

pub mod exchange;
pub mod identity;

pub use exchange::TokenExchanger;
pub use identity::{IdentitySelector, IdentityTokenProvider, ImdsTokenProvider};

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use tracing::{info, instrument};

/// Registry bearer token and the instant it stops being accepted
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Acquires registry access tokens on behalf of a managed identity
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn acquire_with_resource_id(&self, resource_id: &str, registry: &str) -> Result<AccessToken>;

    async fn acquire_with_client_id(&self, client_id: &str, registry: &str) -> Result<AccessToken>;
}

/// Fetches an identity token and exchanges it at the registry. Every call
/// performs the full exchange; nothing is cached between calls.
pub struct AcrAuthorizer<P> {
    identity: P,
    exchanger: TokenExchanger,
}

impl<P: IdentityTokenProvider> AcrAuthorizer<P> {
    pub fn new(identity: P, exchanger: TokenExchanger) -> Self {
        Self { identity, exchanger }
    }

    #[instrument(skip(self))]
    async fn acquire(&self, selector: IdentitySelector, registry: &str) -> Result<AccessToken> {
        let identity_token = self.identity.acquire_token(&selector).await?;
        let token = self.exchanger.exchange(&identity_token, registry).await?;
        info!("Acquired registry token for {} expiring at {}", registry, token.expires_on);
        Ok(token)
    }
}

#[async_trait]
impl<P: IdentityTokenProvider> Authorizer for AcrAuthorizer<P> {
    async fn acquire_with_resource_id(&self, resource_id: &str, registry: &str) -> Result<AccessToken> {
        self.acquire(IdentitySelector::ResourceId(resource_id.to_string()), registry)
            .await
    }

    async fn acquire_with_client_id(&self, client_id: &str, registry: &str) -> Result<AccessToken> {
        self.acquire(IdentitySelector::ClientId(client_id.to_string()), registry)
            .await
    }
}
