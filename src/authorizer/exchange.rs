// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Two-hop registry token exchange: identity token -> refresh token -> access token.

use super::AccessToken;
use crate::constants::auth::{DEFAULT_REGISTRY_SCOPE, REFRESH_TOKEN_GRANT};
use crate::error::{AcrPullError, Result};
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument};
use url::Url;

#[derive(Deserialize)]
struct RefreshTokenResponse {
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: Option<String>,
}

/// Exchanges identity tokens for registry access tokens
#[derive(Debug, Clone)]
pub struct TokenExchanger {
    http: reqwest::Client,
    scope: String,
}

impl TokenExchanger {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            scope: DEFAULT_REGISTRY_SCOPE.to_string(),
        }
    }

    /// Override the access token scope
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    #[instrument(skip(self, identity_token))]
    pub async fn exchange(&self, identity_token: &str, registry: &str) -> Result<AccessToken> {
        let endpoint = registry_endpoint(registry)?;
        let service = endpoint
            .host_str()
            .ok_or_else(|| AcrPullError::Exchange(format!("registry {} has no host", registry)))?
            .to_string();

        let refresh_token = self
            .exchange_for_refresh_token(&endpoint, &service, identity_token)
            .await?;
        debug!("Obtained refresh token from {}", service);

        let access_token = self
            .exchange_for_access_token(&endpoint, &service, &refresh_token)
            .await?;

        let expires_on = decode_expiry(&access_token)?;
        debug!("Obtained access token for {} expiring at {}", service, expires_on);

        Ok(AccessToken {
            token: access_token,
            expires_on,
        })
    }

    async fn exchange_for_refresh_token(
        &self,
        endpoint: &Url,
        service: &str,
        identity_token: &str,
    ) -> Result<String> {
        let url = join(endpoint, "oauth2/exchange")?;
        let form = [
            ("grant_type", REFRESH_TOKEN_GRANT),
            ("service", service),
            ("access_token", identity_token),
        ];

        let response: RefreshTokenResponse = self
            .post_form(url, &form)
            .await
            .map_err(|e| {
                AcrPullError::Exchange(format!(
                    "failed to exchange identity token for refresh token: {}",
                    e
                ))
            })?;

        response
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AcrPullError::Exchange(
                    "empty response when exchanging identity token for refresh token".to_string(),
                )
            })
    }

    async fn exchange_for_access_token(
        &self,
        endpoint: &Url,
        service: &str,
        refresh_token: &str,
    ) -> Result<String> {
        let url = join(endpoint, "oauth2/token")?;
        let form = [
            ("grant_type", REFRESH_TOKEN_GRANT),
            ("service", service),
            ("scope", self.scope.as_str()),
            ("refresh_token", refresh_token),
        ];

        let response: AccessTokenResponse = self
            .post_form(url, &form)
            .await
            .map_err(|e| {
                AcrPullError::Exchange(format!(
                    "failed to exchange refresh token for access token: {}",
                    e
                ))
            })?;

        response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AcrPullError::Exchange(
                    "empty response when exchanging refresh token for access token".to_string(),
                )
            })
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        form: &[(&str, &str)],
    ) -> std::result::Result<T, reqwest::Error> {
        self.http
            .post(url)
            .form(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

/// Registry authentication endpoint; bare hosts are served over https
fn registry_endpoint(registry: &str) -> Result<Url> {
    let raw = if registry.contains("://") {
        registry.to_string()
    } else {
        format!("https://{}", registry)
    };

    Url::parse(&raw)
        .map_err(|e| AcrPullError::Exchange(format!("invalid registry endpoint {}: {}", raw, e)))
}

fn join(endpoint: &Url, path: &str) -> Result<Url> {
    endpoint
        .join(path)
        .map_err(|e| AcrPullError::Exchange(format!("invalid registry endpoint {}: {}", endpoint, e)))
}

/// Reads the `exp` claim without verifying the signature.
///
/// The token was just issued by the registry in response to our own identity
/// token and no verification key is available here, so the signature is not
/// checked. Only the expiry is trusted, and only for scheduling renewal.
pub fn decode_expiry(token: &str) -> Result<DateTime<Utc>> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = jsonwebtoken::decode::<Map<String, Value>>(
        token,
        &DecodingKey::from_secret(&[]),
        &validation,
    )
    .map_err(|e| AcrPullError::TokenDecode(format!("malformed access token: {}", e)))?;

    let seconds = match data.claims.get("exp") {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| AcrPullError::TokenDecode(format!("unusable exp claim {}", n)))?,
        Some(other) => {
            return Err(AcrPullError::TokenDecode(format!(
                "exp claim is not numeric: {}",
                other
            )))
        }
        None => return Err(AcrPullError::TokenDecode("missing exp claim".to_string())),
    };

    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| AcrPullError::TokenDecode(format!("exp claim out of range: {}", seconds)))
}
