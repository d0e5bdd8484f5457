// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AcrPullError {
    #[error("Failed to acquire managed identity token: {0}")]
    IdentityAcquisition(String),

    #[error("Registry token exchange failed: {0}")]
    Exchange(String),

    #[error("Failed to decode registry access token: {0}")]
    TokenDecode(String),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to encode docker config: {0}")]
    Encode(String),

    #[error("Missing binding target: {0}")]
    MissingTarget(String),

    #[error("Reconciliation cancelled: {0}")]
    Cancelled(String),
}

pub type Result<T> = std::result::Result<T, AcrPullError>;
