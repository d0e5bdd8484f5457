// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for CRD discovery, pull secrets, and service accounts.

pub mod crd;
pub mod pull_secret;
pub mod service_account;

pub use crd::wait_for_binding_crd;
pub use pull_secret::{
    build_pull_secret, controller_owner_name, find_owned_pull_secret, render_docker_config,
    update_pull_secret,
};
pub use service_account::{attach_pull_secret, detach_pull_secret};
