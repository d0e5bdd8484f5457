// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

/// Field manager recorded on status writes
pub const OPERATOR_NAME: &str = "acrpull";

/// Finalizer placed on every AcrPullBinding until its service account is cleaned up
pub const FINALIZER: &str = "msi-acrpull.microsoft.com";

/// Service account that receives the pull secret when a binding names none
pub const DEFAULT_SERVICE_ACCOUNT: &str = "default";

/// Renewal happens this long before the registry token expires
pub const TOKEN_REFRESH_BUFFER: Duration = Duration::from_secs(30 * 60);

/// Pull secret layout
pub mod pull_secret {
    /// Suffix appended to the binding name
    pub const NAME_SUFFIX: &str = "-msi-acrpull-secret";
    /// Data key holding the docker config document
    pub const DOCKER_CONFIG_KEY: &str = ".dockerconfigjson";
    pub const SECRET_TYPE: &str = "kubernetes.io/dockerconfigjson";
    /// Fixed username ACR expects alongside an access token
    pub const TOKEN_USERNAME: &str = "00000000-0000-0000-0000-000000000000";
}

/// Identity and registry endpoints
pub mod auth {
    pub const DEFAULT_IDENTITY_ENDPOINT: &str =
        "http://169.254.169.254/metadata/identity/oauth2/token";
    pub const IDENTITY_API_VERSION: &str = "2018-02-01";
    /// Audience of the identity token handed to the registry
    pub const MANAGEMENT_RESOURCE: &str = "https://management.azure.com/";
    /// Pull access across the whole registry; repository-scoped tokens need admin APIs
    pub const DEFAULT_REGISTRY_SCOPE: &str = "repository:*:pull";
    pub const REFRESH_TOKEN_GRANT: &str = "refresh_token";
}

pub mod crd {
    /// Seconds between checks while waiting for the CRD at startup
    pub const POLL_INTERVAL_SECS: u64 = 5;
}

/// Error requeue backoff
pub mod backoff {
    pub const BASE_SECS: u64 = 5;
    pub const MAX_SECS: u64 = 300;
}
