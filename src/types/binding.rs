// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{pull_secret::NAME_SUFFIX, DEFAULT_SERVICE_ACCOUNT, FINALIZER};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};

/// Binds a managed identity to a container registry and a service account in the same namespace.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[kube(
    group = "msi-acrpull.microsoft.com",
    version = "v1beta1",
    kind = "AcrPullBinding"
)]
#[kube(namespaced)]
#[kube(status = "AcrPullBindingStatus")]
#[kube(
    printcolumn = r#"{"name":"Expires","type":"date","jsonPath":".status.tokenExpirationTime"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AcrPullBindingSpec {
    /// Registry host, e.g. example.azurecr.io
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acr_server: Option<String>,
    #[serde(
        default,
        rename = "managedIdentityResourceID",
        skip_serializing_if = "Option::is_none"
    )]
    pub managed_identity_resource_id: Option<String>,
    #[serde(
        default,
        rename = "managedIdentityClientID",
        skip_serializing_if = "Option::is_none"
    )]
    pub managed_identity_client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AcrPullBindingStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_token_refresh_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_expiration_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AcrPullBinding {
    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == FINALIZER)
    }

    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Name of the pull secret derived from this binding
    pub fn pull_secret_name(&self) -> String {
        format!("{}{}", self.name_any(), NAME_SUFFIX)
    }

    /// Service account that references the pull secret
    pub fn service_account_name(&self) -> &str {
        self.spec
            .service_account_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SERVICE_ACCOUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    fn make_binding(name: &str, spec: AcrPullBindingSpec) -> AcrPullBinding {
        AcrPullBinding {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("apps".to_string()),
                ..Default::default()
            },
            spec,
            status: None,
        }
    }

    #[test]
    fn test_pull_secret_name() {
        let binding = make_binding("b1", AcrPullBindingSpec::default());
        assert_eq!(binding.pull_secret_name(), "b1-msi-acrpull-secret");
    }

    #[test]
    fn test_service_account_name_defaults() {
        let binding = make_binding("b1", AcrPullBindingSpec::default());
        assert_eq!(binding.service_account_name(), "default");

        let binding = make_binding(
            "b1",
            AcrPullBindingSpec {
                service_account_name: Some(String::new()),
                ..Default::default()
            },
        );
        assert_eq!(binding.service_account_name(), "default");
    }

    #[test]
    fn test_service_account_name_from_spec() {
        let binding = make_binding(
            "b1",
            AcrPullBindingSpec {
                service_account_name: Some("puller".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(binding.service_account_name(), "puller");
    }

    #[test]
    fn test_has_finalizer() {
        let mut binding = make_binding("b1", AcrPullBindingSpec::default());
        assert!(!binding.has_finalizer());

        binding.metadata.finalizers = Some(vec![FINALIZER.to_string()]);
        assert!(binding.has_finalizer());
    }

    #[test]
    fn test_spec_field_names() {
        let spec: AcrPullBindingSpec = serde_json::from_value(serde_json::json!({
            "acrServer": "r.azurecr.io",
            "managedIdentityResourceID": "/sub/id1",
            "managedIdentityClientID": "client-1",
            "serviceAccountName": "puller"
        }))
        .unwrap();

        assert_eq!(spec.acr_server.as_deref(), Some("r.azurecr.io"));
        assert_eq!(spec.managed_identity_resource_id.as_deref(), Some("/sub/id1"));
        assert_eq!(spec.managed_identity_client_id.as_deref(), Some("client-1"));
        assert_eq!(spec.service_account_name.as_deref(), Some("puller"));
    }
}
