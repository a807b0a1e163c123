//! `management.cattle.io/v3` resources guarded or consulted by the webhook
//!
//! These objects keep their fields at the top level rather than under a
//! `spec`, so they implement the `k8s_openapi` resource traits by hand and
//! get `kube::Resource` through its blanket implementation.

use k8s_openapi::api::rbac::v1::PolicyRule;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use serde::{Deserialize, Serialize};

pub const MANAGEMENT_GROUP: &str = "management.cattle.io";
pub const MANAGEMENT_VERSION: &str = "v3";

macro_rules! management_resource {
    ($ty:ident, $kind:literal, $plural:literal, $scope:ty) => {
        impl k8s_openapi::Resource for $ty {
            const API_VERSION: &'static str = "management.cattle.io/v3";
            const GROUP: &'static str = MANAGEMENT_GROUP;
            const KIND: &'static str = $kind;
            const VERSION: &'static str = MANAGEMENT_VERSION;
            const URL_PATH_SEGMENT: &'static str = $plural;
            type Scope = $scope;
        }

        impl k8s_openapi::Metadata for $ty {
            type Ty = ObjectMeta;

            fn metadata(&self) -> &ObjectMeta {
                &self.metadata
            }

            fn metadata_mut(&mut self) -> &mut ObjectMeta {
                &mut self.metadata
            }
        }
    };
}

/// Cluster-wide set of rules granted through a `GlobalRoleBinding`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalRole {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
    #[serde(default)]
    pub builtin: bool,
    #[serde(default)]
    pub new_user_default: bool,
}

management_resource!(GlobalRole, "GlobalRole", "globalroles", ClusterResourceScope);

/// Grants a `GlobalRole` to a user or group principal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalRoleBinding {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub global_role_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_principal_name: Option<String>,
}

management_resource!(
    GlobalRoleBinding,
    "GlobalRoleBinding",
    "globalrolebindings",
    ClusterResourceScope
);

/// Reusable set of rules for cluster or project bindings
///
/// `role_template_names` lists templates whose rules are inherited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleTemplate {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
    #[serde(default)]
    pub role_template_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub builtin: bool,
    #[serde(default)]
    pub external: bool,
    #[serde(default)]
    pub locked: bool,
}

management_resource!(RoleTemplate, "RoleTemplate", "roletemplates", ClusterResourceScope);

/// Grants a `RoleTemplate` within a project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRoleTemplateBinding {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub project_name: String,
    pub role_template_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_principal_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_principal_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
}

management_resource!(
    ProjectRoleTemplateBinding,
    "ProjectRoleTemplateBinding",
    "projectroletemplatebindings",
    NamespaceResourceScope
);

/// Grants a `RoleTemplate` within a downstream cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRoleTemplateBinding {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub cluster_name: String,
    pub role_template_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_principal_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_principal_name: Option<String>,
}

management_resource!(
    ClusterRoleTemplateBinding,
    "ClusterRoleTemplateBinding",
    "clusterroletemplatebindings",
    NamespaceResourceScope
);
