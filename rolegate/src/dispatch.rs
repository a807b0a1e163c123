//! Routing of admission requests to the validator for their kind

use std::fmt;
use std::sync::Arc;

use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleBinding};
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};

use crate::admission::AdmissionValidator;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::lookup::RbacLookup;
use crate::resources::{
    ClusterRoleTemplateBinding, GlobalRoleBinding, MANAGEMENT_GROUP, MANAGEMENT_VERSION,
    ProjectRoleTemplateBinding,
};
use crate::validators::BindingValidator;

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";
const RBAC_VERSION: &str = "v1";

/// Kinds whose creation, update or deletion is checked for escalation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardedKind {
    GlobalRoleBinding,
    ProjectRoleTemplateBinding,
    ClusterRoleTemplateBinding,
    RoleBinding,
    ClusterRoleBinding,
}

impl GuardedKind {
    pub const ALL: [Self; 5] = [
        Self::GlobalRoleBinding,
        Self::ProjectRoleTemplateBinding,
        Self::ClusterRoleTemplateBinding,
        Self::RoleBinding,
        Self::ClusterRoleBinding,
    ];

    /// Looks up the guarded kind for an exact group, version and kind
    pub fn from_gvk(gvk: &GroupVersionKind) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| {
            kind.group() == gvk.group && kind.version() == gvk.version && kind.kind() == gvk.kind
        })
    }

    pub const fn group(self) -> &'static str {
        match self {
            Self::GlobalRoleBinding | Self::ProjectRoleTemplateBinding | Self::ClusterRoleTemplateBinding => {
                MANAGEMENT_GROUP
            }
            Self::RoleBinding | Self::ClusterRoleBinding => RBAC_GROUP,
        }
    }

    pub const fn version(self) -> &'static str {
        match self {
            Self::GlobalRoleBinding | Self::ProjectRoleTemplateBinding | Self::ClusterRoleTemplateBinding => {
                MANAGEMENT_VERSION
            }
            Self::RoleBinding | Self::ClusterRoleBinding => RBAC_VERSION,
        }
    }

    pub const fn kind(self) -> &'static str {
        match self {
            Self::GlobalRoleBinding => "GlobalRoleBinding",
            Self::ProjectRoleTemplateBinding => "ProjectRoleTemplateBinding",
            Self::ClusterRoleTemplateBinding => "ClusterRoleTemplateBinding",
            Self::RoleBinding => "RoleBinding",
            Self::ClusterRoleBinding => "ClusterRoleBinding",
        }
    }

    pub const fn plural(self) -> &'static str {
        match self {
            Self::GlobalRoleBinding => "globalrolebindings",
            Self::ProjectRoleTemplateBinding => "projectroletemplatebindings",
            Self::ClusterRoleTemplateBinding => "clusterroletemplatebindings",
            Self::RoleBinding => "rolebindings",
            Self::ClusterRoleBinding => "clusterrolebindings",
        }
    }

    pub const fn namespaced(self) -> bool {
        match self {
            Self::GlobalRoleBinding | Self::ClusterRoleBinding => false,
            Self::ProjectRoleTemplateBinding | Self::ClusterRoleTemplateBinding | Self::RoleBinding => true,
        }
    }
}

impl fmt::Display for GuardedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.group(), self.version(), self.kind())
    }
}

/// Validators for every guarded kind sharing one context
pub struct Dispatcher<L> {
    global_role_bindings: BindingValidator<GlobalRoleBinding, L>,
    project_role_template_bindings: BindingValidator<ProjectRoleTemplateBinding, L>,
    cluster_role_template_bindings: BindingValidator<ClusterRoleTemplateBinding, L>,
    role_bindings: BindingValidator<RoleBinding, L>,
    cluster_role_bindings: BindingValidator<ClusterRoleBinding, L>,
}

impl<L> Dispatcher<L>
where
    L: RbacLookup + Send + Sync + 'static,
{
    pub fn new(context: impl Into<Context<L>>) -> Self {
        let context = Arc::new(context.into());
        Self {
            global_role_bindings: BindingValidator::new(context.clone()),
            project_role_template_bindings: BindingValidator::new(context.clone()),
            cluster_role_template_bindings: BindingValidator::new(context.clone()),
            role_bindings: BindingValidator::new(context.clone()),
            cluster_role_bindings: BindingValidator::new(context),
        }
    }

    pub fn validator(&self, kind: GuardedKind) -> &dyn AdmissionValidator {
        match kind {
            GuardedKind::GlobalRoleBinding => &self.global_role_bindings,
            GuardedKind::ProjectRoleTemplateBinding => &self.project_role_template_bindings,
            GuardedKind::ClusterRoleTemplateBinding => &self.cluster_role_template_bindings,
            GuardedKind::RoleBinding => &self.role_bindings,
            GuardedKind::ClusterRoleBinding => &self.cluster_role_bindings,
        }
    }

    /// Routes a request to the validator for its kind
    ///
    /// Kinds outside the guarded set are an error, never an allow.
    pub async fn admit(&self, req: &AdmissionRequest<DynamicObject>) -> Result<AdmissionResponse> {
        let kind = GuardedKind::from_gvk(&req.kind).ok_or_else(|| {
            Error::Unroutable(format!("{}/{}/{}", req.kind.group, req.kind.version, req.kind.kind))
        })?;

        self.validator(kind).admit(req).await
    }
}
