use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, PolicyRule, RoleBinding};
use kube::ResourceExt;

use super::{Grant, namespace_scope};
use crate::error::Result;
use crate::lookup::RbacLookup;
use crate::resolver;
use crate::scope::Scope;

impl Grant for RoleBinding {
    const KIND: &'static str = "RoleBinding";

    fn scope(&self) -> Result<Scope> {
        namespace_scope(self)
    }

    fn granted_rules<L>(&self, lookup: &L) -> Result<Vec<PolicyRule>>
    where
        L: RbacLookup + ?Sized,
    {
        let namespace = self.namespace();
        resolver::role_ref_rules(lookup, namespace.as_deref(), &self.role_ref)
    }
}

impl Grant for ClusterRoleBinding {
    const KIND: &'static str = "ClusterRoleBinding";

    fn scope(&self) -> Result<Scope> {
        Ok(Scope::Cluster)
    }

    fn granted_rules<L>(&self, lookup: &L) -> Result<Vec<PolicyRule>>
    where
        L: RbacLookup + ?Sized,
    {
        resolver::role_ref_rules(lookup, None, &self.role_ref)
    }
}
