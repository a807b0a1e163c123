use k8s_openapi::api::rbac::v1::PolicyRule;

use super::Grant;
use crate::error::Result;
use crate::lookup::RbacLookup;
use crate::resolver;
use crate::resources::GlobalRoleBinding;
use crate::scope::Scope;

impl Grant for GlobalRoleBinding {
    const KIND: &'static str = "GlobalRoleBinding";

    // global roles apply everywhere, so they are only grantable by someone
    // holding the rules cluster-wide
    fn scope(&self) -> Result<Scope> {
        Ok(Scope::Cluster)
    }

    fn granted_rules<L>(&self, lookup: &L) -> Result<Vec<PolicyRule>>
    where
        L: RbacLookup + ?Sized,
    {
        resolver::global_role_rules(lookup, &self.global_role_name)
    }
}
