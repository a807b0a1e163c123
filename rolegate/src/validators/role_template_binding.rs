use k8s_openapi::api::rbac::v1::PolicyRule;

use super::{Grant, namespace_scope};
use crate::error::Result;
use crate::lookup::RbacLookup;
use crate::resolver;
use crate::resources::{ClusterRoleTemplateBinding, ProjectRoleTemplateBinding};
use crate::scope::Scope;

impl Grant for ProjectRoleTemplateBinding {
    const KIND: &'static str = "ProjectRoleTemplateBinding";

    fn scope(&self) -> Result<Scope> {
        namespace_scope(self)
    }

    fn granted_rules<L>(&self, lookup: &L) -> Result<Vec<PolicyRule>>
    where
        L: RbacLookup + ?Sized,
    {
        resolver::role_template_rules(lookup, &self.role_template_name)
    }
}

impl Grant for ClusterRoleTemplateBinding {
    const KIND: &'static str = "ClusterRoleTemplateBinding";

    fn scope(&self) -> Result<Scope> {
        namespace_scope(self)
    }

    fn granted_rules<L>(&self, lookup: &L) -> Result<Vec<PolicyRule>>
    where
        L: RbacLookup + ?Sized,
    {
        resolver::role_template_rules(lookup, &self.role_template_name)
    }
}
