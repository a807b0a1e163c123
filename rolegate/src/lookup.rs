//! Read-only access to the RBAC objects a decision is made against
//!
//! Implementations are expected to answer from a local cache without blocking.
//! A missing object is reported as `None`; callers decide whether that is fatal.

use std::cell::{OnceCell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Arc;

use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use kube::ResourceExt;

use crate::resources::{GlobalRole, RoleTemplate};

/// Lookup capability over cluster RBAC objects
pub trait RbacLookup {
    fn cluster_role(&self, name: &str) -> Option<Arc<ClusterRole>>;

    fn cluster_roles(&self) -> Vec<Arc<ClusterRole>>;

    fn role(&self, namespace: &str, name: &str) -> Option<Arc<Role>>;

    fn cluster_role_bindings(&self) -> Vec<Arc<ClusterRoleBinding>>;

    fn role_bindings(&self, namespace: &str) -> Vec<Arc<RoleBinding>>;

    fn global_role(&self, name: &str) -> Option<Arc<GlobalRole>>;

    fn role_template(&self, name: &str) -> Option<Arc<RoleTemplate>>;
}

fn memoized<K, V>(cache: &RefCell<HashMap<K, V>>, key: K, load: impl FnOnce() -> V) -> V
where
    K: Eq + Hash,
    V: Clone,
{
    if let Some(value) = cache.borrow().get(&key) {
        return value.clone();
    }

    let value = load();
    cache.borrow_mut().insert(key, value.clone());
    value
}

/// Request-local view that reads every object at most once
///
/// The backing cache keeps changing while a request is reviewed. Routing every
/// read through a snapshot guarantees a decision never observes two versions
/// of the same object. Cluster roles are listed once and served by name from
/// that listing so aggregation and direct references agree.
pub struct Snapshot<'a, L: ?Sized> {
    source: &'a L,
    cluster_roles: OnceCell<BTreeMap<String, Arc<ClusterRole>>>,
    cluster_role_bindings: OnceCell<Vec<Arc<ClusterRoleBinding>>>,
    roles: RefCell<HashMap<(String, String), Option<Arc<Role>>>>,
    role_bindings: RefCell<HashMap<String, Vec<Arc<RoleBinding>>>>,
    global_roles: RefCell<HashMap<String, Option<Arc<GlobalRole>>>>,
    role_templates: RefCell<HashMap<String, Option<Arc<RoleTemplate>>>>,
}

impl<'a, L: RbacLookup + ?Sized> Snapshot<'a, L> {
    pub fn new(source: &'a L) -> Self {
        Self {
            source,
            cluster_roles: OnceCell::new(),
            cluster_role_bindings: OnceCell::new(),
            roles: RefCell::default(),
            role_bindings: RefCell::default(),
            global_roles: RefCell::default(),
            role_templates: RefCell::default(),
        }
    }

    fn cluster_role_index(&self) -> &BTreeMap<String, Arc<ClusterRole>> {
        self.cluster_roles.get_or_init(|| {
            self.source
                .cluster_roles()
                .into_iter()
                .map(|role| (role.name_any(), role))
                .collect()
        })
    }
}

impl<L: RbacLookup + ?Sized> RbacLookup for Snapshot<'_, L> {
    fn cluster_role(&self, name: &str) -> Option<Arc<ClusterRole>> {
        self.cluster_role_index().get(name).cloned()
    }

    fn cluster_roles(&self) -> Vec<Arc<ClusterRole>> {
        self.cluster_role_index().values().cloned().collect()
    }

    fn role(&self, namespace: &str, name: &str) -> Option<Arc<Role>> {
        memoized(&self.roles, (namespace.to_owned(), name.to_owned()), || {
            self.source.role(namespace, name)
        })
    }

    fn cluster_role_bindings(&self) -> Vec<Arc<ClusterRoleBinding>> {
        self.cluster_role_bindings
            .get_or_init(|| self.source.cluster_role_bindings())
            .clone()
    }

    fn role_bindings(&self, namespace: &str) -> Vec<Arc<RoleBinding>> {
        memoized(&self.role_bindings, namespace.to_owned(), || {
            self.source.role_bindings(namespace)
        })
    }

    fn global_role(&self, name: &str) -> Option<Arc<GlobalRole>> {
        memoized(&self.global_roles, name.to_owned(), || {
            self.source.global_role(name)
        })
    }

    fn role_template(&self, name: &str) -> Option<Arc<RoleTemplate>> {
        memoized(&self.role_templates, name.to_owned(), || {
            self.source.role_template(name)
        })
    }
}

/// In-memory lookup, for tests and for callers that already hold the objects
#[derive(Debug, Clone, Default)]
pub struct MemoryLookup {
    cluster_roles: BTreeMap<String, Arc<ClusterRole>>,
    roles: BTreeMap<(String, String), Arc<Role>>,
    cluster_role_bindings: Vec<Arc<ClusterRoleBinding>>,
    role_bindings: Vec<Arc<RoleBinding>>,
    global_roles: BTreeMap<String, Arc<GlobalRole>>,
    role_templates: BTreeMap<String, Arc<RoleTemplate>>,
}

impl MemoryLookup {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cluster_role(mut self, role: ClusterRole) -> Self {
        self.cluster_roles.insert(role.name_any(), Arc::new(role));
        self
    }

    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        let key = (role.namespace().unwrap_or_default(), role.name_any());
        self.roles.insert(key, Arc::new(role));
        self
    }

    #[must_use]
    pub fn with_cluster_role_binding(mut self, binding: ClusterRoleBinding) -> Self {
        self.cluster_role_bindings.push(Arc::new(binding));
        self
    }

    #[must_use]
    pub fn with_role_binding(mut self, binding: RoleBinding) -> Self {
        self.role_bindings.push(Arc::new(binding));
        self
    }

    #[must_use]
    pub fn with_global_role(mut self, role: GlobalRole) -> Self {
        self.global_roles.insert(role.name_any(), Arc::new(role));
        self
    }

    #[must_use]
    pub fn with_role_template(mut self, template: RoleTemplate) -> Self {
        self.role_templates
            .insert(template.name_any(), Arc::new(template));
        self
    }
}

impl RbacLookup for MemoryLookup {
    fn cluster_role(&self, name: &str) -> Option<Arc<ClusterRole>> {
        self.cluster_roles.get(name).cloned()
    }

    fn cluster_roles(&self) -> Vec<Arc<ClusterRole>> {
        self.cluster_roles.values().cloned().collect()
    }

    fn role(&self, namespace: &str, name: &str) -> Option<Arc<Role>> {
        self.roles
            .get(&(namespace.to_owned(), name.to_owned()))
            .cloned()
    }

    fn cluster_role_bindings(&self) -> Vec<Arc<ClusterRoleBinding>> {
        self.cluster_role_bindings.clone()
    }

    fn role_bindings(&self, namespace: &str) -> Vec<Arc<RoleBinding>> {
        self.role_bindings
            .iter()
            .filter(|binding| binding.namespace().as_deref() == Some(namespace))
            .cloned()
            .collect()
    }

    fn global_role(&self, name: &str) -> Option<Arc<GlobalRole>> {
        self.global_roles.get(name).cloned()
    }

    fn role_template(&self, name: &str) -> Option<Arc<RoleTemplate>> {
        self.role_templates.get(name).cloned()
    }
}
