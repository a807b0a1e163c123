use std::fmt;

/// Where a set of rules applies
///
/// Cluster-scoped bindings apply everywhere; namespaced bindings only apply
/// when the decision is being made for their namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Cluster,
    Namespace(String),
}

impl Scope {
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::Cluster => None,
            Self::Namespace(ns) => Some(ns),
        }
    }

    /// Whether a binding living in `binding_namespace` contributes rules here
    ///
    /// `None` denotes a cluster-scoped binding, which always applies.
    pub fn admits(&self, binding_namespace: Option<&str>) -> bool {
        match (binding_namespace, self) {
            (None, _) => true,
            (Some(_), Self::Cluster) => false,
            (Some(ns), Self::Namespace(scope)) => ns == scope,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cluster => f.write_str("cluster"),
            Self::Namespace(ns) => write!(f, "namespace {ns:?}"),
        }
    }
}
