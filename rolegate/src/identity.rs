use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::authentication::v1::UserInfo;
use k8s_openapi::api::rbac::v1::Subject;

const SERVICE_ACCOUNT_PREFIX: &str = "system:serviceaccount:";

/// Authenticated requester of an admission request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub groups: Vec<String>,
    pub extra: BTreeMap<String, Vec<String>>,
}

impl Identity {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Whether a binding subject refers to this identity
    ///
    /// Service account subjects without a namespace inherit the namespace of
    /// the binding they belong to; without either they match nobody.
    pub fn matches(&self, subject: &Subject, binding_namespace: Option<&str>) -> bool {
        match subject.kind.as_str() {
            "User" => self.username == subject.name,
            "Group" => self.groups.iter().any(|group| group == &subject.name),
            "ServiceAccount" => {
                let namespace = subject
                    .namespace
                    .as_deref()
                    .filter(|ns| !ns.is_empty())
                    .or(binding_namespace);

                namespace.is_some_and(|ns| {
                    self.username == format!("{SERVICE_ACCOUNT_PREFIX}{ns}:{}", subject.name)
                })
            }
            _ => false,
        }
    }
}

impl From<&UserInfo> for Identity {
    fn from(info: &UserInfo) -> Self {
        Self {
            username: info.username.clone().unwrap_or_default(),
            groups: info.groups.clone().unwrap_or_default(),
            extra: info.extra.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user {:?} (groups={:?})", self.username, self.groups)
    }
}
