//! Fixture builders shared by unit tests

use std::collections::BTreeMap;

use k8s_openapi::api::rbac::v1::{
    AggregationRule, ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef,
    Subject,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionReview};
use serde_json::{Value, json};

use crate::resources::{GlobalRole, RoleTemplate};

pub(crate) use crate::rules::rule;

pub(crate) fn meta(namespace: Option<&str>, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.into()),
        namespace: namespace.map(Into::into),
        ..ObjectMeta::default()
    }
}

pub(crate) fn user(name: &str) -> Subject {
    Subject {
        kind: "User".into(),
        name: name.into(),
        ..Subject::default()
    }
}

pub(crate) fn group(name: &str) -> Subject {
    Subject {
        kind: "Group".into(),
        name: name.into(),
        ..Subject::default()
    }
}

pub(crate) fn cluster_role(name: &str, rules: Vec<PolicyRule>) -> ClusterRole {
    ClusterRole {
        metadata: meta(None, name),
        rules: Some(rules),
        ..ClusterRole::default()
    }
}

/// Cluster role labelled `labels` that aggregates roles labelled `selects`
pub(crate) fn aggregating_cluster_role(
    name: &str,
    rules: Vec<PolicyRule>,
    labels: &[(&str, &str)],
    selects: &[(&str, &str)],
) -> ClusterRole {
    let to_map = |pairs: &[(&str, &str)]| -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    };

    let mut role = cluster_role(name, rules);
    role.metadata.labels = Some(to_map(labels));
    if !selects.is_empty() {
        role.aggregation_rule = Some(AggregationRule {
            cluster_role_selectors: Some(vec![LabelSelector {
                match_labels: Some(to_map(selects)),
                ..LabelSelector::default()
            }]),
        });
    }
    role
}

/// Cluster role whose single empty selector aggregates every cluster role
pub(crate) fn aggregate_everything(name: &str) -> ClusterRole {
    let mut role = cluster_role(name, vec![]);
    role.aggregation_rule = Some(AggregationRule {
        cluster_role_selectors: Some(vec![LabelSelector::default()]),
    });
    role
}

pub(crate) fn role(namespace: &str, name: &str, rules: Vec<PolicyRule>) -> Role {
    Role {
        metadata: meta(Some(namespace), name),
        rules: Some(rules),
    }
}

fn role_ref(kind: &str, name: &str) -> RoleRef {
    RoleRef {
        api_group: "rbac.authorization.k8s.io".into(),
        kind: kind.into(),
        name: name.into(),
    }
}

pub(crate) fn cluster_role_binding(
    name: &str,
    cluster_role: &str,
    subjects: Vec<Subject>,
) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: meta(None, name),
        role_ref: role_ref("ClusterRole", cluster_role),
        subjects: Some(subjects),
    }
}

pub(crate) fn role_binding(
    namespace: &str,
    name: &str,
    (kind, role): (&str, &str),
    subjects: Vec<Subject>,
) -> RoleBinding {
    RoleBinding {
        metadata: meta(Some(namespace), name),
        role_ref: role_ref(kind, role),
        subjects: Some(subjects),
    }
}

pub(crate) fn global_role(name: &str, rules: Vec<PolicyRule>) -> GlobalRole {
    GlobalRole {
        metadata: meta(None, name),
        rules,
        ..GlobalRole::default()
    }
}

pub(crate) fn role_template(name: &str, rules: Vec<PolicyRule>, inherits: &[&str]) -> RoleTemplate {
    RoleTemplate {
        metadata: meta(None, name),
        rules,
        role_template_names: inherits.iter().map(|s| s.to_string()).collect(),
        ..RoleTemplate::default()
    }
}

/// Builds an admission request the way the API server would send it
///
/// `object` is placed in `oldObject` for deletes and in `object` otherwise;
/// updates get the same payload in both.
pub(crate) fn admission_request(
    (group, version, kind): (&str, &str, &str),
    operation: &str,
    username: &str,
    groups: &[&str],
    object: Value,
) -> AdmissionRequest<DynamicObject> {
    let (new, old) = match operation {
        "DELETE" => (Value::Null, object),
        "UPDATE" => (object.clone(), object),
        _ => (object, Value::Null),
    };

    let review = json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "test-uid",
            "kind": { "group": group, "version": version, "kind": kind },
            "resource": { "group": group, "version": version, "resource": format!("{}s", kind.to_lowercase()) },
            "operation": operation,
            "userInfo": { "username": username, "groups": groups },
            "object": new,
            "oldObject": old
        }
    });

    let review: AdmissionReview<DynamicObject> = serde_json::from_value(review).unwrap();
    review.try_into().unwrap()
}
