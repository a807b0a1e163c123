//! Rule resolution
//!
//! Resolves the rules a subject already holds (by walking bindings) and the
//! rules a role reference grants (by following aggregation and inheritance).
//! Held-rule resolution is lenient: an unresolvable binding is recorded and
//! skipped, which can only make the requester look less privileged. Granted
//! rule resolution is strict: an unknown grant is an error.

use std::collections::{BTreeMap, HashSet};

use k8s_openapi::api::rbac::v1::{ClusterRole, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use kube::ResourceExt;
use thiserror::Error;

use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::lookup::RbacLookup;
use crate::scope::Scope;

/// A binding that was skipped while resolving held rules
#[derive(Error, Debug)]
#[error("{binding}: {source}")]
pub struct ResolveError {
    pub binding: String,
    #[source]
    pub source: Error,
}

/// Rules held by a subject, with the bindings that could not be resolved
#[derive(Debug, Default)]
pub struct Resolved {
    pub rules: Vec<PolicyRule>,
    pub errors: Vec<ResolveError>,
}

impl Resolved {
    fn extend(&mut self, binding: String, rules: Result<Vec<PolicyRule>>) {
        match rules {
            Ok(rules) => self.rules.extend(rules),
            Err(source) => self.errors.push(ResolveError { binding, source }),
        }
    }
}

fn applies(identity: &Identity, subjects: Option<&[Subject]>, namespace: Option<&str>) -> bool {
    subjects
        .unwrap_or_default()
        .iter()
        .any(|subject| identity.matches(subject, namespace))
}

/// Rules `identity` holds in `scope`
///
/// Cluster role bindings always contribute. Role bindings contribute only when
/// `scope` is their namespace.
pub fn subject_rules<L>(lookup: &L, identity: &Identity, scope: &Scope) -> Resolved
where
    L: RbacLookup + ?Sized,
{
    let mut resolved = Resolved::default();

    for binding in lookup.cluster_role_bindings() {
        if !applies(identity, binding.subjects.as_deref(), None) {
            continue;
        }

        let name = format!("ClusterRoleBinding {:?}", binding.name_any());
        resolved.extend(name, role_ref_rules(lookup, None, &binding.role_ref));
    }

    let Some(namespace) = scope.namespace() else {
        return resolved;
    };

    for binding in lookup.role_bindings(namespace) {
        let binding_namespace = binding.namespace();
        if !scope.admits(binding_namespace.as_deref())
            || !applies(identity, binding.subjects.as_deref(), binding_namespace.as_deref())
        {
            continue;
        }

        let name = format!("RoleBinding \"{namespace}/{}\"", binding.name_any());
        resolved.extend(
            name,
            role_ref_rules(lookup, Some(namespace), &binding.role_ref),
        );
    }

    resolved
}

/// Rules granted by a binding's role reference
///
/// `Role` references resolve in `namespace` and are invalid without one.
pub fn role_ref_rules<L>(lookup: &L, namespace: Option<&str>, role_ref: &RoleRef) -> Result<Vec<PolicyRule>>
where
    L: RbacLookup + ?Sized,
{
    match (role_ref.kind.as_str(), namespace) {
        ("ClusterRole", _) => cluster_role_rules(lookup, &role_ref.name),
        ("Role", Some(namespace)) => lookup
            .role(namespace, &role_ref.name)
            .map(|role| role.rules.clone().unwrap_or_default())
            .ok_or_else(|| Error::RoleNotFound {
                kind: "Role",
                name: format!("{namespace}/{}", role_ref.name),
            }),
        (kind, _) => Err(Error::RoleNotFound {
            kind: "role reference",
            name: format!("{kind}/{}", role_ref.name),
        }),
    }
}

/// Rules of a cluster role including every role it aggregates
///
/// Aggregated roles are found through the aggregation label selectors and
/// followed transitively. Each role contributes its direct rules once, so
/// self-selecting or mutually aggregating roles terminate.
pub fn cluster_role_rules<L>(lookup: &L, name: &str) -> Result<Vec<PolicyRule>>
where
    L: RbacLookup + ?Sized,
{
    let root = lookup.cluster_role(name).ok_or_else(|| Error::RoleNotFound {
        kind: "ClusterRole",
        name: name.to_owned(),
    })?;

    let mut visited = HashSet::new();
    let mut pending = vec![root];
    let mut rules = Vec::new();

    while let Some(role) = pending.pop() {
        if !visited.insert(role.name_any()) {
            continue;
        }

        rules.extend(role.rules.iter().flatten().cloned());

        let selectors = aggregation_selectors(&role);
        if selectors.is_empty() {
            continue;
        }

        for candidate in lookup.cluster_roles() {
            if visited.contains(&candidate.name_any()) {
                continue;
            }
            for selector in selectors {
                if selector_matches(selector, candidate.labels())? {
                    pending.push(candidate);
                    break;
                }
            }
        }
    }

    Ok(rules)
}

fn aggregation_selectors(role: &ClusterRole) -> &[LabelSelector] {
    role.aggregation_rule
        .as_ref()
        .and_then(|rule| rule.cluster_role_selectors.as_deref())
        .unwrap_or_default()
}

/// Label selector matching for aggregation
///
/// Follows Kubernetes: an empty selector selects every cluster role, and an
/// unknown operator is an error rather than a non-match.
pub fn selector_matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> Result<bool> {
    let labels_match = selector
        .match_labels
        .iter()
        .flatten()
        .all(|(key, value)| labels.get(key) == Some(value));

    let mut expressions_match = true;
    for requirement in selector.match_expressions.iter().flatten() {
        expressions_match &= requirement_matches(requirement, labels)?;
    }

    Ok(labels_match && expressions_match)
}

fn requirement_matches(requirement: &LabelSelectorRequirement, labels: &BTreeMap<String, String>) -> Result<bool> {
    let values = requirement.values.as_deref().unwrap_or_default();
    let label = labels.get(&requirement.key);

    match requirement.operator.as_str() {
        "In" => Ok(label.is_some_and(|value| values.contains(value))),
        "NotIn" => Ok(label.is_none_or(|value| !values.contains(value))),
        "Exists" => Ok(label.is_some()),
        "DoesNotExist" => Ok(label.is_none()),
        operator => Err(Error::InvalidSelector {
            operator: operator.to_owned(),
        }),
    }
}

/// Rules granted by a global role
pub fn global_role_rules<L>(lookup: &L, name: &str) -> Result<Vec<PolicyRule>>
where
    L: RbacLookup + ?Sized,
{
    lookup
        .global_role(name)
        .map(|role| role.rules.clone())
        .ok_or_else(|| Error::RoleNotFound {
            kind: "GlobalRole",
            name: name.to_owned(),
        })
}

/// Rules granted by a role template and every template it inherits from
///
/// External templates additionally grant the rules of the cluster role with the
/// same name. A missing template anywhere in the chain is an error since the
/// full grant cannot be established without it.
pub fn role_template_rules<L>(lookup: &L, name: &str) -> Result<Vec<PolicyRule>>
where
    L: RbacLookup + ?Sized,
{
    let mut visited = HashSet::new();
    let mut pending = vec![name.to_owned()];
    let mut rules = Vec::new();

    while let Some(name) = pending.pop() {
        if !visited.insert(name.clone()) {
            continue;
        }

        let template = lookup.role_template(&name).ok_or_else(|| Error::RoleNotFound {
            kind: "RoleTemplate",
            name: name.clone(),
        })?;

        rules.extend(template.rules.iter().cloned());
        if template.external {
            rules.extend(cluster_role_rules(lookup, &name)?);
        }

        pending.extend(template.role_template_names.iter().rev().cloned());
    }

    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::MemoryLookup;
    use crate::test_support::*;

    fn pods(verbs: &[&str]) -> PolicyRule {
        rule(verbs, &[""], &["pods"])
    }

    fn alice() -> Identity {
        Identity::new("alice").with_groups(["devs"])
    }

    #[test]
    fn cluster_bindings_contribute_in_every_scope() {
        let lookup = MemoryLookup::new()
            .with_cluster_role(cluster_role("pod-reader", vec![pods(&["get"])]))
            .with_cluster_role_binding(cluster_role_binding("crb", "pod-reader", vec![user("alice")]));

        for scope in [Scope::Cluster, Scope::Namespace("p-1".into())] {
            let resolved = subject_rules(&lookup, &alice(), &scope);
            assert_eq!(resolved.rules, vec![pods(&["get"])]);
            assert!(resolved.errors.is_empty());
        }
    }

    #[test]
    fn role_bindings_only_contribute_in_their_namespace() {
        let lookup = MemoryLookup::new()
            .with_role(role("p-1", "deleter", vec![pods(&["delete"])]))
            .with_cluster_role(cluster_role("lister", vec![pods(&["list"])]))
            .with_role_binding(role_binding("p-1", "rb-1", ("Role", "deleter"), vec![group("devs")]))
            .with_role_binding(role_binding("p-1", "rb-2", ("ClusterRole", "lister"), vec![user("alice")]));

        let resolved = subject_rules(&lookup, &alice(), &Scope::Namespace("p-1".into()));
        assert_eq!(resolved.rules.len(), 2);
        assert!(resolved.rules.contains(&pods(&["delete"])));
        assert!(resolved.rules.contains(&pods(&["list"])));

        assert!(subject_rules(&lookup, &alice(), &Scope::Namespace("p-2".into())).rules.is_empty());
        assert!(subject_rules(&lookup, &alice(), &Scope::Cluster).rules.is_empty());
    }

    #[test]
    fn bindings_for_other_subjects_are_ignored() {
        let lookup = MemoryLookup::new()
            .with_cluster_role(cluster_role("admin", vec![rule(&["*"], &["*"], &["*"])]))
            .with_cluster_role_binding(cluster_role_binding("crb", "admin", vec![user("bob"), group("ops")]));

        assert!(subject_rules(&lookup, &alice(), &Scope::Cluster).rules.is_empty());
    }

    #[test]
    fn service_account_subjects_default_to_binding_namespace() {
        let sa = Subject {
            kind: "ServiceAccount".into(),
            name: "deployer".into(),
            ..Subject::default()
        };
        let lookup = MemoryLookup::new()
            .with_cluster_role(cluster_role("lister", vec![pods(&["list"])]))
            .with_role_binding(role_binding("p-1", "rb", ("ClusterRole", "lister"), vec![sa]));

        let identity = Identity::new("system:serviceaccount:p-1:deployer");
        let resolved = subject_rules(&lookup, &identity, &Scope::Namespace("p-1".into()));
        assert_eq!(resolved.rules, vec![pods(&["list"])]);
    }

    #[test]
    fn missing_roles_are_skipped_and_recorded() {
        let lookup = MemoryLookup::new()
            .with_cluster_role(cluster_role("pod-reader", vec![pods(&["get"])]))
            .with_cluster_role_binding(cluster_role_binding("crb-1", "missing", vec![user("alice")]))
            .with_cluster_role_binding(cluster_role_binding("crb-2", "pod-reader", vec![user("alice")]));

        let resolved = subject_rules(&lookup, &alice(), &Scope::Cluster);
        assert_eq!(resolved.rules, vec![pods(&["get"])]);
        assert_eq!(resolved.errors.len(), 1);
        assert_eq!(
            resolved.errors[0].to_string(),
            r#"ClusterRoleBinding "crb-1": role not found: ClusterRole "missing""#
        );
    }

    #[test]
    fn aggregation_includes_selected_roles() {
        let lookup = MemoryLookup::new()
            .with_cluster_role(aggregating_cluster_role("admin", vec![], &[], &[("agg", "admin")]))
            .with_cluster_role(aggregating_cluster_role("extra", vec![pods(&["delete"])], &[("agg", "admin")], &[]))
            .with_cluster_role(cluster_role("unrelated", vec![pods(&["create"])]));

        assert_eq!(cluster_role_rules(&lookup, "admin").unwrap(), vec![pods(&["delete"])]);
    }

    #[test]
    fn self_aggregating_role_includes_its_rules_once() {
        let lookup = MemoryLookup::new().with_cluster_role(aggregating_cluster_role(
            "loop",
            vec![pods(&["get"])],
            &[("agg", "loop")],
            &[("agg", "loop")],
        ));

        assert_eq!(cluster_role_rules(&lookup, "loop").unwrap(), vec![pods(&["get"])]);
    }

    #[test]
    fn mutually_aggregating_roles_terminate() {
        let lookup = MemoryLookup::new()
            .with_cluster_role(aggregating_cluster_role("a", vec![pods(&["get"])], &[("name", "a")], &[("name", "b")]))
            .with_cluster_role(aggregating_cluster_role("b", vec![pods(&["list"])], &[("name", "b")], &[("name", "a")]));

        let rules = cluster_role_rules(&lookup, "a").unwrap();
        assert_eq!(rules, vec![pods(&["get"]), pods(&["list"])]);
    }

    #[test]
    fn selectors() {
        let labels = BTreeMap::from([("tier".to_string(), "admin".to_string())]);
        let requirement = |operator: &str, values: &[&str]| LabelSelector {
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "tier".into(),
                operator: operator.into(),
                values: Some(values.iter().map(|s| s.to_string()).collect()),
            }]),
            ..LabelSelector::default()
        };

        assert!(selector_matches(&LabelSelector::default(), &labels).unwrap());
        assert!(selector_matches(&requirement("In", &["admin", "edit"]), &labels).unwrap());
        assert!(!selector_matches(&requirement("NotIn", &["admin"]), &labels).unwrap());
        assert!(selector_matches(&requirement("Exists", &[]), &labels).unwrap());
        assert!(!selector_matches(&requirement("DoesNotExist", &[]), &labels).unwrap());
        assert!(matches!(
            selector_matches(&requirement("Unknown", &[]), &labels),
            Err(Error::InvalidSelector { operator }) if operator == "Unknown"
        ));
    }

    #[test]
    fn empty_selector_aggregates_every_cluster_role() {
        let lookup = MemoryLookup::new()
            .with_cluster_role(aggregate_everything("everything"))
            .with_cluster_role(cluster_role("cluster-admin", vec![rule(&["*"], &["*"], &["*"])]));

        assert_eq!(
            cluster_role_rules(&lookup, "everything").unwrap(),
            vec![rule(&["*"], &["*"], &["*"])]
        );
    }

    #[test]
    fn unknown_selector_operator_fails_grant_resolution() {
        let mut broken = cluster_role("broken", vec![pods(&["get"])]);
        broken.aggregation_rule = Some(k8s_openapi::api::rbac::v1::AggregationRule {
            cluster_role_selectors: Some(vec![LabelSelector {
                match_expressions: Some(vec![LabelSelectorRequirement {
                    key: "tier".into(),
                    operator: "Matches".into(),
                    values: None,
                }]),
                ..LabelSelector::default()
            }]),
        });
        let lookup = MemoryLookup::new()
            .with_cluster_role(broken)
            .with_cluster_role(cluster_role("other", vec![pods(&["delete"])]))
            .with_cluster_role_binding(cluster_role_binding("crb", "broken", vec![user("alice")]));

        let err = cluster_role_rules(&lookup, "broken").unwrap_err();
        assert!(matches!(err, Error::InvalidSelector { .. }), "{err}");

        // the same role is skipped, not trusted, when it is held
        let resolved = subject_rules(&lookup, &alice(), &Scope::Cluster);
        assert!(resolved.rules.is_empty());
        assert_eq!(resolved.errors.len(), 1);
    }

    #[test]
    fn role_refs_resolve_by_kind() {
        let lookup = MemoryLookup::new()
            .with_role(role("p-1", "deleter", vec![pods(&["delete"])]))
            .with_cluster_role(cluster_role("lister", vec![pods(&["list"])]));
        let reference = |kind: &str, name: &str| RoleRef {
            api_group: "rbac.authorization.k8s.io".into(),
            kind: kind.into(),
            name: name.into(),
        };

        assert_eq!(
            role_ref_rules(&lookup, Some("p-1"), &reference("Role", "deleter")).unwrap(),
            vec![pods(&["delete"])]
        );
        assert_eq!(
            role_ref_rules(&lookup, Some("p-1"), &reference("ClusterRole", "lister")).unwrap(),
            vec![pods(&["list"])]
        );
        assert!(role_ref_rules(&lookup, None, &reference("Role", "deleter")).is_err());
        assert!(role_ref_rules(&lookup, Some("p-2"), &reference("Role", "deleter")).is_err());
        assert!(role_ref_rules(&lookup, Some("p-1"), &reference("GlobalRole", "x")).is_err());
    }

    #[test]
    fn role_templates_inherit_rules() {
        let lookup = MemoryLookup::new()
            .with_role_template(role_template("member", vec![pods(&["create"])], &["view"]))
            .with_role_template(role_template("view", vec![pods(&["get"])], &["member"]));

        let rules = role_template_rules(&lookup, "member").unwrap();
        assert_eq!(rules, vec![pods(&["create"]), pods(&["get"])]);
    }

    #[test]
    fn missing_inherited_template_is_fatal() {
        let lookup = MemoryLookup::new()
            .with_role_template(role_template("member", vec![pods(&["create"])], &["gone"]));

        let err = role_template_rules(&lookup, "member").unwrap_err();
        assert!(matches!(err, Error::RoleNotFound { kind: "RoleTemplate", ref name } if name == "gone"));
    }

    #[test]
    fn external_templates_include_cluster_role_rules() {
        let mut template = role_template("monitoring", vec![], &[]);
        template.external = true;
        let lookup = MemoryLookup::new()
            .with_role_template(template)
            .with_cluster_role(cluster_role("monitoring", vec![pods(&["watch"])]));

        assert_eq!(role_template_rules(&lookup, "monitoring").unwrap(), vec![pods(&["watch"])]);
    }

    #[test]
    fn global_roles() {
        let lookup = MemoryLookup::new().with_global_role(global_role("admin", vec![pods(&["*"])]));
        assert_eq!(global_role_rules(&lookup, "admin").unwrap(), vec![pods(&["*"])]);
        assert!(global_role_rules(&lookup, "user").is_err());
    }
}
