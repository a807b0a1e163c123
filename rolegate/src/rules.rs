//! Policy rule coverage
//!
//! Decides whether a set of held rules grants at least everything a requested
//! rule grants, following Kubernetes RBAC matching semantics. A requested rule
//! is broken down into atomic rules (one verb, group, resource and resource
//! name, or one verb and non-resource URL) and every atom must be covered by
//! some single held rule. The union of held rules therefore covers the request.
//!
//! Nothing here performs I/O; all functions are pure.

use std::fmt;

use k8s_openapi::api::rbac::v1::PolicyRule;

/// Matches any value in a verb, API group or resource position
pub const WILDCARD: &str = "*";

fn values(field: &Option<Vec<String>>) -> &[String] {
    field.as_deref().unwrap_or_default()
}

fn has(set: &[String], value: &str) -> bool {
    set.iter().any(|item| item == value)
}

fn has_all(set: &[String], values: &[String]) -> bool {
    values.iter().all(|value| has(set, value))
}

/// Splits a rule into atomic rules
///
/// Resource rules expand to the product of groups, resources, verbs and (when
/// restricted) resource names. Non-resource URLs only combine with verbs. A
/// rule with an empty dimension grants nothing and yields no atoms.
pub fn breakdown(rule: &PolicyRule) -> Vec<PolicyRule> {
    let names = values(&rule.resource_names);
    let mut atoms = Vec::new();

    for group in values(&rule.api_groups) {
        for resource in values(&rule.resources) {
            for verb in &rule.verbs {
                let atom = |resource_names: Option<Vec<String>>| PolicyRule {
                    api_groups: Some(vec![group.clone()]),
                    resources: Some(vec![resource.clone()]),
                    verbs: vec![verb.clone()],
                    resource_names,
                    non_resource_urls: None,
                };

                if names.is_empty() {
                    atoms.push(atom(None));
                } else {
                    atoms.extend(names.iter().map(|name| atom(Some(vec![name.clone()]))));
                }
            }
        }
    }

    for url in values(&rule.non_resource_urls) {
        for verb in &rule.verbs {
            atoms.push(PolicyRule {
                non_resource_urls: Some(vec![url.clone()]),
                verbs: vec![verb.clone()],
                ..PolicyRule::default()
            });
        }
    }

    atoms
}

fn resource_covers(owned: &[String], requested: &str) -> bool {
    if has(owned, WILDCARD) || has(owned, requested) {
        return true;
    }

    // "*/status" covers the status subresource of every resource
    match requested.split_once('/') {
        Some((_, subresource)) => has(owned, &format!("{WILDCARD}/{subresource}")),
        None => false,
    }
}

fn url_covers(owned: &str, requested: &str) -> bool {
    if owned == requested {
        return true;
    }

    owned.ends_with(WILDCARD) && requested.starts_with(owned.trim_end_matches(WILDCARD))
}

/// Whether a single held rule covers every dimension of `requested`
///
/// A held rule restricted to resource names never covers a request without a
/// name restriction: an unrestricted grant cannot be satisfied by a
/// name-restricted one.
pub fn rule_covers(owner: &PolicyRule, requested: &PolicyRule) -> bool {
    let owner_groups = values(&owner.api_groups);
    let owner_names = values(&owner.resource_names);
    let requested_names = values(&requested.resource_names);

    let verbs = has(&owner.verbs, WILDCARD) || has_all(&owner.verbs, &requested.verbs);
    let groups = has(owner_groups, WILDCARD) || has_all(owner_groups, values(&requested.api_groups));
    let resources = values(&requested.resources)
        .iter()
        .all(|resource| resource_covers(values(&owner.resources), resource));
    // names only scope resource requests, never non-resource URLs
    let names = if values(&requested.resources).is_empty() {
        true
    } else if requested_names.is_empty() {
        owner_names.is_empty()
    } else {
        owner_names.is_empty() || has_all(owner_names, requested_names)
    };
    let urls = values(&requested.non_resource_urls).iter().all(|url| {
        values(&owner.non_resource_urls)
            .iter()
            .any(|owned| url_covers(owned, url))
    });

    verbs && groups && resources && names && urls
}

/// Atoms of `requested` that no held rule covers
pub fn uncovered(held: &[PolicyRule], requested: &PolicyRule) -> Vec<PolicyRule> {
    breakdown(requested)
        .into_iter()
        .filter(|atom| !held.iter().any(|owner| rule_covers(owner, atom)))
        .collect()
}

/// Whether the union of `held` grants everything `requested` grants
pub fn covers(held: &[PolicyRule], requested: &PolicyRule) -> bool {
    breakdown(requested)
        .iter()
        .all(|atom| held.iter().any(|owner| rule_covers(owner, atom)))
}

/// Requested rules not covered by `held`
///
/// A non-empty result means granting `requested` would escalate privileges.
pub fn escalates(held: &[PolicyRule], requested: &[PolicyRule]) -> Vec<PolicyRule> {
    requested
        .iter()
        .filter(|rule| !covers(held, rule))
        .cloned()
        .collect()
}

/// Whether `rule` grants every verb on every resource in every API group
pub fn is_cluster_admin(rule: &PolicyRule) -> bool {
    has(&rule.verbs, WILDCARD)
        && has(values(&rule.api_groups), WILDCARD)
        && has(values(&rule.resources), WILDCARD)
        && values(&rule.resource_names).is_empty()
}

/// Whether any held rule is cluster-admin equivalent for resource requests
pub fn is_superuser(held: &[PolicyRule]) -> bool {
    held.iter().any(is_cluster_admin)
}

/// Merges atoms that differ only in their verbs
///
/// Keeps first-seen order so diagnostics stay stable.
pub fn compact(atoms: Vec<PolicyRule>) -> Vec<PolicyRule> {
    let mut compacted: Vec<PolicyRule> = Vec::new();

    for atom in atoms {
        let existing = compacted.iter_mut().find(|rule| {
            rule.api_groups == atom.api_groups
                && rule.resources == atom.resources
                && rule.resource_names == atom.resource_names
                && rule.non_resource_urls == atom.non_resource_urls
        });

        match existing {
            Some(rule) => {
                for verb in atom.verbs {
                    if !has(&rule.verbs, &verb) {
                        rule.verbs.push(verb);
                    }
                }
            }
            None => compacted.push(atom),
        }
    }

    compacted
}

/// Compact single-line rendering of a rule for denial messages
///
/// Renders as `{APIGroups:["apps"], Resources:["deployments"], Verbs:["get"]}`,
/// omitting empty dimensions other than verbs.
pub struct RuleDisplay<'a>(pub &'a PolicyRule);

impl fmt::Display for RuleDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, label: &str, items: &[String]) -> fmt::Result {
            write!(f, "{label}:[")?;
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{item:?}")?;
            }
            f.write_str("], ")
        }

        let rule = self.0;
        f.write_str("{")?;
        for (label, field) in [
            ("APIGroups", &rule.api_groups),
            ("Resources", &rule.resources),
            ("ResourceNames", &rule.resource_names),
            ("NonResourceURLs", &rule.non_resource_urls),
        ] {
            let items = values(field);
            if !items.is_empty() {
                list(f, label, items)?;
            }
        }
        write!(f, "Verbs:{:?}}}", rule.verbs)
    }
}

#[cfg(test)]
pub(crate) fn rule(verbs: &[&str], groups: &[&str], resources: &[&str]) -> PolicyRule {
    let owned = |items: &[&str]| Some(items.iter().map(|s| s.to_string()).collect());
    PolicyRule {
        verbs: verbs.iter().map(|s| s.to_string()).collect(),
        api_groups: owned(groups),
        resources: owned(resources),
        ..PolicyRule::default()
    }
}
