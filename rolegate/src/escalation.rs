use std::fmt::Write as _;
use std::time::Duration;

use k8s_openapi::api::rbac::v1::PolicyRule;
use tracing::{debug, info_span};

use crate::identity::Identity;
use crate::lookup::RbacLookup;
use crate::resolver::{self, ResolveError};
use crate::rules::{self, RuleDisplay};
use crate::scope::Scope;

/// Reviews slower than this are logged
pub const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_secs(2);

/// Outcome of an escalation check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Confirms a requester holds every rule they are granting
#[derive(Debug, Clone)]
pub struct EscalationChecker {
    slow_threshold: Duration,
}

impl Default for EscalationChecker {
    fn default() -> Self {
        Self::new(DEFAULT_SLOW_THRESHOLD)
    }
}

impl EscalationChecker {
    pub const fn new(slow_threshold: Duration) -> Self {
        Self { slow_threshold }
    }

    /// Duration after which a whole admission review is logged as slow
    pub const fn slow_threshold(&self) -> Duration {
        self.slow_threshold
    }

    /// Decides whether `requester` may grant `granted` in `scope`
    ///
    /// The requester's held rules are resolved from `lookup` for the same
    /// scope. Bindings that fail to resolve are skipped and listed in the
    /// denial reason. Revoking a grant is checked the same way as creating it.
    pub fn confirm_no_escalation<L>(
        &self,
        lookup: &L,
        requester: &Identity,
        granted: &[PolicyRule],
        scope: &Scope,
        kind: &str,
    ) -> Decision
    where
        L: RbacLookup + ?Sized,
    {
        let span = info_span!("escalation_check", user = %requester.username, %kind, %scope);
        let _guard = span.enter();

        self.decide(lookup, requester, granted, scope)
    }

    fn decide<L>(&self, lookup: &L, requester: &Identity, granted: &[PolicyRule], scope: &Scope) -> Decision
    where
        L: RbacLookup + ?Sized,
    {
        let held = resolver::subject_rules(lookup, requester, scope);

        // cluster admins hold every resource rule; only URL rules remain
        let requested: Vec<PolicyRule> = if rules::is_superuser(&held.rules) {
            granted
                .iter()
                .filter(|rule| rule.non_resource_urls.as_ref().is_some_and(|urls| !urls.is_empty()))
                .cloned()
                .collect()
        } else {
            granted.to_vec()
        };

        let escalations = rules::escalates(&held.rules, &requested);
        if escalations.is_empty() {
            debug!(held = held.rules.len(), granted = granted.len(), "no escalation");
            return Decision::allow();
        }

        let missing: Vec<PolicyRule> = escalations
            .iter()
            .flat_map(|rule| rules::uncovered(&held.rules, rule))
            .collect();

        Decision::deny(escalation_reason(requester, &rules::compact(missing), &held.errors))
    }
}

fn escalation_reason(requester: &Identity, missing: &[PolicyRule], errors: &[ResolveError]) -> String {
    let mut reason = format!(
        "{requester} is attempting to grant RBAC permissions not currently held:"
    );
    for rule in missing {
        let _ = write!(reason, "\n{}", RuleDisplay(rule));
    }

    if !errors.is_empty() {
        let errors: Vec<String> = errors.iter().map(ToString::to_string).collect();
        let _ = write!(reason, "; resolution errors: [{}]", errors.join(", "));
    }

    reason
}
