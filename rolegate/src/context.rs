use crate::escalation::EscalationChecker;

/// Shared validator context
pub struct Context<L> {
    /// Read-only view of cluster RBAC objects
    pub lookup: L,
    /// Escalation checker applied to every guarded request
    pub checker: EscalationChecker,
}

impl<L> Context<L> {
    /// Replaces the default escalation checker
    #[must_use]
    pub fn with_checker(mut self, checker: EscalationChecker) -> Self {
        self.checker = checker;
        self
    }
}

impl<L> From<L> for Context<L> {
    fn from(lookup: L) -> Self {
        Self {
            lookup,
            checker: EscalationChecker::default(),
        }
    }
}
