//! Per-kind admission validators
//!
//! Every guarded kind grants rules to some subject. A kind describes how to
//! find the rules it grants and the scope in which the requester must already
//! hold them by implementing [`Grant`]; [`BindingValidator`] does the rest.

mod global_role_binding;
mod rbac_binding;
mod role_template_binding;

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use k8s_openapi::api::rbac::v1::PolicyRule;
use kube::Resource;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::admission::AdmissionValidator;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::escalation::Decision;
use crate::identity::Identity;
use crate::lookup::{RbacLookup, Snapshot};
use crate::scope::Scope;

/// An object that grants rules to a subject
pub trait Grant: Resource<DynamicType = ()> + DeserializeOwned {
    /// Kind name used in logs and denial messages
    const KIND: &'static str;

    /// Scope in which the requester must already hold the granted rules
    fn scope(&self) -> Result<Scope>;

    /// Rules this object grants
    ///
    /// Fails when the referenced role cannot be resolved.
    fn granted_rules<L>(&self, lookup: &L) -> Result<Vec<PolicyRule>>
    where
        L: RbacLookup + ?Sized;
}

/// Scope of the namespace a grant lives in
pub(crate) fn namespace_scope<K: Grant>(object: &K) -> Result<Scope> {
    match object.meta().namespace.as_deref() {
        Some(ns) if !ns.is_empty() => Ok(Scope::Namespace(ns.to_owned())),
        _ => Err(Error::MissingNamespace {
            kind: K::KIND,
            name: object.meta().name.clone().unwrap_or_default(),
        }),
    }
}

/// Decodes the object a request is about
///
/// Creates and updates are checked against the new object. Deletes are
/// checked against the old one, so removing a grant needs the same privileges
/// as creating it.
pub(crate) fn decode<K: Grant>(req: &AdmissionRequest<DynamicObject>) -> Result<K> {
    let object = match req.operation {
        Operation::Create | Operation::Update => req.object.as_ref(),
        Operation::Delete => req.old_object.as_ref(),
        _ => return Err(Error::UnsupportedOperation(req.operation.clone())),
    }
    .ok_or_else(|| Error::MissingObject {
        kind: K::KIND,
        operation: req.operation.clone(),
    })?;

    let decode_err = |source| Error::Decode {
        kind: K::KIND,
        source,
    };
    let value = serde_json::to_value(object).map_err(decode_err)?;
    let mut decoded: K = serde_json::from_value(value).map_err(decode_err)?;

    if decoded.meta().namespace.is_none() {
        decoded.meta_mut().namespace = req.namespace.clone();
    }

    Ok(decoded)
}

/// Reason used when a denial carries none of its own
const DEFAULT_DENY_REASON: &str = "request denied by escalation check";

fn respond(req: &AdmissionRequest<DynamicObject>, decision: Decision) -> AdmissionResponse {
    let res = AdmissionResponse::from(req);
    if decision.allowed {
        return res;
    }
    res.deny(decision.reason.unwrap_or_else(|| DEFAULT_DENY_REASON.to_owned()))
}

/// Validator for a guarded kind
pub struct BindingValidator<K, L> {
    context: Arc<Context<L>>,
    _kind: PhantomData<fn() -> K>,
}

impl<K, L> BindingValidator<K, L>
where
    K: Grant,
    L: RbacLookup,
{
    pub fn new(context: Arc<Context<L>>) -> Self {
        Self {
            context,
            _kind: PhantomData,
        }
    }

    /// Reviews a request against a single snapshot of the lookup
    ///
    /// Reviews reaching the checker's threshold are logged, whatever their
    /// outcome.
    pub fn review(&self, req: &AdmissionRequest<DynamicObject>) -> Result<AdmissionResponse> {
        let started = Instant::now();
        let result = self.decide(req);

        let elapsed = started.elapsed();
        if elapsed >= self.context.checker.slow_threshold() {
            warn!(
                ?elapsed,
                kind = K::KIND,
                user = %req.user_info.username.as_deref().unwrap_or_default(),
                allowed = result.as_ref().is_ok_and(|res| res.allowed),
                "slow admission review"
            );
        }

        result
    }

    fn decide(&self, req: &AdmissionRequest<DynamicObject>) -> Result<AdmissionResponse> {
        let object: K = decode(req)?;
        let scope = object.scope()?;

        let snapshot = Snapshot::new(&self.context.lookup);
        let granted = object.granted_rules(&snapshot)?;
        debug!(kind = K::KIND, %scope, rules = granted.len(), "resolved granted rules");

        let decision = self.context.checker.confirm_no_escalation(
            &snapshot,
            &Identity::from(&req.user_info),
            &granted,
            &scope,
            K::KIND,
        );

        Ok(respond(req, decision))
    }
}

#[async_trait]
impl<K, L> AdmissionValidator for BindingValidator<K, L>
where
    K: Grant + 'static,
    L: RbacLookup + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        K::KIND
    }

    async fn admit(&self, req: &AdmissionRequest<DynamicObject>) -> Result<AdmissionResponse> {
        self.review(req)
    }
}
