use async_trait::async_trait;
use kube::ResourceExt;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use tracing::{error, info, warn};

use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::lookup::RbacLookup;

#[async_trait]
pub trait AdmissionValidator: Send + Sync {
    /// Returns the name of this validator for logging purposes
    fn name(&self) -> &'static str;

    /// Validates the resource in the admission request
    ///
    /// Returns an `AdmissionResponse` that either accepts or denies the request.
    /// An `Err` means no decision could be reached; callers turn it into a
    /// denial.
    async fn admit(&self, req: &AdmissionRequest<DynamicObject>) -> Result<AdmissionResponse>;
}

/// Reviews a single `AdmissionReview`
///
/// Malformed reviews are answered as invalid. Requests that cannot be decided
/// are denied with the error as the message, so a failure never admits.
pub async fn review<L>(
    dispatcher: &Dispatcher<L>,
    body: AdmissionReview<DynamicObject>,
) -> AdmissionReview<DynamicObject>
where
    L: RbacLookup + Send + Sync + 'static,
{
    let req: AdmissionRequest<_> = match body.try_into() {
        Ok(req) => req,
        Err(err) => {
            error!("invalid admission request: {}", err);
            return AdmissionResponse::invalid(err.to_string()).into_review();
        }
    };

    let kind = req.kind.kind.clone();
    let name = req
        .object
        .as_ref()
        .or(req.old_object.as_ref())
        .map(ResourceExt::name_any)
        .unwrap_or_else(|| req.name.clone());

    let res = match dispatcher.admit(&req).await {
        Ok(res) if res.allowed => {
            info!(
                user = %req.user_info.username.as_deref().unwrap_or_default(),
                operation = ?req.operation,
                kind = %kind,
                name = %name,
                "validation passed"
            );
            res
        }
        Ok(res) => {
            warn!(
                user = %req.user_info.username.as_deref().unwrap_or_default(),
                operation = ?req.operation,
                kind = %kind,
                name = %name,
                reason = %res.result.message,
                "validation denied"
            );
            res
        }
        Err(err) => {
            error!(
                user = %req.user_info.username.as_deref().unwrap_or_default(),
                operation = ?req.operation,
                kind = %kind,
                name = %name,
                error = %err,
                "validation error"
            );
            AdmissionResponse::from(&req).deny(format!("{kind}: {err}"))
        }
    };

    res.into_review()
}
