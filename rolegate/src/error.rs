use kube::core::admission::Operation;
use thiserror::Error;

/// Errors that can occur while reviewing an admission request
///
/// Every variant is fatal to the request it occurred in and is reported to the
/// API server as a denial.
#[derive(Error, Debug)]
pub enum Error {
    /// The reviewed object could not be decoded into its typed form
    #[error("failed to decode {kind}: {source}")]
    Decode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The request carried no object for the operation being reviewed
    #[error("{kind} admission request for {operation:?} has no object to review")]
    MissingObject {
        kind: &'static str,
        operation: Operation,
    },

    /// A namespaced object arrived without a namespace
    #[error("{kind} {name:?} has no namespace")]
    MissingNamespace { kind: &'static str, name: String },

    /// The admission operation is not one that grants or revokes permissions
    #[error("unsupported operation {0:?}")]
    UnsupportedOperation(Operation),

    /// A role referenced by the reviewed object does not exist
    #[error("role not found: {kind} {name:?}")]
    RoleNotFound { kind: &'static str, name: String },

    /// An aggregation rule uses a selector operator Kubernetes does not define
    #[error("invalid aggregation selector: unknown operator {operator:?}")]
    InvalidSelector { operator: String },

    /// No validator is registered for the requested resource kind
    #[error("no validator registered for {0}")]
    Unroutable(String),

    /// An object cache stopped before its initial listing completed
    #[error("{0} cache stopped before it was ready")]
    CacheNotReady(String),

    /// Invalid configuration value
    #[error("invalid configuration for {key}: {reason}")]
    Config { key: &'static str, reason: String },

    /// Error from the Kubernetes client
    #[error("Kube Error: {0}")]
    KubeError(#[from] kube::Error),
}

/// Result type for rolegate operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
