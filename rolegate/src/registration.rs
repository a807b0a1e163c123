//! Declaration of the validating webhook for the API server

use k8s_openapi::ByteString;
use k8s_openapi::api::admissionregistration::v1::{
    RuleWithOperations, ServiceReference, ValidatingWebhook, ValidatingWebhookConfiguration,
    WebhookClientConfig,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::config::Config;
use crate::dispatch::GuardedKind;

const OPERATIONS: [&str; 3] = ["CREATE", "UPDATE", "DELETE"];

fn rule(kind: GuardedKind) -> RuleWithOperations {
    let scope = if kind.namespaced() { "Namespaced" } else { "Cluster" };
    RuleWithOperations {
        api_groups: Some(vec![kind.group().into()]),
        api_versions: Some(vec![kind.version().into()]),
        operations: Some(OPERATIONS.iter().map(|op| op.to_string()).collect()),
        resources: Some(vec![kind.plural().into()]),
        scope: Some(scope.into()),
    }
}

/// Builds the webhook configuration routing every guarded kind to the service
///
/// The failure policy is `Fail`: when the webhook is unreachable, grants are
/// rejected rather than admitted unchecked. `ca_bundle` is the PEM encoded CA
/// that signed the serving certificate.
pub fn validating_webhook_configuration(config: &Config, ca_bundle: Vec<u8>) -> ValidatingWebhookConfiguration {
    let webhook = ValidatingWebhook {
        name: config.webhook_name.clone(),
        client_config: WebhookClientConfig {
            ca_bundle: Some(ByteString(ca_bundle)),
            service: Some(ServiceReference {
                name: config.service_name.clone(),
                namespace: config.namespace.clone(),
                path: Some(config.path.clone()),
                port: Some(i32::from(config.service_port)),
            }),
            url: None,
        },
        rules: Some(GuardedKind::ALL.into_iter().map(rule).collect()),
        failure_policy: Some("Fail".into()),
        side_effects: "None".into(),
        admission_review_versions: vec!["v1".into()],
        ..ValidatingWebhook::default()
    };

    ValidatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(config.configuration_name.clone()),
            ..ObjectMeta::default()
        },
        webhooks: Some(vec![webhook]),
    }
}
