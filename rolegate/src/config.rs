//! Webhook configuration
//!
//! Values come from `ROLEGATE_*` environment variables, falling back to the
//! defaults of a standard in-cluster install.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Namespace the webhook service runs in
    pub namespace: String,
    /// Name of the service fronting the webhook
    pub service_name: String,
    /// Port the service exposes to the API server
    pub service_port: u16,
    /// Name of the `ValidatingWebhookConfiguration`
    pub configuration_name: String,
    /// Fully qualified webhook name, must contain at least three segments
    pub webhook_name: String,
    /// HTTP path the API server posts reviews to
    pub path: String,
    /// Address the HTTPS server binds to
    pub listen_addr: SocketAddr,
    pub tls_cert_path: PathBuf,
    pub tls_key_path: PathBuf,
    /// Escalation checks slower than this are logged
    pub slow_check_threshold_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: "cattle-system".into(),
            service_name: "rancher-webhook".into(),
            service_port: 443,
            configuration_name: "rancher.cattle.io".into(),
            webhook_name: "rancherauth.cattle.io".into(),
            path: "/v1/webhook/validation".into(),
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 9443)),
            tls_cert_path: "/tmp/k8s-webhook-server/serving-certs/tls.crt".into(),
            tls_key_path: "/tmp/k8s-webhook-server/serving-certs/tls.key".into(),
            slow_check_threshold_ms: 2000,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from `lookup`, using defaults for absent keys
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        let string = |key: &'static str, target: &mut String| {
            if let Some(value) = lookup(key) {
                *target = value;
            }
        };
        string("ROLEGATE_NAMESPACE", &mut config.namespace);
        string("ROLEGATE_SERVICE_NAME", &mut config.service_name);
        string("ROLEGATE_CONFIGURATION_NAME", &mut config.configuration_name);
        string("ROLEGATE_WEBHOOK_NAME", &mut config.webhook_name);
        string("ROLEGATE_PATH", &mut config.path);

        if let Some(value) = lookup("ROLEGATE_TLS_CERT") {
            config.tls_cert_path = value.into();
        }
        if let Some(value) = lookup("ROLEGATE_TLS_KEY") {
            config.tls_key_path = value.into();
        }

        parse(&lookup, "ROLEGATE_SERVICE_PORT", &mut config.service_port)?;
        parse(&lookup, "ROLEGATE_LISTEN_ADDR", &mut config.listen_addr)?;
        parse(&lookup, "ROLEGATE_SLOW_CHECK_THRESHOLD_MS", &mut config.slow_check_threshold_ms)?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.path.starts_with('/') {
            return Err(Error::Config {
                key: "path",
                reason: format!("{:?} must start with '/'", self.path),
            });
        }
        if self.webhook_name.split('.').filter(|s| !s.is_empty()).count() < 3 {
            return Err(Error::Config {
                key: "webhookName",
                reason: format!("{:?} must have at least three segments", self.webhook_name),
            });
        }
        Ok(())
    }

    pub fn slow_check_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_check_threshold_ms)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = lookup(key) else {
        return Ok(());
    };

    *target = value.parse().map_err(|err: T::Err| Error::Config {
        key,
        reason: format!("{value:?}: {err}"),
    })?;
    Ok(())
}
