//! Escalation webhook server
//!
//! Mirrors the RBAC objects into local caches, then serves admission reviews
//! over TLS. Configuration is read from `ROLEGATE_*` environment variables.

use std::sync::Arc;

use kube::Client;
use rolegate::{Config, Context, Dispatcher, EscalationChecker, Stores};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), rolegate::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let client = Client::try_default().await?;

    let (stores, mut watches) = Stores::spawn(client);
    stores.wait_until_ready().await?;

    let context = Context::from(stores).with_checker(EscalationChecker::new(config.slow_check_threshold()));
    let dispatcher = Arc::new(Dispatcher::<Stores>::new(context));

    rolegate::server::serve(&config, dispatcher).await?;

    watches.abort_all();
    Ok(())
}
