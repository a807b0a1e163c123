//! Validating admission webhook that prevents RBAC privilege escalation
//!
//! Every guarded binding kind grants a set of rules to some subject. A request
//! to create, update or delete such a binding is only admitted when the
//! requesting user already holds every rule being granted, in the scope the
//! grant applies to.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use kube::Client;
//! use rolegate::{Config, Dispatcher, Stores};
//!
//! # async fn run() -> rolegate::Result<()> {
//! let config = Config::from_env()?;
//! let client = Client::try_default().await?;
//!
//! let (stores, _watches) = Stores::spawn(client);
//! stores.wait_until_ready().await?;
//!
//! let dispatcher = Arc::new(Dispatcher::<Stores>::new(stores));
//! rolegate::server::serve(&config, dispatcher).await
//! # }
//! ```

pub mod admission;
pub mod cache;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod escalation;
pub mod identity;
pub mod lookup;
pub mod registration;
pub mod resolver;
pub mod resources;
pub mod rules;
pub mod scope;
pub mod server;
pub mod validators;

#[cfg(test)]
mod test_support;

pub use admission::AdmissionValidator;
pub use cache::Stores;
pub use config::Config;
pub use context::Context;
pub use dispatch::{Dispatcher, GuardedKind};
pub use error::{Error, Result};
pub use escalation::{Decision, EscalationChecker};
pub use identity::Identity;
pub use lookup::{MemoryLookup, RbacLookup, Snapshot};
pub use scope::Scope;
