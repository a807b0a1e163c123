//! Watch-fed caches of the objects escalation checks read
//!
//! Every kind is mirrored by a kube reflector. Lookups read the local stores
//! only, so reviewing a request never waits on the API server.

use std::fmt::Debug;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use kube::runtime::reflector::{self, ObjectRef, Store};
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tokio::task::JoinSet;
use tracing::{Instrument, info, info_span, warn};

use crate::error::{Error, Result};
use crate::lookup::RbacLookup;
use crate::resources::{GlobalRole, RoleTemplate};

/// Reflector stores for every kind read during a review
#[derive(Clone)]
pub struct Stores {
    cluster_roles: Store<ClusterRole>,
    roles: Store<Role>,
    cluster_role_bindings: Store<ClusterRoleBinding>,
    role_bindings: Store<RoleBinding>,
    global_roles: Store<GlobalRole>,
    role_templates: Store<RoleTemplate>,
}

fn watch<K>(tasks: &mut JoinSet<()>, api: Api<K>) -> Store<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    let (reader, writer) = reflector::store();
    let stream = reflector::reflector(writer, watcher(api, watcher::Config::default()))
        .default_backoff()
        .applied_objects();

    let span = info_span!("watch", kind = %K::kind(&()));
    let task = async move {
        stream
            .for_each(|res| async move {
                if let Err(err) = res {
                    warn!(error = %err, "watch error");
                }
            })
            .await;
    };
    tasks.spawn(task.instrument(span));

    reader
}

impl Stores {
    /// Starts one watch task per kind
    ///
    /// The returned stores fill up in the background; call
    /// [`Stores::wait_until_ready`] before serving. The tasks run until the
    /// join set is dropped or aborted.
    pub fn spawn(client: Client) -> (Self, JoinSet<()>) {
        let mut tasks = JoinSet::new();

        let stores = Self {
            cluster_roles: watch(&mut tasks, Api::all(client.clone())),
            roles: watch(&mut tasks, Api::all(client.clone())),
            cluster_role_bindings: watch(&mut tasks, Api::all(client.clone())),
            role_bindings: watch(&mut tasks, Api::all(client.clone())),
            global_roles: watch(&mut tasks, Api::all(client.clone())),
            role_templates: watch(&mut tasks, Api::all(client)),
        };

        info!(watches = tasks.len(), "started object caches");
        (stores, tasks)
    }

    /// Waits for the initial listing of every kind
    pub async fn wait_until_ready(&self) -> Result<()> {
        async fn ready<K>(store: &Store<K>) -> Result<()>
        where
            K: Resource<DynamicType = ()> + Clone + 'static,
        {
            store
                .wait_until_ready()
                .await
                .map_err(|_| Error::CacheNotReady(K::kind(&()).into_owned()))
        }

        futures::try_join!(
            ready(&self.cluster_roles),
            ready(&self.roles),
            ready(&self.cluster_role_bindings),
            ready(&self.role_bindings),
            ready(&self.global_roles),
            ready(&self.role_templates),
        )?;

        info!("object caches ready");
        Ok(())
    }
}

impl RbacLookup for Stores {
    fn cluster_role(&self, name: &str) -> Option<Arc<ClusterRole>> {
        self.cluster_roles.get(&ObjectRef::new(name))
    }

    fn cluster_roles(&self) -> Vec<Arc<ClusterRole>> {
        self.cluster_roles.state()
    }

    fn role(&self, namespace: &str, name: &str) -> Option<Arc<Role>> {
        self.roles.get(&ObjectRef::new(name).within(namespace))
    }

    fn cluster_role_bindings(&self) -> Vec<Arc<ClusterRoleBinding>> {
        self.cluster_role_bindings.state()
    }

    fn role_bindings(&self, namespace: &str) -> Vec<Arc<RoleBinding>> {
        self.role_bindings
            .state()
            .into_iter()
            .filter(|binding| binding.namespace().as_deref() == Some(namespace))
            .collect()
    }

    fn global_role(&self, name: &str) -> Option<Arc<GlobalRole>> {
        self.global_roles.get(&ObjectRef::new(name))
    }

    fn role_template(&self, name: &str) -> Option<Arc<RoleTemplate>> {
        self.role_templates.get(&ObjectRef::new(name))
    }
}
