//! Controller wiring for Traefik IngressRoutes
//!
//! One controller runs per IngressRoute API group (and per namespace when the
//! operator is restricted to namespaces). Each reconcile hands the resource to
//! the finalizer lifecycle, which in turn drives the [`UptimeCheckService`].

use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{Api, ListParams, Patch, PatchParams},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        watcher::Config,
    },
    Resource, ResourceExt,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use crate::crd::{IngressRoute, LegacyIngressRoute};
use crate::error::{Error, Result};
use crate::service::UptimeCheckService;

use super::lifecycle::{
    reconcile_changed, ChangeFilter, FinalizerStore, LifecycleAction, WatchedResource,
};
use super::metrics;

/// Requeue delay after a retriable failure
const RETRY_SHORT: Duration = Duration::from_secs(15);

/// Requeue delay after any other failure
const RETRY_LONG: Duration = Duration::from_secs(60);

/// Shared state for the controllers
pub struct ControllerState {
    pub client: Client,
    pub service: UptimeCheckService,
    /// Generation and annotations last synced per resource
    pub changes: ChangeFilter,
}

impl ControllerState {
    pub fn new(client: Client, service: UptimeCheckService) -> Self {
        Self {
            client,
            service,
            changes: ChangeFilter::default(),
        }
    }
}

/// Watched resource kinds handled by the generic reconciler
pub trait WatchedKind:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + DeserializeOwned
    + Debug
    + Send
    + Sync
    + 'static
{
}

impl<K> WatchedKind for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static
{
}

/// Main entry point to start the controllers
///
/// An empty `namespaces` list watches the whole cluster. The legacy
/// `traefik.containo.us` group is optional; at least one group must be
/// installed. `ready` is raised once the controllers start watching.
pub async fn run_controller(
    state: Arc<ControllerState>,
    namespaces: Vec<String>,
    ready: Arc<AtomicBool>,
) -> Result<()> {
    info!(
        "Starting IngressRoute controllers (provider: {})",
        state.service.provider_name()
    );

    let mut controllers = controllers_for::<IngressRoute>(&state, &namespaces).await;
    controllers.extend(controllers_for::<LegacyIngressRoute>(&state, &namespaces).await);

    if controllers.is_empty() {
        return Err(Error::ConfigError(
            "no Traefik IngressRoute CRD installed".to_string(),
        ));
    }

    ready.store(true, Ordering::Relaxed);
    futures::future::join_all(controllers).await;
    Ok(())
}

/// One controller per watched namespace, or none when the CRD is missing
async fn controllers_for<K: WatchedKind>(
    state: &Arc<ControllerState>,
    namespaces: &[String],
) -> Vec<BoxFuture<'static, ()>> {
    let group = K::api_version(&()).to_string();
    let apis: Vec<Api<K>> = if namespaces.is_empty() {
        vec![Api::all(state.client.clone())]
    } else {
        namespaces
            .iter()
            .map(|ns| Api::namespaced(state.client.clone(), ns))
            .collect()
    };

    // Verify the CRD exists before watching
    if let Some(api) = apis.first() {
        if let Err(e) = api.list(&ListParams::default().limit(1)).await {
            warn!("IngressRoute CRD {} is not available, not watching it: {}", group, e);
            return Vec::new();
        }
    }
    info!("Watching IngressRoutes in {}", group);

    apis.into_iter()
        .map(|api| {
            Controller::new(api, Config::default())
                .shutdown_on_signal()
                .run(reconcile::<K>, error_policy::<K>, state.clone())
                .for_each(|res| async move {
                    match res {
                        Ok(obj) => debug!("Reconciled: {:?}", obj),
                        Err(e) => debug!("Reconcile error: {:?}", e),
                    }
                })
                .boxed()
        })
        .collect()
}

/// Persists finalizer changes with a merge patch pinned to the observed
/// resource version, so a concurrent change yields a conflict
pub struct KubeFinalizerStore<K> {
    client: Client,
    kind: PhantomData<K>,
}

impl<K> KubeFinalizerStore<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            kind: PhantomData,
        }
    }
}

#[async_trait]
impl<K: WatchedKind> FinalizerStore for KubeFinalizerStore<K> {
    async fn update_finalizers(
        &self,
        resource: &WatchedResource,
        finalizers: Vec<String>,
    ) -> Result<()> {
        let api: Api<K> = match &resource.namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::default_namespaced(self.client.clone()),
        };
        let patch = json!({
            "metadata": {
                "resourceVersion": resource.resource_version,
                "finalizers": finalizers,
            }
        });
        api.patch(&resource.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| Error::finalizer_persist(&resource.to_string(), &e))?;
        Ok(())
    }
}

/// The reconciliation function shared by both IngressRoute groups
#[instrument(skip(obj, ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile<K: WatchedKind>(obj: Arc<K>, ctx: Arc<ControllerState>) -> Result<Action> {
    let resource = WatchedResource::from_resource(obj.as_ref());
    if !resource.is_candidate() {
        return Ok(Action::await_change());
    }

    debug!("Reconciling IngressRoute {}", resource);
    let store = KubeFinalizerStore::<K>::new(ctx.client.clone());
    match reconcile_changed(&resource, &store, &ctx.service, &ctx.changes).await {
        Ok(LifecycleAction::Synced(mutation, outcome)) => {
            info!("{} of {}: {}", mutation, resource, outcome);
            Ok(Action::await_change())
        }
        Ok(LifecycleAction::Stop) => Ok(Action::await_change()),
        Err(e) if e.is_not_found() => {
            ctx.changes.forget(&resource);
            info!("IngressRoute {} is already gone", resource);
            Ok(Action::await_change())
        }
        Err(e) => Err(e),
    }
}

/// Requeue failed reconciles, sooner for retriable errors
fn error_policy<K: WatchedKind>(obj: Arc<K>, error: &Error, _ctx: Arc<ControllerState>) -> Action {
    error!("Reconciliation error for {}: {}", obj.name_any(), error);
    metrics::record_reconcile_error(error.metric_label());
    Action::requeue(retry_delay(error))
}

fn retry_delay(error: &Error) -> Duration {
    if error.is_retriable() {
        RETRY_SHORT
    } else {
        RETRY_LONG
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay() {
        assert_eq!(retry_delay(&Error::DecodeError("x".to_string())), RETRY_SHORT);
        assert_eq!(retry_delay(&Error::ConfigError("x".to_string())), RETRY_LONG);
        assert_eq!(retry_delay(&Error::Cancelled), RETRY_LONG);
    }
}
