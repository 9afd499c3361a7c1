//! Finalizer driven lifecycle of a watched resource
//!
//! The finalizer guarantees the remote check is deleted before the resource
//! disappears from the cluster. The state machine only needs to know whether
//! the resource is being deleted and which finalizers it carries, so it works
//! over [`WatchedResource`] and persists through a [`FinalizerStore`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use kube::{Resource, ResourceExt};
use tracing::{debug, info};

use crate::error::Result;
use crate::model::{has_uptime_annotations, Mutation};
use crate::service::{MutationOutcome, UptimeCheckService};

/// Finalizer placed on every managed resource
pub const FINALIZER_NAME: &str = "uptime.pdok.nl/finalizer";

/// Lifecycle state derived from deletion timestamp and finalizers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerState {
    ActiveNoFinalizer,
    ActiveWithFinalizer,
    DeletingWithFinalizer,
    DeletingNoFinalizer,
}

impl FinalizerState {
    pub fn derive(deleting: bool, finalizers: &[String]) -> Self {
        let has_finalizer = finalizers.iter().any(|f| f == FINALIZER_NAME);
        match (deleting, has_finalizer) {
            (false, false) => FinalizerState::ActiveNoFinalizer,
            (false, true) => FinalizerState::ActiveWithFinalizer,
            (true, true) => FinalizerState::DeletingWithFinalizer,
            (true, false) => FinalizerState::DeletingNoFinalizer,
        }
    }
}

/// The parts of a watched resource the lifecycle depends on
#[derive(Debug, Clone, Default)]
pub struct WatchedResource {
    pub name: String,
    pub namespace: Option<String>,
    pub uid: Option<String>,
    pub generation: Option<i64>,
    /// Version observed, used to make finalizer updates conditional
    pub resource_version: Option<String>,
    pub annotations: BTreeMap<String, String>,
    pub deleting: bool,
    pub finalizers: Vec<String>,
}

impl WatchedResource {
    pub fn from_resource<K: Resource>(obj: &K) -> Self {
        Self {
            name: obj.name_any(),
            namespace: obj.namespace(),
            uid: obj.uid(),
            generation: obj.meta().generation,
            resource_version: obj.resource_version(),
            annotations: obj.annotations().clone(),
            deleting: obj.meta().deletion_timestamp.is_some(),
            finalizers: obj.finalizers().to_vec(),
        }
    }

    pub fn state(&self) -> FinalizerState {
        FinalizerState::derive(self.deleting, &self.finalizers)
    }

    /// Whether this operator has any business with the resource
    pub fn is_candidate(&self) -> bool {
        has_uptime_annotations(&self.annotations)
            || self.finalizers.iter().any(|f| f == FINALIZER_NAME)
    }

    fn key(&self) -> String {
        self.uid.clone().unwrap_or_else(|| self.to_string())
    }
}

impl fmt::Display for WatchedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}/{}", namespace, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Conditional update of a resource's finalizer list
///
/// Implementations must fail when the resource changed or vanished since it
/// was observed, rather than overwrite it.
#[async_trait]
pub trait FinalizerStore: Send + Sync {
    async fn update_finalizers(&self, resource: &WatchedResource, finalizers: Vec<String>)
        -> Result<()>;
}

/// What a lifecycle step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Synced(Mutation, MutationOutcome),
    /// Nothing to do for this resource
    Stop,
}

/// Run one lifecycle step for `resource`
///
/// On the delete path the finalizer is only removed after the mutation
/// returned without error; otherwise the error is returned and the resource
/// stays blocked until a later retry succeeds.
pub async fn reconcile_lifecycle(
    resource: &WatchedResource,
    store: &dyn FinalizerStore,
    service: &UptimeCheckService,
) -> Result<LifecycleAction> {
    match resource.state() {
        FinalizerState::ActiveNoFinalizer => {
            info!("Adding finalizer to {}", resource);
            let mut finalizers = resource.finalizers.clone();
            finalizers.push(FINALIZER_NAME.to_string());
            store.update_finalizers(resource, finalizers).await?;
            sync(resource, service, Mutation::CreateOrUpdate).await
        }
        FinalizerState::ActiveWithFinalizer => {
            sync(resource, service, Mutation::CreateOrUpdate).await
        }
        FinalizerState::DeletingWithFinalizer => {
            let action = sync(resource, service, Mutation::Delete).await?;
            info!("Removing finalizer from {}", resource);
            let finalizers = resource
                .finalizers
                .iter()
                .filter(|f| f.as_str() != FINALIZER_NAME)
                .cloned()
                .collect();
            store.update_finalizers(resource, finalizers).await?;
            Ok(action)
        }
        FinalizerState::DeletingNoFinalizer => {
            debug!("{} is being deleted and carries no finalizer of ours", resource);
            Ok(LifecycleAction::Stop)
        }
    }
}

/// Generation and annotations last synced for a resource
#[derive(Debug, Clone, PartialEq, Eq)]
struct SyncedState {
    generation: Option<i64>,
    annotations: BTreeMap<String, String>,
}

impl SyncedState {
    fn of(resource: &WatchedResource) -> Self {
        Self {
            generation: resource.generation,
            annotations: resource.annotations.clone(),
        }
    }
}

/// Skips watch events that changed neither the generation nor the
/// annotations of an already synced resource
///
/// Adding the finalizer, status updates and label edits all produce watch
/// events; only generation or annotation changes lead to another sync.
/// Resources being deleted always pass.
#[derive(Debug, Default)]
pub struct ChangeFilter {
    synced: Mutex<HashMap<String, SyncedState>>,
}

impl ChangeFilter {
    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, SyncedState>> {
        self.synced
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True when `resource` was synced before with the same generation and annotations
    pub fn is_unchanged(&self, resource: &WatchedResource) -> bool {
        if resource.state() != FinalizerState::ActiveWithFinalizer {
            return false;
        }
        self.entries()
            .get(&resource.key())
            .is_some_and(|synced| *synced == SyncedState::of(resource))
    }

    /// Remember a completed lifecycle step
    pub fn record(&self, resource: &WatchedResource) {
        match resource.state() {
            FinalizerState::ActiveNoFinalizer | FinalizerState::ActiveWithFinalizer => {
                self.entries()
                    .insert(resource.key(), SyncedState::of(resource));
            }
            FinalizerState::DeletingWithFinalizer | FinalizerState::DeletingNoFinalizer => {
                self.forget(resource);
            }
        }
    }

    pub fn forget(&self, resource: &WatchedResource) {
        self.entries().remove(&resource.key());
    }
}

/// Run a lifecycle step unless `filter` has already synced this state
///
/// Failed steps are not recorded, so their retry always runs.
pub async fn reconcile_changed(
    resource: &WatchedResource,
    store: &dyn FinalizerStore,
    service: &UptimeCheckService,
    filter: &ChangeFilter,
) -> Result<LifecycleAction> {
    if filter.is_unchanged(resource) {
        debug!("No generation or annotation change on {}", resource);
        return Ok(LifecycleAction::Stop);
    }
    let action = reconcile_lifecycle(resource, store, service).await?;
    filter.record(resource);
    Ok(action)
}

async fn sync(
    resource: &WatchedResource,
    service: &UptimeCheckService,
    mutation: Mutation,
) -> Result<LifecycleAction> {
    let outcome = service
        .mutate(mutation, &resource.name, &resource.annotations)
        .await?;
    Ok(LifecycleAction::Synced(mutation, outcome))
}
