//! Controller module for IngressRoute reconciliation
//!
//! This module contains the finalizer lifecycle, the kube-rs controller loop
//! and the operator metrics.

mod lifecycle;
pub mod metrics;
mod reconciler;

pub use lifecycle::{
    reconcile_changed, reconcile_lifecycle, ChangeFilter, FinalizerState, FinalizerStore,
    LifecycleAction, WatchedResource, FINALIZER_NAME,
};
pub use reconciler::{run_controller, ControllerState, KubeFinalizerStore};
