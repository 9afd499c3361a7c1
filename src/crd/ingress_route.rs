//! Traefik IngressRoute resources watched by the operator
//!
//! Only the metadata (annotations, finalizers, deletion timestamp) of these
//! resources matters to the operator. The spec is kept loosely typed so that
//! any IngressRoute accepted by Traefik deserializes.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Traefik IngressRoute in the `traefik.io` API group
///
/// # Example
///
/// ```yaml
/// apiVersion: traefik.io/v1alpha1
/// kind: IngressRoute
/// metadata:
///   name: my-service
///   annotations:
///     uptime.pdok.nl/id: "7a1f3c"
///     uptime.pdok.nl/name: "My service"
///     uptime.pdok.nl/url: "https://example.com/health"
///     uptime.pdok.nl/tags: "public, wms"
/// spec:
///   routes:
///     - kind: Rule
///       match: Host(`example.com`)
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "traefik.io",
    version = "v1alpha1",
    kind = "IngressRoute",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct IngressRouteSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry_points: Vec<String>,

    #[serde(default)]
    pub routes: Vec<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<serde_json::Value>,
}

/// Traefik IngressRoute in the legacy `traefik.containo.us` API group
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "traefik.containo.us",
    version = "v1alpha1",
    kind = "IngressRoute",
    root = "LegacyIngressRoute",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct LegacyIngressRouteSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry_points: Vec<String>,

    #[serde(default)]
    pub routes: Vec<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<serde_json::Value>,
}
