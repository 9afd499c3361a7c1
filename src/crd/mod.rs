//! Custom resources watched by the uptime operator
//!
//! The operator owns no CRD itself; it watches Traefik's IngressRoutes.

mod ingress_route;

pub use ingress_route::{IngressRoute, IngressRouteSpec, LegacyIngressRoute, LegacyIngressRouteSpec};
