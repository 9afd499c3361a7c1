//! uptime-operator: keeps uptime checks in sync with Traefik IngressRoutes
//!
//! Annotations under `uptime.pdok.nl/` on an IngressRoute describe an uptime
//! check. The operator creates, updates and deletes that check at the
//! configured provider (Pingdom, Better Stack or an in-memory mock), guarded
//! by a finalizer, and reports every change to Slack.

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod governor;
pub mod model;
pub mod notify;
pub mod provider;
pub mod rest_api;
pub mod service;

pub use error::{Error, Result};
