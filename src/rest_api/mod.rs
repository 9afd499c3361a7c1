//! HTTP endpoints for scraping and probing the operator
//!
//! Serves `/metrics` on the metrics address and `/healthz` + `/readyz` on the
//! health probe address.

mod server;

pub use server::run_server;
