//! Uptime providers
//!
//! Every provider implements [`UptimeProvider`]. The concrete implementation
//! is picked once at startup from a [`ProviderConfig`].

mod client;
pub mod interval;
mod resolver;

pub mod betterstack;
pub mod mock;
pub mod pingdom;


use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::model::CheckSpec;

pub use betterstack::{BetterStackProvider, BetterStackSettings};
pub use client::ApiClient;
pub use mock::MockProvider;
pub use pingdom::{PingdomProvider, PingdomSettings};
pub use resolver::{find_check, ListedCheck, Page, PagedListing};

/// Identifier a provider assigned to one of its checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemoteObjectId(pub i64);

impl fmt::Display for RemoteObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capability shared by all uptime providers
///
/// Both operations must be safe to retry from scratch: create-or-update never
/// produces a second remote check for the same correlation key, and deleting a
/// check that does not exist succeeds.
#[async_trait]
pub trait UptimeProvider: Send + Sync {
    /// Short provider name used in logs and metric labels
    fn name(&self) -> &'static str;

    async fn create_or_update_check(&self, check: &CheckSpec) -> Result<()>;

    async fn delete_check(&self, check: &CheckSpec) -> Result<()>;
}

/// Selected provider together with its settings
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    Mock,
    Pingdom(PingdomSettings),
    BetterStack(BetterStackSettings),
}

impl ProviderConfig {
    /// Construct the configured provider
    ///
    /// Fails with a configuration error when a required API token is missing.
    pub fn build(self) -> Result<Arc<dyn UptimeProvider>> {
        match self {
            ProviderConfig::Mock => Ok(Arc::new(MockProvider::default())),
            ProviderConfig::Pingdom(settings) => {
                require_token("Pingdom", &settings.api_token)?;
                Ok(Arc::new(PingdomProvider::new(settings)?))
            }
            ProviderConfig::BetterStack(settings) => {
                require_token("Better Stack", &settings.api_token)?;
                Ok(Arc::new(BetterStackProvider::new(settings)?))
            }
        }
    }
}

fn require_token(provider: &str, token: &str) -> Result<()> {
    if token.trim().is_empty() {
        return Err(Error::ConfigError(format!(
            "{} API token is not provided",
            provider
        )));
    }
    Ok(())
}
