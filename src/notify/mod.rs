//! Chat notifications about check mutations
//!
//! Delivery is best effort: failures are logged and never returned to the
//! caller.

mod slack;

use async_trait::async_trait;

pub use slack::SlackNotifier;

/// Fire-and-forget message sink
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str);
}

/// Notifier used when no chat sink is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _message: &str) {}
}
