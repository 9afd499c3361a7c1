//! In-memory provider for local runs and tests

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use super::UptimeProvider;
use crate::error::Result;
use crate::model::CheckSpec;

/// Keeps checks in memory, keyed by correlation key
#[derive(Debug, Default)]
pub struct MockProvider {
    checks: Mutex<HashMap<String, CheckSpec>>,
}

impl MockProvider {
    /// Snapshot of the check stored under `id`
    pub async fn get(&self, id: &str) -> Option<CheckSpec> {
        self.checks.lock().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.checks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.checks.lock().await.is_empty()
    }
}

#[async_trait]
impl UptimeProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_or_update_check(&self, check: &CheckSpec) -> Result<()> {
        let previous = self
            .checks
            .lock()
            .await
            .insert(check.id.clone(), check.clone());
        match previous {
            Some(_) => info!("MOCK: updated check '{}'", check.id),
            None => info!("MOCK: created check '{}'", check.id),
        }
        Ok(())
    }

    async fn delete_check(&self, check: &CheckSpec) -> Result<()> {
        if self.checks.lock().await.remove(&check.id).is_some() {
            info!("MOCK: deleted check '{}'", check.id);
        } else {
            info!("MOCK: check '{}' is already deleted", check.id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn check(name: &str) -> CheckSpec {
        CheckSpec {
            id: "abc".into(),
            name: name.into(),
            url: "https://example.com".into(),
            tags: vec!["managed-by-uptime-operator".into()],
            interval_minutes: 1,
            request_headers: BTreeMap::new(),
            string_contains: String::new(),
            string_not_contains: String::new(),
        }
    }

    #[tokio::test]
    async fn test_create_or_update_is_idempotent() {
        let provider = MockProvider::default();
        provider.create_or_update_check(&check("first")).await.unwrap();
        provider.create_or_update_check(&check("second")).await.unwrap();
        assert_eq!(provider.len().await, 1);
        assert_eq!(provider.get("abc").await.unwrap().name, "second");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let provider = MockProvider::default();
        provider.delete_check(&check("gone")).await.unwrap();
        provider.create_or_update_check(&check("there")).await.unwrap();
        provider.delete_check(&check("there")).await.unwrap();
        assert!(provider.is_empty().await);
    }
}
