//! Command line and environment configuration of the operator
//!
//! Every flag can also be set through the environment variable named next to
//! it, e.g. `--uptime-provider` through `UPTIME_PROVIDER`.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::Result;
use crate::notify::{NoopNotifier, Notifier, SlackNotifier};
use crate::provider::{BetterStackSettings, PingdomSettings, ProviderConfig};

/// Uptime provider selectable on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    Mock,
    Pingdom,
    #[value(name = "betterstack")]
    BetterStack,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "uptime-operator")]
#[command(about = "Syncs uptime check annotations on Traefik IngressRoutes to an uptime provider", long_about = None)]
#[command(version)]
pub struct OperatorConfig {
    /// Namespaces to watch; all namespaces when omitted
    #[arg(long = "namespace", env = "NAMESPACE", value_delimiter = ',')]
    pub namespaces: Vec<String>,

    /// Uptime provider to sync checks to
    #[arg(long, env = "UPTIME_PROVIDER", value_enum, default_value = "mock")]
    pub uptime_provider: ProviderKind,

    /// Actually delete checks when their IngressRoute is deleted
    #[arg(long, env = "ENABLE_DELETES", default_value_t = false)]
    pub enable_deletes: bool,

    /// The API token to authenticate with Pingdom
    #[arg(long, env = "PINGDOM_API_TOKEN", hide_env_values = true)]
    pub pingdom_api_token: Option<String>,

    /// Pingdom user IDs to alert when a check goes down
    #[arg(long, env = "PINGDOM_ALERT_USER_IDS", value_delimiter = ',')]
    pub pingdom_alert_user_ids: Vec<i64>,

    /// Pingdom integration IDs (e.g. webhooks) to alert when a check goes down
    #[arg(long, env = "PINGDOM_ALERT_INTEGRATION_IDS", value_delimiter = ',')]
    pub pingdom_alert_integration_ids: Vec<i64>,

    /// Number of checks per Pingdom listing call
    #[arg(long, env = "PINGDOM_PAGE_SIZE", default_value_t = crate::provider::pingdom::DEFAULT_PAGE_SIZE)]
    pub pingdom_page_size: u32,

    /// The API token to authenticate with Better Stack
    #[arg(long, env = "BETTERSTACK_API_TOKEN", hide_env_values = true)]
    pub betterstack_api_token: Option<String>,

    /// Number of metadata records per Better Stack listing call
    #[arg(long, env = "BETTERSTACK_PAGE_SIZE", default_value_t = crate::provider::betterstack::DEFAULT_PAGE_SIZE)]
    pub betterstack_page_size: u32,

    /// Slack incoming webhook URL for notifications
    #[arg(long, env = "SLACK_WEBHOOK_URL", hide_env_values = true)]
    pub slack_webhook_url: Option<String>,

    /// Slack channel to post notifications to
    #[arg(long, env = "SLACK_CHANNEL")]
    pub slack_channel: Option<String>,

    /// Address the metrics endpoint binds to
    #[arg(long, env = "METRICS_BIND_ADDRESS", default_value = "0.0.0.0:8080")]
    pub metrics_bind_address: SocketAddr,

    /// Address the health probe endpoints bind to
    #[arg(long, env = "HEALTH_PROBE_BIND_ADDRESS", default_value = "0.0.0.0:8081")]
    pub health_probe_bind_address: SocketAddr,

    /// Log in JSON instead of plain text
    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

impl OperatorConfig {
    /// Provider selection with its settings; tokens are validated on build
    pub fn provider_config(&self) -> ProviderConfig {
        match self.uptime_provider {
            ProviderKind::Mock => ProviderConfig::Mock,
            ProviderKind::Pingdom => {
                let mut settings =
                    PingdomSettings::new(self.pingdom_api_token.clone().unwrap_or_default());
                settings.user_ids = self.pingdom_alert_user_ids.clone();
                settings.integration_ids = self.pingdom_alert_integration_ids.clone();
                settings.page_size = self.pingdom_page_size;
                ProviderConfig::Pingdom(settings)
            }
            ProviderKind::BetterStack => {
                let mut settings =
                    BetterStackSettings::new(self.betterstack_api_token.clone().unwrap_or_default());
                settings.page_size = self.betterstack_page_size;
                ProviderConfig::BetterStack(settings)
            }
        }
    }

    /// Slack notifier when both webhook and channel are set, otherwise a no-op
    pub fn notifier(&self, cancel: CancellationToken) -> Result<Arc<dyn Notifier>> {
        let webhook = self.slack_webhook_url.as_deref().filter(|s| !s.is_empty());
        let channel = self.slack_channel.as_deref().filter(|s| !s.is_empty());
        match (webhook, channel) {
            (Some(webhook), Some(channel)) => {
                info!("Posting notifications to Slack channel {}", channel);
                Ok(Arc::new(SlackNotifier::new(webhook, channel, cancel)?))
            }
            _ => Ok(Arc::new(NoopNotifier)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OperatorConfig::try_parse_from(["uptime-operator"]).unwrap();
        assert_eq!(config.uptime_provider, ProviderKind::Mock);
        assert!(!config.enable_deletes);
        assert!(config.namespaces.is_empty());
        assert_eq!(config.betterstack_page_size, 50);
        assert_eq!(config.pingdom_page_size, 25000);
        assert_eq!(config.metrics_bind_address.port(), 8080);
        assert_eq!(config.health_probe_bind_address.port(), 8081);
        assert!(matches!(config.provider_config(), ProviderConfig::Mock));
    }

    #[test]
    fn test_pingdom_settings() {
        let config = OperatorConfig::try_parse_from([
            "uptime-operator",
            "--uptime-provider",
            "pingdom",
            "--pingdom-api-token",
            "secret",
            "--pingdom-alert-user-ids",
            "1,2",
            "--pingdom-alert-integration-ids",
            "3",
            "--namespace",
            "a,b",
            "--enable-deletes",
        ])
        .unwrap();
        assert_eq!(config.namespaces, vec!["a", "b"]);
        assert!(config.enable_deletes);
        match config.provider_config() {
            ProviderConfig::Pingdom(settings) => {
                assert_eq!(settings.api_token, "secret");
                assert_eq!(settings.user_ids, vec![1, 2]);
                assert_eq!(settings.integration_ids, vec![3]);
            }
            other => panic!("expected pingdom, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_token_fails_on_build() {
        let config =
            OperatorConfig::try_parse_from(["uptime-operator", "--uptime-provider", "betterstack"])
                .unwrap();
        assert!(config.provider_config().build().is_err());
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        assert!(
            OperatorConfig::try_parse_from(["uptime-operator", "--uptime-provider", "nagios"])
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_slack_requires_webhook_and_channel() {
        let config = OperatorConfig::try_parse_from([
            "uptime-operator",
            "--slack-webhook-url",
            "http://localhost/hook",
        ])
        .unwrap();
        // without a channel the no-op notifier is used; sending must not block or fail
        config
            .notifier(CancellationToken::new())
            .unwrap()
            .send("hello")
            .await;
    }
}
