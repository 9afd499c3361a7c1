//! Synchronization of annotation state to the active uptime provider
//!
//! [`UptimeCheckService::mutate`] performs at most one provider mutation and
//! sends at most one notification per call.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::controller::metrics;
use crate::error::{Error, Result};
use crate::model::{is_ignored, CheckSpec, Mutation};
use crate::notify::{NoopNotifier, Notifier};
use crate::provider::UptimeProvider;

const PREFIX_SUCCESS: &str = ":large_green_square:";
const PREFIX_FAILURE: &str = ":large_red_square:";
const PREFIX_INFO: &str = ":information_source:";
const PREFIX_WARNING: &str = ":warning:";

/// How a mutate call ended without a provider error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The provider applied the mutation
    Succeeded,
    /// Deletes are disabled, the provider was not called
    Suppressed,
    /// The resource opted out of monitoring
    Ignored,
    /// The annotations do not describe a valid check
    Invalid,
}

impl MutationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationOutcome::Succeeded => "succeeded",
            MutationOutcome::Suppressed => "suppressed",
            MutationOutcome::Ignored => "ignored",
            MutationOutcome::Invalid => "invalid",
        }
    }
}

impl fmt::Display for MutationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatches check mutations to a provider and reports the result
pub struct UptimeCheckService {
    provider: Arc<dyn UptimeProvider>,
    notifier: Arc<dyn Notifier>,
    enable_deletes: bool,
}

impl UptimeCheckService {
    /// Service without notifications and with deletes disabled
    pub fn new(provider: Arc<dyn UptimeProvider>) -> Self {
        Self {
            provider,
            notifier: Arc::new(NoopNotifier),
            enable_deletes: false,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_deletes(mut self, enable_deletes: bool) -> Self {
        self.enable_deletes = enable_deletes;
        self
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Apply `mutation` for the check described by `annotations`
    ///
    /// Invalid annotations are reported and end in `Ok(Invalid)`; they are
    /// never retried. Provider failures are reported and returned as errors
    /// so the caller can retry the whole mutation.
    #[instrument(skip(self, annotations), fields(provider = self.provider.name()))]
    pub async fn mutate(
        &self,
        mutation: Mutation,
        resource_name: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<MutationOutcome> {
        if is_ignored(annotations) {
            info!("Resource {} is ignored for uptime monitoring", resource_name);
            return Ok(self.finish(mutation, MutationOutcome::Ignored));
        }

        let check = match CheckSpec::from_annotations(resource_name, annotations) {
            Ok(check) => check,
            Err(e @ Error::ValidationError { .. }) => return Ok(self.report_invalid(mutation, &e).await),
            Err(e) => return Err(e),
        };

        let result = match mutation {
            Mutation::CreateOrUpdate => self.provider.create_or_update_check(&check).await,
            Mutation::Delete if !self.enable_deletes => {
                let message = format!(
                    "delete of uptime check '{}' (id: {}) not executed since 'enable-deletes=false'.",
                    check.name, check.id
                );
                warn!("{}", message);
                self.notifier
                    .send(&format!("{} {}", PREFIX_INFO, message))
                    .await;
                return Ok(self.finish(mutation, MutationOutcome::Suppressed));
            }
            Mutation::Delete => self.provider.delete_check(&check).await,
        };

        match result {
            Ok(()) => {
                let message = format!(
                    "{} of uptime check '{}' (id: {}) succeeded.",
                    mutation, check.name, check.id
                );
                info!("{}", message);
                let notification = match mutation {
                    Mutation::CreateOrUpdate => format!("{} {}", PREFIX_SUCCESS, message),
                    Mutation::Delete => format!(
                        "{} {}\n _Beware: a flood of these delete messages may indicate Traefik itself is down!_",
                        PREFIX_WARNING, message
                    ),
                };
                self.notifier.send(&notification).await;
                Ok(self.finish(mutation, MutationOutcome::Succeeded))
            }
            Err(e @ Error::ValidationError { .. }) => Ok(self.report_invalid(mutation, &e).await),
            Err(e) => {
                let message = format!(
                    "{} of uptime check '{}' (id: {}) failed: {}",
                    mutation, check.name, check.id, e
                );
                error!("{}", message);
                self.notifier
                    .send(&format!("{} {}", PREFIX_FAILURE, message))
                    .await;
                metrics::record_mutation(self.provider.name(), mutation.as_str(), "failed");
                Err(e)
            }
        }
    }

    async fn report_invalid(&self, mutation: Mutation, err: &Error) -> MutationOutcome {
        let message = format!(
            "missing or invalid uptime check annotation(s) encountered: {}",
            err
        );
        error!("{}", message);
        self.notifier
            .send(&format!("{} {}", PREFIX_FAILURE, message))
            .await;
        self.finish(mutation, MutationOutcome::Invalid)
    }

    fn finish(&self, mutation: Mutation, outcome: MutationOutcome) -> MutationOutcome {
        metrics::record_mutation(self.provider.name(), mutation.as_str(), outcome.as_str());
        outcome
    }
}
