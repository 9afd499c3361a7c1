//! Pingdom uptime provider
//!
//! Checks are correlated through an `id:<correlation key>` tag. Pingdom
//! reports its request quota in `Req-Limit-Short` / `Req-Limit-Long` response
//! headers, which feed the reactive [`QuotaGovernor`].
//!
//! API reference: <https://docs.pingdom.com/api/>

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, instrument};

use super::client::ApiClient;
use super::interval::{quantize, PINGDOM_RESOLUTIONS_SECS};
use super::resolver::{find_check, ListedCheck, Page, PagedListing};
use super::{RemoteObjectId, UptimeProvider};
use crate::error::{Error, Result};
use crate::governor::QuotaGovernor;
use crate::model::{CheckSpec, TAG_MANAGED_BY};

pub const PINGDOM_BASE_URL: &str = "https://api.pingdom.com/api/3.1";

/// Maximum number of checks Pingdom returns in one listing call
pub const DEFAULT_PAGE_SIZE: u32 = 25000;

/// Pingdom rejects tags longer than this
const MAX_TAG_LENGTH: usize = 64;

const CORRELATION_TAG_PREFIX: &str = "id:";

#[derive(Debug, Clone)]
pub struct PingdomSettings {
    pub api_token: String,
    /// Pingdom users alerted when a check goes down
    pub user_ids: Vec<i64>,
    /// Pingdom integrations (e.g. webhooks) alerted when a check goes down
    pub integration_ids: Vec<i64>,
    pub page_size: u32,
    pub base_url: String,
}

impl PingdomSettings {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            user_ids: Vec::new(),
            integration_ids: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            base_url: PINGDOM_BASE_URL.to_string(),
        }
    }
}

pub struct PingdomProvider {
    client: ApiClient,
    settings: PingdomSettings,
}

impl PingdomProvider {
    pub fn new(mut settings: PingdomSettings) -> Result<Self> {
        if settings.page_size == 0 {
            settings.page_size = DEFAULT_PAGE_SIZE;
        }
        let client = ApiClient::new(
            &settings.base_url,
            &settings.api_token,
            Some(QuotaGovernor::pingdom()),
        )?;
        Ok(Self { client, settings })
    }

    async fn create_check(&self, check: &CheckSpec) -> Result<()> {
        info!("Creating Pingdom check '{}'", check.id);
        let payload = self.check_payload(check, None)?;
        let request = self
            .client
            .request(Method::POST, &self.client.url("/checks"))
            .json(&payload);
        self.client.send(request, &[StatusCode::OK]).await?;
        Ok(())
    }

    async fn update_check(&self, remote_id: RemoteObjectId, check: &CheckSpec) -> Result<()> {
        info!("Updating Pingdom check '{}' (pingdom id {})", check.id, remote_id);
        let url = self.client.url(&format!("/checks/{}", remote_id));

        let existing: CheckDetailResponse = self
            .client
            .send_json(self.client.request(Method::GET, &url), &[StatusCode::OK])
            .await?;
        let existing = existing.check.kind.http.unwrap_or_default();

        let payload = self.check_payload(check, Some(&existing))?;
        let request = self.client.request(Method::PUT, &url).json(&payload);
        self.client.send(request, &[StatusCode::OK]).await?;
        Ok(())
    }

    /// JSON body for a create (`existing` is `None`) or update call
    ///
    /// On update the check type is omitted since Pingdom cannot change it, and
    /// keyword or header fields the existing check has but `check` lacks are
    /// sent empty so they are removed.
    fn check_payload(
        &self,
        check: &CheckSpec,
        existing: Option<&HttpDetail>,
    ) -> Result<Map<String, Value>> {
        let url = Url::parse(&check.url)
            .map_err(|e| Error::validation(&check.name, format!("invalid url '{}': {}", check.url, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::validation(&check.name, format!("url '{}' has no host", check.url)))?;
        let mut relative_url = url.path().to_string();
        if let Some(query) = url.query().filter(|q| !q.is_empty()) {
            relative_url.push('?');
            relative_url.push_str(query);
        }

        let mut tags: Vec<String> = check.tags.iter().map(|t| truncate_tag(t)).collect();
        let id_tag = correlation_tag(&check.id);
        if !tags.contains(&id_tag) {
            tags.push(id_tag);
        }

        let resolution_secs = quantize(i64::from(check.interval_minutes), PINGDOM_RESOLUTIONS_SECS);

        let mut payload = Map::new();
        payload.insert("name".into(), json!(check.name));
        payload.insert("host".into(), json!(host));
        payload.insert("url".into(), json!(relative_url));
        payload.insert("encryption".into(), json!(true));
        payload.insert("port".into(), json!(url.port().unwrap_or(443)));
        payload.insert("resolution".into(), json!(resolution_secs / 60));
        payload.insert("tags".into(), json!(tags));
        if existing.is_none() {
            payload.insert("type".into(), json!("http"));
        }
        if !self.settings.user_ids.is_empty() {
            payload.insert("userids".into(), json!(self.settings.user_ids));
        }
        if !self.settings.integration_ids.is_empty() {
            payload.insert("integrationids".into(), json!(self.settings.integration_ids));
        }

        // BTreeMap iteration is sorted, so header numbering is stable
        for (index, (name, value)) in check.request_headers.iter().enumerate() {
            payload.insert(
                format!("requestheader{}", index),
                json!(format!("{}:{}", name, value)),
            );
        }

        // Pingdom accepts only one of the two; contains wins
        if !check.string_contains.is_empty() {
            payload.insert("shouldcontain".into(), json!(check.string_contains));
        } else if !check.string_not_contains.is_empty() {
            payload.insert("shouldnotcontain".into(), json!(check.string_not_contains));
        }

        if let Some(existing) = existing {
            for index in check.request_headers.len()..existing.requestheaders.len() {
                payload.insert(format!("requestheader{}", index), json!(""));
            }
            for (field, current) in [
                ("shouldcontain", &existing.shouldcontain),
                ("shouldnotcontain", &existing.shouldnotcontain),
            ] {
                let stale = current.as_deref().map(|v| !v.is_empty()).unwrap_or(false);
                if stale && !payload.contains_key(field) {
                    payload.insert(field.into(), json!(""));
                }
            }
        }

        Ok(payload)
    }
}

#[async_trait]
impl PagedListing for PingdomProvider {
    /// Offset of the next page
    type Cursor = u32;

    async fn fetch_page(&self, cursor: Option<&u32>) -> Result<Page<u32>> {
        let offset = cursor.copied().unwrap_or(0);
        let request = self
            .client
            .request(Method::GET, &self.client.url("/checks"))
            .query(&[
                ("include_tags", "true".to_string()),
                ("tags", TAG_MANAGED_BY.to_string()),
                ("limit", self.settings.page_size.to_string()),
                ("offset", offset.to_string()),
            ]);
        let listing: CheckListResponse = self.client.send_json(request, &[StatusCode::OK]).await?;

        let returned = listing.checks.len();
        let entries = listing
            .checks
            .into_iter()
            .filter(|c| c.id > 0)
            .map(|c| ListedCheck {
                id: RemoteObjectId(c.id),
                keys: c.tags.into_iter().map(|t| t.name).collect(),
            })
            .collect();

        // a short page is the last one
        let next = (returned >= self.settings.page_size as usize)
            .then(|| offset.saturating_add(self.settings.page_size));
        Ok(Page { entries, next })
    }
}

#[async_trait]
impl UptimeProvider for PingdomProvider {
    fn name(&self) -> &'static str {
        "pingdom"
    }

    #[instrument(skip(self, check), fields(check_id = %check.id))]
    async fn create_or_update_check(&self, check: &CheckSpec) -> Result<()> {
        match find_check(self, &correlation_tag(&check.id)).await? {
            Some(remote_id) => self.update_check(remote_id, check).await,
            None => self.create_check(check).await,
        }
    }

    #[instrument(skip(self, check), fields(check_id = %check.id))]
    async fn delete_check(&self, check: &CheckSpec) -> Result<()> {
        let Some(remote_id) = find_check(self, &correlation_tag(&check.id)).await? else {
            info!("Pingdom check '{}' is already deleted", check.id);
            return Ok(());
        };

        info!("Deleting Pingdom check '{}' (pingdom id {})", check.id, remote_id);
        let request = self
            .client
            .request(Method::DELETE, &self.client.url(&format!("/checks/{}", remote_id)));
        self.client.send(request, &[StatusCode::OK]).await?;
        Ok(())
    }
}

/// Tag carrying the correlation key, as stored by Pingdom
pub(crate) fn correlation_tag(id: &str) -> String {
    truncate_tag(&format!("{}{}", CORRELATION_TAG_PREFIX, id))
}

fn truncate_tag(tag: &str) -> String {
    tag.chars().take(MAX_TAG_LENGTH).collect()
}

#[derive(Debug, Deserialize)]
struct CheckListResponse {
    #[serde(default)]
    checks: Vec<ListedPingdomCheck>,
}

#[derive(Debug, Deserialize)]
struct ListedPingdomCheck {
    id: i64,
    #[serde(default)]
    tags: Vec<PingdomTag>,
}

#[derive(Debug, Deserialize)]
struct PingdomTag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CheckDetailResponse {
    check: CheckDetail,
}

#[derive(Debug, Deserialize)]
struct CheckDetail {
    #[serde(rename = "type", default)]
    kind: CheckTypeDetail,
}

#[derive(Debug, Default, Deserialize)]
struct CheckTypeDetail {
    #[serde(default)]
    http: Option<HttpDetail>,
}

#[derive(Debug, Default, Deserialize)]
struct HttpDetail {
    #[serde(default)]
    shouldcontain: Option<String>,
    #[serde(default)]
    shouldnotcontain: Option<String>,
    #[serde(default)]
    requestheaders: BTreeMap<String, String>,
}
