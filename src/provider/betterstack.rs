//! Better Stack uptime provider
//!
//! Monitors themselves carry no tags. The correlation key is stored as a
//! metadata record owned by the monitor, whose values hold the check's tags.
//!
//! API reference: <https://betterstack.com/docs/uptime/api/>

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};

use super::client::ApiClient;
use super::interval::{quantize, BETTERSTACK_INTERVALS_SECS};
use super::resolver::{find_check, ListedCheck, Page, PagedListing};
use super::{RemoteObjectId, UptimeProvider};
use crate::error::{Error, Result};
use crate::model::CheckSpec;

pub const BETTERSTACK_BASE_URL: &str = "https://uptime.betterstack.com";

pub const DEFAULT_PAGE_SIZE: u32 = 50;

const OWNER_TYPE_MONITOR: &str = "Monitor";

const MONITOR_PORT: u16 = 443;

#[derive(Debug, Clone)]
pub struct BetterStackSettings {
    pub api_token: String,
    pub page_size: u32,
    pub base_url: String,
}

impl BetterStackSettings {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            page_size: DEFAULT_PAGE_SIZE,
            base_url: BETTERSTACK_BASE_URL.to_string(),
        }
    }
}

pub struct BetterStackProvider {
    client: ApiClient,
    page_size: u32,
}

impl BetterStackProvider {
    pub fn new(settings: BetterStackSettings) -> Result<Self> {
        let page_size = if settings.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            settings.page_size
        };
        Ok(Self {
            client: ApiClient::new(&settings.base_url, &settings.api_token, None)?,
            page_size,
        })
    }

    async fn create_check(&self, check: &CheckSpec) -> Result<()> {
        info!("Creating Better Stack monitor for check '{}'", check.id);
        let request = self
            .client
            .request(Method::POST, &self.client.url("/api/v2/monitors"))
            .json(&MonitorRequest::from_check(check));
        let created: MonitorCreated = self
            .client
            .send_json(request, &[StatusCode::CREATED])
            .await?;
        let monitor_id = parse_id(&created.data.id)?;

        self.upsert_metadata(check, monitor_id).await
    }

    async fn update_check(&self, monitor_id: RemoteObjectId, check: &CheckSpec) -> Result<()> {
        info!(
            "Updating Better Stack monitor {} for check '{}'",
            monitor_id, check.id
        );
        let url = self.client.url(&format!("/api/v2/monitors/{}", monitor_id));
        let existing: MonitorResponse = self
            .client
            .send_json(self.client.request(Method::GET, &url), &[StatusCode::OK])
            .await?;

        // PATCH appends headers, so every existing one is destroyed explicitly
        let mut update = MonitorRequest::from_check(check);
        update.request_headers.extend(
            existing
                .data
                .attributes
                .request_headers
                .into_iter()
                .map(|header| MonitorRequestHeader::destroy(header.id)),
        );

        let request = self.client.request(Method::PATCH, &url).json(&update);
        self.client.send(request, &[StatusCode::OK]).await?;

        self.upsert_metadata(check, monitor_id).await
    }

    /// Store the correlation key and tags on the monitor
    async fn upsert_metadata(&self, check: &CheckSpec, monitor_id: RemoteObjectId) -> Result<()> {
        let body = MetadataRequest::new(&check.id, monitor_id, &check.tags);
        let request = self
            .client
            .request(Method::POST, &self.client.url("/api/v3/metadata"))
            .json(&body);
        self.client
            .send(request, &[StatusCode::OK, StatusCode::CREATED])
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PagedListing for BetterStackProvider {
    /// Absolute URL of the next page
    type Cursor = String;

    async fn fetch_page(&self, cursor: Option<&String>) -> Result<Page<String>> {
        let request = match cursor {
            Some(next) => self.client.request(Method::GET, next),
            None => self
                .client
                .request(Method::GET, &self.client.url("/api/v3/metadata"))
                .query(&[
                    ("owner_type", OWNER_TYPE_MONITOR.to_string()),
                    ("per_page", self.page_size.to_string()),
                ]),
        };
        let listing: MetadataList = self.client.send_json(request, &[StatusCode::OK]).await?;

        let mut entries = Vec::with_capacity(listing.data.len());
        for record in listing.data {
            let Some(attributes) = record.attributes else {
                continue;
            };
            entries.push(ListedCheck {
                id: parse_id(&attributes.owner_id)?,
                keys: vec![attributes.key],
            });
        }

        let next = listing
            .pagination
            .and_then(|p| p.next)
            .filter(|next| !next.is_empty());
        Ok(Page { entries, next })
    }
}

#[async_trait]
impl UptimeProvider for BetterStackProvider {
    fn name(&self) -> &'static str {
        "betterstack"
    }

    #[instrument(skip(self, check), fields(check_id = %check.id))]
    async fn create_or_update_check(&self, check: &CheckSpec) -> Result<()> {
        match find_check(self, &check.id).await? {
            Some(monitor_id) => self.update_check(monitor_id, check).await,
            None => self.create_check(check).await,
        }
    }

    #[instrument(skip(self, check), fields(check_id = %check.id))]
    async fn delete_check(&self, check: &CheckSpec) -> Result<()> {
        let Some(monitor_id) = find_check(self, &check.id).await? else {
            info!("Better Stack monitor for check '{}' is already deleted", check.id);
            return Ok(());
        };

        info!(
            "Deleting Better Stack monitor {} for check '{}'",
            monitor_id, check.id
        );
        // empty values delete the metadata record
        let body = MetadataRequest::new(&check.id, monitor_id, &[]);
        let request = self
            .client
            .request(Method::POST, &self.client.url("/api/v3/metadata"))
            .json(&body);
        self.client
            .send(request, &[StatusCode::OK, StatusCode::NO_CONTENT])
            .await?;

        let request = self.client.request(
            Method::DELETE,
            &self.client.url(&format!("/api/v2/monitors/{}", monitor_id)),
        );
        self.client.send(request, &[StatusCode::NO_CONTENT]).await?;
        Ok(())
    }
}

fn parse_id(raw: &str) -> Result<RemoteObjectId> {
    raw.parse::<i64>()
        .map(RemoteObjectId)
        .map_err(|_| Error::DecodeError(format!("'{}' is not a valid monitor id", raw)))
}

#[derive(Debug, Serialize)]
struct MonitorRequest {
    monitor_type: &'static str,
    url: String,
    pronounceable_name: String,
    port: u16,
    email: bool,
    sms: bool,
    call: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    required_keyword: Option<String>,
    check_frequency: u32,
    request_headers: Vec<MonitorRequestHeader>,
}

impl MonitorRequest {
    fn from_check(check: &CheckSpec) -> Self {
        let (monitor_type, required_keyword) = if !check.string_contains.is_empty() {
            ("keyword", Some(check.string_contains.clone()))
        } else if !check.string_not_contains.is_empty() {
            ("keyword_absence", Some(check.string_not_contains.clone()))
        } else {
            ("status", None)
        };
        Self {
            monitor_type,
            url: check.url.clone(),
            pronounceable_name: check.name.clone(),
            port: MONITOR_PORT,
            email: false,
            sms: false,
            call: false,
            required_keyword,
            check_frequency: quantize(i64::from(check.interval_minutes), BETTERSTACK_INTERVALS_SECS),
            request_headers: check
                .request_headers
                .iter()
                .map(|(name, value)| MonitorRequestHeader {
                    id: None,
                    name: name.clone(),
                    value: value.clone(),
                    destroy: false,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct MonitorRequestHeader {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    name: String,
    value: String,
    #[serde(rename = "_destroy")]
    destroy: bool,
}

impl MonitorRequestHeader {
    fn destroy(id: Value) -> Self {
        Self {
            id: Some(id),
            name: String::new(),
            value: String::new(),
            destroy: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MonitorCreated {
    data: ResourceId,
}

#[derive(Debug, Deserialize)]
struct ResourceId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MonitorResponse {
    data: MonitorData,
}

#[derive(Debug, Deserialize)]
struct MonitorData {
    attributes: MonitorAttributes,
}

#[derive(Debug, Deserialize)]
struct MonitorAttributes {
    #[serde(default)]
    request_headers: Vec<ExistingHeader>,
}

#[derive(Debug, Deserialize)]
struct ExistingHeader {
    id: Value,
}

#[derive(Debug, Serialize)]
struct MetadataRequest<'a> {
    key: &'a str,
    values: Vec<MetadataValue<'a>>,
    owner_id: String,
    owner_type: &'static str,
}

impl<'a> MetadataRequest<'a> {
    fn new(key: &'a str, owner: RemoteObjectId, values: &'a [String]) -> Self {
        Self {
            key,
            values: values.iter().map(|value| MetadataValue { value }).collect(),
            owner_id: owner.to_string(),
            owner_type: OWNER_TYPE_MONITOR,
        }
    }
}

#[derive(Debug, Serialize)]
struct MetadataValue<'a> {
    value: &'a str,
}

#[derive(Debug, Deserialize)]
struct MetadataList {
    #[serde(default)]
    data: Vec<MetadataRecord>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct MetadataRecord {
    #[serde(default)]
    attributes: Option<MetadataAttributes>,
}

#[derive(Debug, Deserialize)]
struct MetadataAttributes {
    key: String,
    owner_id: String,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    next: Option<String>,
}
