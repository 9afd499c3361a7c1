//! Uptime check specification built from resource annotations
//!
//! A [`CheckSpec`] is constructed fresh on every reconcile from the current
//! annotation snapshot of a watched resource and handed to the providers by
//! reference. It is never mutated after construction.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{Error, Result};

/// Prefix shared by every annotation this operator reads
pub const ANNOTATION_BASE: &str = "uptime.pdok.nl/";

pub const ANNOTATION_ID: &str = "uptime.pdok.nl/id";
pub const ANNOTATION_NAME: &str = "uptime.pdok.nl/name";
pub const ANNOTATION_URL: &str = "uptime.pdok.nl/url";
pub const ANNOTATION_TAGS: &str = "uptime.pdok.nl/tags";
pub const ANNOTATION_INTERVAL: &str = "uptime.pdok.nl/interval-in-minutes";
pub const ANNOTATION_REQUEST_HEADERS: &str = "uptime.pdok.nl/request-headers";
pub const ANNOTATION_STRING_CONTAINS: &str = "uptime.pdok.nl/response-check-for-string-contains";
pub const ANNOTATION_STRING_NOT_CONTAINS: &str =
    "uptime.pdok.nl/response-check-for-string-not-contains";
pub const ANNOTATION_IGNORE: &str = "uptime.pdok.nl/ignore";

/// Name of this operator, used as user agent and chat username
pub const OPERATOR_NAME: &str = "uptime-operator";

/// Tag present on every check this operator manages
pub const TAG_MANAGED_BY: &str = "managed-by-uptime-operator";

/// Interval used when no interval annotation is present
pub const DEFAULT_INTERVAL_MINUTES: u32 = 1;

/// Validated, canonical description of one uptime check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckSpec {
    /// Stable correlation key chosen by the resource owner
    pub id: String,
    pub name: String,
    pub url: String,
    /// Unique tags, always including [`TAG_MANAGED_BY`] exactly once
    pub tags: Vec<String>,
    pub interval_minutes: u32,
    pub request_headers: BTreeMap<String, String>,
    pub string_contains: String,
    pub string_not_contains: String,
}

impl CheckSpec {
    /// Parse the annotation set of `resource_name` into a check specification
    pub fn from_annotations(
        resource_name: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let id = required(resource_name, annotations, ANNOTATION_ID)?;
        let name = required(resource_name, annotations, ANNOTATION_NAME)?;
        let url = required(resource_name, annotations, ANNOTATION_URL)?;

        let interval_minutes = match annotations.get(ANNOTATION_INTERVAL) {
            Some(raw) => raw.trim().parse::<u32>().map_err(|e| {
                Error::validation(
                    resource_name,
                    format!("'{}' is not a valid {}: {}", raw, ANNOTATION_INTERVAL, e),
                )
            })?,
            None => DEFAULT_INTERVAL_MINUTES,
        };

        Ok(Self {
            id,
            name,
            url,
            tags: parse_tags(annotations.get(ANNOTATION_TAGS).map(String::as_str)),
            interval_minutes,
            request_headers: parse_request_headers(
                annotations
                    .get(ANNOTATION_REQUEST_HEADERS)
                    .map(String::as_str)
                    .unwrap_or_default(),
            ),
            string_contains: optional(annotations, ANNOTATION_STRING_CONTAINS),
            string_not_contains: optional(annotations, ANNOTATION_STRING_NOT_CONTAINS),
        })
    }

    /// Whether this check carries the managed-by marker
    pub fn is_managed(&self) -> bool {
        self.tags.iter().any(|t| t == TAG_MANAGED_BY)
    }
}

/// True when the resource opted out of uptime monitoring
pub fn is_ignored(annotations: &BTreeMap<String, String>) -> bool {
    annotations
        .get(ANNOTATION_IGNORE)
        .map(|v| !v.trim().eq_ignore_ascii_case("false"))
        .unwrap_or(false)
}

/// True when at least one uptime annotation is present
pub fn has_uptime_annotations(annotations: &BTreeMap<String, String>) -> bool {
    annotations.keys().any(|k| k.starts_with(ANNOTATION_BASE))
}

fn required(
    resource_name: &str,
    annotations: &BTreeMap<String, String>,
    key: &str,
) -> Result<String> {
    match annotations.get(key).map(|v| v.trim()) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(Error::validation(
            resource_name,
            format!("missing required annotation '{}'", key),
        )),
    }
}

fn optional(annotations: &BTreeMap<String, String>, key: &str) -> String {
    annotations
        .get(key)
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

/// Comma separated tags, trimmed and deduplicated, plus the managed-by marker
fn parse_tags(raw: Option<&str>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.unwrap_or_default().split(',').map(str::trim) {
        if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    if !tags.iter().any(|t| t == TAG_MANAGED_BY) {
        tags.push(TAG_MANAGED_BY.to_string());
    }
    tags
}

/// Comma separated `key:value` pairs; pairs without exactly one colon are skipped
fn parse_request_headers(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let mut parts = pair.split(':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(value), None) if !key.trim().is_empty() => {
                    Some((key.trim().to_string(), value.trim().to_string()))
                }
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn complete() -> BTreeMap<String, String> {
        annotations(&[
            (ANNOTATION_ID, "1234567890"),
            (ANNOTATION_NAME, "Test Check"),
            (ANNOTATION_URL, "https://pdok.example"),
            (ANNOTATION_TAGS, "tag1, tag2"),
            (ANNOTATION_REQUEST_HEADERS, "key1:value1, key2:value2"),
            (ANNOTATION_STRING_CONTAINS, "test string"),
            (ANNOTATION_STRING_NOT_CONTAINS, ""),
        ])
    }

    #[test]
    fn test_all_annotations_present() {
        let check = CheckSpec::from_annotations("test-ingress", &complete()).unwrap();
        assert_eq!(check.id, "1234567890");
        assert_eq!(check.name, "Test Check");
        assert_eq!(check.url, "https://pdok.example");
        assert_eq!(check.tags, vec!["tag1", "tag2", TAG_MANAGED_BY]);
        assert_eq!(check.interval_minutes, DEFAULT_INTERVAL_MINUTES);
        assert_eq!(check.request_headers.get("key1").unwrap(), "value1");
        assert_eq!(check.request_headers.get("key2").unwrap(), "value2");
        assert_eq!(check.string_contains, "test string");
        assert!(check.string_not_contains.is_empty());
        assert!(check.is_managed());
    }

    #[test]
    fn test_each_required_annotation_is_enforced() {
        for key in [ANNOTATION_ID, ANNOTATION_NAME, ANNOTATION_URL] {
            let mut ann = complete();
            ann.remove(key);
            let err = CheckSpec::from_annotations("test-ingress", &ann).unwrap_err();
            match err {
                Error::ValidationError { resource, message } => {
                    assert_eq!(resource, "test-ingress");
                    assert!(message.contains(key), "{} not named in '{}'", key, message);
                }
                other => panic!("expected validation error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_optional_annotations_may_be_absent() {
        let ann = annotations(&[
            (ANNOTATION_ID, "y45735y375"),
            (ANNOTATION_NAME, "Test uptime check"),
            (ANNOTATION_URL, "https://test.example"),
        ]);
        let check = CheckSpec::from_annotations("test-ingress", &ann).unwrap();
        assert_eq!(check.tags, vec![TAG_MANAGED_BY]);
        assert!(check.request_headers.is_empty());
        assert!(check.string_contains.is_empty());
    }

    #[test]
    fn test_managed_by_tag_appears_once() {
        let mut ann = complete();
        ann.insert(
            ANNOTATION_TAGS.to_string(),
            format!("{0}, tag1, {0}, tag1", TAG_MANAGED_BY),
        );
        let check = CheckSpec::from_annotations("test-ingress", &ann).unwrap();
        assert_eq!(check.tags, vec![TAG_MANAGED_BY, "tag1"]);
    }

    #[test]
    fn test_interval_annotation() {
        let mut ann = complete();
        ann.insert(ANNOTATION_INTERVAL.to_string(), " 5 ".to_string());
        let check = CheckSpec::from_annotations("test-ingress", &ann).unwrap();
        assert_eq!(check.interval_minutes, 5);

        ann.insert(ANNOTATION_INTERVAL.to_string(), "five".to_string());
        let err = CheckSpec::from_annotations("test-ingress", &ann).unwrap_err();
        assert!(matches!(err, Error::ValidationError { .. }));

        ann.insert(ANNOTATION_INTERVAL.to_string(), "-1".to_string());
        assert!(CheckSpec::from_annotations("test-ingress", &ann).is_err());
    }

    #[test]
    fn test_malformed_header_pairs_are_skipped() {
        let headers = parse_request_headers("good:yes, nocolon, a:b:c, :empty, other : ok ");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("good").unwrap(), "yes");
        assert_eq!(headers.get("other").unwrap(), "ok");
    }

    #[test]
    fn test_ignore_marker() {
        assert!(!is_ignored(&complete()));
        assert!(is_ignored(&annotations(&[(ANNOTATION_IGNORE, "true")])));
        assert!(is_ignored(&annotations(&[(ANNOTATION_IGNORE, "")])));
        assert!(!is_ignored(&annotations(&[(ANNOTATION_IGNORE, "False")])));
    }

    #[test]
    fn test_has_uptime_annotations() {
        assert!(has_uptime_annotations(&complete()));
        assert!(!has_uptime_annotations(&annotations(&[(
            "kubernetes.io/ingress.class",
            "traefik"
        )])));
    }
}
