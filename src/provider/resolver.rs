//! Correlation resolver
//!
//! Walks a provider's paginated listing looking for the remote object that
//! carries a given correlation key. Nothing is cached: every lookup starts at
//! the first page since remote state may change between reconciles.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::RemoteObjectId;
use crate::error::Result;

/// One remote object as seen in a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedCheck {
    pub id: RemoteObjectId,
    /// Correlation keys embedded in this object (tags or metadata keys)
    pub keys: Vec<String>,
}

/// A single page of a listing plus the cursor of the page after it
#[derive(Debug, Clone)]
pub struct Page<C> {
    pub entries: Vec<ListedCheck>,
    pub next: Option<C>,
}

impl<C> Page<C> {
    pub fn last(entries: Vec<ListedCheck>) -> Self {
        Self {
            entries,
            next: None,
        }
    }
}

/// A provider endpoint that lists managed checks page by page
#[async_trait]
pub trait PagedListing: Send + Sync {
    /// Opaque continuation token, e.g. an offset or a next-page URL
    type Cursor: Send + Sync;

    /// Fetch the page at `cursor`, or the first page when `None`
    async fn fetch_page(&self, cursor: Option<&Self::Cursor>) -> Result<Page<Self::Cursor>>;
}

/// Find the remote object tagged with `key`
///
/// Returns `Ok(None)` when no page contains the key. The first match wins;
/// other objects on the same page carrying the key are reported as duplicates.
pub async fn find_check<L>(listing: &L, key: &str) -> Result<Option<RemoteObjectId>>
where
    L: PagedListing + ?Sized,
{
    let mut cursor: Option<L::Cursor> = None;
    let mut pages = 0usize;
    loop {
        let page = listing.fetch_page(cursor.as_ref()).await?;
        pages += 1;

        let mut matches = page
            .entries
            .iter()
            .filter(|entry| entry.keys.iter().any(|k| k == key))
            .map(|entry| entry.id);
        if let Some(found) = matches.next() {
            let duplicates: Vec<RemoteObjectId> = matches.collect();
            if !duplicates.is_empty() {
                warn!(
                    "Correlation key '{}' is carried by several remote checks, using {} and ignoring {:?}",
                    key, found, duplicates
                );
            }
            debug!("Found check '{}' as {} after {} page(s)", key, found, pages);
            return Ok(Some(found));
        }

        match page.next {
            Some(next) => cursor = Some(next),
            None => {
                debug!("Check '{}' not found after {} page(s)", key, pages);
                return Ok(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Listing over fixed pages, counting every fetch
    struct FakeListing {
        pages: Vec<Vec<ListedCheck>>,
        fetches: AtomicUsize,
    }

    impl FakeListing {
        fn new(pages: Vec<Vec<(i64, &str)>>) -> Self {
            let pages = pages
                .into_iter()
                .map(|page| {
                    page.into_iter()
                        .map(|(id, key)| ListedCheck {
                            id: RemoteObjectId(id),
                            keys: vec!["managed-by-uptime-operator".to_string(), key.to_string()],
                        })
                        .collect()
                })
                .collect();
            Self {
                pages,
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PagedListing for FakeListing {
        type Cursor = usize;

        async fn fetch_page(&self, cursor: Option<&usize>) -> Result<Page<usize>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let index = cursor.copied().unwrap_or(0);
            let entries = self
                .pages
                .get(index)
                .cloned()
                .ok_or_else(|| Error::DecodeError(format!("no page {}", index)))?;
            let next = (index + 1 < self.pages.len()).then_some(index + 1);
            Ok(Page { entries, next })
        }
    }

    #[tokio::test]
    async fn test_key_on_second_page() {
        let listing = FakeListing::new(vec![
            vec![(1, "id:a"), (2, "id:b")],
            vec![(3, "id:c"), (4, "id:target")],
            vec![(5, "id:d")],
        ]);
        let found = find_check(&listing, "id:target").await.unwrap();
        assert_eq!(found, Some(RemoteObjectId(4)));
        assert_eq!(listing.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_absent_key_visits_every_page_once() {
        let listing = FakeListing::new(vec![vec![(1, "id:a")], vec![(2, "id:b")], vec![]]);
        let found = find_check(&listing, "id:missing").await.unwrap();
        assert_eq!(found, None);
        assert_eq!(listing.fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_first_match_wins_on_duplicates() {
        let listing = FakeListing::new(vec![vec![(7, "id:dup"), (8, "id:dup")]]);
        let found = find_check(&listing, "id:dup").await.unwrap();
        assert_eq!(found, Some(RemoteObjectId(7)));
    }

    #[tokio::test]
    async fn test_page_errors_propagate() {
        struct Broken;

        #[async_trait]
        impl PagedListing for Broken {
            type Cursor = ();

            async fn fetch_page(&self, _cursor: Option<&()>) -> Result<Page<()>> {
                Err(Error::TransportError {
                    status: 503,
                    expected: "200".to_string(),
                    body: String::new(),
                })
            }
        }

        let err = find_check(&Broken, "id:any").await.unwrap_err();
        assert!(matches!(err, Error::TransportError { status: 503, .. }));
    }
}
