//! In-process [`FeedStore`] backend.
//!
//! Keeps feeds and article keys in maps behind a single `RwLock`. Used by the
//! test suites and by embedders that do not want SQLite.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::store::FeedStore;
use super::types::{DatabaseError, Feed, ParsedArticle};

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    feeds: BTreeMap<i64, Feed>,
    article_keys: HashMap<i64, HashSet<String>>,
}

/// Thread-safe in-memory feed store. Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a URL, returning the feed id (existing id on duplicates).
    pub async fn insert_feed(&self, url: &str, title: &str) -> i64 {
        let mut state = self.state.write().await;
        if let Some(feed) = state.feeds.values_mut().find(|f| f.url == url) {
            feed.title = Arc::from(title);
            return feed.id;
        }
        state.next_id += 1;
        let id = state.next_id;
        state.feeds.insert(id, Feed::new(id, url, title));
        id
    }

    /// Replace a feed row wholesale, e.g. to seed adaptive state in tests.
    pub async fn put_feed(&self, feed: Feed) {
        let mut state = self.state.write().await;
        state.next_id = state.next_id.max(feed.id);
        state.feeds.insert(feed.id, feed);
    }

    /// Number of stored articles for a feed.
    pub async fn article_count(&self, feed_id: i64) -> usize {
        self.state
            .read()
            .await
            .article_keys
            .get(&feed_id)
            .map_or(0, HashSet::len)
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn get_feeds(&self) -> Result<Vec<Feed>, DatabaseError> {
        Ok(self.state.read().await.feeds.values().cloned().collect())
    }

    async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>, DatabaseError> {
        Ok(self.state.read().await.feeds.get(&feed_id).cloned())
    }

    async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>, DatabaseError> {
        Ok(self
            .state
            .read()
            .await
            .feeds
            .values()
            .find(|f| f.url == url)
            .cloned())
    }

    async fn update_feed_fetch_state(&self, feed: &Feed) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        let stored = state
            .feeds
            .get_mut(&feed.id)
            .ok_or(DatabaseError::NotFound(feed.id))?;
        stored.last_fetch = feed.last_fetch;
        stored.last_checked = feed.last_checked;
        stored.last_had_new_content = feed.last_had_new_content;
        stored.average_update_interval_ms = feed.average_update_interval_ms.max(0);
        stored.etag = feed.etag.clone();
        stored.last_modified = feed.last_modified.clone();
        stored.last_error = feed.last_error.clone();
        Ok(())
    }

    async fn add_articles(
        &self,
        feed_id: i64,
        articles: &[ParsedArticle],
    ) -> Result<usize, DatabaseError> {
        let mut state = self.state.write().await;
        if !state.feeds.contains_key(&feed_id) {
            return Err(DatabaseError::NotFound(feed_id));
        }
        let keys = state.article_keys.entry(feed_id).or_default();
        let inserted = articles
            .iter()
            .filter(|a| keys.insert(a.dedupe_key().to_string()))
            .count();
        Ok(inserted)
    }

    async fn delete_feed(&self, feed_id: i64) -> Result<bool, DatabaseError> {
        let mut state = self.state.write().await;
        state.article_keys.remove(&feed_id);
        Ok(state.feeds.remove(&feed_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(url: &str) -> ParsedArticle {
        ParsedArticle {
            guid: url.to_string(),
            title: "t".to_string(),
            url: Some(url.to_string()),
            author: None,
            content: None,
            published: None,
        }
    }

    #[tokio::test]
    async fn test_insert_feed_is_idempotent_on_url() {
        let store = MemoryStore::new();
        let a = store.insert_feed("https://example.com/rss", "A").await;
        let b = store.insert_feed("https://example.com/rss", "B").await;
        assert_eq!(a, b);
        assert_eq!(store.get_feeds().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_articles_counts_only_new() {
        let store = MemoryStore::new();
        let id = store.insert_feed("https://example.com/rss", "A").await;

        let batch = [article("https://example.com/1"), article("https://example.com/2")];
        assert_eq!(store.add_articles(id, &batch).await.unwrap(), 2);
        assert_eq!(store.add_articles(id, &batch).await.unwrap(), 0);
        assert_eq!(store.article_count(id).await, 2);
    }

    #[tokio::test]
    async fn test_unknown_feed_is_not_found() {
        let store = MemoryStore::new();
        let err = store.add_articles(9, &[]).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound(9)));
    }

    #[tokio::test]
    async fn test_delete_feed() {
        let store = MemoryStore::new();
        let id = store.insert_feed("https://example.com/rss", "A").await;
        assert!(store.delete_feed(id).await.unwrap());
        assert!(store.get_feed(id).await.unwrap().is_none());
        assert!(!store.delete_feed(id).await.unwrap());
    }
}
