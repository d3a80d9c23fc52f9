use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Persistence errors surfaced by every [`FeedStore`](super::FeedStore) backend.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// The referenced feed does not exist
    #[error("Feed {0} not found")]
    NotFound(i64),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

// ============================================================================
// Helper Types
// ============================================================================

/// Row type for feed queries
pub(crate) type FeedRow = (
    i64,
    String,
    String,
    Option<i64>,
    Option<i64>,
    Option<i64>,
    i64,
    Option<String>,
    Option<String>,
    Option<String>,
);

/// Represents a parsed article from a feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedArticle {
    pub guid: String,
    pub title: String,
    pub url: Option<String>,
    pub author: Option<String>,
    pub content: Option<String>,
    pub published: Option<i64>,
}

impl ParsedArticle {
    /// Key used to decide whether an article was already stored for a feed.
    ///
    /// The article URL when present, otherwise the guid.
    pub fn dedupe_key(&self) -> &str {
        match self.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url,
            _ => &self.guid,
        }
    }
}

/// Internal row type for Article queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArticleDbRow {
    pub id: i64,
    pub feed_id: i64,
    pub guid: String,
    pub title: String,
    pub url: Option<String>,
    pub author: Option<String>,
    pub content: Option<String>,
    pub published: Option<i64>,
    pub fetched_at: i64,
}

impl ArticleDbRow {
    pub(crate) fn into_article(self) -> Article {
        Article {
            id: self.id,
            feed_id: self.feed_id,
            guid: self.guid,
            title: Arc::from(self.title),
            url: self.url.map(Arc::from),
            author: self.author,
            content: self.content.map(Arc::from),
            published: self.published,
            fetched_at: self.fetched_at,
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// Feed row as seen by the scheduler.
///
/// All timestamps are milliseconds since the Unix epoch. `last_fetch` is the
/// last *attempted* fetch and is always at least `last_had_new_content`.
/// `average_update_interval_ms == 0` means no evidence has accrued yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub id: i64,
    pub title: Arc<str>,
    pub url: String,
    pub last_fetch: Option<i64>,
    pub last_checked: Option<i64>,
    pub last_had_new_content: Option<i64>,
    pub average_update_interval_ms: i64,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// Error from the most recent fetch attempt, cleared on success
    pub last_error: Option<String>,
}

impl Feed {
    /// A feed that has never been fetched.
    pub fn new(id: i64, url: impl Into<String>, title: &str) -> Self {
        Self {
            id,
            title: Arc::from(title),
            url: url.into(),
            last_fetch: None,
            last_checked: None,
            last_had_new_content: None,
            average_update_interval_ms: 0,
            etag: None,
            last_modified: None,
            last_error: None,
        }
    }

    pub fn average_update_interval(&self) -> Duration {
        Duration::from_millis(self.average_update_interval_ms.max(0) as u64)
    }

    pub(crate) fn from_row(row: FeedRow) -> Self {
        let (
            id,
            title,
            url,
            last_fetch,
            last_checked,
            last_had_new_content,
            average_update_interval_ms,
            etag,
            last_modified,
            last_error,
        ) = row;
        Self {
            id,
            title: Arc::from(title),
            url,
            last_fetch,
            last_checked,
            last_had_new_content,
            average_update_interval_ms,
            etag,
            last_modified,
            last_error,
        }
    }
}

/// Article data from storage
///
/// Note: `title`, `url` and `content` use `Arc<str>` for cheap cloning.
#[derive(Debug, Clone)]
pub struct Article {
    pub id: i64,
    pub feed_id: i64,
    pub guid: String,
    pub title: Arc<str>,
    pub url: Option<Arc<str>>,
    pub author: Option<String>,
    pub content: Option<Arc<str>>,
    pub published: Option<i64>,
    pub fetched_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(guid: &str, url: Option<&str>) -> ParsedArticle {
        ParsedArticle {
            guid: guid.to_string(),
            title: "t".to_string(),
            url: url.map(str::to_string),
            author: None,
            content: None,
            published: None,
        }
    }

    #[test]
    fn test_dedupe_key_prefers_url() {
        let a = article("guid-1", Some("https://example.com/a"));
        assert_eq!(a.dedupe_key(), "https://example.com/a");
    }

    #[test]
    fn test_dedupe_key_falls_back_to_guid() {
        assert_eq!(article("guid-1", None).dedupe_key(), "guid-1");
        assert_eq!(article("guid-2", Some("   ")).dedupe_key(), "guid-2");
    }

    #[test]
    fn test_new_feed_has_no_evidence() {
        let feed = Feed::new(7, "https://example.com/rss", "Example");
        assert_eq!(feed.average_update_interval(), Duration::ZERO);
        assert!(feed.last_checked.is_none());
        assert!(feed.last_fetch.is_none());
    }
}
