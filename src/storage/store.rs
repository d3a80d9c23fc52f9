use async_trait::async_trait;

use super::schema::Database;
use super::types::{DatabaseError, Feed, ParsedArticle};

/// Persistence contract the scheduler depends on.
///
/// Implementations must serialize conflicting writes to the same feed row
/// themselves; the scheduler only guarantees that one worker at a time
/// writes a given feed.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// All subscribed feeds.
    async fn get_feeds(&self) -> Result<Vec<Feed>, DatabaseError>;

    async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>, DatabaseError>;

    async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>, DatabaseError>;

    /// Persist fetch metadata and adaptive statistics of `feed`.
    async fn update_feed_fetch_state(&self, feed: &Feed) -> Result<(), DatabaseError>;

    /// Insert previously unseen articles, returning how many were new.
    async fn add_articles(
        &self,
        feed_id: i64,
        articles: &[ParsedArticle],
    ) -> Result<usize, DatabaseError>;

    async fn delete_feed(&self, feed_id: i64) -> Result<bool, DatabaseError>;
}

#[async_trait]
impl FeedStore for Database {
    async fn get_feeds(&self) -> Result<Vec<Feed>, DatabaseError> {
        Database::get_feeds(self).await
    }

    async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>, DatabaseError> {
        Database::get_feed(self, feed_id).await
    }

    async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>, DatabaseError> {
        Database::get_feed_by_url(self, url).await
    }

    async fn update_feed_fetch_state(&self, feed: &Feed) -> Result<(), DatabaseError> {
        Database::update_feed_fetch_state(self, feed).await
    }

    async fn add_articles(
        &self,
        feed_id: i64,
        articles: &[ParsedArticle],
    ) -> Result<usize, DatabaseError> {
        Database::add_articles(self, feed_id, articles).await
    }

    async fn delete_feed(&self, feed_id: i64) -> Result<bool, DatabaseError> {
        Database::delete_feed(self, feed_id).await
    }
}
