use super::schema::Database;
use super::types::{DatabaseError, Feed, FeedRow};

const FEED_COLUMNS: &str = "id, title, url, last_fetch, last_checked, last_had_new_content, \
                            average_update_interval_ms, etag, last_modified, last_error";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Subscribe to a feed URL, returning its id.
    ///
    /// Re-subscribing an existing URL updates the title and keeps the id and
    /// all fetch state.
    pub async fn insert_feed(&self, url: &str, title: &str) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO feeds (title, url) VALUES (?, ?)
            ON CONFLICT(url) DO UPDATE SET title = excluded.title
            RETURNING id
        "#,
        )
        .bind(title)
        .bind(url)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Get all feeds ordered by id
    pub async fn get_feeds(&self) -> Result<Vec<Feed>, DatabaseError> {
        let rows: Vec<FeedRow> =
            sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds ORDER BY id"))
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Feed::from_row).collect())
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>, DatabaseError> {
        let row: Option<FeedRow> =
            sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?"))
                .bind(feed_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Feed::from_row))
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>, DatabaseError> {
        let row: Option<FeedRow> =
            sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?"))
                .bind(url)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Feed::from_row))
    }

    /// Delete a feed and (via ON DELETE CASCADE) its articles.
    ///
    /// Returns `false` when no feed had that id.
    pub async fn delete_feed(&self, feed_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM feeds WHERE id = ?")
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Persist the fetch-state columns of a feed.
    ///
    /// Title and URL are owned by the subscription lifecycle and never
    /// written here.
    pub async fn update_feed_fetch_state(&self, feed: &Feed) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE feeds SET
                last_fetch = ?,
                last_checked = ?,
                last_had_new_content = ?,
                average_update_interval_ms = ?,
                etag = ?,
                last_modified = ?,
                last_error = ?
            WHERE id = ?
        "#,
        )
        .bind(feed.last_fetch)
        .bind(feed.last_checked)
        .bind(feed.last_had_new_content)
        .bind(feed.average_update_interval_ms.max(0))
        .bind(&feed.etag)
        .bind(&feed.last_modified)
        .bind(&feed.last_error)
        .bind(feed.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(feed.id));
        }
        Ok(())
    }
}
