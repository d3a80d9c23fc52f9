use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{Article, ArticleDbRow, DatabaseError, ParsedArticle};

impl Database {
    // ========================================================================
    // Article Operations
    // ========================================================================

    /// Insert the articles of a feed that are not stored yet.
    ///
    /// Articles are deduplicated per feed by [`ParsedArticle::dedupe_key`];
    /// existing rows are left untouched. Returns the number of newly
    /// inserted articles, so re-inserting identical content yields zero.
    pub async fn add_articles(
        &self,
        feed_id: i64,
        articles: &[ParsedArticle],
    ) -> Result<usize, DatabaseError> {
        if articles.is_empty() {
            return Ok(0);
        }

        let now = chrono::Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        const BATCH_SIZE: usize = 50;
        let mut total_inserted: usize = 0;

        for chunk in articles.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT OR IGNORE INTO articles \
                 (feed_id, dedupe_key, guid, title, url, author, content, published, fetched_at) ",
            );

            builder.push_values(chunk, |mut b, article| {
                b.push_bind(feed_id)
                    .push_bind(article.dedupe_key())
                    .push_bind(&article.guid)
                    .push_bind(&article.title)
                    .push_bind(&article.url)
                    .push_bind(&article.author)
                    .push_bind(&article.content)
                    .push_bind(article.published)
                    .push_bind(now);
            });

            let result = builder.build().execute(&mut *tx).await?;
            total_inserted += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(total_inserted)
    }

    /// Get all articles for a feed, newest first
    pub async fn get_articles_for_feed(&self, feed_id: i64) -> Result<Vec<Article>, DatabaseError> {
        let rows = sqlx::query_as::<_, ArticleDbRow>(
            r#"
            SELECT id, feed_id, guid, title, url, author, content, published, fetched_at
            FROM articles
            WHERE feed_id = ?
            ORDER BY published DESC, fetched_at DESC, id DESC
        "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ArticleDbRow::into_article).collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, ParsedArticle};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn test_article(guid: &str, title: &str) -> ParsedArticle {
        ParsedArticle {
            guid: guid.to_string(),
            title: title.to_string(),
            url: Some(format!("https://example.com/{}", guid)),
            author: Some("Author".to_string()),
            content: Some("Body".to_string()),
            published: Some(1_700_000_000_000),
        }
    }

    #[tokio::test]
    async fn test_add_articles_insert() {
        let db = test_db().await;
        let feed_id = db.insert_feed("https://example.com/rss", "Feed").await.unwrap();

        let inserted = db
            .add_articles(feed_id, &[test_article("a", "A"), test_article("b", "B")])
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        let stored = db.get_articles_for_feed(feed_id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].author.as_deref(), Some("Author"));
    }

    #[tokio::test]
    async fn test_add_articles_is_idempotent() {
        let db = test_db().await;
        let feed_id = db.insert_feed("https://example.com/rss", "Feed").await.unwrap();
        let batch = vec![test_article("a", "A"), test_article("b", "B")];

        assert_eq!(db.add_articles(feed_id, &batch).await.unwrap(), 2);
        assert_eq!(db.add_articles(feed_id, &batch).await.unwrap(), 0);
        assert_eq!(db.get_articles_for_feed(feed_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_add_articles_dedupes_by_url_not_guid() {
        let db = test_db().await;
        let feed_id = db.insert_feed("https://example.com/rss", "Feed").await.unwrap();

        let first = test_article("a", "A");
        let mut same_url = test_article("a-renamed", "A again");
        same_url.url = first.url.clone();

        assert_eq!(db.add_articles(feed_id, &[first]).await.unwrap(), 1);
        assert_eq!(db.add_articles(feed_id, &[same_url]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_add_articles_mixed_batch() {
        let db = test_db().await;
        let feed_id = db.insert_feed("https://example.com/rss", "Feed").await.unwrap();

        db.add_articles(feed_id, &[test_article("a", "A")]).await.unwrap();
        let inserted = db
            .add_articles(
                feed_id,
                &[test_article("a", "A"), test_article("c", "C"), test_article("d", "D")],
            )
            .await
            .unwrap();
        assert_eq!(inserted, 2);
    }

    #[tokio::test]
    async fn test_add_articles_empty_batch() {
        let db = test_db().await;
        let feed_id = db.insert_feed("https://example.com/rss", "Feed").await.unwrap();
        assert_eq!(db.add_articles(feed_id, &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_same_url_in_two_feeds_is_stored_twice() {
        let db = test_db().await;
        let a = db.insert_feed("https://a.example/rss", "A").await.unwrap();
        let b = db.insert_feed("https://b.example/rss", "B").await.unwrap();

        assert_eq!(db.add_articles(a, &[test_article("x", "X")]).await.unwrap(), 1);
        assert_eq!(db.add_articles(b, &[test_article("x", "X")]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_feed_cascades_articles() {
        let db = test_db().await;
        let feed_id = db.insert_feed("https://example.com/rss", "Feed").await.unwrap();
        db.add_articles(feed_id, &[test_article("a", "A")]).await.unwrap();

        db.delete_feed(feed_id).await.unwrap();
        assert!(db.get_articles_for_feed(feed_id).await.unwrap().is_empty());
    }
}
