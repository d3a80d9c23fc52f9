use feed_rs::parser;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::FeedParser;
use crate::storage::ParsedArticle;

/// Feed content could not be parsed as RSS, Atom or JSON Feed.
#[derive(Debug, Error)]
#[error("Parse error: {0}")]
pub struct ParseError(String);

impl ParseError {
    /// For [`FeedParser`] implementations that do not go through `feed-rs`.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<parser::ParseFeedError> for ParseError {
    fn from(err: parser::ParseFeedError) -> Self {
        Self(err.to_string())
    }
}

/// [`FeedParser`] backed by the `feed-rs` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedRsParser;

impl FeedParser for FeedRsParser {
    fn parse(&self, content: &[u8]) -> Result<Vec<ParsedArticle>, ParseError> {
        parse_feed(content)
    }
}

pub fn parse_feed(bytes: &[u8]) -> Result<Vec<ParsedArticle>, ParseError> {
    let feed = parser::parse(bytes)?;

    let articles: Vec<ParsedArticle> = feed
        .entries
        .into_iter()
        .map(|entry| {
            let url = entry.links.first().map(|l| l.href.clone());
            let published = entry
                .published
                .or(entry.updated)
                .map(|dt| dt.timestamp_millis());
            let content = entry
                .content
                .and_then(|c| c.body)
                .or_else(|| entry.summary.map(|s| s.content));
            let author = entry
                .authors
                .into_iter()
                .map(|p| p.name)
                .find(|name| !name.trim().is_empty());
            let title = entry
                .title
                .map(|t| t.content)
                .unwrap_or_else(|| "Untitled".to_string());

            let existing_id = if entry.id.is_empty() {
                None
            } else {
                Some(entry.id.as_str())
            };
            let guid = generate_guid(existing_id, url.as_deref(), &title, published);

            ParsedArticle {
                guid,
                title,
                url,
                author,
                content,
                published,
            }
        })
        .collect();

    Ok(articles)
}

fn generate_guid(
    existing: Option<&str>,
    url: Option<&str>,
    title: &str,
    published: Option<i64>,
) -> String {
    if let Some(guid) = existing {
        let trimmed = guid.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let input = format!(
        "{}|{}|{}",
        url.unwrap_or(""),
        title,
        published.map(|p| p.to_string()).unwrap_or_default()
    );
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Example</title>
    <item>
        <guid>item-1</guid>
        <title>First</title>
        <link>https://example.com/1</link>
        <author>jane@example.com (Jane)</author>
        <description>Hello</description>
        <pubDate>Tue, 10 Jun 2003 04:00:00 GMT</pubDate>
    </item>
    <item>
        <link>https://example.com/2</link>
    </item>
</channel></rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
    <title>Atom Example</title>
    <id>urn:uuid:feed</id>
    <updated>2003-12-13T18:30:02Z</updated>
    <entry>
        <title>Atom Entry</title>
        <link href="https://example.org/entry"/>
        <id>urn:uuid:entry-1</id>
        <updated>2003-12-13T18:30:02Z</updated>
        <author><name>John</name></author>
        <content type="text">Body text</content>
    </entry>
</feed>"#;

    #[test]
    fn test_parse_rss_items() {
        let articles = parse_feed(RSS.as_bytes()).unwrap();
        assert_eq!(articles.len(), 2);

        let first = &articles[0];
        assert_eq!(first.guid, "item-1");
        assert_eq!(first.title, "First");
        assert_eq!(first.url.as_deref(), Some("https://example.com/1"));
        assert_eq!(first.content.as_deref(), Some("Hello"));
        assert_eq!(first.published, Some(1_055_217_600_000));
    }

    #[test]
    fn test_missing_title_defaults_to_untitled() {
        let articles = parse_feed(RSS.as_bytes()).unwrap();
        assert_eq!(articles[1].title, "Untitled");
        assert_eq!(articles[1].dedupe_key(), "https://example.com/2");
    }

    #[test]
    fn test_parse_atom_entry() {
        let articles = parse_feed(ATOM.as_bytes()).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].author.as_deref(), Some("John"));
        assert_eq!(articles[0].content.as_deref(), Some("Body text"));
        assert_eq!(articles[0].url.as_deref(), Some("https://example.org/entry"));
    }

    #[test]
    fn test_reparse_yields_same_keys() {
        let first: Vec<_> = parse_feed(RSS.as_bytes())
            .unwrap()
            .into_iter()
            .map(|a| a.guid)
            .collect();
        let second: Vec<_> = parse_feed(RSS.as_bytes())
            .unwrap()
            .into_iter()
            .map(|a| a.guid)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_malformed_content_is_error() {
        let err = FeedRsParser.parse(b"<not valid xml").unwrap_err();
        assert!(err.to_string().starts_with("Parse error"));
    }

    #[test]
    fn test_generate_guid_hashes_when_missing() {
        let guid = generate_guid(None, Some("https://example.com/x"), "X", Some(1));
        assert_eq!(guid.len(), 64);
        assert_eq!(guid, generate_guid(Some("  "), Some("https://example.com/x"), "X", Some(1)));
    }
}
