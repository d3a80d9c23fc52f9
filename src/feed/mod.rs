//! Feed retrieval and parsing collaborators.
//!
//! The scheduler talks to the network and to feed XML only through two narrow
//! seams:
//!
//! - [`FeedFetcher`] - conditional GET of a feed URL
//! - [`FeedParser`] - raw feed bytes into [`ParsedArticle`] records
//!
//! [`HttpFetcher`] (`reqwest`) and [`FeedRsParser`] (`feed-rs`) are the
//! production implementations; tests substitute their own.

mod fetcher;
mod parser;

use async_trait::async_trait;

use crate::storage::ParsedArticle;

pub use fetcher::{FetchError, FetchOutcome, HttpFetcher, Validators};
pub use parser::{parse_feed, FeedRsParser, ParseError};

/// Performs a conditional GET for a feed.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str, validators: &Validators) -> Result<FetchOutcome, FetchError>;
}

/// Converts raw feed content into article records.
pub trait FeedParser: Send + Sync {
    fn parse(&self, content: &[u8]) -> Result<Vec<ParsedArticle>, ParseError>;
}
