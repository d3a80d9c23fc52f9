mod articles;
mod feeds;
mod memory;
mod schema;
mod store;
mod types;

pub use memory::MemoryStore;
pub use schema::Database;
pub use store::FeedStore;
pub use types::{Article, DatabaseError, Feed, ParsedArticle};
