pub mod arxiv;
pub mod feeds;
pub mod hackernews;
pub mod newsapi;

pub use arxiv::ArxivSource;
pub use feeds::{FeedSource, FeedSpec};
pub use hackernews::HackerNewsSource;
pub use newsapi::NewsApiSource;
