//! Discoverer: expands the known `sources` set, either by probing `web://`
//! hosts for a feed (feed discovery) or by asking the chat completion
//! service for candidate URLs against a query (web discovery).

pub mod feed_discovery;
pub mod web_discovery;

pub use feed_discovery::{discover_feeds, FeedDiscoveryResult};
pub use web_discovery::{discover_web, WebDiscoveryResult};
