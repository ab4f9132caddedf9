//! Paginated JSON analytics feed.
//!
//! `GET {endpoint}?since=<rfc3339>&limit=<n>&page_token=<t>` returning
//! `{"events": [...], "next_page_token": "..."}`; the provider follows tokens
//! until the feed stops returning one.

pub mod params;
pub mod provider;
pub mod response;

pub use provider::{HttpFeedConfig, HttpFeedProvider};
