//! # News Sentry
//!
//! A news discovery and deduplication engine. Each scan cycle harvests
//! candidate articles from news sites and a news aggregator, resolves their
//! title and publication date, keeps the recent ones that mention a
//! configured keyword, and drops anything already delivered or near-identical
//! to another story from the same outlet.
//!
//! ## Architecture
//!
//! 1. **Discovery**: find each site's sections ([`scrapers::sections`]) and
//!    harvest article links ([`scrapers::links`]); query the aggregator per
//!    keyword ([`scrapers::aggregator`]).
//! 2. **Resolution**: read title, text and a normalized publication date
//!    ([`scrapers::article`], [`dates`]).
//! 3. **Filtering**: recency window and keyword match ([`filters`]).
//! 4. **Dedup**: URL and same-domain title similarity against History and the
//!    current cycle ([`dedup`], [`history`]).
//! 5. **Delivery**: History is written only for confirmed deliveries
//!    ([`notify`]).
//!
//! [`engine::Engine`] drives steps 1 to 4; the caller owns History and does
//! step 5.

pub mod config;
pub mod dates;
pub mod dedup;
pub mod engine;
pub mod fetch;
pub mod filters;
pub mod history;
pub mod models;
pub mod notify;
pub mod scrapers;
pub mod store;
pub mod utils;
