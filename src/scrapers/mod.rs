//! Discovery and extraction: where candidate articles come from and how their
//! metadata is read.
//!
//! A site source goes through two phases:
//!
//! 1. **Indexing**: find the site's sections, then harvest article links from
//!    each section page.
//! 2. **Resolving**: fetch each article and read its title, text and
//!    publication date.
//!
//! The aggregator skips the first phase: its feed already names the article,
//! the publisher and a date.
//!
//! # Modules
//!
//! | Module | Role | Method |
//! |--------|------|--------|
//! | [`sections`] | Section discovery with a per-domain TTL cache | HTML scraping of the root page |
//! | [`links`] | Article link harvesting | HTML scraping of section pages |
//! | [`aggregator`] | Keyword search | Google News RSS |
//! | [`article`] | Title, text and date fallback chain | Meta tags, JSON-LD, URL |
//!
//! All network access goes through [`crate::fetch::PageFetcher`]. Nothing in
//! here returns an error for a source-level failure; outcomes are reported as
//! values so one bad source never takes down a cycle.

pub mod aggregator;
pub mod article;
pub mod links;
pub mod sections;
