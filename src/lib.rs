//! News Aggregator - scrapes RSS feeds from configured websites
//!
//! Feeds are fetched concurrently, parsed with per-website field selectors,
//! deduplicated by GUID and bulk-inserted into SQLite. A small HTTP API lists
//! the stored news and tracks clicks on outbound links.

pub mod aggregator;
pub mod cli;
pub mod config;
pub mod db;
pub mod fetcher;
pub mod parser;
pub mod routes;
