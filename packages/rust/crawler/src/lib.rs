//! Listing crawler for the remote spirits service.
//!
//! This crate provides:
//! - [`source`]: the [`ListingSource`] seam and its HTTP implementation
//! - [`credential`]: bearer-token providers for the listing service
//! - [`engine`]: the pagination loop producing one category's raw records

pub mod credential;
pub mod engine;
pub mod source;

pub use credential::{Anonymous, CredentialProvider, EnvCredential};
pub use engine::{CrawlResult, Crawler};
pub use source::{HttpListingSource, ListingPage, ListingSource, decode_listing};
