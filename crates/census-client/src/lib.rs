//! Census Client - HTTP access to CKAN portals and bounded row counters
//!
//! This crate provides:
//!
//! - [`http`] - retrying HTTP client (GET JSON, HEAD probes, streamed bodies)
//! - [`download`] - size-capped downloads into temporary files
//! - [`counter`] - delimited-text, spreadsheet and archive row counters
//! - [`datastore`] - row/column counts from the CKAN DataStore
//! - [`catalog`] - CKAN action API and dataset traversal
//! - [`source`] - the [`census_core::RowCountSource`] used by the auditor
//!
//! # Overview
//!
//! Nothing here returns an error for a single unreachable or unreadable
//! resource. Failures degrade to [`census_core::Probe::Unknown`],
//! [`census_core::RowCount::Uncountable`] or `None`, and the audit moves on.

pub mod catalog;
pub mod counter;
pub mod datastore;
pub mod download;
pub mod http;
pub mod source;

#[cfg(test)]
mod test_support;

pub use catalog::{CatalogWalker, CkanClient, TraversalState};
pub use counter::{ArchiveCounter, DelimitedTextCounter, SpreadsheetCounter};
pub use datastore::DataStoreClient;
pub use download::{BoundedDownloader, TempDownload};
pub use http::{ByteStream, HttpClient};
pub use source::CkanRowCountSource;
