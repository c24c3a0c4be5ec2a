//! Census CLI - command-line front end for the CKAN row-count audit
//!
//! This crate wires the catalog walker, the dataset auditor and the CSV
//! reports together; see [`config`] for the options and how they layer over
//! the config file.

pub mod config;

pub use config::{Aggregation, Config, Settings, DEFAULT_PORTAL_URL};
