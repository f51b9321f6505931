//! FSA Harvester - Export conformity records from the FSA registry.
//!
//! This crate downloads certificates and declarations of conformity for a set
//! of technical regulations from the Russian Federal Accreditation Service
//! registry, enriches each record with its detail document, and writes the
//! result as CSV.
//!
//! # Example
//!
//! ```
//! use fsa_harvester::dates::parse_date;
//! use fsa_harvester::reference::regulation_code;
//!
//! assert!(parse_date("20231111").is_ok());
//! assert_eq!(regulation_code("ТР ТС 017/2011 x"), Some("017".to_string()));
//! ```
//!
//! # Architecture
//!
//! The harvester is organized into several modules:
//!
//! - [`config`]: Configuration, register layout and environment loading
//! - [`error`]: Error types and Result alias
//! - [`http`]: HTTP transport and retry client
//! - [`cache`]: Disk-backed memo cache
//! - [`collector`]: Paginated listing collection
//! - [`reference`]: Technical-regulation reference table
//! - [`dates`]: Date normalization
//! - [`types`]: Upstream document types
//! - [`registry`]: Client for one register
//! - [`export`]: Output rows and CSV files
//! - [`cli`]: Command-line interface
//! - [`harvester`]: Main harvester service

pub mod cache;
pub mod cli;
pub mod collector;
pub mod config;
pub mod dates;
pub mod error;
pub mod export;
pub mod harvester;
pub mod http;
pub mod reference;
pub mod registry;
pub mod types;

// Re-export main functions
pub use harvester::{harvest, HarvestSummary};

// Re-export commonly used items
pub use config::{HarvesterConfig, RegistryKind};
pub use error::{HarvesterError, Result};
pub use http::{RetryClient, RetryPolicy};
