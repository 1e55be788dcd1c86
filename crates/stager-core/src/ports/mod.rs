//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ICatalog`] - Remote catalog operations (stat, listing, collections, object I/O)
//! - [`IJobStore`] - Durable job records, progress snapshots and results

pub mod catalog;
pub mod job_store;

pub use catalog::{CatalogEntry, CatalogError, ICatalog};
pub use job_store::{IJobStore, JobRecord};
