//! Stager Core - Domain model and ports for the data stager
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `Locator`, `PathInfo`, `Checksum`, `SyncOutcome`, `Progress`, `JobPayload`
//! - **Port definitions** - Traits for adapters: `ICatalog`, `IJobStore`
//! - **Configuration** - YAML worker configuration with validation
//! - **Credentials** - Repository account credentials and password files
//!
//! # Architecture
//!
//! The domain module is pure data and rules; it performs no I/O.
//! Ports define trait interfaces that adapter crates implement
//! (`stager-catalog` for the remote catalog, `stager-store` for job state).
//! The sync engine in `stager-sync` drives both namespaces through these types.

pub mod config;
pub mod credential;
pub mod domain;
pub mod ports;
