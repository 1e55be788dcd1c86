//! Integration tests for stager-catalog
//!
//! Uses wiremock to simulate the catalog HTTP API and verifies end-to-end
//! behavior of the CatalogClient, the HttpCatalog adapter, and data object
//! transfers.

mod common;

mod test_catalog_client;
mod test_transfers;
