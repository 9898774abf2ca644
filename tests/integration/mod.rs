//! Integration test modules.

mod ingest_test;
mod mocks;
mod reconnect_test;
mod snapshot_test;
