//! Domain core for the knowledge-base bulk importer.
//!
//! Holds everything that does not talk to the network: the import-job
//! state machine, upload naming rules, the store traits the adapters
//! implement, and the tiered admission controller.

pub mod error;
pub mod import_job;
pub mod memory;
pub mod rate_limit;
pub mod stores;
pub mod types;
