//! Row types for the importer tables.

pub mod entry;
pub mod import_job;
