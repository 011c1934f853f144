//! Query layer. Each repository is a zero-sized struct whose methods take
//! the pool explicitly.

pub mod entry_repo;
pub mod import_job_repo;

pub use entry_repo::EntryRepo;
pub use import_job_repo::ImportJobRepo;
