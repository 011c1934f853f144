//! Object storage backends for uploaded files.
//!
//! Both backends implement [`kbase_core::stores::ObjectStore`] and return a
//! store-relative path plus the public URL derived from a configured base.

pub mod local;
pub mod s3;

pub use local::LocalObjectStore;
pub use s3::S3ObjectStore;

pub(crate) const OBJECT_STORE: &str = "object_store";

/// Join a public base URL and a store-relative path with exactly one slash.
pub fn public_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
