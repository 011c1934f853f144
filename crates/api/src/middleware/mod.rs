//! Request middleware and extractors.
//!
//! - [`identity::ClientIdentity`] -- caller's user id and IP as seen by the admission check.
//! - [`rate_limit::enforce`] -- tiered admission control for expensive routes.

pub mod identity;
pub mod rate_limit;
