pub mod generation;
pub mod imports;
pub mod rate_limit;
