//! Remote access layer: typed client for the issue API with error
//! normalization, bounded retry, and a cached wrapper.

pub mod cached_client;
pub mod client;
pub mod error;
pub mod keys;
