//! Response caching.
//!
//! - [`key`] derives stable keys from call parameters.
//! - [`store::CacheStore`] is the bounded LRU + TTL map shared by every
//!   call routed through a pipeline. It is constructed explicitly and
//!   handed to the pipeline builder, so several pipelines can share one
//!   store or keep their own.
//!
//! The [`CachingMiddleware`](crate::middleware::CachingMiddleware) ties the
//! two together and uses [`crate::stream`] to capture and replay streams.

pub mod key;
pub mod store;

pub use key::{canonical_json, derive_key};
pub use store::{CacheConfig, CacheEntry, CacheStore, CachedResult};
