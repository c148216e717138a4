//! Skywatch Backend Library
//!
//! Aircraft tracking pipeline: rate-limited batch fetching from an
//! external state-vector feed, in-memory position caching with update
//! suppression, and a persistent tracking store with a
//! pending/active/stale lifecycle.

pub mod cache;
pub mod feed;
pub mod fetcher;
pub mod models;
pub mod rate_limit;
pub mod retry;
pub mod service;
pub mod store;

pub use models::Config;
pub use service::TrackerService;
