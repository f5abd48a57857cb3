//! Serving-side infrastructure: the prediction TTL cache.

pub mod cache;
