//! Durable, relational persistence for VOD archive job rows.
//!
//! The access pattern is exactly what a relational store is good at: point lookups by
//! `vod_id` and a single ordered scan by stage priority. No joins, no document store.

mod error;
mod row;
mod store;

pub use error::{StoreError, StoreResult};
pub use store::{JobStore, LEASE_STALE_THRESHOLD};
