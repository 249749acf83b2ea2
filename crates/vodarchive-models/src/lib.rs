//! Shared data model for the VOD archiver job pipeline.
//!
//! This crate provides the Serde/JSON-schema types shared between the job store, the
//! stage workers, and the daemon binary:
//! - The `Job` row and its `Stage` state machine
//! - Auxiliary, read-only VOD/channel metadata
//! - Upload title sanitization

pub mod job;
pub mod sanitize;
pub mod vod;

pub use job::{Job, Stage, VodId, MAX_CONSECUTIVE_FAILURES};
pub use sanitize::sanitize_title;
pub use vod::{Channel, StreamMoment, VodMetadata};
