//! Core orchestration and domain logic for Newswatch.
//!
//! This crate ties the filters, the durable store, and the extraction and
//! classification collaborators into the ingestion [`pipeline`], and provides
//! the [`topics`] and [`triage`] logic behind the review queue.

pub mod classifier;
pub mod pipeline;
pub mod topics;
pub mod triage;
