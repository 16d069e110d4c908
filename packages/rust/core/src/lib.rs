//! Job orchestration for the spirits catalog.
//!
//! This crate ties together crawling, normalization, storage and indexing
//! into end-to-end workflows: [`pipeline::ingest`] for the remote listing
//! and [`import::import`] for existing datasets.

pub mod artifacts;
pub mod import;
pub mod pipeline;

pub use import::{ImportReport, ImportSource, import};
pub use pipeline::{
    CategoryReport, IngestConfig, IngestReport, ProgressReporter, SilentProgress, ingest, ingest_from,
};
