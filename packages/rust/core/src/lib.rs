//! Incremental synchronization of the milestone graph.
//!
//! This crate ties together document loading, the node store, citation
//! enrichment, and link reconstruction into the `sync` and `refresh` runs.

pub mod enrichment;
pub mod graph;
pub mod pipeline;
pub mod report;
pub mod store;
