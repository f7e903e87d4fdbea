//! # codectx
//!
//! Incremental digests of a source tree for AI tools.
//!
//! codectx walks a directory, fingerprints every admitted file, and keeps a
//! single markdown document with one section per file: the raw content for
//! small files, a generated summary for large ones. Re-runs only process
//! files whose content changed since their section was written, and sections
//! for files that no longer exist are dropped.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌────────────┐   ┌───────────┐   ┌─────────┐
//! │  Walker  │──▶│ Classify │──▶│ Summarize  │──▶│   Merge   │──▶│ codectx │
//! │ +ignore  │   │ vs store │   │ copy/mock/ │   │ GC + sort │   │   .md   │
//! └──────────┘   └────▲─────┘   │   remote   │   └───────────┘   └────┬────┘
//!                     │         └────────────┘                        │
//!                     └──────────────── parse ────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Layered configuration and validation |
//! | [`models`] | Core data types |
//! | [`ignore`] | Ignore rules and matching |
//! | [`walker`] | Discovery and fingerprinting |
//! | [`store`] | Document parsing and serialization |
//! | [`classify`] | Staleness classification |
//! | [`summarize`] | Per-file strategy selection |
//! | [`remote`] | Summarization service client and retries |
//! | [`merge`] | Merge and atomic write-back |
//! | [`pipeline`] | One run, end to end |
//! | [`progress`] | Progress reporting |
//! | [`status`] | Status table |
//! | [`error`] | Error types |

pub mod classify;
pub mod config;
pub mod error;
pub mod ignore;
pub mod merge;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod remote;
pub mod status;
pub mod store;
pub mod summarize;
pub mod walker;
