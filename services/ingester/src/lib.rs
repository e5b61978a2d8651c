//! SALT archive ingester.
//!
//! Walks the raw exposure files of a range of nights (or a single file),
//! derives their observation graphs and writes them to the archive.

pub mod config;
pub mod discovery;
pub mod ingest;

pub use config::IngesterConfig;
pub use ingest::{ErrorPolicy, FileOutcome, Mode, Orchestrator, RunOptions, RunSummary, Selection, Task};
