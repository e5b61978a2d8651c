//! Archive storage for SALT observations.
//!
//! Provides:
//! - The archive writer (create, scoped update, remove) over PostgreSQL
//! - Entity resolution for proposals, institutions, telescopes and targets
//! - An in-memory archive for dummy runs and tests
//! - A read-only client for the SALT science database

pub mod archive;
pub mod entities;
pub mod memory;
pub mod postgres;
pub mod schema;
pub mod science;

pub use archive::{Archive, UpdateScope, WriteMode, WriteOutcome};
pub use memory::MemoryArchive;
pub use postgres::PgArchive;
pub use science::{
    release_date, ProposalType, SaltScienceDatabase, ScienceDatabase, StaticScienceDatabase,
};
