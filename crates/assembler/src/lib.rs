//! Chainpoint proof assembly.
//!
//! This crate provides:
//! - Pure composition of a proof from the state fragments of one hash_id
//! - Per-event lookup tables joining the fragment rows of one event
//! - Batch assembly with per-hash_id failure isolation
//! - The Chainpoint v3 schema gate every proof passes before storage

#![warn(missing_docs)]

pub mod assembler;
pub mod error;
pub mod fragments;
pub mod lookup;
pub mod schema;

pub use assembler::{
    compose_bitcoin_branch, compose_calendar_branch, compose_header, BatchAssembly, ItemFailure,
    ProofAssembler,
};
pub use error::{AssemblyError, Result};
pub use fragments::*;
pub use lookup::{AnchorAggLookup, BtcChainLookup, CalendarLookup};
pub use schema::{ProofSchemaValidator, SchemaError};
