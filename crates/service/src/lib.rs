//! Chainpoint proof generation service.
//!
//! Consumes proof-ready events, assembles Chainpoint v3 proofs from the state
//! fragments written by the aggregation, calendar and Bitcoin anchoring
//! stages, and stores them for retrieval.
//!
//! # Architecture
//!
//! ```text
//!   work queue ──► PipelineConsumer ──► StateRepository ──► cache / SQLite
//!                        │
//!                        ├─► ProofAssembler + ProofSchemaValidator
//!                        │
//!                        └─► ProofStore ──► proofs table ◄── ProofPruner
//! ```
//!
//! External handles live in [`supervisor::ConnectionSlot`]s that a
//! [`supervisor::Supervisor`] refills after a transport fault.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch_log;
pub mod cache;
pub mod config;
pub mod consumer;
pub mod error;
pub mod proof_store;
pub mod pruner;
pub mod queue;
pub mod repository;
pub mod storage;
pub mod supervisor;

pub use consumer::{EventOutcome, PipelineConsumer};
pub use error::ProcessError;
