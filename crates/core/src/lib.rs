//! # Proofgen Core
//!
//! Shared building blocks for the Chainpoint proof generation service.
//!
//! ## Features
//!
//! - **Proof types**: `Proof`, `Branch`, `Op`, `Anchor` with the exact JSON shape
//!   of a Chainpoint v3 proof
//! - **State fragments**: the per-stage proof material written by the
//!   aggregation, calendar and Bitcoin anchoring stages
//! - **Constants**: protocol context URI, branch labels, proof type tag
//! - **hash_id time**: submission time recovered from time-ordered UUIDs
//! - **Hashing**: evaluation of proof ops down to the anchored values

#![warn(missing_docs)]

pub mod constants;
pub mod error;
pub mod hash_id;
pub mod hashing;
pub mod types;

pub use constants::*;
pub use error::{CoreError, Result};
pub use hash_id::{format_timestamp, submitted_at};
pub use hashing::{evaluate_ops, evaluate_proof, AnchorValue};
pub use types::*;
