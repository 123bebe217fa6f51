//! Core types and algorithms for the revlog change-history store.
//!
//! This crate has no database dependencies. It defines the
//! text-delta model, change records, revision metadata, the replay algorithm
//! that reconstructs file content, and the [`store::RevisionHistory`] trait
//! that storage backends implement.

pub mod change;
pub mod delta;
pub mod diff;
pub mod error;
pub mod planner;
pub mod replay;
pub mod revision;
pub mod store;

pub use error::{Error, Result};
