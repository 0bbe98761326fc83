// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Reweave processor
//!
//! Coordinates independently authored transformers over a corpus of
//! classfile trees. Transformers declare ordering constraints in an
//! apply phase, observe trees and schedule edits in parallel read
//! rounds, and the engine materializes the edits in dependency order
//! during per-class write shards.

pub mod capture;
pub mod error;
pub mod processor;
pub mod provider;
mod schedule;
pub mod transformer;
pub mod types;

pub use capture::{NodeCapture, SliceCapture};
pub use error::{Error, Result};
pub use processor::{NO_WRITE, Processor, READ_VANILLA, WriteContext};
pub use provider::{Platform, TreeReader};
pub use transformer::Transformer;
pub use types::{ClassInfo, Phase};
