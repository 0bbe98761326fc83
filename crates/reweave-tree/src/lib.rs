// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Tree model for classfile transformation
//!
//! This crate contains the node hierarchy (value, list, named, and the
//! composite class/field/method/parameter/instruction nodes), the arena
//! that stores a class tree, and the modification gate that controls when
//! mutators may run.

pub mod access;
pub mod error;
pub mod gate;
pub mod node;
pub mod tree;

pub use error::{Result, TreeError};
pub use gate::{GateGuard, ModificationGate};
pub use node::{NodeId, NodeTag, Value};
pub use tree::{NodeRef, Tree};
