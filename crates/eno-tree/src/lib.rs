//! eno-tree
//!
//! The in-memory heart of reconciliation: a per-synthesis dependency tree
//! ordering resources by readiness group and CRD→CR relationships, and a
//! synthesis-keyed cache that folds informer events into the trees and
//! enqueues reconcile work on state transitions.

pub mod cache;
pub mod error;
pub mod tree;

pub use crate::cache::{ReconcileRequest, ResourceCache};
pub use crate::error::TreeError;
pub use crate::tree::Tree;
