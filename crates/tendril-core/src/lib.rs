//! # tendril-core
//!
//! Dependency tracking and variable aggregation for object graphs of layers.
//!
//! This crate provides:
//! - [`Graph`] — the arena owning every trackable object and variable
//! - [`Value`] — what an attribute or container element can hold
//! - [`ListWrapper`] / [`DictWrapper`] / [`TupleWrapper`] — trackable proxies over raw containers
//! - [`Layer`] — the layer capability (build, freeze, losses, updates)
//! - [`VariableBackend`] — the get/set seam used by checkpoint restore
// - value / variable / object: the data model
// - graph: arena storage and naming
// - track: attribute assignment, the one funnel for structural changes
// - wrappers: list, dict, and tuple wrappers with snapshot comparison
// - walk: breadth-first traversal and everything aggregated over it
// - guard: pre-save validation of every reachable wrapper
// - layer: build mechanics, trainability, losses, updates

pub mod dtype;
pub mod error;
pub mod graph;
pub mod guard;
pub mod layer;
pub mod object;
pub mod track;
pub mod value;
pub mod variable;
pub mod walk;
pub mod wrappers;

pub use dtype::DType;
pub use error::{Error, Result};
pub use graph::Graph;
pub use layer::{BuildContext, Layer, LayerState, LossTerm, Regularizer, Update};
pub use object::{Object, ObjectId, ObjectKind};
pub use value::{Key, SharedDict, SharedList, Value};
pub use variable::{Variable, VariableBackend, VariableId};
pub use walk::{VariableFilter, Visit};
pub use wrappers::{DictMut, DictWrapper, Fingerprint, ListMut, ListWrapper, TupleWrapper};
