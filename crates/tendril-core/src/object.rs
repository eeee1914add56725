//! Trackable objects stored in the arena.

use std::fmt;

use crate::layer::LayerState;
use crate::value::Value;
use crate::variable::VariableId;
use crate::wrappers::{DictWrapper, ListWrapper, TupleWrapper};

/// A handle to a trackable object in a [`Graph`](crate::Graph).
///
/// Handles are plain slot indices. Objects are never destroyed, so a handle
/// stays valid for the life of the arena that issued it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) u32);

impl ObjectId {
    /// Raw slot index (for diagnostics only).
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

/// What an object is, and the state specific to that kind.
#[derive(Debug)]
pub enum ObjectKind {
    /// A plain trackable with attributes, children, and variables.
    Module,
    /// A trackable with the layer capability.
    Layer(LayerState),
    List(ListWrapper),
    Dict(DictWrapper),
    Tuple(TupleWrapper),
}

/// A node in the dependency graph.
#[derive(Debug)]
pub struct Object {
    pub(crate) name: String,
    pub(crate) kind: ObjectKind,
    /// Attribute values in first-assignment order.
    pub(crate) attrs: Vec<(String, Value)>,
    /// Named child edges in first-registration order.
    pub(crate) edges: Vec<(String, ObjectId)>,
    /// Directly owned variables, keyed by local name.
    pub(crate) variables: Vec<(String, VariableId)>,
    /// Nonzero while an untracked initializer runs for this object.
    pub(crate) untracked_depth: u32,
}

impl Object {
    pub(crate) fn new(name: String, kind: ObjectKind) -> Self {
        Object {
            name,
            kind,
            attrs: Vec::new(),
            edges: Vec::new(),
            variables: Vec::new(),
            untracked_depth: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    pub fn class_name(&self) -> &str {
        match &self.kind {
            ObjectKind::Module => "Module",
            ObjectKind::Layer(state) => state.class_name(),
            ObjectKind::List(_) => "ListWrapper",
            ObjectKind::Dict(_) => "DictWrapper",
            ObjectKind::Tuple(_) => "TupleWrapper",
        }
    }

    pub fn is_layer(&self) -> bool {
        matches!(self.kind, ObjectKind::Layer(_))
    }

    pub fn is_wrapper(&self) -> bool {
        matches!(
            self.kind,
            ObjectKind::List(_) | ObjectKind::Dict(_) | ObjectKind::Tuple(_)
        )
    }

    /// Layers can be frozen; everything else is always trainable.
    pub fn is_trainable(&self) -> bool {
        match &self.kind {
            ObjectKind::Layer(state) => state.trainable,
            _ => true,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attrs.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attrs.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub(crate) fn store_attr(&mut self, name: &str, value: Value) {
        match self.attrs.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    /// Register or replace the edge `name`; a replaced edge keeps its position.
    pub(crate) fn set_edge(&mut self, name: &str, child: ObjectId) -> Option<ObjectId> {
        match self.edges.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, child)),
            None => {
                self.edges.push((name.to_string(), child));
                None
            }
        }
    }

    pub(crate) fn remove_edge(&mut self, name: &str) -> Option<ObjectId> {
        let pos = self.edges.iter().position(|(n, _)| n == name)?;
        Some(self.edges.remove(pos).1)
    }

    pub(crate) fn set_variable(&mut self, name: &str, var: VariableId) {
        match self.variables.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = var,
            None => self.variables.push((name.to_string(), var)),
        }
    }

    pub(crate) fn remove_variable(&mut self, name: &str) -> Option<VariableId> {
        let pos = self.variables.iter().position(|(n, _)| n == name)?;
        Some(self.variables.remove(pos).1)
    }
}
