// Attribute assignment — the single funnel for structural changes
//
// Every `owner.name = value` goes through `Graph::set_attr`. The steps:
//
//   1. Tracking suspended on `owner` (inside `Graph::untracked`):
//        store the value as-is, touch no edges.
//   2. Value carries the no-dependency marker:
//        store the inner value, drop any edge previously under `name`.
//   3. Value is an object handle:
//        register the edge `name -> object`, store the handle.
//   4. Value is a raw list / dict / tuple:
//        wrap it (recursively), register the edge to the wrapper,
//        store the wrapper handle instead of the raw container.
//   5. Value is a variable:
//        record it as a directly owned variable under `name`.
//   6. Anything else:
//        store it, drop any edge previously under `name`.
//
// Re-assigning a name replaces the edge in place, so traversal order stays
// tied to the first time a name was registered.

use tracing::debug;

use crate::error::Result;
use crate::graph::Graph;
use crate::object::{ObjectId, ObjectKind};
use crate::value::Value;
use crate::variable::VariableId;

/// How a value ended up after passing through the tracking rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tracked {
    Child(ObjectId),
    Variable(VariableId),
    /// Opted out with the no-dependency marker.
    Untracked,
    Plain,
}

impl Graph {
    /// Assign attribute `name` on `owner`, returning the value actually stored.
    ///
    /// Raw containers come back as the wrapper handle that replaced them.
    pub fn set_attr(
        &mut self,
        owner: ObjectId,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<Value> {
        let value = value.into();
        let stored = if self.object(owner)?.untracked_depth > 0 {
            value
        } else {
            self.track_child(owner, name, value)?
        };
        self.object_mut(owner)?.store_attr(name, stored.clone());
        Ok(stored)
    }

    /// Current value of attribute `name` on `owner`.
    pub fn get_attr(&self, owner: ObjectId, name: &str) -> Result<Option<&Value>> {
        Ok(self.object(owner)?.attr(name))
    }

    /// Decide whether `value` becomes a named child of `owner`, wrapping
    /// containers as needed, and return the value that should be stored.
    pub fn track_child(&mut self, owner: ObjectId, name: &str, value: Value) -> Result<Value> {
        self.object(owner)?;
        let (stored, tracked) = self.track_value(value)?;
        if let Tracked::Variable(var) = tracked {
            self.claim_variable(var, owner)?;
        }
        let obj = self.object_mut(owner)?;
        match tracked {
            Tracked::Child(child) => {
                obj.remove_variable(name);
                if let Some(old) = obj.set_edge(name, child) {
                    if old != child {
                        debug!(owner = ?owner, name, ?old, new = ?child, "replaced tracked child");
                    }
                } else {
                    debug!(owner = ?owner, name, child = ?child, "tracked child");
                }
            }
            Tracked::Variable(var) => {
                obj.remove_edge(name);
                obj.set_variable(name, var);
            }
            Tracked::Untracked | Tracked::Plain => {
                if obj.remove_edge(name).is_some() {
                    debug!(owner = ?owner, name, "dropped tracked child");
                }
                obj.remove_variable(name);
            }
        }
        Ok(stored)
    }

    /// Run `init` with attribute tracking suspended on `owner`.
    ///
    /// Every `set_attr(owner, ..)` inside the closure stores its value
    /// verbatim: no wrapping, no edges, no variable registration.
    pub fn untracked<R>(&mut self, owner: ObjectId, init: impl FnOnce(&mut Graph) -> R) -> Result<R> {
        self.object_mut(owner)?.untracked_depth += 1;
        let out = init(self);
        let obj = self.object_mut(owner)?;
        obj.untracked_depth = obj.untracked_depth.saturating_sub(1);
        Ok(out)
    }

    /// Named children of `id` in traversal order.
    ///
    /// For modules and layers this is first-registration order of attribute
    /// edges. Wrappers report their tracked elements by scanning current
    /// contents: list and tuple elements by index, dictionary entries with
    /// string keys in sorted key order.
    pub fn list_children(&self, id: ObjectId) -> Result<Vec<(String, ObjectId)>> {
        let obj = self.object(id)?;
        Ok(match &obj.kind {
            ObjectKind::Module | ObjectKind::Layer(_) => obj.edges.clone(),
            ObjectKind::List(w) => w.children(),
            ObjectKind::Dict(w) => w.children(),
            ObjectKind::Tuple(w) => w.children(),
        })
    }

    /// Variables `id` owns directly, not through children.
    pub fn direct_variables(&self, id: ObjectId) -> Result<Vec<VariableId>> {
        Ok(self
            .named_variables(id)?
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }

    /// [`direct_variables`](Self::direct_variables) with their local names.
    pub fn named_variables(&self, id: ObjectId) -> Result<Vec<(String, VariableId)>> {
        let obj = self.object(id)?;
        Ok(match &obj.kind {
            ObjectKind::Module | ObjectKind::Layer(_) => obj.variables.clone(),
            ObjectKind::List(w) => w.named_variables(),
            ObjectKind::Dict(w) => w.named_variables(),
            ObjectKind::Tuple(w) => w.named_variables(),
        })
    }

    /// Wrap `value` if it is a raw container, otherwise return it unchanged.
    ///
    /// This is the explicit counterpart of the wrapping `set_attr` performs.
    pub fn wrap(&mut self, value: impl Into<Value>) -> Result<Value> {
        Ok(self.track_value(value.into())?.0)
    }

    /// Apply the tracking rules to a value, returning the stored form.
    pub(crate) fn track_value(&mut self, value: Value) -> Result<(Value, Tracked)> {
        match value {
            Value::NoDependency(inner) => Ok((inner.into_unmarked(), Tracked::Untracked)),
            Value::Object(id) => {
                self.object(id)?;
                Ok((value, Tracked::Child(id)))
            }
            Value::Variable(var) => {
                self.variable(var)?;
                Ok((value, Tracked::Variable(var)))
            }
            Value::List(raw) => {
                let id = self.wrap_list(raw)?;
                Ok((Value::Object(id), Tracked::Child(id)))
            }
            Value::Dict(raw) => {
                let id = self.wrap_dict(raw)?;
                Ok((Value::Object(id), Tracked::Child(id)))
            }
            Value::Tuple(items) => {
                let id = self.wrap_tuple(items)?;
                Ok((Value::Object(id), Tracked::Child(id)))
            }
            plain => Ok((plain, Tracked::Plain)),
        }
    }

    /// Tracking rules for a container element: like `track_value`, but the
    /// no-dependency marker is kept so the element stays invisible to scans.
    pub(crate) fn track_element(&mut self, value: Value) -> Result<Value> {
        match value {
            Value::NoDependency(_) => Ok(value),
            other => Ok(self.track_value(other)?.0),
        }
    }
}
