// Walk — deterministic traversal of the dependency graph
//
// The graph is never materialized. A traversal starts at a root and follows
// `list_children` edges breadth-first:
//
//   1. The root is visited first.
//   2. Children are enqueued in `list_children` order, so siblings appear in
//      attribute-registration order (or index / sorted-key order inside
//      wrappers).
//   3. An object is enqueued at most once, the first time it is reached.
//      Cycles and shared sub-objects are therefore visited exactly once, and
//      the path recorded for them is the first one found.
//
// Everything that aggregates over a graph (variables, checkpoint paths,
// losses, updates, the consistency guard) goes through `walk`, so all of
// them agree on order.
//
// FROZEN LAYERS:
//
// A layer with `trainable = false` freezes the subtree reached through it.
// Because each object is visited once, an object shared between a frozen and
// an unfrozen parent takes the state of whichever parent reached it first.

use std::collections::{HashSet, VecDeque};

use crate::error::Result;
use crate::graph::Graph;
use crate::object::{ObjectId, ObjectKind};
use crate::value::Value;
use crate::variable::{VariableBackend, VariableId};

/// One visited object and how it was first reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visit {
    pub id: ObjectId,
    /// Child names from the root down to this object; empty for the root.
    pub path: Vec<String>,
    /// Whether a frozen layer sits on `path` (the object itself included).
    pub frozen: bool,
}

/// Which variables [`Graph::aggregate_variables`] keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VariableFilter {
    #[default]
    All,
    Trainable,
    NonTrainable,
}

impl VariableFilter {
    fn keeps(self, trainable: bool) -> bool {
        match self {
            VariableFilter::All => true,
            VariableFilter::Trainable => trainable,
            VariableFilter::NonTrainable => !trainable,
        }
    }
}

fn escape_segment(segment: &str, separator: &str) -> String {
    if separator.is_empty() {
        return segment.to_string();
    }
    segment
        .replace('\\', "\\\\")
        .replace(separator, &format!("\\{separator}"))
}

impl Graph {
    /// Breadth-first traversal from `root`.
    pub fn walk(&self, root: ObjectId) -> Result<Vec<Visit>> {
        let mut visited = HashSet::from([root]);
        let mut queue = VecDeque::from([Visit {
            id: root,
            path: Vec::new(),
            frozen: !self.object(root)?.is_trainable(),
        }]);
        let mut order = Vec::new();
        while let Some(visit) = queue.pop_front() {
            for (name, child) in self.list_children(visit.id)? {
                if !visited.insert(child) {
                    continue;
                }
                let mut path = visit.path.clone();
                path.push(name);
                queue.push_back(Visit {
                    id: child,
                    path,
                    frozen: visit.frozen || !self.object(child)?.is_trainable(),
                });
            }
            order.push(visit);
        }
        Ok(order)
    }

    /// Every object reachable from `root`, root first, each exactly once.
    pub fn list_objects(&self, root: ObjectId) -> Result<Vec<ObjectId>> {
        Ok(self.walk(root)?.into_iter().map(|v| v.id).collect())
    }

    /// Variables owned by objects reachable from `root`, in first-visit
    /// order, deduplicated by identity.
    ///
    /// A variable counts as trainable when its own flag is set and no
    /// frozen layer sits on the path that first reached its owner.
    pub fn aggregate_variables(
        &self,
        root: ObjectId,
        filter: VariableFilter,
    ) -> Result<Vec<VariableId>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for visit in self.walk(root)? {
            for var in self.direct_variables(visit.id)? {
                if !seen.insert(var) {
                    continue;
                }
                let trainable = self.variable(var)?.trainable() && !visit.frozen;
                if filter.keeps(trainable) {
                    out.push(var);
                }
            }
        }
        Ok(out)
    }

    pub fn variables(&self, root: ObjectId) -> Result<Vec<VariableId>> {
        self.aggregate_variables(root, VariableFilter::All)
    }

    pub fn trainable_variables(&self, root: ObjectId) -> Result<Vec<VariableId>> {
        self.aggregate_variables(root, VariableFilter::Trainable)
    }

    pub fn non_trainable_variables(&self, root: ObjectId) -> Result<Vec<VariableId>> {
        self.aggregate_variables(root, VariableFilter::NonTrainable)
    }

    /// Every reachable variable keyed by its traversal path: the child names
    /// leading to its owner followed by its local name, joined by
    /// `separator`.
    ///
    /// A separator occurring inside a name is escaped with a backslash (and
    /// backslashes are doubled), so `{"a/b": v}` and `{"a": {"b": v}}` get
    /// different keys.
    pub fn variable_paths(
        &self,
        root: ObjectId,
        separator: &str,
    ) -> Result<Vec<(String, VariableId)>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for visit in self.walk(root)? {
            for (name, var) in self.named_variables(visit.id)? {
                if !seen.insert(var) {
                    continue;
                }
                let segments: Vec<String> = visit
                    .path
                    .iter()
                    .chain(std::iter::once(&name))
                    .map(|segment| escape_segment(segment, separator))
                    .collect();
                out.push((segments.join(separator), var));
            }
        }
        Ok(out)
    }

    /// Current value of every regularization loss registered on a layer
    /// reachable from `root`.
    pub fn losses(&self, root: ObjectId) -> Result<Vec<f64>> {
        let mut out = Vec::new();
        for id in self.list_objects(root)? {
            if let ObjectKind::Layer(state) = &self.object(id)?.kind {
                for term in state.losses() {
                    out.push((term.regularizer)(self.variable(term.variable)?.values()));
                }
            }
        }
        Ok(out)
    }

    /// Pending updates of every reachable layer, as `(layer, variable)`.
    pub fn updates(&self, root: ObjectId) -> Result<Vec<(ObjectId, VariableId)>> {
        let mut out = Vec::new();
        for id in self.list_objects(root)? {
            if let ObjectKind::Layer(state) = &self.object(id)?.kind {
                out.extend(state.updates().iter().map(|u| (id, u.variable)));
            }
        }
        Ok(out)
    }

    /// Run and clear the pending updates of every reachable layer.
    /// Returns how many were applied.
    pub fn apply_updates(&mut self, root: ObjectId) -> Result<usize> {
        let mut applied = 0;
        for id in self.list_objects(root)? {
            let pending = match self.layer_state_mut(id) {
                Ok(state) => std::mem::take(&mut state.updates),
                Err(_) => continue,
            };
            for update in pending {
                let next = (update.compute)(&self.get_value(update.variable)?);
                self.assign(update.variable, &next)?;
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Layers held by `id`, flattened.
    ///
    /// Modules and layers report layers found in their attributes, in
    /// assignment order; wrappers report their contents (dicts in sorted key
    /// order). Nested wrappers are flattened recursively, a layer is reported
    /// without descending into it, and plain modules are skipped. Values held
    /// through the no-dependency marker still count.
    pub fn layers(&self, id: ObjectId) -> Result<Vec<ObjectId>> {
        let mut seen = HashSet::from([id]);
        let mut out = Vec::new();
        for value in self.held_values(id)? {
            self.collect_layers(&value, &mut seen, &mut out)?;
        }
        Ok(out)
    }

    fn held_values(&self, id: ObjectId) -> Result<Vec<Value>> {
        let obj = self.object(id)?;
        Ok(match &obj.kind {
            ObjectKind::Module | ObjectKind::Layer(_) => {
                obj.attrs.iter().map(|(_, v)| v.clone()).collect()
            }
            ObjectKind::List(w) => w.values(),
            ObjectKind::Dict(w) => {
                let mut entries = w.entries();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                entries.into_iter().map(|(_, v)| v).collect()
            }
            ObjectKind::Tuple(w) => w.values().to_vec(),
        })
    }

    fn collect_layers(
        &self,
        value: &Value,
        seen: &mut HashSet<ObjectId>,
        out: &mut Vec<ObjectId>,
    ) -> Result<()> {
        let Value::Object(id) = value.unmarked() else {
            return Ok(());
        };
        if !seen.insert(*id) {
            return Ok(());
        }
        let obj = self.object(*id)?;
        if obj.is_layer() {
            out.push(*id);
        } else if obj.is_wrapper() {
            for inner in self.held_values(*id)? {
                self.collect_layers(&inner, seen, out)?;
            }
        }
        Ok(())
    }
}
