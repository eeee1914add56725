// Container wrappers — trackable proxies over lists, dicts, and tuples
//
// A raw container assigned as an attribute is replaced by a wrapper object
// that adopts the container's storage. Elements that are trackable (objects,
// variables, nested containers which get wrapped in turn) become children of
// the wrapper; plain values pass through untouched.
//
// SNAPSHOTS:
//
// List and dict wrappers keep a shallow copy of their storage taken after
// every mutation made through the wrapper. Before any wrapper operation, and
// again before a save, the storage is compared against that copy. A mismatch
// means someone mutated the container through a kept alias; the wrapper is
// then marked as externally modified for good and the snapshot is dropped.
//
// APPEND-ONLY LISTS:
//
// A list wrapper names its children by index, so only appending is safe for
// restore-on-creation. Overwriting a tracked element, inserting, or removing
// while the list holds tracked elements marks the list as non-append
// mutated. Lists with no tracked content can be edited freely.
//
// DICTS:
//
// Dict entries are named by key. Overwriting a key is fine, removing a key
// that held a tracked value is not. A trackable value under a non-string key
// cannot be named at all; that is reported when the dict is validated.
//
// Tuples are fixed at wrap time and need no snapshot.

use tracing::debug;

use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::object::{ObjectId, ObjectKind};
use crate::value::{Key, SharedDict, SharedList, Value};
use crate::variable::VariableId;

/// Structural fingerprint of a wrapper's contents.
#[derive(Debug, Clone, PartialEq)]
pub enum Fingerprint {
    Sequence(Vec<Value>),
    Mapping(Vec<(Key, Value)>),
}

fn indexed_children(values: &[Value]) -> Vec<(String, ObjectId)> {
    values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.as_object().map(|id| (i.to_string(), id)))
        .collect()
}

fn indexed_variables(values: &[Value]) -> Vec<(String, VariableId)> {
    values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.as_variable().map(|id| (i.to_string(), id)))
        .collect()
}

/// State of a list wrapper.
#[derive(Debug)]
pub struct ListWrapper {
    storage: SharedList,
    snapshot: Option<Vec<Value>>,
    external_modification: bool,
    non_append_mutation: bool,
}

impl ListWrapper {
    pub(crate) fn new(storage: SharedList) -> Self {
        let snapshot = Some(storage.to_vec());
        ListWrapper {
            storage,
            snapshot,
            external_modification: false,
            non_append_mutation: false,
        }
    }

    /// The adopted storage; mutating it directly bypasses the wrapper.
    pub fn storage(&self) -> &SharedList {
        &self.storage
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Element at `index`, with any no-dependency marker peeled off.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.storage.get(index).map(Value::into_unmarked)
    }

    /// Current elements, markers included.
    pub fn values(&self) -> Vec<Value> {
        self.storage.to_vec()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::Sequence(self.storage.to_vec())
    }

    pub fn is_externally_modified(&self) -> bool {
        self.external_modification
    }

    pub fn has_non_append_mutation(&self) -> bool {
        self.non_append_mutation
    }

    fn is_dirty(&self) -> bool {
        self.external_modification || self.non_append_mutation
    }

    pub(crate) fn check_external_modification(&mut self) {
        if self.is_dirty() {
            return;
        }
        let diverged = match &self.snapshot {
            Some(snapshot) => *snapshot != *self.storage.borrow(),
            None => false,
        };
        if diverged {
            debug!(
                storage = ?self.storage,
                snapshot = ?self.snapshot,
                "list modified outside its wrapper"
            );
            self.external_modification = true;
            self.snapshot = None;
        }
    }

    pub(crate) fn update_snapshot(&mut self) {
        if !self.is_dirty() {
            self.snapshot = Some(self.storage.to_vec());
        }
    }

    fn has_mutation_or_trackable(&self) -> bool {
        self.non_append_mutation || self.storage.borrow().iter().any(Value::is_trackable)
    }

    fn mark_non_append(&mut self) {
        if !self.non_append_mutation {
            debug!(storage = ?self.storage, "non-append mutation of tracked list");
        }
        self.non_append_mutation = true;
    }

    pub(crate) fn children(&self) -> Vec<(String, ObjectId)> {
        indexed_children(&self.storage.borrow())
    }

    pub(crate) fn named_variables(&self) -> Vec<(String, VariableId)> {
        indexed_variables(&self.storage.borrow())
    }

    pub(crate) fn validate(&mut self, object: &str) -> Result<()> {
        self.check_external_modification();
        if self.non_append_mutation {
            return Err(Error::IncompatibleReplacement {
                object: object.to_string(),
            });
        }
        if self.external_modification {
            return Err(Error::StructuralMutation {
                object: object.to_string(),
                reason: format!(
                    "the wrapped list was modified outside the wrapper (its final value was \
                     {:?}), which breaks restoration on object creation. If you don't need this \
                     list checkpointed, wrap it in a no-dependency marker",
                    self.storage
                ),
            });
        }
        Ok(())
    }
}

/// State of a dict wrapper.
#[derive(Debug)]
pub struct DictWrapper {
    storage: SharedDict,
    snapshot: Option<Vec<(Key, Value)>>,
    external_modification: bool,
    removed_tracked: Option<Key>,
}

impl DictWrapper {
    pub(crate) fn new(storage: SharedDict) -> Self {
        let snapshot = Some(storage.entries());
        DictWrapper {
            storage,
            snapshot,
            external_modification: false,
            removed_tracked: None,
        }
    }

    pub fn storage(&self) -> &SharedDict {
        &self.storage
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Value under `key`, with any no-dependency marker peeled off.
    pub fn get(&self, key: &Key) -> Option<Value> {
        self.storage.get(key).map(Value::into_unmarked)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<Key> {
        self.storage.keys()
    }

    pub fn entries(&self) -> Vec<(Key, Value)> {
        self.storage.entries()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::Mapping(self.storage.entries())
    }

    pub fn is_externally_modified(&self) -> bool {
        self.external_modification
    }

    pub(crate) fn check_external_modification(&mut self) {
        if self.external_modification {
            return;
        }
        let diverged = match &self.snapshot {
            Some(snapshot) => *snapshot != *self.storage.borrow(),
            None => false,
        };
        if diverged {
            debug!(
                storage = ?self.storage,
                snapshot = ?self.snapshot,
                "dict modified outside its wrapper"
            );
            self.external_modification = true;
            self.snapshot = None;
        }
    }

    pub(crate) fn update_snapshot(&mut self) {
        if !self.external_modification {
            self.snapshot = Some(self.storage.entries());
        }
    }

    /// First non-string key that holds a tracked value, if any.
    pub fn non_string_trackable_key(&self) -> Option<Key> {
        self.storage
            .borrow()
            .iter()
            .find(|(k, v)| k.as_str().is_none() && v.is_trackable())
            .map(|(k, _)| k.clone())
    }

    /// String-keyed entries in sorted key order, filtered by `pick`.
    fn sorted_named<T>(&self, pick: impl Fn(&Value) -> Option<T>) -> Vec<(String, T)> {
        let mut named: Vec<(String, T)> = self
            .storage
            .borrow()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str()?.to_string(), pick(v)?)))
            .collect();
        named.sort_by(|a, b| a.0.cmp(&b.0));
        named
    }

    pub(crate) fn children(&self) -> Vec<(String, ObjectId)> {
        self.sorted_named(Value::as_object)
    }

    pub(crate) fn named_variables(&self) -> Vec<(String, VariableId)> {
        self.sorted_named(Value::as_variable)
    }

    pub(crate) fn validate(&mut self, object: &str) -> Result<()> {
        self.check_external_modification();
        if let Some(key) = self.non_string_trackable_key() {
            return Err(Error::UnsupportedKey {
                object: object.to_string(),
                key,
            });
        }
        if self.external_modification {
            return Err(Error::StructuralMutation {
                object: object.to_string(),
                reason: format!(
                    "the wrapped dictionary was modified outside the wrapper (its final value \
                     was {:?}), which breaks restoration on object creation. If you don't need \
                     this dictionary checkpointed, wrap it in a no-dependency marker",
                    self.storage
                ),
            });
        }
        if let Some(key) = &self.removed_tracked {
            return Err(Error::StructuralMutation {
                object: object.to_string(),
                reason: format!(
                    "the tracked entry {key} was removed from the wrapped dictionary, which \
                     breaks restoration on object creation"
                ),
            });
        }
        Ok(())
    }
}

/// State of a tuple wrapper: contents fixed at wrap time.
#[derive(Debug)]
pub struct TupleWrapper {
    values: Vec<Value>,
}

impl TupleWrapper {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.values.get(index).cloned().map(Value::into_unmarked)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::Sequence(self.values.clone())
    }

    pub(crate) fn children(&self) -> Vec<(String, ObjectId)> {
        indexed_children(&self.values)
    }

    pub(crate) fn named_variables(&self) -> Vec<(String, VariableId)> {
        indexed_variables(&self.values)
    }
}

impl Graph {
    pub(crate) fn wrap_list(&mut self, raw: SharedList) -> Result<ObjectId> {
        self.tracking_elements_of(Value::List(raw.clone()), "list", |g| {
            for index in 0..raw.len() {
                if let Some(element) = raw.get(index) {
                    let tracked = g.track_element(element)?;
                    raw.set(index, tracked);
                }
            }
            Ok(())
        })?;
        let len = raw.len();
        let name = self.unique_name("list");
        let id = self.insert_object(name, ObjectKind::List(ListWrapper::new(raw)));
        debug!(wrapper = ?id, len, "wrapped list");
        self.claim_element_variables(id)?;
        Ok(id)
    }

    pub(crate) fn wrap_dict(&mut self, raw: SharedDict) -> Result<ObjectId> {
        self.tracking_elements_of(Value::Dict(raw.clone()), "dict", |g| {
            for (key, value) in raw.entries() {
                let tracked = g.track_element(value)?;
                raw.insert(key, tracked);
            }
            Ok(())
        })?;
        let len = raw.len();
        let name = self.unique_name("dict");
        let id = self.insert_object(name, ObjectKind::Dict(DictWrapper::new(raw)));
        debug!(wrapper = ?id, len, "wrapped dict");
        self.claim_element_variables(id)?;
        Ok(id)
    }

    pub(crate) fn wrap_tuple(&mut self, items: Vec<Value>) -> Result<ObjectId> {
        let values = items
            .into_iter()
            .map(|v| self.track_element(v))
            .collect::<Result<Vec<_>>>()?;
        let name = self.unique_name("tuple");
        let id = self.insert_object(name, ObjectKind::Tuple(TupleWrapper { values }));
        debug!(wrapper = ?id, "wrapped tuple");
        self.claim_element_variables(id)?;
        Ok(id)
    }

    /// Run `track` over the elements of `raw`, failing if `raw` is already
    /// being wrapped further up the stack (a container that holds itself).
    fn tracking_elements_of(
        &mut self,
        raw: Value,
        kind: &str,
        track: impl FnOnce(&mut Graph) -> Result<()>,
    ) -> Result<()> {
        if self.wrapping.contains(&raw) {
            return Err(Error::msg(format!(
                "cannot wrap a {kind} that contains itself"
            )));
        }
        self.wrapping.push(raw);
        let result = track(self);
        self.wrapping.pop();
        result
    }

    fn claim_element_variables(&mut self, wrapper: ObjectId) -> Result<()> {
        for var in self.direct_variables(wrapper)? {
            self.claim_variable(var, wrapper)?;
        }
        Ok(())
    }

    /// Read access to a list wrapper.
    pub fn list(&self, id: ObjectId) -> Result<&ListWrapper> {
        match &self.object(id)?.kind {
            ObjectKind::List(w) => Ok(w),
            _ => Err(self.not_a(id, "list wrapper")),
        }
    }

    /// Mutating access to a list wrapper.
    pub fn list_mut(&mut self, id: ObjectId) -> Result<ListMut<'_>> {
        self.list(id)?;
        Ok(ListMut { graph: self, id })
    }

    pub fn dict(&self, id: ObjectId) -> Result<&DictWrapper> {
        match &self.object(id)?.kind {
            ObjectKind::Dict(w) => Ok(w),
            _ => Err(self.not_a(id, "dict wrapper")),
        }
    }

    pub fn dict_mut(&mut self, id: ObjectId) -> Result<DictMut<'_>> {
        self.dict(id)?;
        Ok(DictMut { graph: self, id })
    }

    pub fn tuple(&self, id: ObjectId) -> Result<&TupleWrapper> {
        match &self.object(id)?.kind {
            ObjectKind::Tuple(w) => Ok(w),
            _ => Err(self.not_a(id, "tuple wrapper")),
        }
    }

    /// Structural fingerprint of a wrapper.
    pub fn fingerprint(&self, id: ObjectId) -> Result<Fingerprint> {
        match &self.object(id)?.kind {
            ObjectKind::List(w) => Ok(w.fingerprint()),
            ObjectKind::Dict(w) => Ok(w.fingerprint()),
            ObjectKind::Tuple(w) => Ok(w.fingerprint()),
            _ => Err(self.not_a(id, "container wrapper")),
        }
    }

    fn list_state_mut(&mut self, id: ObjectId) -> Result<&mut ListWrapper> {
        let err = self.not_a(id, "list wrapper");
        match &mut self.object_mut(id)?.kind {
            ObjectKind::List(w) => Ok(w),
            _ => Err(err),
        }
    }

    fn dict_state_mut(&mut self, id: ObjectId) -> Result<&mut DictWrapper> {
        let err = self.not_a(id, "dict wrapper");
        match &mut self.object_mut(id)?.kind {
            ObjectKind::Dict(w) => Ok(w),
            _ => Err(err),
        }
    }

    fn not_a(&self, id: ObjectId, expected: &'static str) -> Error {
        Error::NotAContainer {
            object: self.describe(id),
            expected,
        }
    }
}

/// Mutating view of a list wrapper.
///
/// Every element added through this view passes the same tracking rules as
/// attribute assignment.
pub struct ListMut<'g> {
    graph: &'g mut Graph,
    id: ObjectId,
}

impl ListMut<'_> {
    fn state(&mut self) -> Result<&mut ListWrapper> {
        self.graph.list_state_mut(self.id)
    }

    fn track(&mut self, value: Value) -> Result<Value> {
        let value = self.graph.track_element(value)?;
        if let Value::Variable(var) = value {
            self.graph.claim_variable(var, self.id)?;
        }
        Ok(value)
    }

    pub fn len(&mut self) -> Result<usize> {
        Ok(self.state()?.len())
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.state()?.is_empty())
    }

    pub fn append(&mut self, value: impl Into<Value>) -> Result<()> {
        self.state()?.check_external_modification();
        let value = self.track(value.into())?;
        let state = self.state()?;
        state.storage.push(value);
        state.update_snapshot();
        Ok(())
    }

    pub fn extend(&mut self, values: impl IntoIterator<Item = Value>) -> Result<()> {
        for value in values {
            self.append(value)?;
        }
        Ok(())
    }

    /// `self += other` where `other` is a raw list or tuple, or a list or
    /// tuple wrapper.
    pub fn concat_assign(&mut self, other: &Value) -> Result<()> {
        let items = match other.unmarked() {
            Value::List(raw) => raw.to_vec(),
            Value::Tuple(items) => items.clone(),
            Value::Object(id) => match &self.graph.object(*id)?.kind {
                ObjectKind::List(w) => w.values(),
                ObjectKind::Tuple(w) => w.values().to_vec(),
                _ => return Err(self.graph.not_a(*id, "list or tuple wrapper")),
            },
            other => {
                return Err(Error::msg(format!(
                    "can only concatenate a list or tuple onto a list wrapper, got {other:?}"
                )))
            }
        };
        self.extend(items)
    }

    /// Overwrite the element at `index`.
    ///
    /// Replacing a tracked element with a different value marks the list as
    /// non-append mutated.
    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> Result<()> {
        self.state()?.check_external_modification();
        let len = self.state()?.len();
        if index >= len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        let value = self.track(value.into())?;
        let state = self.state()?;
        if let Some(old) = state.storage.get(index) {
            if old.is_trackable() && old != value {
                state.mark_non_append();
            }
        }
        state.storage.set(index, value);
        state.update_snapshot();
        Ok(())
    }

    pub fn insert(&mut self, index: usize, value: impl Into<Value>) -> Result<()> {
        self.state()?.check_external_modification();
        let value = self.track(value.into())?;
        let state = self.state()?;
        if state.has_mutation_or_trackable() || value.is_trackable() {
            state.mark_non_append();
        }
        state.storage.insert(index, value);
        state.update_snapshot();
        Ok(())
    }

    /// Remove and return the element at `index` (the last one when `None`).
    pub fn pop(&mut self, index: Option<usize>) -> Result<Value> {
        let state = self.state()?;
        state.check_external_modification();
        let len = state.len();
        let index = match index {
            Some(i) => i,
            None if len > 0 => len - 1,
            None => return Err(Error::IndexOutOfRange { index: 0, len }),
        };
        if index >= len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        if state.has_mutation_or_trackable() {
            state.mark_non_append();
        }
        let removed = state
            .storage
            .remove(index)
            .ok_or(Error::IndexOutOfRange { index, len })?;
        state.update_snapshot();
        Ok(removed.into_unmarked())
    }
}

/// Mutating view of a dict wrapper.
pub struct DictMut<'g> {
    graph: &'g mut Graph,
    id: ObjectId,
}

impl DictMut<'_> {
    fn state(&mut self) -> Result<&mut DictWrapper> {
        self.graph.dict_state_mut(self.id)
    }

    /// Assign `value` under `key`.
    ///
    /// Overwriting an existing key is always allowed; the key keeps its
    /// position and the new value takes over the key's name.
    pub fn set(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        self.state()?.check_external_modification();
        let value = self.graph.track_element(value.into())?;
        if let Value::Variable(var) = value {
            self.graph.claim_variable(var, self.id)?;
        }
        let state = self.state()?;
        state.storage.insert(key, value);
        state.update_snapshot();
        Ok(())
    }

    /// Remove `key`, returning its value.
    ///
    /// Removing a string key that held a tracked value blocks future saves.
    pub fn remove(&mut self, key: &Key) -> Result<Value> {
        let state = self.state()?;
        state.check_external_modification();
        let removed = state
            .storage
            .remove(key)
            .ok_or_else(|| Error::KeyNotFound(key.clone()))?;
        if key.as_str().is_some() && removed.is_trackable() && state.removed_tracked.is_none() {
            debug!(key = %key, "tracked dict entry removed");
            state.removed_tracked = Some(key.clone());
        }
        state.update_snapshot();
        Ok(removed.into_unmarked())
    }

    /// Assign every entry of `entries`, in order.
    pub fn update<K: Into<Key>>(&mut self, entries: impl IntoIterator<Item = (K, Value)>) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    pub fn len(&mut self) -> Result<usize> {
        Ok(self.state()?.len())
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.state()?.is_empty())
    }
}
