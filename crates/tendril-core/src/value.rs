// Value — what an attribute or container element can hold
//
// Attribute assignment and container mutation both move `Value`s around.
// A value is either plain data (numbers, strings), a handle into the arena
// (an object or a variable), a raw container, or a value wrapped in the
// no-dependency marker.
//
// RAW CONTAINERS ARE SHARED:
//
// `SharedList` and `SharedDict` are reference-counted handles. A caller can
// keep a clone of the handle after assigning it as an attribute; the wrapper
// built on assignment adopts the same storage. Mutating through the kept
// alias bypasses the wrapper, which is exactly what snapshot comparison
// detects before a save.
//
// EQUALITY:
//
// Objects, variables, and shared containers compare by identity; scalars
// compare by value (floats by bit pattern, so a NaN equals itself). This is
// the equality used for wrapper fingerprints.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::object::ObjectId;
use crate::variable::VariableId;

/// A mapping key. Only string keys can carry tracked values.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Str(String),
    Int(i64),
}

impl Key {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::Str(s) => Some(s),
            Key::Int(_) => None,
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(s) => write!(f, "'{s}'"),
            Key::Int(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

/// A shared, mutable, ordered sequence.
#[derive(Clone, Default)]
pub struct SharedList(Rc<RefCell<Vec<Value>>>);

impl SharedList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: Vec<Value>) -> Self {
        SharedList(Rc::new(RefCell::new(values)))
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.0.borrow_mut().push(value.into());
    }

    /// Insert at `index`, clamped to the end of the list.
    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        let mut items = self.0.borrow_mut();
        let index = index.min(items.len());
        items.insert(index, value.into());
    }

    pub fn remove(&self, index: usize) -> Option<Value> {
        let mut items = self.0.borrow_mut();
        (index < items.len()).then(|| items.remove(index))
    }

    /// Replace the element at `index`, returning the previous one.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Option<Value> {
        let mut items = self.0.borrow_mut();
        items
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, value.into()))
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Shallow copy of the current contents.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    /// Whether both handles point at the same storage.
    pub fn ptr_eq(&self, other: &SharedList) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn borrow(&self) -> Ref<'_, Vec<Value>> {
        self.0.borrow()
    }
}

impl PartialEq for SharedList {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for SharedList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(items) => f.debug_list().entries(items.iter()).finish(),
            Err(_) => f.write_str("[<borrowed>]"),
        }
    }
}

/// A shared, mutable mapping that keeps insertion order.
#[derive(Clone, Default)]
pub struct SharedDict(Rc<RefCell<Vec<(Key, Value)>>>);

impl SharedDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<(Key, Value)>) -> Self {
        let dict = SharedDict::new();
        for (k, v) in entries {
            dict.insert(k, v);
        }
        dict
    }

    /// Insert or overwrite, keeping the original position of an existing key.
    pub fn insert(&self, key: impl Into<Key>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        let mut entries = self.0.borrow_mut();
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &Key) -> Option<Value> {
        self.0
            .borrow()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn remove(&self, key: &Key) -> Option<Value> {
        let mut entries = self.0.borrow_mut();
        let pos = entries.iter().position(|(k, _)| k == key)?;
        Some(entries.remove(pos).1)
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.0.borrow().iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> Vec<Key> {
        self.0.borrow().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Shallow copy of the current entries, in insertion order.
    pub fn entries(&self) -> Vec<(Key, Value)> {
        self.0.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn ptr_eq(&self, other: &SharedDict) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn borrow(&self) -> Ref<'_, Vec<(Key, Value)>> {
        self.0.borrow()
    }
}

impl PartialEq for SharedDict {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for SharedDict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(entries) => f
                .debug_map()
                .entries(entries.iter().map(|(k, v)| (k, v)))
                .finish(),
            Err(_) => f.write_str("{<borrowed>}"),
        }
    }
}

/// Anything that can be stored as an attribute or a container element.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A trackable object in the arena.
    Object(ObjectId),
    Variable(VariableId),
    /// A raw list; wrapped into a list wrapper when tracked.
    List(SharedList),
    /// A raw dictionary; wrapped into a dict wrapper when tracked.
    Dict(SharedDict),
    /// A raw fixed-size tuple; wrapped into a tuple wrapper when tracked.
    Tuple(Vec<Value>),
    /// Opt-out marker: the inner value is stored but never becomes a dependency.
    NoDependency(Box<Value>),
}

impl Value {
    /// A fresh raw list holding `values`.
    pub fn list(values: impl IntoIterator<Item = Value>) -> Self {
        Value::List(SharedList::from_values(values.into_iter().collect()))
    }

    /// A fresh raw dictionary holding `entries`.
    pub fn dict<K: Into<Key>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Dict(SharedDict::from_entries(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn tuple(values: impl IntoIterator<Item = Value>) -> Self {
        Value::Tuple(values.into_iter().collect())
    }

    /// Mark `value` as excluded from the dependency graph.
    pub fn no_dependency(value: impl Into<Value>) -> Self {
        Value::NoDependency(Box::new(value.into()))
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<VariableId> {
        match self {
            Value::Variable(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_no_dependency(&self) -> bool {
        matches!(self, Value::NoDependency(_))
    }

    /// The value with any no-dependency markers peeled off.
    pub fn unmarked(&self) -> &Value {
        let mut value = self;
        while let Value::NoDependency(inner) = value {
            value = inner;
        }
        value
    }

    /// Owned variant of [`unmarked`](Self::unmarked).
    pub fn into_unmarked(self) -> Value {
        let mut value = self;
        while let Value::NoDependency(inner) = value {
            value = *inner;
        }
        value
    }

    /// Whether this value is a graph dependency when held by a container:
    /// an arena object or variable not hidden behind the opt-out marker.
    pub fn is_trackable(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Variable(_))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Variable(a), Value::Variable(b)) => a == b,
            (Value::List(a), Value::List(b)) => a.ptr_eq(b),
            (Value::Dict(a), Value::Dict(b)) => a.ptr_eq(b),
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::NoDependency(a), Value::NoDependency(b)) => a == b,
            _ => false,
        }
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::Object(id)
    }
}

impl From<VariableId> for Value {
    fn from(id: VariableId) -> Self {
        Value::Variable(id)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<SharedList> for Value {
    fn from(list: SharedList) -> Self {
        Value::List(list)
    }
}

impl From<SharedDict> for Value {
    fn from(dict: SharedDict) -> Self {
        Value::Dict(dict)
    }
}
