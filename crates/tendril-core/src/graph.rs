// Graph — the owning arena for objects and variables
//
// Every trackable object and every variable lives in one `Graph` and is
// addressed by a stable integer handle. Identity is the handle: two
// attribute paths that lead to the same `ObjectId` lead to the same object,
// which is what the walker deduplicates on.
//
// Nothing is ever removed from the arena. An object that is no longer
// reachable from a root simply stops showing up in traversals.
//
// The arena assumes a single writer. It is neither Send nor Sync (raw
// containers are `Rc`-shared), so concurrent mutation is ruled out by the
// type system rather than by locking.

use std::collections::{HashMap, HashSet};

use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::layer::{Layer, LayerState};
use crate::object::{Object, ObjectId, ObjectKind};
use crate::value::Value;
use crate::variable::{Variable, VariableBackend, VariableId};

/// Arena of trackable objects and variables.
#[derive(Debug, Default)]
pub struct Graph {
    pub(crate) objects: Vec<Object>,
    pub(crate) variables: Vec<Variable>,
    name_counts: HashMap<String, usize>,
    names: HashSet<String>,
    /// Raw containers whose elements are being tracked right now.
    pub(crate) wrapping: Vec<Value>,
}

impl Graph {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a plain trackable object.
    ///
    /// Names are made unique per prefix: `"model"`, `"model_1"`, ...
    pub fn create_module(&mut self, name: &str) -> ObjectId {
        let name = self.unique_name(name);
        self.insert_object(name, ObjectKind::Module)
    }

    /// Creates an object with the layer capability, backed by `behavior`.
    pub fn create_layer(&mut self, name: &str, behavior: Box<dyn Layer>) -> ObjectId {
        let name = self.unique_name(name);
        self.insert_object(name, ObjectKind::Layer(LayerState::new(behavior)))
    }

    /// Creates a variable that no object owns yet.
    ///
    /// It becomes owned by the first object it is attached to.
    pub fn create_variable(
        &mut self,
        name: &str,
        shape: Vec<usize>,
        dtype: DType,
        trainable: bool,
        data: Vec<f64>,
    ) -> Result<VariableId> {
        let var = Variable::new(name, shape, dtype, trainable, data)?;
        let id = VariableId(self.variables.len() as u32);
        self.variables.push(var);
        Ok(id)
    }

    /// Convenience: a scalar trainable `f32` variable.
    pub fn scalar_variable(&mut self, name: &str, value: f64) -> Result<VariableId> {
        self.create_variable(name, Vec::new(), DType::F32, true, vec![value])
    }

    pub fn object(&self, id: ObjectId) -> Result<&Object> {
        self.objects
            .get(id.0 as usize)
            .ok_or(Error::UnknownObject(id))
    }

    pub(crate) fn object_mut(&mut self, id: ObjectId) -> Result<&mut Object> {
        self.objects
            .get_mut(id.0 as usize)
            .ok_or(Error::UnknownObject(id))
    }

    pub fn variable(&self, id: VariableId) -> Result<&Variable> {
        self.variables
            .get(id.0 as usize)
            .ok_or(Error::UnknownVariable(id))
    }

    pub(crate) fn variable_mut(&mut self, id: VariableId) -> Result<&mut Variable> {
        self.variables
            .get_mut(id.0 as usize)
            .ok_or(Error::UnknownVariable(id))
    }

    /// Number of objects in the arena (reachable or not).
    pub fn num_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    /// Human-readable description used in error messages.
    pub fn describe(&self, id: ObjectId) -> String {
        match self.object(id) {
            Ok(obj) => format!("{} '{}'", obj.class_name(), obj.name()),
            Err(_) => format!("{id:?}"),
        }
    }

    pub(crate) fn insert_object(&mut self, name: String, kind: ObjectKind) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(Object::new(name, kind));
        id
    }

    pub(crate) fn unique_name(&mut self, prefix: &str) -> String {
        let count = self.name_counts.entry(prefix.to_string()).or_insert(0);
        loop {
            let name = if *count == 0 {
                prefix.to_string()
            } else {
                format!("{prefix}_{count}")
            };
            *count += 1;
            if self.names.insert(name.clone()) {
                return name;
            }
        }
    }

    /// Record `owner` as the variable's owner unless it already has one.
    pub(crate) fn claim_variable(&mut self, var: VariableId, owner: ObjectId) -> Result<()> {
        let v = self.variable_mut(var)?;
        if v.owner.is_none() {
            v.owner = Some(owner);
        }
        Ok(())
    }
}

impl VariableBackend for Graph {
    fn get_value(&self, var: VariableId) -> Result<Vec<f64>> {
        Ok(self.variable(var)?.values().to_vec())
    }

    fn set_value(&mut self, var: VariableId, buffer: &[f64]) -> Result<()> {
        self.variable_mut(var)?.write(buffer)
    }
}
