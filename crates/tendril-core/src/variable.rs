// Variable — a named, shaped numeric buffer with a trainability flag
//
// Variables live in the arena next to objects and are addressed by
// `VariableId`. Each variable is owned by at most one object: the layer that
// created it, or the first object it was attached to as an attribute or
// container element. Aggregated lists on ancestors only hold ids.

use std::fmt;

use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::object::ObjectId;

/// A handle to a variable in a [`Graph`](crate::Graph).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(pub(crate) u32);

impl VariableId {
    /// Raw slot index (for diagnostics only).
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VariableId({})", self.0)
    }
}

/// A variable's metadata and current value.
#[derive(Debug, Clone)]
pub struct Variable {
    name: String,
    shape: Vec<usize>,
    dtype: DType,
    trainable: bool,
    data: Vec<f64>,
    pub(crate) owner: Option<ObjectId>,
}

impl Variable {
    pub(crate) fn new(
        name: &str,
        shape: Vec<usize>,
        dtype: DType,
        trainable: bool,
        data: Vec<f64>,
    ) -> Result<Self> {
        let mut var = Variable {
            name: name.to_string(),
            shape,
            dtype,
            trainable,
            data: Vec::new(),
            owner: None,
        };
        var.write(&data)?;
        Ok(var)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// The variable's own flag; a frozen enclosing layer can still make it
    /// non-trainable during aggregation.
    pub fn trainable(&self) -> bool {
        self.trainable
    }

    /// Number of scalar elements implied by the shape.
    pub fn elem_count(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn owner(&self) -> Option<ObjectId> {
        self.owner
    }

    pub fn values(&self) -> &[f64] {
        &self.data
    }

    /// Replace the buffer, quantizing every element to the variable's dtype.
    pub(crate) fn write(&mut self, data: &[f64]) -> Result<()> {
        let expected = self.elem_count();
        if data.len() != expected {
            return Err(Error::ElementCountMismatch {
                name: self.name.clone(),
                expected,
                got: data.len(),
            });
        }
        let dtype = self.dtype;
        self.data = data.iter().map(|&v| dtype.quantize(v)).collect();
        Ok(())
    }
}

/// Storage seam for variable values.
///
/// The arena implements this directly; checkpoint restore and update
/// application only go through this trait.
pub trait VariableBackend {
    /// Copy out the current buffer.
    fn get_value(&self, var: VariableId) -> Result<Vec<f64>>;

    /// Overwrite the buffer. Fails if the element count does not match the shape.
    fn set_value(&mut self, var: VariableId, buffer: &[f64]) -> Result<()>;

    /// In-place assignment issued by a layer's computation.
    fn assign(&mut self, var: VariableId, buffer: &[f64]) -> Result<()> {
        self.set_value(var, buffer)
    }

    /// `var += delta`, element-wise.
    fn assign_add(&mut self, var: VariableId, delta: &[f64]) -> Result<()> {
        let current = self.get_value(var)?;
        if current.len() != delta.len() {
            return Err(Error::ElementCountMismatch {
                name: format!("{var:?}"),
                expected: current.len(),
                got: delta.len(),
            });
        }
        let next: Vec<f64> = current.iter().zip(delta).map(|(a, b)| a + b).collect();
        self.assign(var, &next)
    }
}
