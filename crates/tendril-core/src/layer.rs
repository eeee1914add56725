// Layer — the "model/layer" capability of a trackable object
//
// A layer is a trackable object that additionally:
//
//   - has a class name and (optionally) a unit count, used for reporting;
//   - is built once for a given input width, creating its weights;
//   - can be frozen (`trainable = false`), which makes every variable
//     reached through it non-trainable during aggregation;
//   - collects regularization losses and pending variable updates that the
//     walker forwards to whichever root asks for them.
//
// The layer-specific behavior lives behind the `Layer` trait object. The
// bookkeeping every layer shares (built state, losses, updates, the frozen
// flag) lives in `LayerState`, owned by the arena next to the object.
//
// BUILDING:
//
// `Graph::build` takes the behavior out of the arena for the duration of the
// call, hands it a `BuildContext` with mutable access to the graph, and puts
// it back afterwards. A composite layer can therefore build its sublayers
// from inside its own `build`. Re-entering the same layer is a construction
// error.

use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::object::{ObjectId, ObjectKind};
use crate::value::Key;
use crate::variable::VariableId;

/// Layer-specific behavior.
pub trait Layer: fmt::Debug {
    /// Class name used in error messages and unique naming.
    fn class_name(&self) -> &'static str;

    /// Output width, for layers that declare one up front.
    fn units(&self) -> Option<usize> {
        None
    }

    /// Input width the layer was configured with, if any.
    fn input_dim(&self) -> Option<usize> {
        None
    }

    /// Create the layer's weights for inputs of width `input_dim`.
    /// Returns the output width.
    fn build(&mut self, ctx: &mut BuildContext<'_>, input_dim: usize) -> Result<usize>;
}

/// A penalty computed from a variable's current value.
pub type Regularizer = Rc<dyn Fn(&[f64]) -> f64>;

/// A regularization loss registered on a layer.
#[derive(Clone)]
pub struct LossTerm {
    pub variable: VariableId,
    pub regularizer: Regularizer,
}

impl fmt::Debug for LossTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LossTerm")
            .field("variable", &self.variable)
            .finish_non_exhaustive()
    }
}

/// A pending in-place update: `variable <- compute(variable)`.
pub struct Update {
    pub variable: VariableId,
    pub compute: Box<dyn Fn(&[f64]) -> Vec<f64>>,
}

impl fmt::Debug for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Update")
            .field("variable", &self.variable)
            .finish_non_exhaustive()
    }
}

/// Bookkeeping shared by every layer.
pub struct LayerState {
    behavior: Option<Box<dyn Layer>>,
    class_name: &'static str,
    pub(crate) trainable: bool,
    /// `(input width, output width)` once built.
    built: Option<(usize, usize)>,
    pub(crate) losses: Vec<LossTerm>,
    pub(crate) updates: Vec<Update>,
}

impl LayerState {
    pub(crate) fn new(behavior: Box<dyn Layer>) -> Self {
        LayerState {
            class_name: behavior.class_name(),
            behavior: Some(behavior),
            trainable: true,
            built: None,
            losses: Vec::new(),
            updates: Vec::new(),
        }
    }

    pub fn class_name(&self) -> &'static str {
        self.class_name
    }

    pub fn behavior(&self) -> Option<&dyn Layer> {
        self.behavior.as_deref()
    }

    pub fn trainable(&self) -> bool {
        self.trainable
    }

    pub fn built(&self) -> Option<(usize, usize)> {
        self.built
    }

    pub fn losses(&self) -> &[LossTerm] {
        &self.losses
    }

    pub fn updates(&self) -> &[Update] {
        &self.updates
    }
}

impl fmt::Debug for LayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerState")
            .field("behavior", &self.behavior)
            .field("trainable", &self.trainable)
            .field("built", &self.built)
            .field("losses", &self.losses.len())
            .field("updates", &self.updates.len())
            .finish()
    }
}

/// Handed to [`Layer::build`]: the graph plus the layer being built.
pub struct BuildContext<'g> {
    graph: &'g mut Graph,
    layer: ObjectId,
}

impl<'g> BuildContext<'g> {
    pub fn layer(&self) -> ObjectId {
        self.layer
    }

    pub fn graph(&mut self) -> &mut Graph {
        self.graph
    }

    /// Create a weight owned by the layer being built.
    pub fn add_weight(
        &mut self,
        name: &str,
        shape: Vec<usize>,
        dtype: DType,
        trainable: bool,
        data: Vec<f64>,
    ) -> Result<VariableId> {
        self.graph
            .add_weight(self.layer, name, shape, dtype, trainable, data)
    }

    /// Register a regularization loss on the layer being built.
    pub fn add_loss(&mut self, variable: VariableId, regularizer: Regularizer) -> Result<()> {
        self.graph.add_loss(self.layer, variable, regularizer)
    }
}

impl Graph {
    /// Bookkeeping of layer `id`.
    pub fn layer_state(&self, id: ObjectId) -> Result<&LayerState> {
        match &self.object(id)?.kind {
            ObjectKind::Layer(state) => Ok(state),
            _ => Err(Error::msg(format!("{} is not a layer", self.describe(id)))),
        }
    }

    pub(crate) fn layer_state_mut(&mut self, id: ObjectId) -> Result<&mut LayerState> {
        let err = Error::msg(format!("{} is not a layer", self.describe(id)));
        match &mut self.object_mut(id)?.kind {
            ObjectKind::Layer(state) => Ok(state),
            _ => Err(err),
        }
    }

    /// Build `layer` for inputs of width `input_dim`, returning the output
    /// width.
    ///
    /// The width falls back to the one the layer was configured with. A
    /// layer is built once; building it again with the same width is a
    /// no-op, with a different width a construction error.
    pub fn build(&mut self, layer: ObjectId, input_dim: Option<usize>) -> Result<usize> {
        let describe = self.describe(layer);
        let state = self.layer_state_mut(layer)?;
        let Some(mut behavior) = state.behavior.take() else {
            return Err(Error::Construction(format!(
                "{describe} is already being built"
            )));
        };
        let resolved = input_dim.or_else(|| behavior.input_dim());
        let result = match (resolved, state.built) {
            (None, _) => Err(Error::Construction(format!(
                "cannot build {describe}: the input width is unknown and could not be inferred; \
                 pass an input width or configure one on the layer"
            ))),
            (Some(0), _) => Err(Error::Construction(format!(
                "cannot build {describe} with an input width of 0"
            ))),
            (Some(dim), Some((built_in, built_out))) => {
                if dim == built_in {
                    Ok(built_out)
                } else {
                    Err(Error::Construction(format!(
                        "{describe} was built for input width {built_in}, got {dim}"
                    )))
                }
            }
            (Some(dim), None) => {
                let mut ctx = BuildContext { graph: self, layer };
                behavior.build(&mut ctx, dim).map(|out| {
                    debug!(layer = %describe, input = dim, output = out, "built layer");
                    out
                })
            }
        };
        // Put the behavior back even when building failed.
        let state = self.layer_state_mut(layer)?;
        state.behavior = Some(behavior);
        if let (Some(dim), Ok(out)) = (resolved, &result) {
            if state.built.is_none() {
                state.built = Some((dim, *out));
            }
        }
        result
    }

    pub fn is_built(&self, layer: ObjectId) -> Result<bool> {
        Ok(self.layer_state(layer)?.built.is_some())
    }

    /// Freeze or unfreeze a layer.
    pub fn set_trainable(&mut self, layer: ObjectId, trainable: bool) -> Result<()> {
        self.layer_state_mut(layer)?.trainable = trainable;
        Ok(())
    }

    /// Declared unit count of `layer`.
    pub fn layer_units(&self, layer: ObjectId) -> Result<Option<usize>> {
        Ok(self
            .layer_state(layer)?
            .behavior()
            .and_then(|b| b.units()))
    }

    /// Create a variable owned directly by `owner` under `name`.
    pub fn add_weight(
        &mut self,
        owner: ObjectId,
        name: &str,
        shape: Vec<usize>,
        dtype: DType,
        trainable: bool,
        data: Vec<f64>,
    ) -> Result<VariableId> {
        self.object(owner)?;
        let var = self.create_variable(name, shape, dtype, trainable, data)?;
        self.claim_variable(var, owner)?;
        self.object_mut(owner)?.set_variable(name, var);
        Ok(var)
    }

    /// Weight `name` of a built layer.
    pub fn weight(&self, layer: ObjectId, name: &str) -> Result<VariableId> {
        if self.layer_state(layer)?.built.is_none() {
            return Err(Error::Construction(format!(
                "{} has not been built yet; its weights are created on build",
                self.describe(layer)
            )));
        }
        self.object(layer)?
            .variables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
            .ok_or_else(|| Error::KeyNotFound(Key::from(name)))
    }

    pub fn add_loss(
        &mut self,
        layer: ObjectId,
        variable: VariableId,
        regularizer: Regularizer,
    ) -> Result<()> {
        self.variable(variable)?;
        self.layer_state_mut(layer)?
            .losses
            .push(LossTerm { variable, regularizer });
        Ok(())
    }

    /// Queue an update of `variable` on `layer`, applied by
    /// [`apply_updates`](Graph::apply_updates).
    pub fn add_update(
        &mut self,
        layer: ObjectId,
        variable: VariableId,
        compute: impl Fn(&[f64]) -> Vec<f64> + 'static,
    ) -> Result<()> {
        self.variable(variable)?;
        self.layer_state_mut(layer)?.updates.push(Update {
            variable,
            compute: Box::new(compute),
        });
        Ok(())
    }
}
