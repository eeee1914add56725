// Model — a layer composed from layers assigned as attributes
//
// A Model carries no weights of its own by default. Sublayers are attached
// with `Graph::set_attr`, directly or inside lists, dicts, and tuples, and
// building the model builds every layer `Graph::layers` reports, in
// attribute order, chaining widths from one to the next.

use tendril_core::{BuildContext, Graph, Layer, ObjectId, Result};

/// A layer assembled from attribute-assigned sublayers.
#[derive(Debug, Clone, Default)]
pub struct Model {
    input_dim: Option<usize>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input_dim(mut self, dim: usize) -> Self {
        self.input_dim = Some(dim);
        self
    }

    pub fn create(self, graph: &mut Graph) -> ObjectId {
        graph.create_layer("model", Box::new(self))
    }
}

impl Layer for Model {
    fn class_name(&self) -> &'static str {
        "Model"
    }

    fn input_dim(&self) -> Option<usize> {
        self.input_dim
    }

    fn build(&mut self, ctx: &mut BuildContext<'_>, input_dim: usize) -> Result<usize> {
        let me = ctx.layer();
        let graph = ctx.graph();
        let mut dim = input_dim;
        for layer in graph.layers(me)? {
            dim = graph.build(layer, Some(dim))?;
        }
        Ok(dim)
    }
}
