// Sequential — a chain of layers built one after another
//
// A Sequential is a layer whose sublayers live in a tracked list attribute
// named `layers`. Adding a layer appends to that list through its wrapper,
// so the sublayers are ordinary children of the graph: they show up in
// traversal, aggregation, and checkpoint paths (`layers/0/kernel`, ...).
//
// Building a Sequential builds each sublayer in order, feeding the output
// width of one layer into the next.

use tendril_core::{BuildContext, Error, Graph, Layer, ObjectId, Result, Value};

/// A layer that chains its sublayers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

const LAYERS: &str = "layers";

impl Sequential {
    /// Add an empty Sequential to `graph`.
    pub fn create(graph: &mut Graph) -> Result<ObjectId> {
        let id = graph.create_layer("sequential", Box::new(Sequential));
        graph.set_attr(id, LAYERS, Value::list([]))?;
        Ok(id)
    }

    /// Append `layer` to the end of the chain.
    pub fn add(graph: &mut Graph, sequential: ObjectId, layer: ObjectId) -> Result<()> {
        let list = Self::layer_list(graph, sequential)?;
        graph.list_mut(list)?.append(layer)
    }

    /// The wrapper holding the chain.
    pub fn layer_list(graph: &Graph, sequential: ObjectId) -> Result<ObjectId> {
        graph
            .get_attr(sequential, LAYERS)?
            .and_then(Value::as_object)
            .ok_or_else(|| {
                Error::Construction(format!(
                    "{} has no layer list",
                    graph.describe(sequential)
                ))
            })
    }
}

impl Layer for Sequential {
    fn class_name(&self) -> &'static str {
        "Sequential"
    }

    fn build(&mut self, ctx: &mut BuildContext<'_>, input_dim: usize) -> Result<usize> {
        let me = ctx.layer();
        let graph = ctx.graph();
        let list = Self::layer_list(graph, me)?;
        let mut dim = input_dim;
        for layer in graph.layers(list)? {
            dim = graph.build(layer, Some(dim))?;
        }
        Ok(dim)
    }
}
