// Dense — fully-connected layer
//
// Dense(units) maps inputs of width `in` to width `units`. Only the weights
// matter here: the layer is built once for a given input width and owns
//
//   kernel: [in, units]   — trainable, Kaiming uniform by default
//   bias:   [units]       — trainable, zeros by default (optional)
//
// Regularizers given on the builder are registered as layer losses on
// build, one per regularized weight.

use std::fmt;

use tracing::debug;

use tendril_core::{BuildContext, DType, Graph, Layer, ObjectId, Regularizer, Result};

use crate::init::Initializer;

/// A fully-connected layer.
///
/// # Examples
/// ```ignore
/// let dense = Dense::new(4).input_dim(2).kernel_regularizer(l2(0.01)).create(&mut graph);
/// graph.build(dense, None)?;
/// ```
#[derive(Clone)]
pub struct Dense {
    units: usize,
    input_dim: Option<usize>,
    use_bias: bool,
    dtype: DType,
    kernel_initializer: Initializer,
    bias_initializer: Initializer,
    kernel_regularizer: Option<Regularizer>,
    bias_regularizer: Option<Regularizer>,
    seed: Option<u64>,
}

impl Dense {
    pub fn new(units: usize) -> Self {
        Dense {
            units,
            input_dim: None,
            use_bias: true,
            dtype: DType::F32,
            kernel_initializer: Initializer::KaimingUniform,
            bias_initializer: Initializer::Zeros,
            kernel_regularizer: None,
            bias_regularizer: None,
            seed: None,
        }
    }

    /// Fix the input width so the layer can be built without one.
    pub fn input_dim(mut self, dim: usize) -> Self {
        self.input_dim = Some(dim);
        self
    }

    pub fn use_bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }

    pub fn dtype(mut self, dtype: DType) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn kernel_initializer(mut self, init: Initializer) -> Self {
        self.kernel_initializer = init;
        self
    }

    pub fn bias_initializer(mut self, init: Initializer) -> Self {
        self.bias_initializer = init;
        self
    }

    pub fn kernel_regularizer(mut self, reg: Regularizer) -> Self {
        self.kernel_regularizer = Some(reg);
        self
    }

    pub fn bias_regularizer(mut self, reg: Regularizer) -> Self {
        self.bias_regularizer = Some(reg);
        self
    }

    /// Seed weight initialization for reproducible builds.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Add the layer to `graph`, named `dense`, `dense_1`, ...
    pub fn create(self, graph: &mut Graph) -> ObjectId {
        graph.create_layer("dense", Box::new(self))
    }
}

impl fmt::Debug for Dense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dense")
            .field("units", &self.units)
            .field("input_dim", &self.input_dim)
            .field("use_bias", &self.use_bias)
            .field("dtype", &self.dtype)
            .field("kernel_regularizer", &self.kernel_regularizer.is_some())
            .field("bias_regularizer", &self.bias_regularizer.is_some())
            .finish()
    }
}

impl Layer for Dense {
    fn class_name(&self) -> &'static str {
        "Dense"
    }

    fn units(&self) -> Option<usize> {
        Some(self.units)
    }

    fn input_dim(&self) -> Option<usize> {
        self.input_dim
    }

    fn build(&mut self, ctx: &mut BuildContext<'_>, input_dim: usize) -> Result<usize> {
        let kernel_shape = vec![input_dim, self.units];
        let data = self.kernel_initializer.generate(&kernel_shape, self.seed);
        let kernel = ctx.add_weight("kernel", kernel_shape, self.dtype, true, data)?;
        if let Some(reg) = &self.kernel_regularizer {
            ctx.add_loss(kernel, reg.clone())?;
        }

        if self.use_bias {
            let bias_shape = vec![self.units];
            let data = self.bias_initializer.generate(&bias_shape, self.seed);
            let bias = ctx.add_weight("bias", bias_shape, self.dtype, true, data)?;
            if let Some(reg) = &self.bias_regularizer {
                ctx.add_loss(bias, reg.clone())?;
            }
        }
        debug!(units = self.units, input_dim, "dense weights created");
        Ok(self.units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regularizer::l2;

    #[test]
    fn test_build_creates_kernel_and_bias() -> Result<()> {
        let mut g = Graph::new();
        let dense = Dense::new(3).create(&mut g);
        assert_eq!(g.build(dense, Some(2))?, 3);
        let kernel = g.weight(dense, "kernel")?;
        let bias = g.weight(dense, "bias")?;
        assert_eq!(g.variable(kernel)?.shape(), &[2, 3]);
        assert_eq!(g.variable(bias)?.values(), &[0.0, 0.0, 0.0]);
        assert_eq!(g.variables(dense)?, vec![kernel, bias]);
        Ok(())
    }

    #[test]
    fn test_configured_input_dim_is_used() -> Result<()> {
        let mut g = Graph::new();
        let dense = Dense::new(1).input_dim(4).use_bias(false).create(&mut g);
        g.build(dense, None)?;
        assert_eq!(g.direct_variables(dense)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_regularizers_become_losses() -> Result<()> {
        let mut g = Graph::new();
        let dense = Dense::new(2)
            .kernel_initializer(Initializer::Ones)
            .kernel_regularizer(l2(0.5))
            .bias_regularizer(l2(1.0))
            .create(&mut g);
        g.build(dense, Some(2))?;
        assert_eq!(g.losses(dense)?, vec![2.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_names_are_unique() {
        let mut g = Graph::new();
        let a = Dense::new(1).create(&mut g);
        let b = Dense::new(1).create(&mut g);
        assert_eq!(g.object(a).unwrap().name(), "dense");
        assert_eq!(g.object(b).unwrap().name(), "dense_1");
    }
}
