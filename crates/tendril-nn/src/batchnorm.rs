// BatchNormalization — per-feature normalization with moving statistics
//
// Built for an input of width C, the layer owns
//
//   gamma:           [C]  trainable, ones
//   beta:            [C]  trainable, zeros
//   moving_mean:     [C]  non-trainable, zeros
//   moving_variance: [C]  non-trainable, ones
//
// MOVING STATISTICS:
//
// The moving averages are not trained; they are updated from observed batch
// statistics:
//
//   moving = momentum * moving + (1 - momentum) * batch
//
// `record_batch_statistics` queues those two updates on the layer. They run
// when a root that reaches the layer calls `apply_updates`, which is how a
// model picks up the updates of every layer it contains.

use tendril_core::{bail, BuildContext, DType, Graph, Layer, ObjectId, Result, Value};

use crate::init::Initializer;

/// Batch normalization over a feature axis of width C.
#[derive(Debug, Clone)]
pub struct BatchNormalization {
    momentum: f64,
    epsilon: f64,
    dtype: DType,
}

impl Default for BatchNormalization {
    fn default() -> Self {
        BatchNormalization {
            momentum: 0.99,
            epsilon: 1e-3,
            dtype: DType::F32,
        }
    }
}

impl BatchNormalization {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn momentum(mut self, momentum: f64) -> Self {
        self.momentum = momentum;
        self
    }

    pub fn epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn dtype(mut self, dtype: DType) -> Self {
        self.dtype = dtype;
        self
    }

    /// Add the layer to `graph`. Momentum and epsilon are stored as plain
    /// attributes so update code can read them back.
    pub fn create(self, graph: &mut Graph) -> Result<ObjectId> {
        let (momentum, epsilon) = (self.momentum, self.epsilon);
        let id = graph.create_layer("batch_normalization", Box::new(self));
        graph.set_attr(id, "momentum", momentum)?;
        graph.set_attr(id, "epsilon", epsilon)?;
        Ok(id)
    }
}

impl Layer for BatchNormalization {
    fn class_name(&self) -> &'static str {
        "BatchNormalization"
    }

    fn build(&mut self, ctx: &mut BuildContext<'_>, input_dim: usize) -> Result<usize> {
        let shape = vec![input_dim];
        let weights = [
            ("gamma", Initializer::Ones, true),
            ("beta", Initializer::Zeros, true),
            ("moving_mean", Initializer::Zeros, false),
            ("moving_variance", Initializer::Ones, false),
        ];
        for (name, init, trainable) in weights {
            let data = init.generate(&shape, None);
            ctx.add_weight(name, shape.clone(), self.dtype, trainable, data)?;
        }
        Ok(input_dim)
    }
}

/// Queue moving-average updates of `layer` from one batch's statistics.
pub fn record_batch_statistics(
    graph: &mut Graph,
    layer: ObjectId,
    mean: &[f64],
    variance: &[f64],
) -> Result<()> {
    let momentum = match graph.get_attr(layer, "momentum")? {
        Some(Value::Float(m)) => *m,
        _ => bail!("{} has no momentum attribute", graph.describe(layer)),
    };
    let targets = [
        (graph.weight(layer, "moving_mean")?, mean.to_vec()),
        (graph.weight(layer, "moving_variance")?, variance.to_vec()),
    ];
    for (var, batch) in targets {
        let expected = graph.variable(var)?.elem_count();
        if batch.len() != expected {
            bail!(
                "batch statistics of width {} do not match {} features",
                batch.len(),
                expected
            );
        }
        graph.add_update(layer, var, move |moving| {
            moving
                .iter()
                .zip(&batch)
                .map(|(m, b)| momentum * m + (1.0 - momentum) * b)
                .collect()
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_split_by_trainability() -> Result<()> {
        let mut g = Graph::new();
        let bn = BatchNormalization::new().create(&mut g)?;
        g.build(bn, Some(3))?;
        assert_eq!(g.trainable_variables(bn)?.len(), 2);
        assert_eq!(g.non_trainable_variables(bn)?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_batch_statistics_update_moving_averages() -> Result<()> {
        let mut g = Graph::new();
        let bn = BatchNormalization::new()
            .momentum(0.5)
            .dtype(DType::F64)
            .create(&mut g)?;
        g.build(bn, Some(2))?;
        record_batch_statistics(&mut g, bn, &[2.0, 4.0], &[3.0, 3.0])?;
        assert_eq!(g.updates(bn)?.len(), 2);
        assert_eq!(g.apply_updates(bn)?, 2);
        let mean = g.weight(bn, "moving_mean")?;
        let var = g.weight(bn, "moving_variance")?;
        assert_eq!(g.variable(mean)?.values(), &[1.0, 2.0]);
        assert_eq!(g.variable(var)?.values(), &[2.0, 2.0]);
        Ok(())
    }

    #[test]
    fn test_statistics_width_checked() -> Result<()> {
        let mut g = Graph::new();
        let bn = BatchNormalization::new().create(&mut g)?;
        g.build(bn, Some(2))?;
        assert!(record_batch_statistics(&mut g, bn, &[1.0], &[1.0, 1.0]).is_err());
        Ok(())
    }
}
