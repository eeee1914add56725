// nn::init — weight initializers
//
// Initializers produce the flat f64 buffer a layer hands to `add_weight`.
// Values are quantized by the variable on write, so an initializer does not
// need to know the target dtype.
//
// AVAILABLE INITIALIZERS:
//
//   Zeros                        — all zeros
//   Ones                         — all ones
//   Constant(v)                  — all elements = v
//   Uniform { low, high }        — U(low, high)
//   KaimingUniform               — U(-k, k) with k = sqrt(1 / fan_in)
//
// Sampling uses `thread_rng` unless a seed is given, in which case a
// `StdRng` seeded from it makes initialization reproducible.

use rand::rngs::StdRng;
use rand::{thread_rng, Rng, SeedableRng};

/// How to fill a new weight.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Initializer {
    Zeros,
    Ones,
    Constant(f64),
    Uniform {
        low: f64,
        high: f64,
    },
    /// Uniform in `[-k, k]`, `k = sqrt(1 / fan_in)`.
    #[default]
    KaimingUniform,
}

/// Fan-in of a weight shape: the first dimension for kernels laid out as
/// `[in, out]`, the only dimension for vectors.
fn fan_in(shape: &[usize]) -> f64 {
    match shape {
        [] => 1.0,
        [n] => *n as f64,
        [n, ..] => *n as f64,
    }
}

impl Initializer {
    /// Fill a buffer for `shape`, seeding the generator when `seed` is set.
    pub fn generate(self, shape: &[usize], seed: Option<u64>) -> Vec<f64> {
        match seed {
            Some(seed) => self.sample(shape, &mut StdRng::seed_from_u64(seed)),
            None => self.sample(shape, &mut thread_rng()),
        }
    }

    /// Fill a buffer for `shape` from `rng`.
    pub fn sample<R: Rng + ?Sized>(self, shape: &[usize], rng: &mut R) -> Vec<f64> {
        let n: usize = shape.iter().product();
        match self {
            Initializer::Zeros => vec![0.0; n],
            Initializer::Ones => vec![1.0; n],
            Initializer::Constant(v) => vec![v; n],
            Initializer::Uniform { low, high } => uniform(n, low, high, rng),
            Initializer::KaimingUniform => {
                let k = (1.0 / fan_in(shape).max(1.0)).sqrt();
                uniform(n, -k, k, rng)
            }
        }
    }
}

fn uniform<R: Rng + ?Sized>(n: usize, low: f64, high: f64, rng: &mut R) -> Vec<f64> {
    if high <= low {
        return vec![low; n];
    }
    (0..n).map(|_| rng.gen_range(low..high)).collect()
}
