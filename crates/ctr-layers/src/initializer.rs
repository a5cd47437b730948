//! Weight initialization utilities matching Keras defaults.
//!
//! Every random initializer draws from a caller-supplied RNG so model
//! construction is reproducible from a single seed.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::tensor::Tensor;

/// Parameter initialization scheme.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum Initializer {
    /// Glorot/Xavier uniform initialization (Keras `Dense` kernel default).
    #[default]
    GlorotUniform,
    /// Glorot/Xavier normal initialization.
    GlorotNormal,
    /// Uniform in `[min, max)`.
    RandomUniform {
        /// Lower bound (inclusive)
        min: f32,
        /// Upper bound (exclusive)
        max: f32,
    },
    /// Normal with the given mean and standard deviation.
    RandomNormal {
        /// Mean of the distribution
        mean: f32,
        /// Standard deviation of the distribution
        std: f32,
    },
    /// All zeros.
    Zeros,
    /// All ones.
    Ones,
    /// Constant value.
    Constant(f32),
}

impl Initializer {
    /// Keras' `'random_uniform'` string initializer: `U(-0.05, 0.05)`.
    pub const fn keras_random_uniform() -> Self {
        Initializer::RandomUniform {
            min: -0.05,
            max: 0.05,
        }
    }

    /// Creates a tensor of the given shape.
    ///
    /// For Glorot schemes the fans are taken from the first two dimensions of
    /// `shape` (`[fan_in, fan_out, ...]`).
    pub fn initialize<R: Rng + ?Sized>(&self, shape: &[usize], rng: &mut R) -> Tensor {
        match *self {
            Initializer::Zeros => Tensor::zeros(shape),
            Initializer::Ones => Tensor::ones(shape),
            Initializer::Constant(value) => Tensor::full(shape, value),
            Initializer::RandomUniform { min, max } => Tensor::rand_uniform(shape, min, max, rng),
            Initializer::RandomNormal { mean, std } => Tensor::randn(shape, mean, std, rng),
            Initializer::GlorotUniform => {
                let (fan_in, fan_out) = fan_in_out(shape);
                let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
                Tensor::rand_uniform(shape, -limit, limit, rng)
            }
            Initializer::GlorotNormal => {
                let (fan_in, fan_out) = fan_in_out(shape);
                let std = (2.0 / (fan_in + fan_out) as f32).sqrt();
                Tensor::randn(shape, 0.0, std, rng)
            }
        }
    }
}

fn fan_in_out(shape: &[usize]) -> (usize, usize) {
    match shape.len() {
        0 => (1, 1),
        1 => {
            let dim = shape[0].max(1);
            (dim, dim)
        }
        _ => {
            let receptive: usize = shape[2..].iter().product::<usize>().max(1);
            (
                (shape[0] * receptive).max(1),
                (shape[1] * receptive).max(1),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_constant_initializers() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(Initializer::Zeros
            .initialize(&[3, 2], &mut rng)
            .data()
            .iter()
            .all(|&x| x == 0.0));
        assert!(Initializer::Constant(0.5)
            .initialize(&[4], &mut rng)
            .data()
            .iter()
            .all(|&x| x == 0.5));
    }

    #[test]
    fn test_glorot_uniform_bounds() {
        let mut rng = StdRng::seed_from_u64(0);
        let t = Initializer::GlorotUniform.initialize(&[10, 20], &mut rng);
        let limit = (6.0f32 / 30.0).sqrt();
        assert_eq!(t.shape(), &[10, 20]);
        assert!(t.data().iter().all(|&x| x.abs() <= limit));
    }

    #[test]
    fn test_keras_random_uniform_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        let t = Initializer::keras_random_uniform().initialize(&[50, 8], &mut rng);
        assert!(t.data().iter().all(|&x| (-0.05..0.05).contains(&x)));
    }

    #[test]
    fn test_same_seed_same_values() {
        let a = Initializer::GlorotNormal.initialize(&[4, 4], &mut StdRng::seed_from_u64(11));
        let b = Initializer::GlorotNormal.initialize(&[4, 4], &mut StdRng::seed_from_u64(11));
        assert_eq!(a, b);
    }
}
