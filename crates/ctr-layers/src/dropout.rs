//! Inverted dropout.
//!
//! In training mode each element is zeroed with probability `rate` and the
//! survivors are scaled by `1 / (1 - rate)`; at inference the layer is the
//! identity.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::LayerError;
use crate::layer::Layer;
use crate::tensor::Tensor;

/// Dropout layer with its own seeded RNG.
#[derive(Debug, Clone)]
pub struct Dropout {
    rate: f32,
    rng: StdRng,
    cached_mask: Option<Tensor>,
    training: bool,
}

impl Dropout {
    /// Creates a dropout layer.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::ConfigError`] if `rate` is outside `[0, 1)`.
    pub fn new(rate: f32, seed: u64) -> Result<Self, LayerError> {
        if !(0.0..1.0).contains(&rate) {
            return Err(LayerError::ConfigError {
                message: format!("Dropout rate must be in [0, 1), got {rate}"),
            });
        }
        Ok(Self {
            rate,
            rng: StdRng::seed_from_u64(seed),
            cached_mask: None,
            training: true,
        })
    }

    /// Returns the drop probability.
    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Applies dropout (when training) and caches the mask.
    pub fn forward_train(&mut self, input: &Tensor) -> Result<Tensor, LayerError> {
        if !self.training || self.rate == 0.0 {
            self.cached_mask = Some(Tensor::ones(input.shape()));
            return Ok(input.clone());
        }
        let keep = 1.0 - self.rate;
        let scale = 1.0 / keep;
        let mask_data: Vec<f32> = (0..input.numel())
            .map(|_| {
                if self.rng.gen::<f32>() < keep {
                    scale
                } else {
                    0.0
                }
            })
            .collect();
        let mask = Tensor::from_data(input.shape(), mask_data);
        let output = input.mul(&mask);
        self.cached_mask = Some(mask);
        Ok(output)
    }
}

impl Layer for Dropout {
    fn forward(&self, input: &Tensor) -> Result<Tensor, LayerError> {
        Ok(input.clone())
    }

    fn backward(&mut self, grad: &Tensor) -> Result<Tensor, LayerError> {
        let mask = self
            .cached_mask
            .as_ref()
            .ok_or(LayerError::NotInitialized)?;
        if mask.shape() != grad.shape() {
            return Err(LayerError::ShapeMismatch {
                expected: mask.shape().to_vec(),
                actual: grad.shape().to_vec(),
            });
        }
        Ok(grad.mul(mask))
    }

    fn parameters(&self) -> Vec<&Tensor> {
        vec![]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![]
    }

    fn gradients(&self) -> Vec<Option<&Tensor>> {
        vec![]
    }

    fn name(&self) -> &str {
        "Dropout"
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_rate() {
        assert!(Dropout::new(1.0, 0).is_err());
        assert!(Dropout::new(-0.1, 0).is_err());
    }

    #[test]
    fn test_zero_rate_is_identity() {
        let mut d = Dropout::new(0.0, 0).unwrap();
        let x = Tensor::rand(&[4, 4]);
        assert_eq!(d.forward_train(&x).unwrap(), x);
    }

    #[test]
    fn test_mask_is_reused_in_backward() {
        let mut d = Dropout::new(0.5, 9).unwrap();
        let x = Tensor::ones(&[8, 8]);
        let y = d.forward_train(&x).unwrap();
        let g = d.backward(&Tensor::ones(&[8, 8])).unwrap();
        assert_eq!(y, g);
        assert!(y.data().iter().all(|&v| v == 0.0 || (v - 2.0).abs() < 1e-6));
    }

    #[test]
    fn test_inference_is_identity() {
        let mut d = Dropout::new(0.9, 1).unwrap();
        d.set_training(false);
        let x = Tensor::rand(&[3, 3]);
        assert_eq!(d.forward(&x).unwrap(), x);
        assert_eq!(d.forward_train(&x).unwrap(), x);
    }
}
