//! Pairwise interaction layer.
//!
//! Given stacked field embeddings `[batch, fields, k]`, produces the
//! element-wise product of every unordered field pair `(r, c)` with `r < c`,
//! in lexicographic order, as a `[batch, pairs, k]` tensor.

use serde::{Deserialize, Serialize};

use crate::error::LayerError;
use crate::layer::Layer;
use crate::tensor::Tensor;

/// Returns all pairs `(r, c)` with `r < c < num_fields`, in lexicographic order.
pub fn field_pairs(num_fields: usize) -> Vec<(usize, usize)> {
    (0..num_fields)
        .flat_map(|r| ((r + 1)..num_fields).map(move |c| (r, c)))
        .collect()
}

/// Element-wise products of all field pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairwiseInteraction {
    num_fields: usize,
    pairs: Vec<(usize, usize)>,
    cached_input: Option<Tensor>,
}

impl PairwiseInteraction {
    /// Creates the interaction for `num_fields` fields.
    pub fn new(num_fields: usize) -> Self {
        Self {
            num_fields,
            pairs: field_pairs(num_fields),
            cached_input: None,
        }
    }

    /// Returns the pair list.
    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    /// Returns `fields·(fields−1)/2`.
    pub fn num_pairs(&self) -> usize {
        self.pairs.len()
    }

    fn check_input(&self, input: &Tensor) -> Result<(), LayerError> {
        if input.ndim() != 3 {
            return Err(LayerError::ForwardError {
                message: format!(
                    "PairwiseInteraction expects [batch, fields, k] input, got {}D",
                    input.ndim()
                ),
            });
        }
        if input.shape()[1] != self.num_fields {
            return Err(LayerError::InvalidInputDimension {
                expected: self.num_fields,
                actual: input.shape()[1],
            });
        }
        Ok(())
    }

    /// Performs forward pass and caches the embeddings for backward pass.
    pub fn forward_train(&mut self, input: &Tensor) -> Result<Tensor, LayerError> {
        let out = self.forward(input)?;
        self.cached_input = Some(input.clone());
        Ok(out)
    }
}

impl Layer for PairwiseInteraction {
    fn forward(&self, input: &Tensor) -> Result<Tensor, LayerError> {
        self.check_input(input)?;
        let batch = input.shape()[0];
        let s = self.num_fields;
        let k = input.shape()[2];
        let p = self.pairs.len();
        let x = input.data();

        let mut out = vec![0.0; batch * p * k];
        for b in 0..batch {
            for (idx, &(r, c)) in self.pairs.iter().enumerate() {
                let er = &x[(b * s + r) * k..(b * s + r + 1) * k];
                let ec = &x[(b * s + c) * k..(b * s + c + 1) * k];
                let dst = &mut out[(b * p + idx) * k..(b * p + idx + 1) * k];
                for d in 0..k {
                    dst[d] = er[d] * ec[d];
                }
            }
        }
        Ok(Tensor::from_data(&[batch, p, k], out))
    }

    fn backward(&mut self, grad: &Tensor) -> Result<Tensor, LayerError> {
        let input = self
            .cached_input
            .as_ref()
            .ok_or(LayerError::NotInitialized)?;
        let batch = input.shape()[0];
        let s = self.num_fields;
        let k = input.shape()[2];
        let p = self.pairs.len();
        if grad.shape() != [batch, p, k] {
            return Err(LayerError::ShapeMismatch {
                expected: vec![batch, p, k],
                actual: grad.shape().to_vec(),
            });
        }

        let x = input.data();
        let g = grad.data();
        let mut dx = vec![0.0; batch * s * k];
        for b in 0..batch {
            for (idx, &(r, c)) in self.pairs.iter().enumerate() {
                let gp = &g[(b * p + idx) * k..(b * p + idx + 1) * k];
                let row_r = (b * s + r) * k;
                let row_c = (b * s + c) * k;
                for d in 0..k {
                    dx[row_r + d] += gp[d] * x[row_c + d];
                    dx[row_c + d] += gp[d] * x[row_r + d];
                }
            }
        }
        Ok(Tensor::from_data(&[batch, s, k], dx))
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
        "PairwiseInteraction"
    }
}
