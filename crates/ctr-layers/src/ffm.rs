//! Field-aware Factorization Machine (FFM) layer implementation.
//!
//! Every dense feature is its own field with value `x`; every sparse feature
//! is a field whose active feature is its one-hot index with value 1. Feature
//! ids live in one flat space of size `N = D + Σ feat_num`, and each feature
//! owns one latent vector per field (`v: [N, F, k]`, `F = D + S`).
//!
//! # Mathematical Formulation
//!
//! ```text
//! y = w0 + Σ_i w_{feat_i} x_i + Σ_{i<j} <v_{feat_i, field_j}, v_{feat_j, field_i}> x_i x_j
//! ```
//!
//! where `i, j` range over the `F` active (feature, field, value) entries of
//! one example. The layer returns the logit; the model applies the sigmoid.
//!
//! # References
//!
//! - [Field-aware Factorization Machines for CTR Prediction](https://www.csie.ntu.edu.tw/~cjlin/papers/ffm.pdf)
#![allow(clippy::needless_range_loop)]

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::LayerError;
use crate::initializer::Initializer;
use crate::regularizer::Regularizer;
use crate::tensor::{IndexTensor, Tensor};

/// Configuration for the Field-aware Factorization Machine layer.
///
/// # Example
///
/// ```
/// use ctr_layers::ffm::FFMConfig;
///
/// // 2 dense features, sparse cardinalities 3 and 5, latent size 4
/// let config = FFMConfig::new(2, vec![3, 5], 4);
/// assert_eq!(config.num_features(), 10);
/// assert_eq!(config.num_fields(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FFMConfig {
    /// Number of dense features
    pub num_dense: usize,
    /// Cardinality of each sparse feature
    pub feat_nums: Vec<usize>,
    /// Dimension of the latent vectors
    pub k: usize,
    /// Regularizer on the linear weights
    pub w_regularizer: Regularizer,
    /// Regularizer on the latent vectors
    pub v_regularizer: Regularizer,
}

impl FFMConfig {
    /// Creates a configuration with L2(1e-4) on `w` and `v`.
    pub fn new(num_dense: usize, feat_nums: Vec<usize>, k: usize) -> Self {
        Self {
            num_dense,
            feat_nums,
            k,
            w_regularizer: Regularizer::L2(1e-4),
            v_regularizer: Regularizer::L2(1e-4),
        }
    }

    /// Sets the regularizers.
    pub fn with_regularizers(mut self, w_regularizer: Regularizer, v_regularizer: Regularizer) -> Self {
        self.w_regularizer = w_regularizer;
        self.v_regularizer = v_regularizer;
        self
    }

    /// Returns `N = D + Σ feat_num`.
    pub fn num_features(&self) -> usize {
        self.num_dense + self.feat_nums.iter().sum::<usize>()
    }

    /// Returns `F = D + S`.
    pub fn num_fields(&self) -> usize {
        self.num_dense + self.feat_nums.len()
    }
}

/// Active `(feature, field, value)` entries of one example, in field order.
type ActiveRow = Vec<(usize, usize, f32)>;

/// Field-aware Factorization Machine over mixed dense and sparse inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FFMLayer {
    /// Global bias, shape [1]
    w0: Tensor,
    /// Linear weights, shape [N, 1]
    w: Tensor,
    /// Field-aware latent vectors, shape [N, F, k]
    v: Tensor,
    config: FFMConfig,
    /// Offset of each sparse feature's ids in the flat feature space
    sparse_offsets: Vec<usize>,
    w0_grad: Option<Tensor>,
    w_grad: Option<Tensor>,
    v_grad: Option<Tensor>,
    cached_rows: Option<Vec<ActiveRow>>,
}

impl FFMLayer {
    /// Creates the layer; `w0` starts at zero, `w` and `v` are drawn from
    /// Keras' `random_uniform` initializer.
    pub fn from_config<R: Rng + ?Sized>(config: FFMConfig, rng: &mut R) -> Self {
        let n = config.num_features();
        let f = config.num_fields();
        let init = Initializer::keras_random_uniform();
        let w = init.initialize(&[n, 1], rng);
        let v = init.initialize(&[n, f, config.k], rng);

        let mut sparse_offsets = Vec::with_capacity(config.feat_nums.len());
        let mut offset = config.num_dense;
        for &feat_num in &config.feat_nums {
            sparse_offsets.push(offset);
            offset += feat_num;
        }

        Self {
            w0: Tensor::zeros(&[1]),
            w,
            v,
            config,
            sparse_offsets,
            w0_grad: None,
            w_grad: None,
            v_grad: None,
            cached_rows: None,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &FFMConfig {
        &self.config
    }

    /// Returns the latent vectors (`[N, F, k]`).
    pub fn latent(&self) -> &Tensor {
        &self.v
    }

    /// Returns the linear weights (`[N, 1]`).
    pub fn linear(&self) -> &Tensor {
        &self.w
    }

    fn latent_vec(&self, feature: usize, field: usize) -> &[f32] {
        let f = self.config.num_fields();
        let k = self.config.k;
        let offset = (feature * f + field) * k;
        &self.v.data()[offset..offset + k]
    }

    /// Maps each example to its active entries, validating shapes and ids.
    fn active_rows(&self, dense: &Tensor, sparse: &IndexTensor) -> Result<Vec<ActiveRow>, LayerError> {
        let d = self.config.num_dense;
        let s = self.config.feat_nums.len();
        if dense.ndim() != 2 || dense.last_dim() != d {
            return Err(LayerError::InvalidInputDimension {
                expected: d,
                actual: dense.shape().last().copied().unwrap_or(0),
            });
        }
        if sparse.num_fields() != s {
            return Err(LayerError::InvalidInputDimension {
                expected: s,
                actual: sparse.num_fields(),
            });
        }
        let batch = dense.shape()[0];
        if sparse.batch_size() != batch {
            return Err(LayerError::ShapeMismatch {
                expected: vec![batch, s],
                actual: sparse.shape().to_vec(),
            });
        }

        let mut rows = Vec::with_capacity(batch);
        for b in 0..batch {
            let mut row = Vec::with_capacity(d + s);
            for i in 0..d {
                row.push((i, i, dense.data()[b * d + i]));
            }
            for (j, &id) in sparse.row(b).iter().enumerate() {
                let feat_num = self.config.feat_nums[j];
                if id >= feat_num {
                    return Err(LayerError::IndexOutOfRange {
                        index: id,
                        num_embeddings: feat_num,
                    });
                }
                row.push((self.sparse_offsets[j] + id, d + j, 1.0));
            }
            rows.push(row);
        }
        Ok(rows)
    }

    fn score(&self, row: &ActiveRow) -> f32 {
        let mut total = self.w0.data()[0];
        for &(feat, _, x) in row {
            total += self.w.data()[feat] * x;
        }
        for i in 0..row.len() {
            let (feat_i, field_i, x_i) = row[i];
            for j in (i + 1)..row.len() {
                let (feat_j, field_j, x_j) = row[j];
                let inner: f32 = self
                    .latent_vec(feat_i, field_j)
                    .iter()
                    .zip(self.latent_vec(feat_j, field_i))
                    .map(|(a, b)| a * b)
                    .sum();
                total += inner * x_i * x_j;
            }
        }
        total
    }

    /// Computes the logits (`[batch, 1]`).
    ///
    /// # Errors
    ///
    /// Returns an error when `dense` is not `[batch, D]`, `sparse` is not
    /// `[batch, S]`, or a sparse id is out of range.
    pub fn forward_with_fields(&self, dense: &Tensor, sparse: &IndexTensor) -> Result<Tensor, LayerError> {
        let rows = self.active_rows(dense, sparse)?;
        let out: Vec<f32> = rows.iter().map(|row| self.score(row)).collect();
        Ok(Tensor::from_data(&[rows.len(), 1], out))
    }

    /// Performs forward pass with caching for training.
    pub fn forward_train_with_fields(
        &mut self,
        dense: &Tensor,
        sparse: &IndexTensor,
    ) -> Result<Tensor, LayerError> {
        let rows = self.active_rows(dense, sparse)?;
        let out: Vec<f32> = rows.iter().map(|row| self.score(row)).collect();
        let batch = rows.len();
        self.cached_rows = Some(rows);
        Ok(Tensor::from_data(&[batch, 1], out))
    }

    /// Backward pass from the logit gradient (`[batch, 1]`).
    ///
    /// Inputs are not differentiated; only parameter gradients are stored.
    pub fn backward_ffm(&mut self, grad: &Tensor) -> Result<(), LayerError> {
        let rows = self.cached_rows.as_ref().ok_or(LayerError::NotInitialized)?;
        if grad.shape() != [rows.len(), 1] {
            return Err(LayerError::ShapeMismatch {
                expected: vec![rows.len(), 1],
                actual: grad.shape().to_vec(),
            });
        }
        let n = self.config.num_features();
        let f = self.config.num_fields();
        let k = self.config.k;
        let g = grad.data();

        let mut w_grad = vec![0.0f32; n];
        let mut v_grad = vec![0.0f32; n * f * k];

        for (b, row) in rows.iter().enumerate() {
            let gb = g[b];
            if gb == 0.0 {
                continue;
            }
            for &(feat, _, x) in row {
                w_grad[feat] += gb * x;
            }
            for i in 0..row.len() {
                let (feat_i, field_i, x_i) = row[i];
                for j in (i + 1)..row.len() {
                    let (feat_j, field_j, x_j) = row[j];
                    let scale = gb * x_i * x_j;
                    if scale == 0.0 {
                        continue;
                    }
                    let v_i_fj = self.latent_vec(feat_i, field_j);
                    let v_j_fi = self.latent_vec(feat_j, field_i);
                    let off_i_fj = (feat_i * f + field_j) * k;
                    let off_j_fi = (feat_j * f + field_i) * k;
                    for d in 0..k {
                        v_grad[off_i_fj + d] += scale * v_j_fi[d];
                        v_grad[off_j_fi + d] += scale * v_i_fj[d];
                    }
                }
            }
        }

        let mut w_grad = Tensor::from_data(&[n, 1], w_grad);
        self.config.w_regularizer.accumulate_grad(&self.w, &mut w_grad);
        let mut v_grad = Tensor::from_data(&[n, f, k], v_grad);
        self.config.v_regularizer.accumulate_grad(&self.v, &mut v_grad);

        self.w0_grad = Some(Tensor::from_data(&[1], vec![grad.sum()]));
        self.w_grad = Some(w_grad);
        self.v_grad = Some(v_grad);
        Ok(())
    }

    /// `[w0, w, v]`.
    pub fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.w0, &self.w, &self.v]
    }

    /// Mutable access aligned with [`FFMLayer::parameters`].
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.w0, &mut self.w, &mut self.v]
    }

    /// Gradients aligned with [`FFMLayer::parameters`].
    pub fn gradients(&self) -> Vec<Option<&Tensor>> {
        vec![
            self.w0_grad.as_ref(),
            self.w_grad.as_ref(),
            self.v_grad.as_ref(),
        ]
    }

    /// Regularization loss of `w` and `v`.
    pub fn regularization_loss(&self) -> f32 {
        self.config.w_regularizer.loss(&self.w) + self.config.v_regularizer.loss(&self.v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn layer() -> FFMLayer {
        FFMLayer::from_config(FFMConfig::new(2, vec![3, 2], 4), &mut StdRng::seed_from_u64(17))
    }

    fn inputs() -> (Tensor, IndexTensor) {
        let dense = Tensor::from_data(&[3, 2], vec![0.5, -1.0, 0.0, 2.0, 1.5, 0.25]);
        let sparse = IndexTensor::from_rows(&[vec![0, 1], vec![2, 0], vec![2, 1]]).unwrap();
        (dense, sparse)
    }

    #[test]
    fn test_config_sizes() {
        let config = FFMConfig::new(13, vec![10, 20], 8);
        assert_eq!(config.num_features(), 43);
        assert_eq!(config.num_fields(), 15);
    }

    #[test]
    fn test_parameter_shapes() {
        let ffm = layer();
        let params = ffm.parameters();
        assert_eq!(params[0].shape(), &[1]);
        assert_eq!(params[1].shape(), &[7, 1]);
        assert_eq!(params[2].shape(), &[7, 4, 4]);
    }

    #[test]
    fn test_forward_matches_manual_score() {
        let ffm = layer();
        let dense = Tensor::from_data(&[1, 2], vec![2.0, 0.0]);
        let sparse = IndexTensor::from_rows(&[vec![1, 0]]).unwrap();
        let out = ffm.forward_with_fields(&dense, &sparse).unwrap();

        // Active entries: (0, field 0, 2.0), (1, field 1, 0.0), (3, field 2, 1), (5, field 3, 1).
        let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
        let w = ffm.linear().data();
        let mut expected = w[0] * 2.0 + w[3] + w[5];
        expected += dot(ffm.latent_vec(0, 2), ffm.latent_vec(3, 0)) * 2.0;
        expected += dot(ffm.latent_vec(0, 3), ffm.latent_vec(5, 0)) * 2.0;
        expected += dot(ffm.latent_vec(3, 3), ffm.latent_vec(5, 2));
        assert!((out.data()[0] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_range_sparse_id() {
        let ffm = layer();
        let dense = Tensor::zeros(&[1, 2]);
        let sparse = IndexTensor::from_rows(&[vec![3, 0]]).unwrap();
        assert!(matches!(
            ffm.forward_with_fields(&dense, &sparse),
            Err(LayerError::IndexOutOfRange { index: 3, num_embeddings: 3 })
        ));
    }

    #[test]
    fn test_wrong_widths() {
        let ffm = layer();
        let sparse = IndexTensor::from_rows(&[vec![0, 0]]).unwrap();
        assert!(ffm.forward_with_fields(&Tensor::zeros(&[1, 3]), &sparse).is_err());
        let sparse = IndexTensor::from_rows(&[vec![0]]).unwrap();
        assert!(ffm.forward_with_fields(&Tensor::zeros(&[1, 2]), &sparse).is_err());
    }

    #[test]
    fn test_backward_without_forward() {
        let mut ffm = layer();
        assert!(matches!(
            ffm.backward_ffm(&Tensor::ones(&[1, 1])),
            Err(LayerError::NotInitialized)
        ));
    }

    #[test]
    fn test_gradients_match_finite_differences() {
        let config = FFMConfig::new(2, vec![3, 2], 4).with_regularizers(Regularizer::None, Regularizer::None);
        let mut ffm = FFMLayer::from_config(config, &mut StdRng::seed_from_u64(2));
        // Scale up the latent vectors so second-order terms dominate rounding.
        for v in ffm.parameters_mut()[2].data_mut() {
            *v *= 10.0;
        }
        let (dense, sparse) = inputs();
        ffm.forward_train_with_fields(&dense, &sparse).unwrap();
        ffm.backward_ffm(&Tensor::ones(&[3, 1])).unwrap();
        let grads: Vec<Tensor> = ffm.gradients().into_iter().map(|g| g.cloned().unwrap()).collect();

        let total = |l: &FFMLayer| l.forward_with_fields(&dense, &sparse).unwrap().sum();
        let eps = 1e-2;
        for (t, grad) in grads.iter().enumerate() {
            for i in 0..grad.numel() {
                let mut plus = ffm.clone();
                plus.parameters_mut()[t].data_mut()[i] += eps;
                let mut minus = ffm.clone();
                minus.parameters_mut()[t].data_mut()[i] -= eps;
                let numeric = (total(&plus) - total(&minus)) / (2.0 * eps);
                assert!((numeric - grad.data()[i]).abs() < 1e-2, "param {t}[{i}]");
            }
        }
    }
}
