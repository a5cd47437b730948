//! Pooling of pairwise interactions over the pair axis.
//!
//! Every policy maps `[batch, pairs, k]` to `[batch, k]`:
//!
//! - [`PoolingMode::Sum`] adds the pair vectors,
//! - [`PoolingMode::Mean`] averages them,
//! - [`PoolingMode::Attention`] weights them by a softmax over learned scores.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activation::ActivationType;
use crate::activation_layer::ActivationLayer;
use crate::dense::Dense;
use crate::error::LayerError;
use crate::layer::Layer;
use crate::tensor::Tensor;

/// Pair pooling policy.
///
/// Parses from the short names `max`, `avg`, `att` as well as `sum`, `mean`,
/// `attention`. `max` selects [`PoolingMode::Sum`]: the pooled vector is the
/// sum over pairs, not an element-wise maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolingMode {
    /// Sum over pairs.
    #[serde(alias = "max")]
    Sum,
    /// Mean over pairs.
    #[serde(alias = "avg")]
    Mean,
    /// Softmax-weighted sum over pairs.
    #[default]
    #[serde(alias = "att")]
    Attention,
}

impl FromStr for PoolingMode {
    type Err = LayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "max" | "sum" => Ok(PoolingMode::Sum),
            "avg" | "mean" => Ok(PoolingMode::Mean),
            "att" | "attention" => Ok(PoolingMode::Attention),
            other => Err(LayerError::ConfigError {
                message: format!("Unknown pooling mode '{other}', expected max, avg or att"),
            }),
        }
    }
}

impl fmt::Display for PoolingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PoolingMode::Sum => "max",
            PoolingMode::Mean => "avg",
            PoolingMode::Attention => "att",
        };
        f.write_str(name)
    }
}

fn check_pairs(input: &Tensor) -> Result<(usize, usize, usize), LayerError> {
    if input.ndim() != 3 {
        return Err(LayerError::ForwardError {
            message: format!("Pooling expects [batch, pairs, k] input, got {}D", input.ndim()),
        });
    }
    let (b, p, k) = (input.shape()[0], input.shape()[1], input.shape()[2]);
    if p == 0 {
        return Err(LayerError::ForwardError {
            message: "Pooling requires at least one pair".to_string(),
        });
    }
    Ok((b, p, k))
}

/// Weighted sum over the pair axis: `out[b] = Σ_p weights[b, p] · x[b, p]`.
fn weighted_sum(input: &Tensor, weights: &[f32]) -> Tensor {
    let (b, p, k) = (input.shape()[0], input.shape()[1], input.shape()[2]);
    let x = input.data();
    let mut out = vec![0.0; b * k];
    for bi in 0..b {
        let dst = &mut out[bi * k..(bi + 1) * k];
        for pi in 0..p {
            let w = weights[bi * p + pi];
            let src = &x[(bi * p + pi) * k..(bi * p + pi + 1) * k];
            for d in 0..k {
                dst[d] += w * src[d];
            }
        }
    }
    Tensor::from_data(&[b, k], out)
}

/// Spreads a `[batch, k]` gradient back over the pairs with the given weights.
fn spread(grad: &Tensor, weights: &[f32], pairs: usize) -> Tensor {
    let (b, k) = (grad.shape()[0], grad.shape()[1]);
    let g = grad.data();
    let mut out = vec![0.0; b * pairs * k];
    for bi in 0..b {
        let src = &g[bi * k..(bi + 1) * k];
        for pi in 0..pairs {
            let w = weights[bi * pairs + pi];
            let dst = &mut out[(bi * pairs + pi) * k..(bi * pairs + pi + 1) * k];
            for d in 0..k {
                dst[d] = w * src[d];
            }
        }
    }
    Tensor::from_data(&[b, pairs, k], out)
}

/// Row-wise softmax of a `[batch, pairs]` score matrix.
fn softmax_rows(scores: &[f32], batch: usize, pairs: usize) -> Vec<f32> {
    let mut out = vec![0.0; batch * pairs];
    for b in 0..batch {
        let row = &scores[b * pairs..(b + 1) * pairs];
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let dst = &mut out[b * pairs..(b + 1) * pairs];
        let mut total = 0.0;
        for (d, &s) in dst.iter_mut().zip(row) {
            *d = (s - max).exp();
            total += *d;
        }
        for d in dst.iter_mut() {
            *d /= total;
        }
    }
    out
}

#[derive(Debug, Clone)]
struct AttentionCache {
    input: Tensor,
    /// Softmax weights, flattened [batch, pairs]
    weights: Vec<f32>,
}

/// Attention pooling: `a = act(x·W + b)`, `s = a·h + c`, softmax over pairs,
/// then the weighted sum of the pair vectors.
#[derive(Debug, Clone)]
pub struct AttentionPooling {
    attention_w: Dense,
    activation: ActivationLayer,
    attention_dense: Dense,
    cache: Option<AttentionCache>,
}

impl AttentionPooling {
    /// Creates attention pooling over `k`-dimensional pairs with an attention
    /// network of width `att_vector`.
    pub fn new<R: Rng + ?Sized>(
        k: usize,
        att_vector: usize,
        activation: ActivationType,
        rng: &mut R,
    ) -> Self {
        Self {
            attention_w: Dense::new(k, att_vector, rng),
            activation: ActivationLayer::from_activation_type(activation),
            attention_dense: Dense::new(att_vector, 1, rng),
            cache: None,
        }
    }

    fn scores(&self, input: &Tensor) -> Result<Vec<f32>, LayerError> {
        let (b, p, _) = check_pairs(input)?;
        let a = self.attention_w.forward(input)?;
        let a = self.activation.forward(&a)?;
        let s = self.attention_dense.forward(&a)?;
        Ok(softmax_rows(s.data(), b, p))
    }

    /// Returns the softmax weights as a `[batch, pairs]` tensor.
    pub fn attention_weights(&self, input: &Tensor) -> Result<Tensor, LayerError> {
        let (b, p, _) = check_pairs(input)?;
        let weights = self.scores(input)?;
        Ok(Tensor::from_data(&[b, p], weights))
    }

    /// Performs forward pass and caches what backward needs.
    pub fn forward_train(&mut self, input: &Tensor) -> Result<Tensor, LayerError> {
        let (b, p, _) = check_pairs(input)?;
        let a = self.attention_w.forward_train(input)?;
        let a = self.activation.forward_train(&a)?;
        let s = self.attention_dense.forward_train(&a)?;
        let weights = softmax_rows(s.data(), b, p);
        let out = weighted_sum(input, &weights);
        self.cache = Some(AttentionCache {
            input: input.clone(),
            weights,
        });
        Ok(out)
    }
}

impl Layer for AttentionPooling {
    fn forward(&self, input: &Tensor) -> Result<Tensor, LayerError> {
        let weights = self.scores(input)?;
        Ok(weighted_sum(input, &weights))
    }

    fn backward(&mut self, grad: &Tensor) -> Result<Tensor, LayerError> {
        let cache = self.cache.as_ref().ok_or(LayerError::NotInitialized)?;
        let input = &cache.input;
        let (b, p, k) = (input.shape()[0], input.shape()[1], input.shape()[2]);
        if grad.shape() != [b, k] {
            return Err(LayerError::ShapeMismatch {
                expected: vec![b, k],
                actual: grad.shape().to_vec(),
            });
        }
        let alpha = &cache.weights;
        let x = input.data();
        let g = grad.data();

        // Direct path through the weighted sum.
        let mut d_input = spread(grad, alpha, p);

        // d alpha[b,p] = <g[b], x[b,p]>, then softmax backward.
        let mut d_scores = vec![0.0; b * p];
        for bi in 0..b {
            let gb = &g[bi * k..(bi + 1) * k];
            let mut d_alpha = vec![0.0; p];
            for (pi, da) in d_alpha.iter_mut().enumerate() {
                let xp = &x[(bi * p + pi) * k..(bi * p + pi + 1) * k];
                *da = gb.iter().zip(xp).map(|(a, b)| a * b).sum();
            }
            let row_alpha = &alpha[bi * p..(bi + 1) * p];
            let dot: f32 = row_alpha.iter().zip(&d_alpha).map(|(a, d)| a * d).sum();
            for pi in 0..p {
                d_scores[bi * p + pi] = row_alpha[pi] * (d_alpha[pi] - dot);
            }
        }
        let d_scores = Tensor::from_data(&[b, p, 1], d_scores);

        let d_a = self.attention_dense.backward(&d_scores)?;
        let d_a = self.activation.backward(&d_a)?;
        let d_from_attention = self.attention_w.backward(&d_a)?;
        d_input.add_assign(&d_from_attention);
        Ok(d_input)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        let mut params = self.attention_w.parameters();
        params.extend(self.attention_dense.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.attention_w.parameters_mut();
        params.extend(self.attention_dense.parameters_mut());
        params
    }

    fn gradients(&self) -> Vec<Option<&Tensor>> {
        let mut grads = self.attention_w.gradients();
        grads.extend(self.attention_dense.gradients());
        grads
    }

    fn regularization_loss(&self) -> f32 {
        self.attention_w.regularization_loss() + self.attention_dense.regularization_loss()
    }

    fn name(&self) -> &str {
        "AttentionPooling"
    }
}

/// Pooling layer selected by [`PoolingMode`].
#[derive(Debug, Clone)]
pub enum PairPooling {
    /// Sum over pairs.
    Sum {
        /// Pair count seen by the last training forward pass
        cached_pairs: Option<usize>,
    },
    /// Mean over pairs.
    Mean {
        /// Pair count seen by the last training forward pass
        cached_pairs: Option<usize>,
    },
    /// Learned attention weights.
    Attention(AttentionPooling),
}

impl PairPooling {
    /// Builds the pooling for `mode`; the attention network is only created
    /// for [`PoolingMode::Attention`].
    pub fn new<R: Rng + ?Sized>(
        mode: PoolingMode,
        k: usize,
        att_vector: usize,
        activation: ActivationType,
        rng: &mut R,
    ) -> Self {
        match mode {
            PoolingMode::Sum => PairPooling::Sum { cached_pairs: None },
            PoolingMode::Mean => PairPooling::Mean { cached_pairs: None },
            PoolingMode::Attention => {
                PairPooling::Attention(AttentionPooling::new(k, att_vector, activation, rng))
            }
        }
    }

    /// Returns the policy.
    pub fn mode(&self) -> PoolingMode {
        match self {
            PairPooling::Sum { .. } => PoolingMode::Sum,
            PairPooling::Mean { .. } => PoolingMode::Mean,
            PairPooling::Attention(_) => PoolingMode::Attention,
        }
    }

    /// Returns the attention pooling, if this is the attention policy.
    pub fn attention(&self) -> Option<&AttentionPooling> {
        match self {
            PairPooling::Attention(att) => Some(att),
            _ => None,
        }
    }

    /// Per-pair weights as a `[batch, pairs]` tensor: all ones for sum,
    /// `1/pairs` for mean, the softmax for attention.
    pub fn pair_weights(&self, input: &Tensor) -> Result<Tensor, LayerError> {
        let (b, p, _) = check_pairs(input)?;
        match self {
            PairPooling::Sum { .. } => Ok(Tensor::ones(&[b, p])),
            PairPooling::Mean { .. } => Ok(Tensor::full(&[b, p], 1.0 / p as f32)),
            PairPooling::Attention(att) => att.attention_weights(input),
        }
    }

    /// Performs forward pass and caches what backward needs.
    pub fn forward_train(&mut self, input: &Tensor) -> Result<Tensor, LayerError> {
        match self {
            PairPooling::Sum { cached_pairs } | PairPooling::Mean { cached_pairs } => {
                let (_, p, _) = check_pairs(input)?;
                *cached_pairs = Some(p);
                self.forward(input)
            }
            PairPooling::Attention(att) => att.forward_train(input),
        }
    }
}

impl Layer for PairPooling {
    fn forward(&self, input: &Tensor) -> Result<Tensor, LayerError> {
        let (b, p, _) = check_pairs(input)?;
        match self {
            PairPooling::Sum { .. } => Ok(weighted_sum(input, &vec![1.0; b * p])),
            PairPooling::Mean { .. } => Ok(weighted_sum(input, &vec![1.0 / p as f32; b * p])),
            PairPooling::Attention(att) => att.forward(input),
        }
    }

    fn backward(&mut self, grad: &Tensor) -> Result<Tensor, LayerError> {
        match self {
            PairPooling::Sum { cached_pairs } => {
                let p = cached_pairs.ok_or(LayerError::NotInitialized)?;
                Ok(spread(grad, &vec![1.0; grad.shape()[0] * p], p))
            }
            PairPooling::Mean { cached_pairs } => {
                let p = cached_pairs.ok_or(LayerError::NotInitialized)?;
                Ok(spread(grad, &vec![1.0 / p as f32; grad.shape()[0] * p], p))
            }
            PairPooling::Attention(att) => att.backward(grad),
        }
    }

    fn parameters(&self) -> Vec<&Tensor> {
        match self {
            PairPooling::Attention(att) => att.parameters(),
            _ => vec![],
        }
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        match self {
            PairPooling::Attention(att) => att.parameters_mut(),
            _ => vec![],
        }
    }

    fn gradients(&self) -> Vec<Option<&Tensor>> {
        match self {
            PairPooling::Attention(att) => att.gradients(),
            _ => vec![],
        }
    }

    fn regularization_loss(&self) -> f32 {
        match self {
            PairPooling::Attention(att) => att.regularization_loss(),
            _ => 0.0,
        }
    }

    fn name(&self) -> &str {
        match self {
            PairPooling::Sum { .. } => "SumPooling",
            PairPooling::Mean { .. } => "MeanPooling",
            PairPooling::Attention(_) => "AttentionPooling",
        }
    }
}
