//! Factorization Machine layer.
//!
//! Scores a dense input row `x` (`[batch, n]`) as
//!
//! ```text
//! y = w0 + x·w + ½ Σ_f ((x·Vᵀ)_f² − (x²·(V²)ᵀ)_f)
//! ```
//!
//! which equals `w0 + x·w + Σ_{i<j} <V_i, V_j> x_i x_j` (with `V_i` the i-th
//! column of `V`) at O(n·k) cost instead of O(n²·k).

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::LayerError;
use crate::initializer::Initializer;
use crate::layer::Layer;
use crate::regularizer::Regularizer;
use crate::tensor::Tensor;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FmCache {
    input: Tensor,
    /// x·Vᵀ, shape [batch, k]
    xv: Tensor,
}

/// Factorization Machine with a global bias, linear weights and a rank-`k` factor matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorizationMachine {
    /// Global bias, shape [1]
    w0: Tensor,
    /// Linear weights, shape [n, 1]
    w: Tensor,
    /// Latent factors, shape [k, n]
    v: Tensor,
    w_regularizer: Regularizer,
    v_regularizer: Regularizer,
    w0_grad: Option<Tensor>,
    w_grad: Option<Tensor>,
    v_grad: Option<Tensor>,
    cache: Option<FmCache>,
    input_dim: usize,
    k: usize,
}

impl FactorizationMachine {
    /// Creates an FM over `input_dim` features with latent size `k`.
    ///
    /// `w0` starts at zero; `w` and `V` are drawn from Keras'
    /// `random_uniform` initializer.
    pub fn new<R: Rng + ?Sized>(input_dim: usize, k: usize, rng: &mut R) -> Self {
        let init = Initializer::keras_random_uniform();
        Self {
            w0: Tensor::zeros(&[1]),
            w: init.initialize(&[input_dim, 1], rng),
            v: init.initialize(&[k, input_dim], rng),
            w_regularizer: Regularizer::None,
            v_regularizer: Regularizer::None,
            w0_grad: None,
            w_grad: None,
            v_grad: None,
            cache: None,
            input_dim,
            k,
        }
    }

    /// Creates an FM from explicit parameters.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::ShapeMismatch`] unless `w0` is `[1]`, `w` is
    /// `[n, 1]` and `v` is `[k, n]`.
    pub fn from_parameters(w0: Tensor, w: Tensor, v: Tensor) -> Result<Self, LayerError> {
        if w0.shape() != [1] {
            return Err(LayerError::ShapeMismatch {
                expected: vec![1],
                actual: w0.shape().to_vec(),
            });
        }
        if w.ndim() != 2 || w.shape()[1] != 1 {
            return Err(LayerError::ShapeMismatch {
                expected: vec![w.shape().first().copied().unwrap_or(0), 1],
                actual: w.shape().to_vec(),
            });
        }
        let input_dim = w.shape()[0];
        if v.ndim() != 2 || v.shape()[1] != input_dim {
            return Err(LayerError::ShapeMismatch {
                expected: vec![v.shape().first().copied().unwrap_or(0), input_dim],
                actual: v.shape().to_vec(),
            });
        }
        let k = v.shape()[0];
        Ok(Self {
            w0,
            w,
            v,
            w_regularizer: Regularizer::None,
            v_regularizer: Regularizer::None,
            w0_grad: None,
            w_grad: None,
            v_grad: None,
            cache: None,
            input_dim,
            k,
        })
    }

    /// Sets the regularizers on `w` and `V`.
    pub fn with_regularizers(mut self, w_regularizer: Regularizer, v_regularizer: Regularizer) -> Self {
        self.w_regularizer = w_regularizer;
        self.v_regularizer = v_regularizer;
        self
    }

    /// Returns the input width `n`.
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Returns the latent size `k`.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Returns the latent factor matrix `V` (`[k, n]`).
    pub fn factors(&self) -> &Tensor {
        &self.v
    }

    fn check_input(&self, input: &Tensor) -> Result<(), LayerError> {
        if input.ndim() != 2 {
            return Err(LayerError::ForwardError {
                message: format!("FM expects 2D input, got {}D", input.ndim()),
            });
        }
        if input.last_dim() != self.input_dim {
            return Err(LayerError::InvalidInputDimension {
                expected: self.input_dim,
                actual: input.last_dim(),
            });
        }
        Ok(())
    }

    fn compute(&self, input: &Tensor) -> (Tensor, Tensor) {
        let first_order = input.matmul(&self.w).add(&self.w0);
        let xv = input.matmul(&self.v.transpose());
        let x2v2 = input.sqr().matmul(&self.v.sqr().transpose());
        let second_order = xv.sqr().sub(&x2v2).sum_axis(1).scale(0.5);
        let batch = input.shape()[0];
        let out = first_order.add(&second_order.reshape(&[batch, 1]));
        (out, xv)
    }

    /// Reference O(n²·k) evaluation of the second-order term, one value per row.
    pub fn pairwise_brute_force(&self, input: &Tensor) -> Result<Vec<f32>, LayerError> {
        self.check_input(input)?;
        let n = self.input_dim;
        let v = self.v.data();
        let rows = input.shape()[0];
        let mut out = Vec::with_capacity(rows);
        for b in 0..rows {
            let x = &input.data()[b * n..(b + 1) * n];
            let mut total = 0.0;
            for i in 0..n {
                for j in (i + 1)..n {
                    let dot: f32 = (0..self.k).map(|f| v[f * n + i] * v[f * n + j]).sum();
                    total += dot * x[i] * x[j];
                }
            }
            out.push(total);
        }
        Ok(out)
    }

    /// Performs forward pass and caches what backward needs.
    pub fn forward_train(&mut self, input: &Tensor) -> Result<Tensor, LayerError> {
        self.check_input(input)?;
        let (out, xv) = self.compute(input);
        self.cache = Some(FmCache {
            input: input.clone(),
            xv,
        });
        Ok(out)
    }
}

impl Layer for FactorizationMachine {
    fn forward(&self, input: &Tensor) -> Result<Tensor, LayerError> {
        self.check_input(input)?;
        Ok(self.compute(input).0)
    }

    fn backward(&mut self, grad: &Tensor) -> Result<Tensor, LayerError> {
        let cache = self.cache.as_ref().ok_or(LayerError::NotInitialized)?;
        let x = &cache.input;
        let batch = x.shape()[0];
        if grad.shape() != [batch, 1] {
            return Err(LayerError::ShapeMismatch {
                expected: vec![batch, 1],
                actual: grad.shape().to_vec(),
            });
        }
        let n = self.input_dim;
        let k = self.k;
        let g = grad.data();
        let xd = x.data();
        let xv = cache.xv.data();
        let v = self.v.data();

        let w0_grad = Tensor::from_data(&[1], vec![grad.sum()]);

        let mut w_grad = x.transpose().matmul(grad);
        self.w_regularizer.accumulate_grad(&self.w, &mut w_grad);

        // dV[f,i] = Σ_b g_b (xv[b,f] x[b,i] − V[f,i] x[b,i]²)
        let mut v_grad = vec![0.0; k * n];
        for b in 0..batch {
            let gb = g[b];
            if gb == 0.0 {
                continue;
            }
            let xb = &xd[b * n..(b + 1) * n];
            for f in 0..k {
                let s = gb * xv[b * k + f];
                let vf = &v[f * n..(f + 1) * n];
                let out = &mut v_grad[f * n..(f + 1) * n];
                for i in 0..n {
                    out[i] += s * xb[i] - gb * vf[i] * xb[i] * xb[i];
                }
            }
        }
        let mut v_grad = Tensor::from_data(&[k, n], v_grad);
        self.v_regularizer.accumulate_grad(&self.v, &mut v_grad);

        // dx[b,i] = g_b (w_i + Σ_f xv[b,f] V[f,i] − x[b,i] Σ_f V[f,i]²)
        let xv_v = cache.xv.matmul(&self.v);
        let v_sq_col = self.v.sqr().sum_axis(0);
        let mut dx = vec![0.0; batch * n];
        for b in 0..batch {
            for i in 0..n {
                let idx = b * n + i;
                dx[idx] = g[b]
                    * (self.w.data()[i] + xv_v.data()[idx] - xd[idx] * v_sq_col.data()[i]);
            }
        }

        self.w0_grad = Some(w0_grad);
        self.w_grad = Some(w_grad);
        self.v_grad = Some(v_grad);
        Ok(Tensor::from_data(&[batch, n], dx))
    }

    fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.w0, &self.w, &self.v]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.w0, &mut self.w, &mut self.v]
    }

    fn gradients(&self) -> Vec<Option<&Tensor>> {
        vec![
            self.w0_grad.as_ref(),
            self.w_grad.as_ref(),
            self.v_grad.as_ref(),
        ]
    }

    fn regularization_loss(&self) -> f32 {
        self.w_regularizer.loss(&self.w) + self.v_regularizer.loss(&self.v)
    }

    fn name(&self) -> &str {
        "FM"
    }
}
