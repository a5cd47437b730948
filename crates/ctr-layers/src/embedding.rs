//! Embedding lookup layers.
//!
//! This module provides [`Embedding`], a dense `[feat_num, dim]` table indexed
//! by label-encoded ids, and [`FieldEmbeddings`], one table per sparse field
//! that produces either a stacked `[batch, fields, dim]` tensor or a flat
//! `[batch, Σ dims]` concatenation.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::LayerError;
use crate::initializer::Initializer;
use crate::layer::Layer;
use crate::regularizer::Regularizer;
use crate::tensor::{IndexTensor, Tensor};

/// A trainable embedding table.
///
/// # Example
///
/// ```
/// use ctr_layers::embedding::Embedding;
/// use ctr_layers::initializer::Initializer;
/// use rand::SeedableRng;
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(0);
/// let table = Embedding::new(10, 4, Initializer::keras_random_uniform(), &mut rng);
/// let rows = table.lookup(&[3, 3, 7]).unwrap();
/// assert_eq!(rows.shape(), &[3, 4]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    /// Embedding table of shape [feat_num, dim]
    table: Tensor,
    regularizer: Regularizer,
    /// Gradient of the table from the last backward pass
    table_grad: Option<Tensor>,
    /// Ids looked up by the last training forward pass
    cached_ids: Option<Vec<usize>>,
    feat_num: usize,
    dim: usize,
}

impl Embedding {
    /// Creates a table of `feat_num` rows of width `dim`.
    pub fn new<R: Rng + ?Sized>(
        feat_num: usize,
        dim: usize,
        initializer: Initializer,
        rng: &mut R,
    ) -> Self {
        Self {
            table: initializer.initialize(&[feat_num, dim], rng),
            regularizer: Regularizer::None,
            table_grad: None,
            cached_ids: None,
            feat_num,
            dim,
        }
    }

    /// Sets the regularizer applied to the whole table.
    pub fn with_regularizer(mut self, regularizer: Regularizer) -> Self {
        self.regularizer = regularizer;
        self
    }

    /// Returns the number of rows.
    pub fn feat_num(&self) -> usize {
        self.feat_num
    }

    /// Returns the embedding dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Returns the embedding table.
    pub fn table(&self) -> &Tensor {
        &self.table
    }

    /// Returns the table gradient from the last backward pass.
    pub fn table_grad(&self) -> Option<&Tensor> {
        self.table_grad.as_ref()
    }

    /// Looks up one row per id.
    ///
    /// # Returns
    ///
    /// A tensor of shape `[ids.len(), dim]`.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::IndexOutOfRange`] for any id `>= feat_num`.
    pub fn lookup(&self, ids: &[usize]) -> Result<Tensor, LayerError> {
        let mut data = Vec::with_capacity(ids.len() * self.dim);
        let table = self.table.data();
        for &id in ids {
            if id >= self.feat_num {
                return Err(LayerError::IndexOutOfRange {
                    index: id,
                    num_embeddings: self.feat_num,
                });
            }
            data.extend_from_slice(&table[id * self.dim..(id + 1) * self.dim]);
        }
        Ok(Tensor::from_data(&[ids.len(), self.dim], data))
    }

    /// Looks up rows and caches the ids for the backward pass.
    pub fn lookup_train(&mut self, ids: &[usize]) -> Result<Tensor, LayerError> {
        let rows = self.lookup(ids)?;
        self.cached_ids = Some(ids.to_vec());
        Ok(rows)
    }

    /// Scatter-adds `grad` (`[num_ids, dim]`) into the rows looked up by the
    /// last [`Embedding::lookup_train`].
    ///
    /// Repeated ids accumulate. The result replaces the previous step's
    /// gradient and includes the regularizer term.
    pub fn accumulate_grad(&mut self, grad: &Tensor) -> Result<(), LayerError> {
        let ids = self.cached_ids.as_ref().ok_or(LayerError::NotInitialized)?;
        if grad.shape() != [ids.len(), self.dim] {
            return Err(LayerError::ShapeMismatch {
                expected: vec![ids.len(), self.dim],
                actual: grad.shape().to_vec(),
            });
        }

        let mut table_grad = Tensor::zeros(&[self.feat_num, self.dim]);
        {
            let acc = table_grad.data_mut();
            for (i, &id) in ids.iter().enumerate() {
                let src = &grad.data()[i * self.dim..(i + 1) * self.dim];
                let dst = &mut acc[id * self.dim..(id + 1) * self.dim];
                for (d, s) in dst.iter_mut().zip(src) {
                    *d += s;
                }
            }
        }
        self.regularizer.accumulate_grad(&self.table, &mut table_grad);
        self.table_grad = Some(table_grad);
        Ok(())
    }
}

impl Layer for Embedding {
    /// Ids are passed as an `f32` tensor of any shape; the output has shape
    /// `[numel, dim]`. Every id must be a non-negative whole number.
    fn forward(&self, input: &Tensor) -> Result<Tensor, LayerError> {
        let ids = input
            .data()
            .iter()
            .map(|&x| {
                if x.is_finite() && x >= 0.0 && x.fract() == 0.0 {
                    Ok(x as usize)
                } else {
                    Err(LayerError::ForwardError {
                        message: format!("Embedding id must be a non-negative integer, got {x}"),
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.lookup(&ids)
    }

    fn backward(&mut self, grad: &Tensor) -> Result<Tensor, LayerError> {
        self.accumulate_grad(grad)?;
        // Ids are not differentiable.
        let num_ids = self.cached_ids.as_ref().map_or(0, Vec::len);
        Ok(Tensor::zeros(&[num_ids]))
    }

    fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.table]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.table]
    }

    fn gradients(&self) -> Vec<Option<&Tensor>> {
        vec![self.table_grad.as_ref()]
    }

    fn regularization_loss(&self) -> f32 {
        self.regularizer.loss(&self.table)
    }

    fn name(&self) -> &str {
        "Embedding"
    }
}

/// One embedding table per sparse field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldEmbeddings {
    tables: Vec<Embedding>,
}

impl FieldEmbeddings {
    /// Creates one table per `(feat_num, dim)` entry, in field order.
    pub fn new<R: Rng + ?Sized>(
        fields: &[(usize, usize)],
        initializer: Initializer,
        regularizer: Regularizer,
        rng: &mut R,
    ) -> Self {
        let tables = fields
            .iter()
            .map(|&(feat_num, dim)| {
                Embedding::new(feat_num, dim, initializer, rng).with_regularizer(regularizer)
            })
            .collect();
        Self { tables }
    }

    /// Returns the number of fields.
    pub fn num_fields(&self) -> usize {
        self.tables.len()
    }

    /// Returns the per-field tables.
    pub fn tables(&self) -> &[Embedding] {
        &self.tables
    }

    /// Returns the per-field embedding dimensions.
    pub fn dims(&self) -> Vec<usize> {
        self.tables.iter().map(Embedding::dim).collect()
    }

    /// Returns `Σ dims`.
    pub fn total_dim(&self) -> usize {
        self.tables.iter().map(Embedding::dim).sum()
    }

    /// Returns the shared dimension when every field has the same width.
    pub fn uniform_dim(&self) -> Option<usize> {
        let first = self.tables.first()?.dim();
        self.tables
            .iter()
            .all(|t| t.dim() == first)
            .then_some(first)
    }

    fn check_fields(&self, sparse: &IndexTensor) -> Result<(), LayerError> {
        if sparse.num_fields() != self.tables.len() {
            return Err(LayerError::InvalidInputDimension {
                expected: self.tables.len(),
                actual: sparse.num_fields(),
            });
        }
        Ok(())
    }

    fn stacked_dim(&self) -> Result<usize, LayerError> {
        self.uniform_dim().ok_or_else(|| LayerError::ConfigError {
            message: format!(
                "Stacked embeddings require equal dimensions, got {:?}",
                self.dims()
            ),
        })
    }

    fn lookup_fields(&self, sparse: &IndexTensor) -> Result<Vec<Tensor>, LayerError> {
        self.check_fields(sparse)?;
        self.tables
            .iter()
            .enumerate()
            .map(|(f, table)| table.lookup(&sparse.column(f)))
            .collect()
    }

    fn lookup_fields_train(&mut self, sparse: &IndexTensor) -> Result<Vec<Tensor>, LayerError> {
        self.check_fields(sparse)?;
        self.tables
            .iter_mut()
            .enumerate()
            .map(|(f, table)| table.lookup_train(&sparse.column(f)))
            .collect()
    }

    /// Returns the embeddings as a `[batch, fields, dim]` tensor.
    pub fn forward_stacked(&self, sparse: &IndexTensor) -> Result<Tensor, LayerError> {
        let k = self.stacked_dim()?;
        let per_field = self.lookup_fields(sparse)?;
        Ok(stack(&per_field, sparse.batch_size(), k))
    }

    /// Training variant of [`FieldEmbeddings::forward_stacked`].
    pub fn forward_stacked_train(&mut self, sparse: &IndexTensor) -> Result<Tensor, LayerError> {
        let k = self.stacked_dim()?;
        let per_field = self.lookup_fields_train(sparse)?;
        Ok(stack(&per_field, sparse.batch_size(), k))
    }

    /// Routes a `[batch, fields, dim]` gradient back into the tables.
    pub fn backward_stacked(&mut self, grad: &Tensor) -> Result<(), LayerError> {
        let k = self.stacked_dim()?;
        let num_fields = self.tables.len();
        if grad.ndim() != 3 || grad.shape()[1] != num_fields || grad.shape()[2] != k {
            return Err(LayerError::ShapeMismatch {
                expected: vec![grad.shape().first().copied().unwrap_or(0), num_fields, k],
                actual: grad.shape().to_vec(),
            });
        }
        let batch = grad.shape()[0];
        let flat = grad.reshape(&[batch, num_fields * k]);
        let per_field = flat.split_cols(&vec![k; num_fields])?;
        for (table, g) in self.tables.iter_mut().zip(per_field.iter()) {
            table.accumulate_grad(g)?;
        }
        Ok(())
    }

    /// Returns the embeddings concatenated along the last axis (`[batch, Σ dims]`).
    pub fn forward_concat(&self, sparse: &IndexTensor) -> Result<Tensor, LayerError> {
        let per_field = self.lookup_fields(sparse)?;
        concat_fields(&per_field, sparse.batch_size())
    }

    /// Training variant of [`FieldEmbeddings::forward_concat`].
    pub fn forward_concat_train(&mut self, sparse: &IndexTensor) -> Result<Tensor, LayerError> {
        let per_field = self.lookup_fields_train(sparse)?;
        concat_fields(&per_field, sparse.batch_size())
    }

    /// Routes a `[batch, Σ dims]` gradient back into the tables.
    pub fn backward_concat(&mut self, grad: &Tensor) -> Result<(), LayerError> {
        let per_field = grad.split_cols(&self.dims())?;
        for (table, g) in self.tables.iter_mut().zip(per_field.iter()) {
            table.accumulate_grad(g)?;
        }
        Ok(())
    }

    /// One table per field, in field order.
    pub fn parameters(&self) -> Vec<&Tensor> {
        self.tables.iter().flat_map(Layer::parameters).collect()
    }

    /// Mutable access aligned with [`FieldEmbeddings::parameters`].
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.tables
            .iter_mut()
            .flat_map(Layer::parameters_mut)
            .collect()
    }

    /// Gradients aligned with [`FieldEmbeddings::parameters`].
    pub fn gradients(&self) -> Vec<Option<&Tensor>> {
        self.tables.iter().flat_map(Layer::gradients).collect()
    }

    /// Sum of the per-table regularization losses.
    pub fn regularization_loss(&self) -> f32 {
        self.tables.iter().map(Layer::regularization_loss).sum()
    }
}

fn stack(per_field: &[Tensor], batch: usize, k: usize) -> Tensor {
    let num_fields = per_field.len();
    let mut data = vec![0.0; batch * num_fields * k];
    for (f, t) in per_field.iter().enumerate() {
        for b in 0..batch {
            let dst = (b * num_fields + f) * k;
            data[dst..dst + k].copy_from_slice(&t.data()[b * k..(b + 1) * k]);
        }
    }
    Tensor::from_data(&[batch, num_fields, k], data)
}

fn concat_fields(per_field: &[Tensor], batch: usize) -> Result<Tensor, LayerError> {
    if per_field.is_empty() {
        return Ok(Tensor::zeros(&[batch, 0]));
    }
    let refs: Vec<&Tensor> = per_field.iter().collect();
    Tensor::concat_cols(&refs)
}
