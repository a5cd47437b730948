#![allow(clippy::needless_range_loop)]
//! Tensor types for neural network computations.
//!
//! [`Tensor`] is a dense, row-major `f32` array used for activations,
//! parameters and gradients. [`IndexTensor`] is its integer counterpart for
//! label-encoded sparse feature ids.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::LayerError;

/// A multi-dimensional array for neural network computations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    /// The shape of the tensor (dimensions)
    shape: Vec<usize>,
    /// The underlying data in row-major order
    data: Vec<f32>,
}

impl Tensor {
    /// Creates a new tensor with the given shape, filled with zeros.
    ///
    /// # Example
    ///
    /// ```
    /// use ctr_layers::tensor::Tensor;
    ///
    /// let t = Tensor::zeros(&[2, 3]);
    /// assert_eq!(t.shape(), &[2, 3]);
    /// assert_eq!(t.numel(), 6);
    /// ```
    pub fn zeros(shape: &[usize]) -> Self {
        let numel: usize = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: vec![0.0; numel],
        }
    }

    /// Creates a new tensor with the given shape, filled with ones.
    pub fn ones(shape: &[usize]) -> Self {
        Self::full(shape, 1.0)
    }

    /// Creates a new tensor with the given shape, filled with `value`.
    pub fn full(shape: &[usize], value: f32) -> Self {
        let numel: usize = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: vec![value; numel],
        }
    }

    /// Creates a new tensor with the given shape and data.
    ///
    /// # Panics
    ///
    /// Panics if the data length doesn't match the shape
    pub fn from_data(shape: &[usize], data: Vec<f32>) -> Self {
        let numel: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            numel,
            "Data length {} doesn't match shape {:?} (expected {})",
            data.len(),
            shape,
            numel
        );
        Self {
            shape: shape.to_vec(),
            data,
        }
    }

    /// Fallible variant of [`Tensor::from_data`].
    pub fn try_from_data(shape: &[usize], data: Vec<f32>) -> Result<Self, LayerError> {
        let numel: usize = shape.iter().product();
        if data.len() != numel {
            return Err(LayerError::ShapeMismatch {
                expected: shape.to_vec(),
                actual: vec![data.len()],
            });
        }
        Ok(Self {
            shape: shape.to_vec(),
            data,
        })
    }

    /// Creates a tensor with values drawn uniformly from `[0, 1)` using a fixed seed.
    ///
    /// Handy for tests and examples where reproducibility matters more than
    /// the distribution.
    pub fn rand(shape: &[usize]) -> Self {
        let mut rng = StdRng::seed_from_u64(42);
        Self::rand_uniform(shape, 0.0, 1.0, &mut rng)
    }

    /// Creates a tensor with values drawn uniformly from `[min, max)`.
    pub fn rand_uniform<R: Rng + ?Sized>(shape: &[usize], min: f32, max: f32, rng: &mut R) -> Self {
        let numel: usize = shape.iter().product();
        let data: Vec<f32> = if max > min {
            (0..numel).map(|_| rng.gen_range(min..max)).collect()
        } else {
            vec![min; numel]
        };
        Self {
            shape: shape.to_vec(),
            data,
        }
    }

    /// Creates a tensor with values drawn from a normal distribution.
    pub fn randn<R: Rng + ?Sized>(shape: &[usize], mean: f32, std: f32, rng: &mut R) -> Self {
        let numel: usize = shape.iter().product();
        let data: Vec<f32> = match Normal::new(mean, std) {
            Ok(normal) => (0..numel).map(|_| normal.sample(rng)).collect(),
            // std <= 0 or NaN: degenerate distribution
            Err(_) => vec![mean; numel],
        };
        Self {
            shape: shape.to_vec(),
            data,
        }
    }

    /// Returns the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Returns the total number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Returns the size of the last dimension (0 for a scalar-shaped tensor).
    pub fn last_dim(&self) -> usize {
        self.shape.last().copied().unwrap_or(0)
    }

    /// Returns a reference to the underlying data.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Returns a mutable reference to the underlying data.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Consumes the tensor and returns its data.
    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Returns true if every element is finite (no NaN or infinity).
    pub fn all_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }

    /// Matrix multiplication between two 2D tensors.
    ///
    /// # Panics
    ///
    /// Panics if the inner dimensions don't match
    pub fn matmul(&self, other: &Tensor) -> Tensor {
        assert_eq!(self.ndim(), 2, "matmul requires 2D tensors");
        assert_eq!(other.ndim(), 2, "matmul requires 2D tensors");
        assert_eq!(
            self.shape[1], other.shape[0],
            "Inner dimensions must match for matmul"
        );

        let m = self.shape[0];
        let k = self.shape[1];
        let n = other.shape[1];

        let mut result = vec![0.0; m * n];
        for i in 0..m {
            for l in 0..k {
                let a = self.data[i * k + l];
                if a == 0.0 {
                    continue;
                }
                let row = &other.data[l * n..(l + 1) * n];
                let out = &mut result[i * n..(i + 1) * n];
                for j in 0..n {
                    out[j] += a * row[j];
                }
            }
        }

        Tensor::from_data(&[m, n], result)
    }

    /// Transposes a 2D tensor.
    pub fn transpose(&self) -> Tensor {
        assert_eq!(self.ndim(), 2, "transpose requires 2D tensor");
        let m = self.shape[0];
        let n = self.shape[1];

        let mut result = vec![0.0; m * n];
        for i in 0..m {
            for j in 0..n {
                result[j * m + i] = self.data[i * n + j];
            }
        }

        Tensor::from_data(&[n, m], result)
    }

    /// Element-wise addition with broadcasting.
    ///
    /// Supports identical shapes, a single-element `other`, and a 1D `other`
    /// matching the last dimension (bias addition).
    pub fn add(&self, other: &Tensor) -> Tensor {
        if self.shape == other.shape {
            let data: Vec<f32> = self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| a + b)
                .collect();
            Tensor::from_data(&self.shape, data)
        } else if other.numel() == 1 {
            let scalar = other.data[0];
            self.map(|a| a + scalar)
        } else if other.ndim() == 1 && self.last_dim() == other.shape[0] {
            let n = other.shape[0];
            let mut data = self.data.clone();
            for (i, v) in data.iter_mut().enumerate() {
                *v += other.data[i % n];
            }
            Tensor::from_data(&self.shape, data)
        } else {
            panic!(
                "Cannot broadcast shapes {:?} and {:?}",
                self.shape, other.shape
            );
        }
    }

    /// Element-wise subtraction (identical shapes or single-element `other`).
    pub fn sub(&self, other: &Tensor) -> Tensor {
        if self.shape == other.shape {
            let data: Vec<f32> = self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| a - b)
                .collect();
            Tensor::from_data(&self.shape, data)
        } else if other.numel() == 1 {
            let scalar = other.data[0];
            self.map(|a| a - scalar)
        } else {
            panic!(
                "Cannot subtract shapes {:?} and {:?}",
                self.shape, other.shape
            );
        }
    }

    /// Element-wise multiplication.
    pub fn mul(&self, other: &Tensor) -> Tensor {
        if self.shape == other.shape {
            let data: Vec<f32> = self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| a * b)
                .collect();
            Tensor::from_data(&self.shape, data)
        } else if other.numel() == 1 {
            let scalar = other.data[0];
            self.map(|a| a * scalar)
        } else {
            panic!(
                "Cannot multiply shapes {:?} and {:?}",
                self.shape, other.shape
            );
        }
    }

    /// In-place element-wise accumulation of a tensor with the same shape.
    pub fn add_assign(&mut self, other: &Tensor) {
        assert_eq!(self.shape, other.shape, "add_assign shape mismatch");
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += b;
        }
    }

    /// Scalar multiplication.
    pub fn scale(&self, scalar: f32) -> Tensor {
        self.map(|a| a * scalar)
    }

    /// Element-wise square.
    pub fn sqr(&self) -> Tensor {
        self.map(|a| a * a)
    }

    /// Element-wise absolute value.
    pub fn abs(&self) -> Tensor {
        self.map(f32::abs)
    }

    /// Sum all elements in the tensor.
    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    /// Sum along an axis of a 2D tensor.
    ///
    /// Axis 0 yields shape `[n]`, axis 1 yields shape `[m]`.
    pub fn sum_axis(&self, axis: usize) -> Tensor {
        assert!(axis < self.ndim(), "Axis out of bounds");
        assert_eq!(self.ndim(), 2, "sum_axis only implemented for 2D tensors");

        let m = self.shape[0];
        let n = self.shape[1];
        if axis == 0 {
            let mut result = vec![0.0; n];
            for i in 0..m {
                for j in 0..n {
                    result[j] += self.data[i * n + j];
                }
            }
            Tensor::from_data(&[n], result)
        } else {
            let result: Vec<f32> = (0..m)
                .map(|i| self.data[i * n..(i + 1) * n].iter().sum())
                .collect();
            Tensor::from_data(&[m], result)
        }
    }

    /// Apply a function element-wise.
    pub fn map<F>(&self, f: F) -> Tensor
    where
        F: Fn(f32) -> f32,
    {
        let data: Vec<f32> = self.data.iter().map(|&x| f(x)).collect();
        Tensor::from_data(&self.shape, data)
    }

    /// Reshape the tensor to a new shape.
    ///
    /// # Panics
    ///
    /// Panics if the new shape has a different number of elements
    pub fn reshape(&self, new_shape: &[usize]) -> Tensor {
        let new_numel: usize = new_shape.iter().product();
        assert_eq!(
            self.numel(),
            new_numel,
            "Cannot reshape tensor of {} elements to shape {:?}",
            self.numel(),
            new_shape
        );
        Tensor::from_data(new_shape, self.data.clone())
    }

    /// Concatenates 2D tensors along the last axis.
    ///
    /// All inputs must share the same number of rows.
    pub fn concat_cols(tensors: &[&Tensor]) -> Result<Tensor, LayerError> {
        let Some(first) = tensors.first() else {
            return Err(LayerError::ForwardError {
                message: "concat_cols expects at least one tensor".to_string(),
            });
        };
        if first.ndim() != 2 {
            return Err(LayerError::ForwardError {
                message: format!("concat_cols expects 2D tensors, got {}D", first.ndim()),
            });
        }
        let rows = first.shape[0];
        for t in tensors {
            if t.ndim() != 2 || t.shape[0] != rows {
                return Err(LayerError::ShapeMismatch {
                    expected: vec![rows, t.last_dim()],
                    actual: t.shape.clone(),
                });
            }
        }

        let total: usize = tensors.iter().map(|t| t.shape[1]).sum();
        let mut data = Vec::with_capacity(rows * total);
        for r in 0..rows {
            for t in tensors {
                let n = t.shape[1];
                data.extend_from_slice(&t.data[r * n..(r + 1) * n]);
            }
        }
        Ok(Tensor::from_data(&[rows, total], data))
    }

    /// Splits a 2D tensor along the last axis into pieces of the given widths.
    ///
    /// Inverse of [`Tensor::concat_cols`].
    pub fn split_cols(&self, widths: &[usize]) -> Result<Vec<Tensor>, LayerError> {
        if self.ndim() != 2 {
            return Err(LayerError::ForwardError {
                message: format!("split_cols expects a 2D tensor, got {}D", self.ndim()),
            });
        }
        let total: usize = widths.iter().sum();
        if total != self.shape[1] {
            return Err(LayerError::InvalidInputDimension {
                expected: total,
                actual: self.shape[1],
            });
        }

        let rows = self.shape[0];
        let cols = self.shape[1];
        let mut out = Vec::with_capacity(widths.len());
        let mut offset = 0;
        for &w in widths {
            let mut data = Vec::with_capacity(rows * w);
            for r in 0..rows {
                data.extend_from_slice(&self.data[r * cols + offset..r * cols + offset + w]);
            }
            out.push(Tensor::from_data(&[rows, w], data));
            offset += w;
        }
        Ok(out)
    }
}

impl std::ops::Add for &Tensor {
    type Output = Tensor;

    fn add(self, other: &Tensor) -> Tensor {
        Tensor::add(self, other)
    }
}

impl std::ops::Mul for &Tensor {
    type Output = Tensor;

    fn mul(self, other: &Tensor) -> Tensor {
        Tensor::mul(self, other)
    }
}

/// A 2D matrix of label-encoded sparse feature ids, shape `[batch, num_fields]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexTensor {
    batch_size: usize,
    num_fields: usize,
    data: Vec<usize>,
}

impl IndexTensor {
    /// Creates an index tensor from row-major data.
    pub fn new(batch_size: usize, num_fields: usize, data: Vec<usize>) -> Result<Self, LayerError> {
        if data.len() != batch_size * num_fields {
            return Err(LayerError::ShapeMismatch {
                expected: vec![batch_size, num_fields],
                actual: vec![data.len()],
            });
        }
        Ok(Self {
            batch_size,
            num_fields,
            data,
        })
    }

    /// Creates an index tensor from per-sample rows.
    ///
    /// All rows must have the same length.
    ///
    /// # Example
    ///
    /// ```
    /// use ctr_layers::tensor::IndexTensor;
    ///
    /// let ids = IndexTensor::from_rows(&[vec![0, 2], vec![1, 1]]).unwrap();
    /// assert_eq!(ids.shape(), [2, 2]);
    /// assert_eq!(ids.column(0), vec![0, 1]);
    /// ```
    pub fn from_rows(rows: &[Vec<usize>]) -> Result<Self, LayerError> {
        let num_fields = rows.first().map(Vec::len).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * num_fields);
        for row in rows {
            if row.len() != num_fields {
                return Err(LayerError::ShapeMismatch {
                    expected: vec![num_fields],
                    actual: vec![row.len()],
                });
            }
            data.extend_from_slice(row);
        }
        Self::new(rows.len(), num_fields, data)
    }

    /// Returns `[batch_size, num_fields]`.
    pub fn shape(&self) -> [usize; 2] {
        [self.batch_size, self.num_fields]
    }

    /// Number of samples.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of sparse fields per sample.
    pub fn num_fields(&self) -> usize {
        self.num_fields
    }

    /// Id of field `field` for sample `row`.
    pub fn get(&self, row: usize, field: usize) -> usize {
        self.data[row * self.num_fields + field]
    }

    /// All ids of one sample.
    pub fn row(&self, row: usize) -> &[usize] {
        &self.data[row * self.num_fields..(row + 1) * self.num_fields]
    }

    /// All ids of one field across the batch.
    pub fn column(&self, field: usize) -> Vec<usize> {
        (0..self.batch_size).map(|b| self.get(b, field)).collect()
    }

    /// Row-major data.
    pub fn data(&self) -> &[usize] {
        &self.data
    }

    /// Gathers the given rows into a new index tensor.
    pub fn select_rows(&self, rows: &[usize]) -> IndexTensor {
        let mut data = Vec::with_capacity(rows.len() * self.num_fields);
        for &r in rows {
            data.extend_from_slice(self.row(r));
        }
        IndexTensor {
            batch_size: rows.len(),
            num_fields: self.num_fields,
            data,
        }
    }
}

impl Tensor {
    /// Gathers the given rows of a 2D tensor into a new tensor.
    pub fn select_rows(&self, rows: &[usize]) -> Tensor {
        assert_eq!(self.ndim(), 2, "select_rows requires a 2D tensor");
        let n = self.shape[1];
        let mut data = Vec::with_capacity(rows.len() * n);
        for &r in rows {
            data.extend_from_slice(&self.data[r * n..(r + 1) * n]);
        }
        Tensor::from_data(&[rows.len(), n], data)
    }
}
