//! Tensor and neural network layers for CTR prediction models.
//!
//! This crate provides the building blocks shared by the AFM, DeepFM and FFM
//! models:
//!
//! - **Tensor**: a row-major `f32` tensor plus an index matrix for sparse ids
//! - **Dense layers**: fully connected linear transformations
//! - **DNN**: stacked dense layers with a trailing dropout
//! - **Embeddings**: per-field embedding tables with scatter-add gradients
//! - **FM**: factorization machine with the O(n·k) closed form
//! - **Pairwise interaction and pooling**: the AFM interaction stack
//! - **FFM**: field-aware factorization machine over dense and one-hot fields
//! - **Activations, dropout, initializers, regularizers**
//!
//! # Quick Start
//!
//! ```
//! use ctr_layers::prelude::*;
//! use rand::SeedableRng;
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(42);
//! let dnn = DnnConfig::new(16)
//!     .with_hidden_units(vec![8, 4])
//!     .build(&mut rng)
//!     .unwrap();
//!
//! let input = Tensor::rand(&[32, 16]);
//! let output = dnn.forward(&input).unwrap();
//! assert_eq!(output.shape(), &[32, 4]);
//! ```
//!
//! # Layer Trait
//!
//! Layers with a single tensor input implement [`Layer`]. Training follows a
//! two-phase protocol: an inherent `forward_train` caches intermediates, then
//! [`Layer::backward`] returns the input gradient and stores parameter
//! gradients aligned with [`Layer::parameters`].

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod activation;
pub mod activation_layer;
pub mod dense;
pub mod dropout;
pub mod embedding;
pub mod error;
pub mod ffm;
pub mod fm;
pub mod initializer;
pub mod interaction;
pub mod layer;
pub mod mlp;
pub mod pooling;
pub mod regularizer;
pub mod tensor;

// Re-export main types at crate level
pub use activation::{sigmoid, ActivationType, ReLU, Sigmoid, Tanh};
pub use activation_layer::ActivationLayer;
pub use dense::Dense;
pub use dropout::Dropout;
pub use embedding::{Embedding, FieldEmbeddings};
pub use error::{LayerError, LayerResult};
pub use ffm::{FFMConfig, FFMLayer};
pub use fm::FactorizationMachine;
pub use initializer::Initializer;
pub use interaction::{field_pairs, PairwiseInteraction};
pub use layer::Layer;
pub use mlp::{Dnn, DnnConfig};
pub use pooling::{AttentionPooling, PairPooling, PoolingMode};
pub use regularizer::Regularizer;
pub use tensor::{IndexTensor, Tensor};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::activation::{ActivationType, ReLU, Sigmoid, Tanh};
    pub use crate::dense::Dense;
    pub use crate::dropout::Dropout;
    pub use crate::embedding::{Embedding, FieldEmbeddings};
    pub use crate::error::LayerError;
    pub use crate::ffm::{FFMConfig, FFMLayer};
    pub use crate::fm::FactorizationMachine;
    pub use crate::initializer::Initializer;
    pub use crate::interaction::PairwiseInteraction;
    pub use crate::layer::Layer;
    pub use crate::mlp::{Dnn, DnnConfig};
    pub use crate::pooling::{PairPooling, PoolingMode};
    pub use crate::regularizer::Regularizer;
    pub use crate::tensor::{IndexTensor, Tensor};
}
