//! Attentional Factorization Machine.
//!
//! ```text
//! sparse ids ─► embeddings [B,S,k] ─► pair products [B,P,k]
//!            ─► pooling (sum | mean | attention) [B,k] ─► dropout
//!            ─► Dense(k→1) ─► sigmoid
//! ```
//!
//! Dense inputs are accepted for interface parity but do not contribute.

use ctr_data::FeatureColumns;
use ctr_layers::{
    Dense, Dropout, FieldEmbeddings, IndexTensor, Initializer, Layer, PairPooling,
    PairwiseInteraction, PoolingMode, Regularizer, Tensor,
};
use rand::Rng;

use crate::config::{AfmConfig, ModelKind};
use crate::error::ModelError;
use crate::model::{check_inputs, CtrModel};

/// AFM model.
#[derive(Debug, Clone)]
pub struct Afm {
    config: AfmConfig,
    num_dense: usize,
    embeddings: FieldEmbeddings,
    interaction: PairwiseInteraction,
    pooling: PairPooling,
    dropout: Dropout,
    output: Dense,
}

impl Afm {
    /// Builds the model.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidConfig`] with fewer than two sparse
    /// features, unequal embedding widths or an out-of-range dropout rate.
    pub fn new<R: Rng + ?Sized>(
        columns: &FeatureColumns,
        config: &AfmConfig,
        rng: &mut R,
    ) -> Result<Self, ModelError> {
        if columns.num_sparse() < 2 {
            return Err(ModelError::InvalidConfig(format!(
                "AFM needs at least two sparse features to form a pair, got {}",
                columns.num_sparse()
            )));
        }
        let k = columns.uniform_embed_dim().ok_or_else(|| {
            ModelError::InvalidConfig("AFM requires equal embedding widths".to_string())
        })?;
        if config.mode == PoolingMode::Attention && config.att_vector == 0 {
            return Err(ModelError::InvalidConfig(
                "att_vector must be positive".to_string(),
            ));
        }

        let embeddings = FieldEmbeddings::new(
            &columns.embedding_shapes(),
            Initializer::keras_random_uniform(),
            Regularizer::L2(config.embed_reg),
            rng,
        );
        let interaction = PairwiseInteraction::new(columns.num_sparse());
        let pooling = PairPooling::new(config.mode, k, config.att_vector, config.activation, rng);
        let dropout = Dropout::new(config.dropout, rng.gen())?;
        let output = Dense::new(k, 1, rng);

        Ok(Self {
            config: config.clone(),
            num_dense: columns.num_dense(),
            embeddings,
            interaction,
            pooling,
            dropout,
            output,
        })
    }

    /// Hyperparameters.
    pub fn config(&self) -> &AfmConfig {
        &self.config
    }

    /// Number of feature pairs.
    pub fn num_pairs(&self) -> usize {
        self.interaction.num_pairs()
    }

    /// The pooled `[B, k]` representation before the output layer.
    pub fn pooled(&self, dense: &Tensor, sparse: &IndexTensor) -> Result<Tensor, ModelError> {
        check_inputs(dense, sparse, self.num_dense)?;
        let embed = self.embeddings.forward_stacked(sparse)?;
        let bi = self.interaction.forward(&embed)?;
        Ok(self.pooling.forward(&bi)?)
    }

    /// Per-pair pooling weights, `[B, P]`.
    pub fn pair_weights(&self, dense: &Tensor, sparse: &IndexTensor) -> Result<Tensor, ModelError> {
        check_inputs(dense, sparse, self.num_dense)?;
        let embed = self.embeddings.forward_stacked(sparse)?;
        let bi = self.interaction.forward(&embed)?;
        Ok(self.pooling.pair_weights(&bi)?)
    }
}

impl CtrModel for Afm {
    fn kind(&self) -> ModelKind {
        ModelKind::Afm
    }

    fn logits(&self, dense: &Tensor, sparse: &IndexTensor) -> Result<Tensor, ModelError> {
        let pooled = self.pooled(dense, sparse)?;
        Ok(self.output.forward(&pooled)?)
    }

    fn forward_train(&mut self, dense: &Tensor, sparse: &IndexTensor) -> Result<Tensor, ModelError> {
        check_inputs(dense, sparse, self.num_dense)?;
        let embed = self.embeddings.forward_stacked_train(sparse)?;
        let bi = self.interaction.forward_train(&embed)?;
        let pooled = self.pooling.forward_train(&bi)?;
        let pooled = self.dropout.forward_train(&pooled)?;
        let logits = self.output.forward_train(&pooled)?;
        Ok(logits.map(ctr_layers::sigmoid))
    }

    fn backward(&mut self, grad_logits: &Tensor) -> Result<(), ModelError> {
        let g = self.output.backward(grad_logits)?;
        let g = self.dropout.backward(&g)?;
        let g = self.pooling.backward(&g)?;
        let g = self.interaction.backward(&g)?;
        self.embeddings.backward_stacked(&g)?;
        Ok(())
    }

    fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        let mut named: Vec<(String, &Tensor)> = self
            .embeddings
            .parameters()
            .into_iter()
            .enumerate()
            .map(|(i, t)| (format!("embed_{i}/embeddings"), t))
            .collect();
        let attention_names = [
            "attention_W/kernel",
            "attention_W/bias",
            "attention_dense/kernel",
            "attention_dense/bias",
        ];
        named.extend(
            attention_names
                .iter()
                .map(|n| n.to_string())
                .zip(self.pooling.parameters()),
        );
        named.extend(
            ["dense/kernel", "dense/bias"]
                .iter()
                .map(|n| n.to_string())
                .zip(self.output.parameters()),
        );
        named
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.embeddings.parameters_mut();
        params.extend(self.pooling.parameters_mut());
        params.extend(self.output.parameters_mut());
        params
    }

    fn gradients(&self) -> Vec<Option<&Tensor>> {
        let mut grads = self.embeddings.gradients();
        grads.extend(self.pooling.gradients());
        grads.extend(self.output.gradients());
        grads
    }

    fn regularization_loss(&self) -> f32 {
        self.embeddings.regularization_loss()
            + self.pooling.regularization_loss()
            + self.output.regularization_loss()
    }

    fn set_training(&mut self, training: bool) {
        self.dropout.set_training(training);
    }
}
