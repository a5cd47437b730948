//! DeepFM: a factorization machine and a feed-forward network sharing one
//! input stack.
//!
//! ```text
//! stack = [dense | embed_0 | embed_1 | ...]            [B, n]
//! wide  = FM(stack)                                    [B, 1]
//! deep  = Dense(DNN(stack))                            [B, 1]
//! p     = sigmoid(wide + deep)
//! ```

use ctr_data::FeatureColumns;
use ctr_layers::{
    Dense, Dnn, DnnConfig, FactorizationMachine, FieldEmbeddings, IndexTensor, Initializer, Layer,
    Regularizer, Tensor,
};
use rand::Rng;

use crate::config::{DeepFmConfig, ModelKind};
use crate::error::ModelError;
use crate::model::{check_inputs, CtrModel};

/// DeepFM model.
#[derive(Debug, Clone)]
pub struct DeepFm {
    config: DeepFmConfig,
    num_dense: usize,
    embeddings: FieldEmbeddings,
    fm: FactorizationMachine,
    dnn: Dnn,
    output: Dense,
}

impl DeepFm {
    /// Builds the model.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidConfig`] when the input stack is empty or
    /// `k` is zero, and a wrapped layer error for an invalid DNN setting.
    pub fn new<R: Rng + ?Sized>(
        columns: &FeatureColumns,
        config: &DeepFmConfig,
        rng: &mut R,
    ) -> Result<Self, ModelError> {
        let embed_dim: usize = columns.sparse().iter().map(|f| f.embed_dim).sum();
        let stack_dim = columns.num_dense() + embed_dim;
        if stack_dim == 0 {
            return Err(ModelError::InvalidConfig(
                "DeepFM needs at least one dense or sparse feature".to_string(),
            ));
        }
        if config.k == 0 {
            return Err(ModelError::InvalidConfig("k must be positive".to_string()));
        }

        let embeddings = FieldEmbeddings::new(
            &columns.embedding_shapes(),
            Initializer::keras_random_uniform(),
            Regularizer::L2(config.embed_reg),
            rng,
        );
        let fm = FactorizationMachine::new(stack_dim, config.k, rng)
            .with_regularizers(Regularizer::L2(config.fm_w_reg), Regularizer::L2(config.fm_v_reg));
        let dnn = DnnConfig::new(stack_dim)
            .with_hidden_units(config.hidden_units.clone())
            .with_activation(config.activation)
            .with_dropout(config.dnn_dropout)
            .build(rng)?;
        let output = Dense::new(dnn.output_dim(), 1, rng);

        Ok(Self {
            config: config.clone(),
            num_dense: columns.num_dense(),
            embeddings,
            fm,
            dnn,
            output,
        })
    }

    /// Hyperparameters.
    pub fn config(&self) -> &DeepFmConfig {
        &self.config
    }

    /// Width of the shared input stack.
    pub fn stack_dim(&self) -> usize {
        self.fm.input_dim()
    }

    /// The wide (FM) component.
    pub fn fm(&self) -> &FactorizationMachine {
        &self.fm
    }

    /// Concatenated dense values and embeddings, `[B, n]`.
    pub fn input_stack(&self, dense: &Tensor, sparse: &IndexTensor) -> Result<Tensor, ModelError> {
        check_inputs(dense, sparse, self.num_dense)?;
        let embed = self.embeddings.forward_concat(sparse)?;
        Ok(Tensor::concat_cols(&[dense, &embed])?)
    }
}

impl CtrModel for DeepFm {
    fn kind(&self) -> ModelKind {
        ModelKind::DeepFm
    }

    fn logits(&self, dense: &Tensor, sparse: &IndexTensor) -> Result<Tensor, ModelError> {
        let stack = self.input_stack(dense, sparse)?;
        let wide = self.fm.forward(&stack)?;
        let deep = self.output.forward(&self.dnn.forward(&stack)?)?;
        Ok(wide.add(&deep))
    }

    fn forward_train(&mut self, dense: &Tensor, sparse: &IndexTensor) -> Result<Tensor, ModelError> {
        check_inputs(dense, sparse, self.num_dense)?;
        let embed = self.embeddings.forward_concat_train(sparse)?;
        let stack = Tensor::concat_cols(&[dense, &embed])?;
        let wide = self.fm.forward_train(&stack)?;
        let hidden = self.dnn.forward_train(&stack)?;
        let deep = self.output.forward_train(&hidden)?;
        Ok(wide.add(&deep).map(ctr_layers::sigmoid))
    }

    fn backward(&mut self, grad_logits: &Tensor) -> Result<(), ModelError> {
        let mut d_stack = self.fm.backward(grad_logits)?;
        let d_hidden = self.output.backward(grad_logits)?;
        d_stack.add_assign(&self.dnn.backward(&d_hidden)?);

        let embed_dim = self.stack_dim() - self.num_dense;
        let parts = d_stack.split_cols(&[self.num_dense, embed_dim])?;
        self.embeddings.backward_concat(&parts[1])?;
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
        named.extend(
            ["fm/w0", "fm/w", "fm/V"]
                .iter()
                .map(|n| n.to_string())
                .zip(self.fm.parameters()),
        );
        for (i, layer) in self.dnn.dense_layers().iter().enumerate() {
            named.push((format!("dnn/dense_{i}/kernel"), layer.weights()));
            named.push((format!("dnn/dense_{i}/bias"), layer.bias()));
        }
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
        params.extend(self.fm.parameters_mut());
        params.extend(self.dnn.parameters_mut());
        params.extend(self.output.parameters_mut());
        params
    }

    fn gradients(&self) -> Vec<Option<&Tensor>> {
        let mut grads = self.embeddings.gradients();
        grads.extend(self.fm.gradients());
        grads.extend(self.dnn.gradients());
        grads.extend(self.output.gradients());
        grads
    }

    fn regularization_loss(&self) -> f32 {
        self.embeddings.regularization_loss()
            + self.fm.regularization_loss()
            + self.dnn.regularization_loss()
            + self.output.regularization_loss()
    }

    fn set_training(&mut self, training: bool) {
        self.dnn.set_training(training);
    }
}
