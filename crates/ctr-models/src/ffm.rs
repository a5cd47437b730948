//! Field-aware Factorization Machine.
//!
//! Every dense column is one field carrying its value; every sparse column is
//! one field whose active feature is the one-hot id with value 1. The logit is
//!
//! ```text
//! w0 + Σ_i w[feat_i]·x_i + Σ_{i<j} <v[feat_i, field_j], v[feat_j, field_i]>·x_i·x_j
//! ```

use ctr_data::FeatureColumns;
use ctr_layers::{FFMConfig, FFMLayer, IndexTensor, Regularizer, Tensor};
use rand::Rng;

use crate::config::{FfmConfig, ModelKind};
use crate::error::ModelError;
use crate::model::{check_inputs, CtrModel};

/// FFM model.
#[derive(Debug, Clone)]
pub struct Ffm {
    layer: FFMLayer,
}

impl Ffm {
    /// Builds the model.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidConfig`] for `k = 0` or when there are no
    /// features at all.
    pub fn new<R: Rng + ?Sized>(
        columns: &FeatureColumns,
        config: &FfmConfig,
        rng: &mut R,
    ) -> Result<Self, ModelError> {
        if config.k == 0 {
            return Err(ModelError::InvalidConfig("k must be positive".to_string()));
        }
        if columns.num_dense() + columns.num_sparse() == 0 {
            return Err(ModelError::InvalidConfig(
                "FFM needs at least one feature".to_string(),
            ));
        }
        let layer_config = FFMConfig::new(columns.num_dense(), columns.feat_nums(), config.k)
            .with_regularizers(Regularizer::L2(config.w_reg), Regularizer::L2(config.v_reg));
        tracing::debug!(
            features = layer_config.num_features(),
            fields = layer_config.num_fields(),
            k = config.k,
            "Building FFM"
        );
        Ok(Self {
            layer: FFMLayer::from_config(layer_config, rng),
        })
    }

    /// The underlying layer.
    pub fn layer(&self) -> &FFMLayer {
        &self.layer
    }
}

impl CtrModel for Ffm {
    fn kind(&self) -> ModelKind {
        ModelKind::Ffm
    }

    fn logits(&self, dense: &Tensor, sparse: &IndexTensor) -> Result<Tensor, ModelError> {
        check_inputs(dense, sparse, self.layer.config().num_dense)?;
        Ok(self.layer.forward_with_fields(dense, sparse)?)
    }

    fn forward_train(&mut self, dense: &Tensor, sparse: &IndexTensor) -> Result<Tensor, ModelError> {
        check_inputs(dense, sparse, self.layer.config().num_dense)?;
        let logits = self.layer.forward_train_with_fields(dense, sparse)?;
        Ok(logits.map(ctr_layers::sigmoid))
    }

    fn backward(&mut self, grad_logits: &Tensor) -> Result<(), ModelError> {
        Ok(self.layer.backward_ffm(grad_logits)?)
    }

    fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        ["w0", "w", "v"]
            .iter()
            .map(|n| n.to_string())
            .zip(self.layer.parameters())
            .collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.layer.parameters_mut()
    }

    fn gradients(&self) -> Vec<Option<&Tensor>> {
        self.layer.gradients()
    }

    fn regularization_loss(&self) -> f32 {
        self.layer.regularization_loss()
    }

    // No dropout.
    fn set_training(&mut self, _training: bool) {}
}
