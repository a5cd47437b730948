//! The common model interface and the model factory.

use ctr_data::FeatureColumns;
use ctr_layers::{sigmoid, IndexTensor, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::afm::Afm;
use crate::config::{ModelConfig, ModelKind};
use crate::deepfm::DeepFm;
use crate::error::ModelError;
use crate::ffm::Ffm;
use crate::summary::ModelSummary;

/// A CTR model mapping `(dense [B, D], sparse [B, S])` to click
/// probabilities `[B, 1]`.
///
/// Training follows the layer protocol: [`CtrModel::forward_train`] caches
/// intermediates, then [`CtrModel::backward`] takes the gradient of the loss
/// with respect to the pre-sigmoid logits and stores parameter gradients
/// aligned with [`CtrModel::parameters_mut`].
pub trait CtrModel: Send {
    /// Which model this is.
    fn kind(&self) -> ModelKind;

    /// Inference logits, `[B, 1]`.
    ///
    /// # Errors
    ///
    /// Returns a [`ModelError`] for inputs that do not match the feature
    /// columns the model was built for.
    fn logits(&self, dense: &Tensor, sparse: &IndexTensor) -> Result<Tensor, ModelError>;

    /// Inference probabilities, `[B, 1]`.
    fn forward(&self, dense: &Tensor, sparse: &IndexTensor) -> Result<Tensor, ModelError> {
        Ok(self.logits(dense, sparse)?.map(sigmoid))
    }

    /// Training forward pass; returns probabilities and caches intermediates.
    fn forward_train(&mut self, dense: &Tensor, sparse: &IndexTensor) -> Result<Tensor, ModelError>;

    /// Backward pass from `d loss / d logits` (`[B, 1]`).
    ///
    /// # Errors
    ///
    /// Returns [`ctr_layers::LayerError::NotInitialized`] (wrapped) without a
    /// preceding [`CtrModel::forward_train`].
    fn backward(&mut self, grad_logits: &Tensor) -> Result<(), ModelError>;

    /// Named parameter tensors, in update order.
    fn named_parameters(&self) -> Vec<(String, &Tensor)>;

    /// Mutable parameters, aligned with [`CtrModel::named_parameters`].
    fn parameters_mut(&mut self) -> Vec<&mut Tensor>;

    /// Gradients from the last backward pass, aligned with the parameters.
    fn gradients(&self) -> Vec<Option<&Tensor>>;

    /// Sum of all regularization penalties.
    fn regularization_loss(&self) -> f32;

    /// Switches dropout between training and inference behaviour.
    fn set_training(&mut self, training: bool);

    /// Parameter listing with shapes and counts.
    fn summary(&self) -> ModelSummary {
        ModelSummary::new(
            self.kind().to_string(),
            self.named_parameters()
                .into_iter()
                .map(|(name, t)| (name, t.shape().to_vec()))
                .collect(),
        )
    }
}

/// Builds a model for the given feature columns.
///
/// All parameters and dropout masks are drawn from an RNG seeded with `seed`.
///
/// # Errors
///
/// Returns [`ModelError::InvalidConfig`] if the columns or hyperparameters
/// cannot form the requested model.
///
/// # Example
///
/// ```
/// use ctr_data::synthetic::{synthetic_dataset, SyntheticOptions};
/// use ctr_models::{build_model, ModelConfig, ModelKind};
///
/// let (columns, data) = synthetic_dataset(&SyntheticOptions::small(4)).unwrap();
/// let model = build_model(ModelKind::Afm, &columns, &ModelConfig::default(), 7).unwrap();
/// let probs = model.forward(data.dense(), data.sparse()).unwrap();
/// assert_eq!(probs.shape(), &[4, 1]);
/// ```
pub fn build_model(
    kind: ModelKind,
    columns: &FeatureColumns,
    config: &ModelConfig,
    seed: u64,
) -> Result<Box<dyn CtrModel>, ModelError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let model: Box<dyn CtrModel> = match kind {
        ModelKind::Afm => Box::new(Afm::new(columns, &config.afm, &mut rng)?),
        ModelKind::DeepFm => Box::new(DeepFm::new(columns, &config.deepfm, &mut rng)?),
        ModelKind::Ffm => Box::new(Ffm::new(columns, &config.ffm, &mut rng)?),
    };
    tracing::debug!(
        model = %kind,
        params = model.summary().total_params(),
        "Built model"
    );
    Ok(model)
}

pub(crate) fn check_inputs(
    dense: &Tensor,
    sparse: &IndexTensor,
    num_dense: usize,
) -> Result<(), ModelError> {
    if dense.ndim() != 2 || dense.shape()[1] != num_dense {
        return Err(ModelError::DenseWidth {
            expected: num_dense,
            actual: dense.shape().last().copied().unwrap_or(0),
        });
    }
    if dense.shape()[0] != sparse.batch_size() {
        return Err(ModelError::BatchMismatch {
            dense: dense.shape()[0],
            sparse: sparse.batch_size(),
        });
    }
    Ok(())
}
