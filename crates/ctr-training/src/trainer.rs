//! Mini-batch training loop.
//!
//! Each step runs the model's training forward pass, takes the cross-entropy
//! gradient with respect to the logits, back-propagates it and applies one
//! optimizer per parameter tensor.

use std::borrow::Cow;

use ctr_data::{CtrBatch, DataError, Dataset};
use ctr_layers::Tensor;
use ctr_models::CtrModel;
use ctr_optimizer::{create_optimizer, Optimizer};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::TrainConfig;
use crate::error::{Result, TrainingError};
use crate::loss::{binary_cross_entropy, logit_gradient};
use crate::metrics::{Metrics, MetricsRecorder};

/// Metrics for one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Metrics accumulated over the epoch's training steps.
    pub train: Metrics,
    /// Metrics on the held-out rows after the epoch.
    pub validation: Option<Metrics>,
}

/// Everything [`Trainer::fit`] measured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    /// One entry per completed epoch.
    pub epochs: Vec<EpochSummary>,
    /// Whether training ended before the configured number of epochs.
    pub stopped_early: bool,
}

impl History {
    /// Number of completed epochs.
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    /// Returns `true` if no epoch completed.
    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// The last epoch.
    pub fn last(&self) -> Option<&EpochSummary> {
        self.epochs.last()
    }

    /// Training loss per epoch.
    pub fn train_losses(&self) -> Vec<f64> {
        self.epochs.iter().map(|e| e.train.loss).collect()
    }

    /// Validation loss per epoch, for epochs that had a validation set.
    pub fn validation_losses(&self) -> Vec<f64> {
        self.epochs
            .iter()
            .filter_map(|e| e.validation.as_ref().map(|m| m.loss))
            .collect()
    }
}

/// Tracks the best validation loss and how long it has not improved.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best: f64,
    wait: usize,
}

impl EarlyStopping {
    /// Stops once `patience` consecutive epochs fail to improve.
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: f64::INFINITY,
            wait: 0,
        }
    }

    /// Feeds one validation loss; returns `true` when training should stop.
    pub fn update(&mut self, loss: f64) -> bool {
        if loss < self.best {
            self.best = loss;
            self.wait = 0;
            return false;
        }
        self.wait += 1;
        self.wait >= self.patience
    }

    /// Lowest loss seen so far.
    pub fn best(&self) -> f64 {
        self.best
    }
}

/// Trains and evaluates one [`CtrModel`].
///
/// # Example
///
/// ```
/// use ctr_data::synthetic::{synthetic_dataset, SyntheticOptions};
/// use ctr_models::{build_model, ModelConfig, ModelKind};
/// use ctr_training::{TrainConfig, Trainer};
///
/// let (columns, data) = synthetic_dataset(&SyntheticOptions::small(40)).unwrap();
/// let model = build_model(ModelKind::Ffm, &columns, &ModelConfig::default(), 0).unwrap();
/// let config = TrainConfig::default().with_batch_size(8).with_epochs(2);
///
/// let mut trainer = Trainer::new(model, config).unwrap();
/// let history = trainer.fit(&data).unwrap();
/// assert_eq!(history.len(), 2);
/// assert_eq!(trainer.predict(&data).unwrap().len(), 40);
/// ```
pub struct Trainer {
    model: Box<dyn CtrModel>,
    config: TrainConfig,
    optimizers: Vec<Box<dyn Optimizer>>,
    rng: StdRng,
    global_step: u64,
}

impl Trainer {
    /// Creates a trainer with one fresh optimizer per parameter tensor.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::InvalidConfig`] or a wrapped optimizer error
    /// for an invalid config.
    pub fn new(mut model: Box<dyn CtrModel>, config: TrainConfig) -> Result<Self> {
        config.validate()?;
        let optimizers = model
            .parameters_mut()
            .iter()
            .map(|_| create_optimizer(config.optimizer.clone()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        tracing::debug!(
            model = %model.kind(),
            optimizer = config.optimizer.name(),
            tensors = optimizers.len(),
            "Created trainer"
        );
        Ok(Self {
            model,
            rng: StdRng::seed_from_u64(config.seed),
            config,
            optimizers,
            global_step: 0,
        })
    }

    /// The model being trained.
    pub fn model(&self) -> &dyn CtrModel {
        self.model.as_ref()
    }

    /// Consumes the trainer and returns the model.
    pub fn into_model(self) -> Box<dyn CtrModel> {
        self.model
    }

    /// Training hyperparameters.
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Optimizer steps taken so far.
    pub fn global_step(&self) -> u64 {
        self.global_step
    }

    /// Trains for the configured number of epochs.
    ///
    /// The last `validation_split` of `data` is held out before any
    /// shuffling and evaluated after every epoch.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::Data`] for an empty dataset and
    /// [`TrainingError::InvalidConfig`] if the validation split leaves no
    /// training rows. Model and optimizer failures are propagated.
    pub fn fit(&mut self, data: &Dataset) -> Result<History> {
        if data.is_empty() {
            return Err(DataError::Empty.into());
        }
        let (train, validation) = if self.config.validation_split > 0.0 {
            let (head, tail) = data.split_tail(self.config.validation_split)?;
            (Cow::Owned(head), Some(tail).filter(|t| !t.is_empty()))
        } else {
            (Cow::Borrowed(data), None)
        };
        if train.is_empty() {
            return Err(TrainingError::InvalidConfig(format!(
                "validation_split {} leaves no training rows out of {}",
                self.config.validation_split,
                data.len()
            )));
        }

        tracing::info!(
            model = %self.model.kind(),
            train = train.len(),
            validation = validation.as_ref().map_or(0, Dataset::len),
            epochs = self.config.epochs,
            batch_size = self.config.batch_size,
            "Starting training"
        );

        let mut history = History::default();
        let mut early_stopping = self.config.early_stopping_patience.map(EarlyStopping::new);
        for epoch in 1..=self.config.epochs {
            let train_metrics = self.train_epoch(&train)?;
            let validation_metrics = validation
                .as_ref()
                .map(|v| self.evaluate(v))
                .transpose()?;

            tracing::info!(
                epoch,
                epochs = self.config.epochs,
                loss = train_metrics.loss,
                auc = ?train_metrics.auc,
                val_loss = ?validation_metrics.as_ref().map(|m| m.loss),
                val_auc = ?validation_metrics.as_ref().and_then(|m| m.auc),
                "Epoch complete"
            );

            let stop = match (&mut early_stopping, &validation_metrics) {
                (Some(stopper), Some(metrics)) => stopper.update(metrics.loss),
                _ => false,
            };
            history.epochs.push(EpochSummary {
                epoch,
                train: train_metrics,
                validation: validation_metrics,
            });
            if stop && epoch < self.config.epochs {
                tracing::info!(epoch, "Validation loss stopped improving, ending training");
                history.stopped_early = true;
                break;
            }
        }
        Ok(history)
    }

    /// One shuffled pass over `train`.
    ///
    /// # Errors
    ///
    /// Propagates model, data and optimizer failures.
    pub fn train_epoch(&mut self, train: &Dataset) -> Result<Metrics> {
        self.model.set_training(true);
        let mut recorder = MetricsRecorder::new();
        let batches = train.shuffled_batches(self.config.batch_size, &mut self.rng)?;
        for batch in batches {
            let (loss, probs) = self.train_step(&batch)?;
            recorder.record_batch(f64::from(loss), probs.data(), &batch.labels);
        }
        self.model.set_training(false);
        Ok(recorder.aggregate(self.global_step))
    }

    /// One optimizer step on `batch`; returns the loss and the predictions
    /// made before the update.
    ///
    /// # Errors
    ///
    /// Propagates model and optimizer failures.
    pub fn train_step(&mut self, batch: &CtrBatch) -> Result<(f32, Tensor)> {
        let probs = self.model.forward_train(&batch.dense, &batch.sparse)?;
        let loss =
            binary_cross_entropy(probs.data(), &batch.labels)? + self.model.regularization_loss();
        let grad = logit_gradient(probs.data(), &batch.labels)?;
        self.model.backward(&grad)?;
        self.apply_gradients()?;
        self.global_step += 1;

        if self.config.log_interval > 0 && self.global_step % self.config.log_interval == 0 {
            tracing::debug!(step = self.global_step, loss, "Training step");
        }
        Ok((loss, probs))
    }

    fn apply_gradients(&mut self) -> Result<()> {
        // Copied out so the parameters can be borrowed mutably.
        let gradients = self
            .model
            .gradients()
            .into_iter()
            .enumerate()
            .map(|(index, grad)| grad.cloned().ok_or(TrainingError::MissingGradient { index }))
            .collect::<Result<Vec<Tensor>>>()?;

        let params = self.model.parameters_mut();
        for ((param, grad), optimizer) in params
            .into_iter()
            .zip(&gradients)
            .zip(self.optimizers.iter_mut())
        {
            optimizer.apply_gradients(param.data_mut(), grad.data())?;
        }
        Ok(())
    }

    /// Inference-mode loss, AUC and accuracy over `dataset`.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::Model`] if the rows do not match the model.
    pub fn evaluate(&self, dataset: &Dataset) -> Result<Metrics> {
        let regularization = f64::from(self.model.regularization_loss());
        let mut recorder = MetricsRecorder::new();
        for batch in dataset.batches(self.config.batch_size)? {
            let probs = self.model.forward(&batch.dense, &batch.sparse)?;
            let loss = f64::from(binary_cross_entropy(probs.data(), &batch.labels)?);
            recorder.record_batch(loss + regularization, probs.data(), &batch.labels);
        }
        Ok(recorder.aggregate(self.global_step))
    }

    /// Click probabilities for every row of `dataset`, in order.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::Model`] if the rows do not match the model.
    pub fn predict(&self, dataset: &Dataset) -> Result<Vec<f32>> {
        let mut predictions = Vec::with_capacity(dataset.len());
        for batch in dataset.batches(self.config.batch_size)? {
            let probs = self.model.forward(&batch.dense, &batch.sparse)?;
            predictions.extend_from_slice(probs.data());
        }
        Ok(predictions)
    }
}
