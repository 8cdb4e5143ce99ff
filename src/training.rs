//! Training loop
//!
//! Each epoch trains on every batch of the training set, then measures loss
//! and accuracy on the train and test sets, optionally clamps the primary
//! weights and records the metrics.

use crate::architecture::build_model;
use crate::config::{validate_config, ExperimentConfig, TrainingMode};
use crate::data::{Batch, DataLoader, Dataset, Split};
use crate::error::{BenderError, Result};
use crate::loss::logit_cross_entropy;
use crate::metrics::{accuracy, TrainingHistory};
use crate::model::{DirectFeedback, Sequential};
use crate::optimizers::{build_optimizer, Optimizer};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Instant;
use tracing::{debug, info};

/// Drives a model through epochs of mini-batch training.
pub struct Trainer {
    model: Sequential,
    optimizer: Box<dyn Optimizer>,
    loader: DataLoader,
    direct_feedback: Option<DirectFeedback>,
    clamp: Option<[f32; 2]>,
    epochs: usize,
    rng: StdRng,
}

impl Trainer {
    /// Build the model and optimizer described by `config`.
    pub fn new(config: &ExperimentConfig) -> Result<Self> {
        validate_config(config)?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let model = build_model(&config.architecture, &mut rng)?;
        debug!(
            layers = model.len(),
            parameters = model.parameter_count(),
            "model built"
        );
        let optimizer = build_optimizer(&config.optimizer, config.learning_rate)?;
        Self::assemble(model, optimizer, config, rng)
    }

    /// Train an existing model with the hyper-parameters of `config`.
    ///
    /// The architecture listed in `config` is ignored.
    pub fn from_model(
        model: Sequential,
        optimizer: Box<dyn Optimizer>,
        config: &ExperimentConfig,
    ) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(BenderError::config("batch_size must be greater than 0"));
        }
        let rng = StdRng::seed_from_u64(config.seed);
        Self::assemble(model, optimizer, config, rng)
    }

    fn assemble(
        model: Sequential,
        optimizer: Box<dyn Optimizer>,
        config: &ExperimentConfig,
        mut rng: StdRng,
    ) -> Result<Self> {
        let direct_feedback = match config.training_mode {
            TrainingMode::Backprop => None,
            TrainingMode::DirectFeedback => Some(DirectFeedback::for_model(&model, &mut rng)),
        };
        Ok(Self {
            model,
            optimizer,
            loader: DataLoader::new(config.batch_size).shuffle(config.shuffle),
            direct_feedback,
            clamp: config.clamp_weights,
            epochs: config.epochs,
            rng,
        })
    }

    pub fn model(&self) -> &Sequential {
        &self.model
    }

    pub fn into_model(self) -> Sequential {
        self.model
    }

    /// One forward/backward/update step. Returns the batch loss.
    pub fn train_step(&mut self, batch: &Batch) -> f32 {
        let classes = self.model.output_size();
        let trace = self.model.forward_trace(&batch.inputs, batch.size);
        let logits = trace.last().map_or(&[][..], Vec::as_slice);
        let (loss, grad) = logit_cross_entropy(logits, &batch.targets, batch.size, classes);

        match &self.direct_feedback {
            Some(feedback) => {
                self.model
                    .backward_direct_feedback(&batch.inputs, &trace, &grad, feedback, batch.size);
            }
            None => self.model.backward(&batch.inputs, &trace, &grad, batch.size),
        }
        self.model.apply_gradients(&mut *self.optimizer);
        loss
    }

    /// Train on every batch of `data` once. Returns the mean batch loss.
    ///
    /// # Errors
    ///
    /// `NonFiniteLoss` as soon as a batch loss is NaN or infinite, and
    /// `InvalidConfig` if `data` is too small for a single batch.
    pub fn train_epoch(&mut self, data: &Dataset, epoch: usize) -> Result<f32> {
        self.check_batches(data)?;
        let loader = self.loader;

        let mut total = 0.0f32;
        let mut batches = 0usize;
        for batch in loader.iter(data, &mut self.rng) {
            let loss = self.train_step(&batch);
            if !loss.is_finite() {
                return Err(BenderError::NonFiniteLoss { epoch, loss });
            }
            total += loss;
            batches += 1;
        }
        Ok(total / batches as f32)
    }

    /// Mean per-batch loss and accuracy of the model on `data`.
    pub fn evaluate(&self, data: &Dataset) -> Result<(f32, f32)> {
        self.check_batches(data)?;
        let classes = self.model.output_size();
        let loader = DataLoader::new(self.loader.batch_size());
        // Unshuffled, so the RNG is never consumed.
        let mut unused = StdRng::seed_from_u64(0);

        let mut loss_sum = 0.0f32;
        let mut acc_sum = 0.0f32;
        let mut batches = 0usize;
        for batch in loader.iter(data, &mut unused) {
            let logits = self.model.forward(&batch.inputs, batch.size);
            let (loss, _) = logit_cross_entropy(&logits, &batch.targets, batch.size, classes);
            loss_sum += loss;
            acc_sum += accuracy(&logits, &batch.targets, classes);
            batches += 1;
        }
        Ok((loss_sum / batches as f32, acc_sum / batches as f32))
    }

    fn check_batches(&self, data: &Dataset) -> Result<()> {
        if self.loader.num_batches(data.len()) == 0 {
            return Err(BenderError::config(format!(
                "{} samples do not fill a single batch of {}",
                data.len(),
                self.loader.batch_size()
            )));
        }
        if data.feature_size() != self.model.input_size() {
            return Err(BenderError::Shape(format!(
                "dataset has {} features per sample but the model expects {}",
                data.feature_size(),
                self.model.input_size()
            )));
        }
        Ok(())
    }

    /// Run every configured epoch and return the per-epoch metrics.
    pub fn fit(&mut self, train: &Dataset, test: &Dataset) -> Result<TrainingHistory> {
        let mut history = TrainingHistory::new();
        for epoch in 1..=self.epochs {
            let start = Instant::now();
            self.train_epoch(train, epoch)?;
            let (loss_train, acc_train) = self.evaluate(train)?;
            let (loss_test, acc_test) = self.evaluate(test)?;

            if let Some([low, high]) = self.clamp {
                self.model.clamp_weights(low, high);
            }

            history.record(loss_train, loss_test, acc_train, acc_test);
            info!(
                epoch,
                loss_train,
                loss_test,
                acc_train,
                acc_test,
                seconds = start.elapsed().as_secs_f64(),
                "epoch finished"
            );
        }
        Ok(history)
    }
}

/// Load MNIST from `config.data_dir`, train the configured model and return
/// its metrics.
pub fn run_experiment(config: &ExperimentConfig) -> Result<TrainingHistory> {
    validate_config(config)?;
    info!(name = %config.name, data_dir = %config.data_dir, "loading MNIST");
    let train = Dataset::mnist(&config.data_dir, Split::Train, config.train_samples)?;
    let test = Dataset::mnist(&config.data_dir, Split::Test, config.test_samples)?;

    let mut trainer = Trainer::new(config)?;
    info!(
        name = %config.name,
        parameters = trainer.model().parameter_count(),
        train = train.len(),
        test = test.len(),
        epochs = config.epochs,
        "training"
    );
    trainer.fit(&train, &test)
}
