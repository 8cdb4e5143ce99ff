//! Experiment configuration
//!
//! An experiment bundles the training hyper-parameters with the network
//! architecture. Configurations are read from JSON files; every field except
//! `layers` has a default, so a file only needs to list what it changes.

use crate::architecture::{validate_architecture, ArchitectureConfig, LayerConfig};
use crate::error::{BenderError, Result};
use crate::layers::DenseMapping;
use crate::optimizers::OPTIMIZER_NAMES;
use crate::utils::Activation;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// How errors reach the hidden layers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingMode {
    /// Layer-by-layer propagation; each layer's mapping decides which weights
    /// carry the error, so asymmetric mappings give feedback alignment.
    #[default]
    Backprop,
    /// Direct feedback alignment: the output error is projected onto every
    /// hidden layer through its own fixed random matrix.
    DirectFeedback,
}

fn default_name() -> String {
    "experiment".into()
}

fn default_learning_rate() -> f32 {
    3e-4
}

fn default_batch_size() -> usize {
    64
}

fn default_epochs() -> usize {
    10
}

fn default_seed() -> u64 {
    1
}

fn default_optimizer() -> String {
    "adam".into()
}

fn default_train_samples() -> usize {
    60_000
}

fn default_test_samples() -> usize {
    10_000
}

fn default_data_dir() -> String {
    "./data".into()
}

fn default_shuffle() -> bool {
    true
}

/// Hyper-parameters and architecture of one training run.
///
/// # Example
///
/// ```json
/// {
///   "name": "binary",
///   "learning_rate": 0.0003,
///   "batch_size": 64,
///   "epochs": 10,
///   "clamp_weights": [-1.0, 1.0],
///   "layers": [
///     { "layer_type": "gen_dense", "input_size": 784, "output_size": 300,
///       "activation": "sign_ste", "forward": "linear_binary_weights" },
///     { "layer_type": "gen_dense", "input_size": 300, "output_size": 10,
///       "forward": "linear_binary_weights" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Used to name the metrics file written under `logs/`
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// Seeds weight initialization, shuffling and stochastic mappings
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// "adam" or "sgd"
    #[serde(default = "default_optimizer")]
    pub optimizer: String,

    #[serde(default)]
    pub training_mode: TrainingMode,

    /// `[low, high]` range the primary weights are clamped into after each epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clamp_weights: Option<[f32; 2]>,

    /// Maximum number of training samples to load
    #[serde(default = "default_train_samples")]
    pub train_samples: usize,

    /// Maximum number of test samples to load
    #[serde(default = "default_test_samples")]
    pub test_samples: usize,

    /// Directory holding the MNIST IDX files
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Reshuffle the training set every epoch
    #[serde(default = "default_shuffle")]
    pub shuffle: bool,

    #[serde(flatten)]
    pub architecture: ArchitectureConfig,
}

impl ExperimentConfig {
    /// Defaults for every hyper-parameter around the given architecture.
    pub fn with_layers(name: &str, layers: Vec<LayerConfig>) -> Self {
        Self {
            name: name.into(),
            learning_rate: default_learning_rate(),
            batch_size: default_batch_size(),
            epochs: default_epochs(),
            seed: default_seed(),
            optimizer: default_optimizer(),
            training_mode: TrainingMode::Backprop,
            clamp_weights: None,
            train_samples: default_train_samples(),
            test_samples: default_test_samples(),
            data_dir: default_data_dir(),
            shuffle: default_shuffle(),
            architecture: ArchitectureConfig { layers },
        }
    }

    /// 784 → 128 → 64 → 10 MLP trained with feedback alignment.
    pub fn feedback_alignment() -> Self {
        let fa = DenseMapping::LinearAsymDx;
        Self::with_layers(
            "feedback_alignment",
            vec![
                LayerConfig::dense(784, 128, Activation::Relu, fa),
                LayerConfig::dense(128, 64, Activation::Relu, fa),
                LayerConfig::dense(64, 10, Activation::Identity, fa),
            ],
        )
    }

    /// 784 → 300 → 100 → 10 MLP with binary weights and binary hidden units,
    /// latent weights clamped to `[-1, 1]` after every epoch.
    pub fn binary() -> Self {
        let binary = DenseMapping::LinearBinaryWeights;
        let mut config = Self::with_layers(
            "binary",
            vec![
                LayerConfig::dense(784, 300, Activation::SignSte, binary),
                LayerConfig::dense(300, 100, Activation::SignSte, binary),
                LayerConfig::dense(100, 10, Activation::Identity, binary),
            ],
        );
        config.clamp_weights = Some([-1.0, 1.0]);
        config
    }

    pub fn layers(&self) -> &[LayerConfig] {
        &self.architecture.layers
    }
}

/// Loads an experiment configuration from a JSON file and validates it.
///
/// # Examples
///
/// ```no_run
/// use bender::config::load_config;
///
/// let cfg = load_config("config/binary.json").unwrap();
/// assert_eq!(cfg.clamp_weights, Some([-1.0, 1.0]));
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<ExperimentConfig> {
    let contents = fs::read_to_string(path)?;
    let config: ExperimentConfig = serde_json::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Checks hyper-parameter ranges, the optimizer name and the architecture.
pub fn validate_config(config: &ExperimentConfig) -> Result<()> {
    if !(config.learning_rate.is_finite() && config.learning_rate > 0.0) {
        return Err(BenderError::config("learning_rate must be positive"));
    }
    if config.batch_size == 0 {
        return Err(BenderError::config("batch_size must be greater than 0"));
    }
    if config.epochs == 0 {
        return Err(BenderError::config("epochs must be greater than 0"));
    }
    if config.train_samples == 0 || config.test_samples == 0 {
        return Err(BenderError::config(
            "train_samples and test_samples must be greater than 0",
        ));
    }

    if !OPTIMIZER_NAMES.contains(&config.optimizer.to_lowercase().as_str()) {
        return Err(BenderError::config(format!(
            "Invalid optimizer '{}'. Must be one of: {}",
            config.optimizer,
            OPTIMIZER_NAMES.join(", ")
        )));
    }

    if let Some([low, high]) = config.clamp_weights {
        if !(low.is_finite() && high.is_finite() && low < high) {
            return Err(BenderError::config(format!(
                "clamp_weights must be an increasing range, got [{}, {}]",
                low, high
            )));
        }
    }

    validate_architecture(&config.architecture)
}
