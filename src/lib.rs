//! Generalized neural network layers
//!
//! Dense and convolutional layers whose forward mapping is swappable, so the
//! weights that produce a layer's output need not be the weights that carry
//! the error back to its input. This covers feedback alignment (fixed random
//! backward weights) and binary-weight networks (sign of the weights forward,
//! straight-through gradients to real-valued latent weights).
//!
//! # Modules
//!
//! - `layers`: Layer trait, `GenDense`, `GenConv` and their forward mappings
//! - `similarity`: matmul, radial and convolution kernels with their gradients
//! - `loss`: softmax cross-entropy and the direct feedback alignment loss
//! - `model`: `Sequential` models and direct feedback matrices
//! - `optimizers`: Optimizer trait, SGD and Adam
//! - `data`: MNIST IDX loading, one-hot encoding and batching
//! - `metrics`: accuracy and per-epoch training history
//! - `architecture`: architecture configuration and model building
//! - `config`: experiment configuration and presets
//! - `training`: the epoch loop
//! - `utils`: activations and weight initialization

pub mod architecture;
pub mod config;
pub mod data;
pub mod error;
pub mod layers;
pub mod loss;
pub mod metrics;
pub mod model;
pub mod optimizers;
pub mod similarity;
pub mod training;
pub mod utils;

pub use error::{BenderError, Result};
