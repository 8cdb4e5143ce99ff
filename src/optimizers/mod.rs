//! Gradient-based optimizers
//!
//! A single optimizer instance updates every parameter tensor of a model.
//! Tensors are identified by a *slot* index, assigned by the model in the
//! order its layers visit their parameters, so stateful optimizers such as
//! Adam keep separate moment estimates per tensor.
//!
//! # Example
//!
//! ```ignore
//! use bender::optimizers::{Adam, Optimizer};
//!
//! let mut optimizer = Adam::new(3e-4);
//! optimizer.step(0, &mut weights, &weight_gradients);
//! optimizer.step(1, &mut biases, &bias_gradients);
//! ```

pub mod adam;
pub mod sgd;

pub use adam::Adam;
pub use sgd::SGD;

use crate::error::{BenderError, Result};

/// Core trait for optimizers.
pub trait Optimizer {
    /// Apply one update to the tensor registered under `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `parameters` and `gradients` have different lengths, or if a
    /// slot is reused with a different tensor length.
    fn step(&mut self, slot: usize, parameters: &mut [f32], gradients: &[f32]);

    /// Forget all per-slot state.
    fn reset(&mut self);

    fn learning_rate(&self) -> f32;
}

/// Names accepted by [`build_optimizer`].
pub const OPTIMIZER_NAMES: [&str; 2] = ["adam", "sgd"];

/// Build an optimizer by name with its default hyper-parameters.
pub fn build_optimizer(name: &str, learning_rate: f32) -> Result<Box<dyn Optimizer>> {
    match name.to_lowercase().as_str() {
        "adam" => Ok(Box::new(Adam::new(learning_rate))),
        "sgd" => Ok(Box::new(SGD::new(learning_rate))),
        other => Err(BenderError::config(format!(
            "Invalid optimizer '{}'. Must be one of: {}",
            other,
            OPTIMIZER_NAMES.join(", ")
        ))),
    }
}
