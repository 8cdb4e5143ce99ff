//! Shared utilities for the layer implementations
//!
//! Activation functions, straight-through estimators and weight initialization.

pub mod activations;
pub mod init;

pub use activations::{hard_sigmoid, sign, softmax_rows, stochastic_sign, Activation};
pub use init::{glorot_uniform, seeded_rng};
