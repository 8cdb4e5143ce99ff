//! Generalized layers
//!
//! `GenDense` and `GenConv` behave like ordinary dense and convolutional
//! layers, but their forward mapping is chosen at construction time. This is
//! what allows feedback alignment (separate backward weights) and binary
//! weights (sign forward, straight-through backward) without changing the
//! training loop.

mod r#trait;
pub mod conv2d;
pub mod dense;
pub mod mapping;

pub use conv2d::GenConv;
pub use dense::GenDense;
pub use mapping::{ConvMapping, DenseMapping};
pub use r#trait::Layer;
