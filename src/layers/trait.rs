//! Layer trait definition for generalized layers
//!
//! Every layer owns its parameters and gradient accumulators. Forward and
//! backward take `&self`; gradients and the forward cache live behind
//! `RefCell`s so a model can be driven through shared references.

use crate::utils::Activation;

/// Core trait for neural network layers.
///
/// # Example
///
/// ```ignore
/// let mut output = vec![0.0f32; batch_size * layer.output_size()];
/// layer.forward(&input, &mut output, batch_size);
///
/// let mut grad_input = vec![0.0f32; batch_size * layer.input_size()];
/// layer.backward(&input, &grad_output, &mut grad_input, batch_size);
/// layer.update_parameters(0.01);
/// ```
pub trait Layer {
    /// Forward propagation through the layer's mapping and activation.
    ///
    /// Caches the pre-activations (and any sampled weights) needed by the next
    /// `backward` call.
    ///
    /// # Panics
    ///
    /// Panics if `input` or `output` do not hold `batch_size` samples.
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize);

    /// Backward propagation through the layer.
    ///
    /// `grad_output` is the gradient of the loss w.r.t. this layer's
    /// activated output. Parameter gradients are accumulated internally and
    /// the gradient w.r.t. `input` is written to `grad_input`, using whatever
    /// weights the layer's mapping routes errors through.
    ///
    /// # Panics
    ///
    /// Panics if not preceded by a `forward` call with the same batch size.
    fn backward(
        &self,
        input: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    );

    /// Hand every trainable parameter tensor and its gradient accumulator to
    /// `visitor`, in a stable order.
    ///
    /// Feedback weights are not trainable and are never visited.
    fn visit_parameters(&mut self, visitor: &mut dyn FnMut(&mut [f32], &mut [f32]));

    /// Plain gradient descent step followed by clearing the gradients.
    fn update_parameters(&mut self, learning_rate: f32) {
        self.visit_parameters(&mut |params: &mut [f32], grads: &mut [f32]| {
            for (p, g) in params.iter_mut().zip(grads.iter_mut()) {
                *p -= learning_rate * *g;
                *g = 0.0;
            }
        });
    }

    /// Discard accumulated gradients.
    fn zero_gradients(&mut self) {
        self.visit_parameters(&mut |_: &mut [f32], grads: &mut [f32]| grads.fill(0.0));
    }

    /// Clamp the primary weights into `[low, high]`. Biases are left alone.
    fn clamp_weights(&mut self, low: f32, high: f32);

    /// Primary weights.
    fn weights(&self) -> &[f32];

    /// Feedback weights, if the layer carries them.
    fn feedback_weights(&self) -> Option<&[f32]>;

    fn has_feedback(&self) -> bool {
        self.feedback_weights().is_some()
    }

    fn activation(&self) -> Activation;

    /// Short type name used in logs ("gen_dense", "gen_conv").
    fn kind(&self) -> &'static str;

    /// Number of input features per sample.
    fn input_size(&self) -> usize;

    /// Number of output features per sample.
    fn output_size(&self) -> usize;

    /// Number of trainable parameters (weights plus biases).
    fn parameter_count(&self) -> usize;
}
