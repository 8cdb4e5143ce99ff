//! Sequential model: a chain of layers trained together.

use crate::error::{BenderError, Result};
use crate::layers::Layer;
use crate::optimizers::Optimizer;
use crate::loss::direct_feedback_loss;
use crate::utils::glorot_uniform;
use rand::Rng;

/// Layers applied in order, each feeding the next.
pub struct Sequential {
    layers: Vec<Box<dyn Layer>>,
}

impl Sequential {
    /// # Errors
    ///
    /// `Shape` if the model is empty or a layer's output size does not match
    /// the next layer's input size.
    pub fn new(layers: Vec<Box<dyn Layer>>) -> Result<Self> {
        if layers.is_empty() {
            return Err(BenderError::Shape("a model needs at least one layer".into()));
        }
        for (i, pair) in layers.windows(2).enumerate() {
            if pair[0].output_size() != pair[1].input_size() {
                return Err(BenderError::Shape(format!(
                    "Layer {} output size ({}) does not match Layer {} input size ({})",
                    i,
                    pair[0].output_size(),
                    i + 1,
                    pair[1].input_size()
                )));
            }
        }
        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn input_size(&self) -> usize {
        self.layers[0].input_size()
    }

    pub fn output_size(&self) -> usize {
        self.layers[self.layers.len() - 1].output_size()
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|l| l.parameter_count()).sum()
    }

    /// Run the whole chain and return the final layer's output.
    pub fn forward(&self, input: &[f32], batch_size: usize) -> Vec<f32> {
        self.forward_trace(input, batch_size)
            .pop()
            .unwrap_or_default()
    }

    /// Run the whole chain, keeping every layer's output.
    ///
    /// Element `l` of the result is the output of layer `l`; pass the trace to
    /// [`backward`](Self::backward) for the same batch.
    pub fn forward_trace(&self, input: &[f32], batch_size: usize) -> Vec<Vec<f32>> {
        let mut trace: Vec<Vec<f32>> = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let mut output = vec![0.0f32; batch_size * layer.output_size()];
            let layer_input = trace.last().map_or(input, Vec::as_slice);
            layer.forward(layer_input, &mut output, batch_size);
            trace.push(output);
        }
        trace
    }

    /// Backpropagate `grad_output` (gradient w.r.t. the final output) through
    /// every layer, accumulating parameter gradients.
    ///
    /// Each layer decides which weights carry the error to its input, so a
    /// chain of asymmetric layers performs feedback alignment here.
    pub fn backward(&self, input: &[f32], trace: &[Vec<f32>], grad_output: &[f32], batch_size: usize) {
        assert_eq!(trace.len(), self.layers.len(), "trace does not match model depth");

        let mut grad = grad_output.to_vec();
        for (l, layer) in self.layers.iter().enumerate().rev() {
            let layer_input: &[f32] = if l == 0 { input } else { &trace[l - 1] };
            let mut grad_input = vec![0.0f32; batch_size * layer.input_size()];
            layer.backward(layer_input, &grad, &mut grad_input, batch_size);
            grad = grad_input;
        }
    }

    /// Direct feedback alignment: the output layer learns from `output_error`
    /// as usual, and every hidden layer receives the error projected through
    /// its own fixed matrix instead of the signal from the layer above.
    ///
    /// Returns the direct feedback loss of the hidden states.
    pub fn backward_direct_feedback(
        &self,
        input: &[f32],
        trace: &[Vec<f32>],
        output_error: &[f32],
        feedback: &DirectFeedback,
        batch_size: usize,
    ) -> f32 {
        assert_eq!(trace.len(), self.layers.len(), "trace does not match model depth");
        let last = self.layers.len() - 1;
        let hidden: Vec<&[f32]> = trace[..last].iter().map(Vec::as_slice).collect();
        let (loss, signals) = direct_feedback_loss(
            &hidden,
            output_error,
            &feedback.matrices,
            batch_size,
            self.output_size(),
        );

        for (l, layer) in self.layers.iter().enumerate() {
            let layer_input: &[f32] = if l == 0 { input } else { &trace[l - 1] };
            let grad_output: &[f32] = if l == last { output_error } else { &signals[l] };
            let mut scratch = vec![0.0f32; batch_size * layer.input_size()];
            layer.backward(layer_input, grad_output, &mut scratch, batch_size);
        }
        loss
    }

    /// Hand every parameter tensor to `optimizer` and clear the gradients.
    ///
    /// Slots are numbered in layer order, weights before biases, so the same
    /// model always maps a tensor to the same slot.
    pub fn apply_gradients(&mut self, optimizer: &mut dyn Optimizer) {
        let mut slot = 0usize;
        for layer in self.layers.iter_mut() {
            layer.visit_parameters(&mut |params: &mut [f32], grads: &mut [f32]| {
                optimizer.step(slot, params, grads);
                grads.fill(0.0);
                slot += 1;
            });
        }
    }

    pub fn zero_gradients(&mut self) {
        for layer in self.layers.iter_mut() {
            layer.zero_gradients();
        }
    }

    /// Clamp every layer's primary weights into `[low, high]`.
    pub fn clamp_weights(&mut self, low: f32, high: f32) {
        for layer in self.layers.iter_mut() {
            layer.clamp_weights(low, high);
        }
    }
}

/// Fixed random matrices projecting the output error onto each hidden layer.
///
/// Matrix `l` is `classes × hidden_l`, row-major.
pub struct DirectFeedback {
    matrices: Vec<Vec<f32>>,
}

impl DirectFeedback {
    /// Glorot-uniform feedback matrices for every hidden layer of `model`.
    pub fn for_model<R: Rng + ?Sized>(model: &Sequential, rng: &mut R) -> Self {
        let classes = model.output_size();
        let hidden = &model.layers()[..model.len() - 1];
        let matrices = hidden
            .iter()
            .map(|layer| {
                let width = layer.output_size();
                glorot_uniform(classes * width, classes, width, rng)
            })
            .collect();
        Self { matrices }
    }

    pub fn matrices(&self) -> &[Vec<f32>] {
        &self.matrices
    }
}
