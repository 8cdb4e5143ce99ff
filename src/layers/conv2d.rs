//! Generalized 2D convolutional layer
//!
//! `GenConv` slides square filters over NCHW input with zero padding and a
//! configurable stride. Like `GenDense` it can carry a second set of filters
//! that replaces the forward filters when the error is propagated to the
//! input (feedback alignment for convolutions).

use crate::error::{BenderError, Result};
use crate::layers::{ConvMapping, Layer};
use crate::similarity::{conv2d, conv2d_input_grad, conv2d_weight_grad, ConvGeometry};
use crate::utils::{glorot_uniform, seeded_rng, Activation};
use rand::rngs::StdRng;
use rand::Rng;
use std::cell::RefCell;

/// Generalized convolutional layer.
///
/// Filters are laid out `out_channels × in_channels × kernel_size × kernel_size`;
/// feedback filters use the same layout.
///
/// # Example
///
/// ```ignore
/// use bender::layers::{ConvMapping, GenConv};
/// use bender::similarity::ConvGeometry;
///
/// let geometry = ConvGeometry {
///     in_channels: 1, out_channels: 8, kernel_size: 3,
///     padding: 1, stride: 1, input_height: 28, input_width: 28,
/// };
/// let layer = GenConv::new(geometry, Activation::Relu, ConvMapping::ConvLinearAsymDx, &mut rng)?;
/// assert_eq!(layer.output_size(), 8 * 28 * 28);
/// ```
pub struct GenConv {
    geometry: ConvGeometry,
    mapping: ConvMapping,
    activation: Activation,
    weights: Vec<f32>,
    biases: Vec<f32>,
    feedback: Option<Vec<f32>>,
    grad_weights: RefCell<Vec<f32>>,
    grad_biases: RefCell<Vec<f32>>,
    cached_pre: RefCell<Vec<f32>>,
    cached_out: RefCell<Vec<f32>>,
    rng: RefCell<StdRng>,
}

impl GenConv {
    /// Create a layer with Glorot-uniform filters and zero biases.
    ///
    /// fan_in = in_channels × k², fan_out = out_channels × k².
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the kernel does not fit the padded input or a
    /// dimension is zero.
    pub fn new<R: Rng + ?Sized>(
        geometry: ConvGeometry,
        activation: Activation,
        mapping: ConvMapping,
        rng: &mut R,
    ) -> Result<Self> {
        if !geometry.is_valid() {
            return Err(BenderError::config(format!(
                "invalid convolution geometry {:?}",
                geometry
            )));
        }

        let k2 = geometry.kernel_size * geometry.kernel_size;
        let fan_in = geometry.in_channels * k2;
        let fan_out = geometry.out_channels * k2;
        let filter_len = geometry.filter_len();

        let weights = glorot_uniform(filter_len, fan_in, fan_out, rng);
        let feedback = mapping
            .uses_feedback()
            .then(|| glorot_uniform(filter_len, fan_in, fan_out, rng));

        Ok(Self {
            geometry,
            mapping,
            activation,
            weights,
            biases: vec![0.0; geometry.out_channels],
            feedback,
            grad_weights: RefCell::new(vec![0.0; filter_len]),
            grad_biases: RefCell::new(vec![0.0; geometry.out_channels]),
            cached_pre: RefCell::new(Vec::new()),
            cached_out: RefCell::new(Vec::new()),
            rng: RefCell::new(seeded_rng(rng)),
        })
    }

    pub fn biases(&self) -> &[f32] {
        &self.biases
    }

    /// Overwrite the forward filters, e.g. to compare against a reference layer.
    pub fn set_weights(&mut self, weights: Vec<f32>) -> Result<()> {
        if weights.len() != self.weights.len() {
            return Err(BenderError::Shape(format!(
                "filters: expected {} values, got {}",
                self.weights.len(),
                weights.len()
            )));
        }
        self.weights = weights;
        Ok(())
    }
}

impl Layer for GenConv {
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        let out_spatial = self.geometry.output_height() * self.geometry.output_width();
        let mut pre = self.cached_pre.borrow_mut();
        pre.resize(batch_size * self.geometry.output_len(), 0.0);

        // Both mappings share the forward pass.
        conv2d(&self.geometry, input, &self.weights, &mut pre, batch_size);
        for (idx, z) in pre.iter_mut().enumerate() {
            let oc = (idx / out_spatial) % self.geometry.out_channels;
            *z += self.biases[oc];
        }

        self.activation
            .forward(&pre, output, &mut *self.rng.borrow_mut());
        let mut out = self.cached_out.borrow_mut();
        out.clear();
        out.extend_from_slice(output);
    }

    fn backward(
        &self,
        input: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        let out_spatial = self.geometry.output_height() * self.geometry.output_width();
        let pre = self.cached_pre.borrow();
        assert_eq!(
            pre.len(),
            batch_size * self.geometry.output_len(),
            "backward called without a matching forward pass"
        );

        let mut delta = grad_output.to_vec();
        self.activation
            .backward(&pre, &self.cached_out.borrow(), &mut delta);

        {
            let mut grad_b = self.grad_biases.borrow_mut();
            for (idx, &d) in delta.iter().enumerate() {
                grad_b[(idx / out_spatial) % self.geometry.out_channels] += d;
            }
        }

        conv2d_weight_grad(
            &self.geometry,
            input,
            &delta,
            &mut self.grad_weights.borrow_mut(),
            batch_size,
        );

        let filters = match (self.mapping, &self.feedback) {
            (ConvMapping::ConvLinearAsymDx, Some(feedback)) => feedback.as_slice(),
            _ => self.weights.as_slice(),
        };
        conv2d_input_grad(&self.geometry, &delta, filters, grad_input, batch_size);
    }

    fn visit_parameters(&mut self, visitor: &mut dyn FnMut(&mut [f32], &mut [f32])) {
        visitor(self.weights.as_mut_slice(), self.grad_weights.get_mut().as_mut_slice());
        visitor(self.biases.as_mut_slice(), self.grad_biases.get_mut().as_mut_slice());
    }

    fn clamp_weights(&mut self, low: f32, high: f32) {
        for w in self.weights.iter_mut() {
            *w = w.clamp(low, high);
        }
    }

    fn weights(&self) -> &[f32] {
        &self.weights
    }

    fn feedback_weights(&self) -> Option<&[f32]> {
        self.feedback.as_deref()
    }

    fn activation(&self) -> Activation {
        self.activation
    }

    fn kind(&self) -> &'static str {
        "gen_conv"
    }

    fn input_size(&self) -> usize {
        self.geometry.input_len()
    }

    fn output_size(&self) -> usize {
        self.geometry.output_len()
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}
