//! Generalized dense (fully connected) layer
//!
//! `GenDense` computes `activation(mapping(W, b, x))` where the forward
//! mapping is swappable (see [`DenseMapping`]). It can carry a second,
//! fixed set of feedback weights used only to propagate errors to its input.

use crate::error::{BenderError, Result};
use crate::layers::{DenseMapping, Layer};
use crate::similarity::{
    matmul, matmul_asym_input_grad, matmul_input_grad, matmul_weight_grad, radial_sim,
    radial_sim_asym_input_grad, radial_sim_input_grad, radial_sim_weight_grad,
};
use crate::utils::{glorot_uniform, seeded_rng, sign, stochastic_sign, Activation};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;

#[derive(Default)]
struct ForwardCache {
    pre: Vec<f32>,
    out: Vec<f32>,
    /// Binarized weights used by the last forward call (binary mappings only).
    effective_weights: Vec<f32>,
}

/// Generalized dense layer.
///
/// # Fields
///
/// * `weights` - Row-major `input_size × output_size`, so `y = xW + b`
/// * `biases` - `output_size`, absent when built without bias
/// * `feedback` - Row-major `output_size × input_size`, maps output errors onto inputs
///
/// # Example
///
/// ```ignore
/// use bender::layers::{DenseMapping, GenDense};
/// use bender::utils::Activation;
///
/// let mut rng = StdRng::seed_from_u64(42);
/// // Feedback alignment: forward like a Dense layer, backward through fixed random weights.
/// let layer = GenDense::new(784, 128, Activation::Relu, DenseMapping::LinearAsymDx, &mut rng);
/// assert!(layer.feedback_weights().is_some());
/// ```
pub struct GenDense {
    input_size: usize,
    output_size: usize,
    mapping: DenseMapping,
    activation: Activation,
    weights: Vec<f32>,
    biases: Option<Vec<f32>>,
    feedback: Option<Vec<f32>>,
    grad_weights: RefCell<Vec<f32>>,
    grad_biases: RefCell<Vec<f32>>,
    cache: RefCell<ForwardCache>,
    rng: RefCell<StdRng>,
}

impl GenDense {
    /// Create a layer with Glorot-uniform weights and zero biases.
    ///
    /// Feedback weights are drawn the same way when the mapping needs them.
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        output_size: usize,
        activation: Activation,
        mapping: DenseMapping,
        rng: &mut R,
    ) -> Self {
        let weights = glorot_uniform(input_size * output_size, input_size, output_size, rng);
        let feedback = mapping
            .uses_feedback()
            .then(|| glorot_uniform(output_size * input_size, output_size, input_size, rng));

        Self {
            input_size,
            output_size,
            mapping,
            activation,
            grad_weights: RefCell::new(vec![0.0; weights.len()]),
            grad_biases: RefCell::new(vec![0.0; output_size]),
            weights,
            biases: Some(vec![0.0; output_size]),
            feedback,
            cache: RefCell::new(ForwardCache::default()),
            rng: RefCell::new(seeded_rng(rng)),
        }
    }

    /// Build a layer around existing parameters.
    ///
    /// # Errors
    ///
    /// `Shape` if a tensor has the wrong length, `InvalidConfig` if the mapping
    /// needs feedback weights and none were given, or feedback weights were
    /// given to a mapping that never reads them.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parameters(
        input_size: usize,
        output_size: usize,
        weights: Vec<f32>,
        biases: Option<Vec<f32>>,
        feedback: Option<Vec<f32>>,
        activation: Activation,
        mapping: DenseMapping,
        seed: u64,
    ) -> Result<Self> {
        let expected = input_size * output_size;
        if weights.len() != expected {
            return Err(BenderError::Shape(format!(
                "weights: expected {} values for {}=>{}, got {}",
                expected,
                input_size,
                output_size,
                weights.len()
            )));
        }
        if let Some(b) = &biases {
            if b.len() != output_size {
                return Err(BenderError::Shape(format!(
                    "biases: expected {} values, got {}",
                    output_size,
                    b.len()
                )));
            }
        }
        match (&feedback, mapping.uses_feedback()) {
            (Some(fb), _) if fb.len() != expected => {
                return Err(BenderError::Shape(format!(
                    "feedback: expected {} values for {}=>{}, got {}",
                    expected,
                    output_size,
                    input_size,
                    fb.len()
                )));
            }
            (None, true) => {
                return Err(BenderError::config(format!(
                    "forward mapping '{}' requires feedback weights",
                    mapping
                )));
            }
            (Some(_), false) => {
                return Err(BenderError::config(format!(
                    "forward mapping '{}' does not use feedback weights",
                    mapping
                )));
            }
            _ => {}
        }

        let bias_len = biases.as_ref().map_or(0, Vec::len);
        Ok(Self {
            input_size,
            output_size,
            mapping,
            activation,
            grad_weights: RefCell::new(vec![0.0; expected]),
            grad_biases: RefCell::new(vec![0.0; bias_len]),
            weights,
            biases,
            feedback,
            cache: RefCell::new(ForwardCache::default()),
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
        })
    }

    /// Drop the bias vector.
    pub fn without_bias(mut self) -> Self {
        self.biases = None;
        self.grad_biases = RefCell::new(Vec::new());
        self
    }

    pub fn biases(&self) -> Option<&[f32]> {
        self.biases.as_deref()
    }

    /// Copy of the accumulated weight gradients.
    pub fn weight_gradients(&self) -> Vec<f32> {
        self.grad_weights.borrow().clone()
    }

    /// Copy of the accumulated bias gradients (empty without bias).
    pub fn bias_gradients(&self) -> Vec<f32> {
        self.grad_biases.borrow().clone()
    }

    fn feedback_slice(&self) -> &[f32] {
        self.feedback.as_deref().unwrap_or(&[])
    }
}

impl Layer for GenDense {
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        let (n_in, n_out) = (self.input_size, self.output_size);
        let mut cache = self.cache.borrow_mut();
        let mut rng = self.rng.borrow_mut();
        let ForwardCache {
            pre,
            out,
            effective_weights,
        } = &mut *cache;
        pre.resize(batch_size * n_out, 0.0);

        match self.mapping {
            DenseMapping::Linear | DenseMapping::LinearAsymDx | DenseMapping::LinearBlockedDx => {
                matmul(input, &self.weights, pre, batch_size, n_in, n_out);
            }
            DenseMapping::Radial | DenseMapping::RadialAsymDx => {
                radial_sim(input, &self.weights, pre, batch_size, n_in, n_out);
            }
            DenseMapping::LinearBinaryWeights => {
                effective_weights.clear();
                effective_weights.extend(self.weights.iter().map(|&w| sign(w)));
                matmul(input, effective_weights, pre, batch_size, n_in, n_out);
            }
            DenseMapping::LinearStocBinaryWeights => {
                effective_weights.clear();
                effective_weights.extend(
                    self.weights
                        .iter()
                        .map(|&w| stochastic_sign(w, &mut *rng)),
                );
                matmul(input, effective_weights, pre, batch_size, n_in, n_out);
            }
        }

        if let Some(biases) = &self.biases {
            for row in pre.chunks_exact_mut(n_out) {
                for (z, &b) in row.iter_mut().zip(biases.iter()) {
                    *z += b;
                }
            }
        }

        self.activation.forward(pre, output, &mut *rng);
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
        let (n_in, n_out) = (self.input_size, self.output_size);
        let cache = self.cache.borrow();
        assert_eq!(
            cache.pre.len(),
            batch_size * n_out,
            "backward called without a matching forward pass"
        );
        assert_eq!(grad_output.len(), batch_size * n_out, "grad_output length mismatch");

        let mut delta = grad_output.to_vec();
        self.activation.backward(&cache.pre, &cache.out, &mut delta);

        if self.biases.is_some() {
            let mut grad_b = self.grad_biases.borrow_mut();
            for row in delta.chunks_exact(n_out) {
                for (gb, &d) in grad_b.iter_mut().zip(row.iter()) {
                    *gb += d;
                }
            }
        }

        {
            let mut grad_w = self.grad_weights.borrow_mut();
            match self.mapping {
                DenseMapping::Radial | DenseMapping::RadialAsymDx => radial_sim_weight_grad(
                    input,
                    &delta,
                    &self.weights,
                    &mut grad_w,
                    batch_size,
                    n_in,
                    n_out,
                ),
                // Binary mappings pass the gradient straight through to the latent weights.
                _ => matmul_weight_grad(input, &delta, &mut grad_w, batch_size, n_in, n_out),
            }
        }

        match self.mapping {
            DenseMapping::Linear => {
                matmul_input_grad(&delta, &self.weights, grad_input, batch_size, n_in, n_out)
            }
            DenseMapping::LinearAsymDx => matmul_asym_input_grad(
                &delta,
                self.feedback_slice(),
                grad_input,
                batch_size,
                n_in,
                n_out,
            ),
            DenseMapping::LinearBlockedDx => grad_input.fill(0.0),
            DenseMapping::Radial => radial_sim_input_grad(
                input,
                &delta,
                &self.weights,
                grad_input,
                batch_size,
                n_in,
                n_out,
            ),
            DenseMapping::RadialAsymDx => radial_sim_asym_input_grad(
                input,
                &delta,
                self.feedback_slice(),
                grad_input,
                batch_size,
                n_in,
                n_out,
            ),
            DenseMapping::LinearBinaryWeights | DenseMapping::LinearStocBinaryWeights => {
                matmul_input_grad(
                    &delta,
                    &cache.effective_weights,
                    grad_input,
                    batch_size,
                    n_in,
                    n_out,
                )
            }
        }
    }

    fn visit_parameters(&mut self, visitor: &mut dyn FnMut(&mut [f32], &mut [f32])) {
        visitor(self.weights.as_mut_slice(), self.grad_weights.get_mut().as_mut_slice());
        if let Some(biases) = self.biases.as_mut() {
            visitor(biases.as_mut_slice(), self.grad_biases.get_mut().as_mut_slice());
        }
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
        "gen_dense"
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.output_size
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.as_ref().map_or(0, Vec::len)
    }
}
