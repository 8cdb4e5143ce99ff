//! Activation functions and straight-through estimators
//!
//! Every layer applies one [`Activation`] to its pre-activations. Besides the
//! usual smooth functions this module provides the binary estimators used by
//! binary networks:
//! - `SignSte`: sign in the forward pass, identity in the backward pass
//! - `StocSignSte`: stochastic sign (`+1` with probability `hardσ(x)`), identity backward
//!
//! References: Bengio et al. 2013 (arXiv:1308.3432), Courbariaux et al. 2015
//! (arXiv:1511.00363).

use rand::Rng;
use std::fmt;
use std::str::FromStr;

/// Mathematical sign with `sign(0) = 0`.
///
/// `f32::signum` maps `+0.0` to `1.0`, which is not what a binarized weight of
/// exactly zero should produce.
pub fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Piece-wise linear sigmoid: `max(0, min(1, (x + 1) / 2))`.
pub fn hard_sigmoid(x: f32) -> f32 {
    ((x + 1.0) * 0.5).clamp(0.0, 1.0)
}

/// Stochastic sign: `+1` with probability `hard_sigmoid(x)`, otherwise `-1`.
pub fn stochastic_sign<R: Rng + ?Sized>(x: f32, rng: &mut R) -> f32 {
    if rng.gen::<f32>() < hard_sigmoid(x) {
        1.0
    } else {
        -1.0
    }
}

/// Elementwise activation applied after a layer's forward mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activation {
    #[default]
    Identity,
    Relu,
    Sigmoid,
    Tanh,
    HardSigmoid,
    /// Deterministic straight-through estimator for `sign`.
    SignSte,
    /// Stochastic straight-through estimator for `sign`.
    StocSignSte,
}

impl Activation {
    pub const NAMES: [&'static str; 7] = [
        "identity",
        "relu",
        "sigmoid",
        "tanh",
        "hard_sigmoid",
        "sign_ste",
        "stoc_sign_ste",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Activation::Identity => "identity",
            Activation::Relu => "relu",
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
            Activation::HardSigmoid => "hard_sigmoid",
            Activation::SignSte => "sign_ste",
            Activation::StocSignSte => "stoc_sign_ste",
        }
    }

    /// Apply the activation to `pre`, writing into `out`.
    ///
    /// The RNG is only consumed by `StocSignSte`.
    pub fn forward<R: Rng + ?Sized>(&self, pre: &[f32], out: &mut [f32], rng: &mut R) {
        assert_eq!(pre.len(), out.len(), "activation buffer length mismatch");
        for (o, &z) in out.iter_mut().zip(pre.iter()) {
            *o = match self {
                Activation::Identity => z,
                Activation::Relu => z.max(0.0),
                Activation::Sigmoid => 1.0 / (1.0 + (-z).exp()),
                Activation::Tanh => z.tanh(),
                Activation::HardSigmoid => hard_sigmoid(z),
                Activation::SignSte => sign(z),
                Activation::StocSignSte => stochastic_sign(z, rng),
            };
        }
    }

    /// Turn the gradient w.r.t. the activation output into the gradient w.r.t.
    /// the pre-activation, in place.
    ///
    /// `pre` and `out` are the buffers from the matching forward call.
    pub fn backward(&self, pre: &[f32], out: &[f32], grad: &mut [f32]) {
        assert_eq!(pre.len(), grad.len(), "activation gradient length mismatch");
        match self {
            // Straight-through: the surrogate derivative is 1.
            Activation::Identity | Activation::SignSte | Activation::StocSignSte => {}
            Activation::Relu => {
                for (g, &z) in grad.iter_mut().zip(pre.iter()) {
                    if z <= 0.0 {
                        *g = 0.0;
                    }
                }
            }
            Activation::Sigmoid => {
                for (g, &a) in grad.iter_mut().zip(out.iter()) {
                    *g *= a * (1.0 - a);
                }
            }
            Activation::Tanh => {
                for (g, &a) in grad.iter_mut().zip(out.iter()) {
                    *g *= 1.0 - a * a;
                }
            }
            Activation::HardSigmoid => {
                for (g, &z) in grad.iter_mut().zip(pre.iter()) {
                    if z <= -1.0 || z >= 1.0 {
                        *g = 0.0;
                    } else {
                        *g *= 0.5;
                    }
                }
            }
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Activation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "identity" | "linear" => Ok(Activation::Identity),
            "relu" => Ok(Activation::Relu),
            "sigmoid" => Ok(Activation::Sigmoid),
            "tanh" => Ok(Activation::Tanh),
            "hard_sigmoid" => Ok(Activation::HardSigmoid),
            "sign_ste" => Ok(Activation::SignSte),
            "stoc_sign_ste" => Ok(Activation::StocSignSte),
            other => Err(format!(
                "Invalid activation function '{}'. Must be one of: {}",
                other,
                Activation::NAMES.join(", ")
            )),
        }
    }
}

/// Softmax applied row-wise, in place.
///
/// Uses the max-subtraction trick so large logits do not overflow.
///
/// # Arguments
/// * `outputs` - Flat array containing row-major matrix data
/// * `rows` - Number of rows in the matrix
/// * `cols` - Number of columns in the matrix
pub fn softmax_rows(outputs: &mut [f32], rows: usize, cols: usize) {
    if cols == 0 {
        return;
    }
    assert_eq!(outputs.len(), rows * cols, "outputs length mismatch in softmax_rows");

    for row in outputs.chunks_exact_mut(cols) {
        let max_value = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);

        let mut sum = 0.0f32;
        for value in row.iter_mut() {
            *value = (*value - max_value).exp();
            sum += *value;
        }

        let inv_sum = 1.0f32 / sum;
        for value in row.iter_mut() {
            *value *= inv_sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const EPSILON_F32: f32 = 1e-6;

    #[test]
    fn test_sign_of_zero_is_zero() {
        assert_eq!(sign(0.0), 0.0);
        assert_eq!(sign(-0.0), 0.0);
        assert_eq!(sign(0.3), 1.0);
        assert_eq!(sign(-2.0), -1.0);
    }

    #[test]
    fn test_hard_sigmoid_pieces() {
        assert_eq!(hard_sigmoid(-3.0), 0.0);
        assert_eq!(hard_sigmoid(0.0), 0.5);
        assert_eq!(hard_sigmoid(3.0), 1.0);
        assert!((hard_sigmoid(0.5) - 0.75).abs() < EPSILON_F32);
    }

    #[test]
    fn test_stochastic_sign_saturates() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert_eq!(stochastic_sign(5.0, &mut rng), 1.0);
            assert_eq!(stochastic_sign(-5.0, &mut rng), -1.0);
        }
    }

    #[test]
    fn test_sign_ste_backward_is_identity() {
        let mut rng = StdRng::seed_from_u64(1);
        let pre = vec![-2.0, -0.1, 0.0, 0.4, 3.0];
        let mut out = vec![0.0; 5];
        Activation::SignSte.forward(&pre, &mut out, &mut rng);
        assert_eq!(out, vec![-1.0, -1.0, 0.0, 1.0, 1.0]);

        let mut grad = vec![0.5, -1.0, 2.0, 0.25, 1.5];
        let expected = grad.clone();
        Activation::SignSte.backward(&pre, &out, &mut grad);
        assert_eq!(grad, expected);
    }

    #[test]
    fn test_relu_backward_masks_non_positive() {
        let mut rng = StdRng::seed_from_u64(1);
        let pre = vec![-1.0, 0.0, 2.0];
        let mut out = vec![0.0; 3];
        Activation::Relu.forward(&pre, &mut out, &mut rng);
        assert_eq!(out, vec![0.0, 0.0, 2.0]);

        let mut grad = vec![1.0, 1.0, 1.0];
        Activation::Relu.backward(&pre, &out, &mut grad);
        assert_eq!(grad, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_activation_names_round_trip() {
        for name in Activation::NAMES {
            let parsed: Activation = name.parse().unwrap();
            assert_eq!(parsed.name(), name);
        }
        assert!("swish".parse::<Activation>().is_err());
    }

    #[test]
    fn test_softmax_numerical_stability() {
        let mut data = vec![1000.0, 1001.0, 1002.0];
        softmax_rows(&mut data, 1, 3);
        let sum: f32 = data.iter().sum();
        assert!((sum - 1.0).abs() < EPSILON_F32);
        assert!(!data.iter().any(|&x| x.is_nan() || x.is_infinite()));
    }
}
