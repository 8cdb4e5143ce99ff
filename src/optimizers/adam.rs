//! Adam (adaptive moment estimation)
//!
//! ```text
//! m_t = β1·m_{t-1} + (1 - β1)·g
//! v_t = β2·v_{t-1} + (1 - β2)·g²
//! w  ← w - η · (m_t / (1 - β1^t)) / (√(v_t / (1 - β2^t)) + ε)
//! ```
//!
//! Kingma & Ba (2014), arXiv:1412.6980.

use crate::optimizers::Optimizer;

#[derive(Debug, Clone, Default)]
struct SlotState {
    m: Vec<f32>,
    v: Vec<f32>,
    t: i32,
}

/// Adam with one moment/step state per parameter slot.
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    slots: Vec<SlotState>,
}

impl Adam {
    /// Adam with the paper's defaults: β1 = 0.9, β2 = 0.999, ε = 1e-8.
    pub fn new(learning_rate: f32) -> Self {
        Self::with_betas(learning_rate, 0.9, 0.999, 1e-8)
    }

    pub fn with_betas(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            slots: Vec::new(),
        }
    }

    /// Number of update steps taken for `slot`.
    pub fn steps(&self, slot: usize) -> usize {
        self.slots.get(slot).map_or(0, |s| s.t as usize)
    }
}

impl Optimizer for Adam {
    fn step(&mut self, slot: usize, parameters: &mut [f32], gradients: &[f32]) {
        assert_eq!(
            parameters.len(),
            gradients.len(),
            "Parameters and gradients must have the same length"
        );
        if self.slots.len() <= slot {
            self.slots.resize_with(slot + 1, SlotState::default);
        }

        let state = &mut self.slots[slot];
        if state.m.is_empty() {
            state.m = vec![0.0; parameters.len()];
            state.v = vec![0.0; parameters.len()];
        }
        assert_eq!(
            state.m.len(),
            parameters.len(),
            "Adam slot {} reused with a different tensor length",
            slot
        );

        state.t += 1;
        let bias_correction1 = 1.0 - self.beta1.powi(state.t);
        let bias_correction2 = 1.0 - self.beta2.powi(state.t);

        for (i, (param, &grad)) in parameters.iter_mut().zip(gradients.iter()).enumerate() {
            state.m[i] = self.beta1 * state.m[i] + (1.0 - self.beta1) * grad;
            state.v[i] = self.beta2 * state.v[i] + (1.0 - self.beta2) * grad * grad;
            let m_hat = state.m[i] / bias_correction1;
            let v_hat = state.v[i] / bias_correction2;
            *param -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }
    }

    fn reset(&mut self) {
        self.slots.clear();
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adam_first_step_moves_by_learning_rate() {
        // With bias correction the first step is ≈ η·sign(g).
        let mut optimizer = Adam::new(0.01);
        let mut params = vec![1.0, 1.0];
        optimizer.step(0, &mut params, &[0.5, -2.0]);
        assert!((params[0] - 0.99).abs() < 1e-5);
        assert!((params[1] - 1.01).abs() < 1e-5);
    }

    #[test]
    fn test_adam_slots_are_independent() {
        let mut optimizer = Adam::new(0.01);
        let mut a = vec![0.0; 3];
        let mut b = vec![0.0; 5];
        optimizer.step(0, &mut a, &[1.0; 3]);
        optimizer.step(0, &mut a, &[1.0; 3]);
        optimizer.step(1, &mut b, &[1.0; 5]);
        assert_eq!(optimizer.steps(0), 2);
        assert_eq!(optimizer.steps(1), 1);
    }

    #[test]
    fn test_adam_reset_clears_state() {
        let mut optimizer = Adam::new(0.01);
        let mut a = vec![0.0; 2];
        optimizer.step(0, &mut a, &[1.0, 1.0]);
        optimizer.reset();
        assert_eq!(optimizer.steps(0), 0);
    }

    #[test]
    #[should_panic(expected = "reused with a different tensor length")]
    fn test_adam_slot_length_change_panics() {
        let mut optimizer = Adam::new(0.01);
        optimizer.step(0, &mut [0.0; 2], &[1.0; 2]);
        optimizer.step(0, &mut [0.0; 3], &[1.0; 3]);
    }
}
