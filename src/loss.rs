//! Loss functions
//!
//! - [`logit_cross_entropy`]: softmax followed by cross-entropy, averaged over the batch
//! - [`direct_feedback_loss`]: the error function of direct feedback alignment

use crate::similarity::matmul_asym_input_grad;
use crate::utils::softmax_rows;

/// Softmax cross-entropy on raw logits.
///
/// Returns the mean loss over the batch and the gradient of that mean w.r.t.
/// the logits, `(softmax(logits) - targets) / batch`.
///
/// The loss is computed through log-softmax, so large logits neither overflow
/// nor hide a NaN.
///
/// `targets` are one-hot (or any probability rows) laid out like `logits`.
pub fn logit_cross_entropy(
    logits: &[f32],
    targets: &[f32],
    batch: usize,
    classes: usize,
) -> (f32, Vec<f32>) {
    assert_eq!(logits.len(), batch * classes, "logits length mismatch");
    assert_eq!(targets.len(), batch * classes, "targets length mismatch");
    if batch == 0 {
        return (0.0, Vec::new());
    }

    let mut probs = logits.to_vec();
    softmax_rows(&mut probs, batch, classes);

    let scale = 1.0 / batch as f32;
    let mut total = 0.0f32;
    let mut grad = vec![0.0f32; probs.len()];
    for (((z_row, p_row), t_row), g_row) in logits
        .chunks_exact(classes)
        .zip(probs.chunks_exact(classes))
        .zip(targets.chunks_exact(classes))
        .zip(grad.chunks_exact_mut(classes))
    {
        let max = z_row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let log_sum = max + z_row.iter().map(|&z| (z - max).exp()).sum::<f32>().ln();
        for (((&z, &p), &t), g) in z_row.iter().zip(p_row).zip(t_row).zip(g_row.iter_mut()) {
            if t != 0.0 {
                total -= t * (z - log_sum);
            }
            *g = (p - t) * scale;
        }
    }

    (total * scale, grad)
}

/// Direct feedback alignment error function.
///
/// Each hidden state `h_l` (`batch × n_l`) is paired with a fixed feedback
/// matrix `B_l` (`classes × n_l`) that projects the output error `e`
/// (`batch × classes`) straight onto that layer. The loss is
/// `Σ_l Σ h_l ⊙ (e·B_l)` with `e·B_l` treated as a constant, so its gradient
/// w.r.t. `h_l` is exactly the projected error.
///
/// Returns the loss and one gradient buffer per hidden state. Any batch
/// averaging should already be folded into `output_error`.
pub fn direct_feedback_loss(
    hidden_states: &[&[f32]],
    output_error: &[f32],
    feedbacks: &[Vec<f32>],
    batch: usize,
    classes: usize,
) -> (f32, Vec<Vec<f32>>) {
    assert_eq!(
        hidden_states.len(),
        feedbacks.len(),
        "one feedback matrix is required per hidden state"
    );
    assert_eq!(output_error.len(), batch * classes, "output error length mismatch");

    let mut loss = 0.0f32;
    let mut grads = Vec::with_capacity(hidden_states.len());
    for (&hidden, feedback) in hidden_states.iter().zip(feedbacks.iter()) {
        let width = if batch == 0 { 0 } else { hidden.len() / batch };
        let mut projected = vec![0.0f32; hidden.len()];
        matmul_asym_input_grad(output_error, feedback, &mut projected, batch, width, classes);
        loss += hidden
            .iter()
            .zip(projected.iter())
            .map(|(h, p)| h * p)
            .sum::<f32>();
        grads.push(projected);
    }

    (loss, grads)
}
