//! Similarity and correlation functions behind the forward mappings
//!
//! All buffers are flat and row-major. For the dense functions:
//! - `x` is `batch × n_in`
//! - `w` is `n_in × n_out` (the layer's primary weights)
//! - `feedback` is `n_out × n_in` (maps output errors back onto inputs)
//! - outputs and output gradients are `batch × n_out`
//!
//! Weight-gradient functions accumulate (`+=`) into their destination so a
//! layer can sum gradients over several backward calls before an update.
//! Input-gradient functions overwrite theirs.

/// Plain matrix product: `out[b, j] = Σ_i x[b, i] · w[i, j]`.
pub fn matmul(x: &[f32], w: &[f32], out: &mut [f32], batch: usize, n_in: usize, n_out: usize) {
    check_dense_lengths(x, w, out, batch, n_in, n_out);
    for b in 0..batch {
        let x_row = &x[b * n_in..(b + 1) * n_in];
        let out_row = &mut out[b * n_out..(b + 1) * n_out];
        out_row.fill(0.0);
        for (i, &xi) in x_row.iter().enumerate() {
            if xi == 0.0 {
                continue;
            }
            let w_row = &w[i * n_out..(i + 1) * n_out];
            for (o, &wij) in out_row.iter_mut().zip(w_row.iter()) {
                *o += xi * wij;
            }
        }
    }
}

/// Input gradient of [`matmul`] through the forward weights:
/// `grad_in[b, i] = Σ_j grad_out[b, j] · w[i, j]`.
pub fn matmul_input_grad(
    grad_out: &[f32],
    w: &[f32],
    grad_in: &mut [f32],
    batch: usize,
    n_in: usize,
    n_out: usize,
) {
    assert_eq!(w.len(), n_in * n_out, "weight length mismatch");
    assert_eq!(grad_out.len(), batch * n_out, "grad_out length mismatch");
    assert_eq!(grad_in.len(), batch * n_in, "grad_in length mismatch");

    for b in 0..batch {
        let g_row = &grad_out[b * n_out..(b + 1) * n_out];
        for i in 0..n_in {
            let w_row = &w[i * n_out..(i + 1) * n_out];
            grad_in[b * n_in + i] = g_row.iter().zip(w_row.iter()).map(|(g, w)| g * w).sum();
        }
    }
}

/// Input gradient of [`matmul`] through a separate feedback matrix, which
/// breaks the symmetry between forward and backward weights:
/// `grad_in[b, i] = Σ_j grad_out[b, j] · feedback[j, i]`.
pub fn matmul_asym_input_grad(
    grad_out: &[f32],
    feedback: &[f32],
    grad_in: &mut [f32],
    batch: usize,
    n_in: usize,
    n_out: usize,
) {
    assert_eq!(feedback.len(), n_out * n_in, "feedback length mismatch");
    assert_eq!(grad_out.len(), batch * n_out, "grad_out length mismatch");
    assert_eq!(grad_in.len(), batch * n_in, "grad_in length mismatch");

    for b in 0..batch {
        let g_row = &grad_out[b * n_out..(b + 1) * n_out];
        let in_row = &mut grad_in[b * n_in..(b + 1) * n_in];
        in_row.fill(0.0);
        for (j, &g) in g_row.iter().enumerate() {
            if g == 0.0 {
                continue;
            }
            let fb_row = &feedback[j * n_in..(j + 1) * n_in];
            for (gi, &f) in in_row.iter_mut().zip(fb_row.iter()) {
                *gi += g * f;
            }
        }
    }
}

/// Weight gradient of [`matmul`]: `grad_w[i, j] += Σ_b x[b, i] · grad_out[b, j]`.
pub fn matmul_weight_grad(
    x: &[f32],
    grad_out: &[f32],
    grad_w: &mut [f32],
    batch: usize,
    n_in: usize,
    n_out: usize,
) {
    assert_eq!(grad_w.len(), n_in * n_out, "grad_w length mismatch");
    for b in 0..batch {
        let x_row = &x[b * n_in..(b + 1) * n_in];
        let g_row = &grad_out[b * n_out..(b + 1) * n_out];
        for (i, &xi) in x_row.iter().enumerate() {
            if xi == 0.0 {
                continue;
            }
            let gw_row = &mut grad_w[i * n_out..(i + 1) * n_out];
            for (gw, &g) in gw_row.iter_mut().zip(g_row.iter()) {
                *gw += xi * g;
            }
        }
    }
}

/// Negative squared euclidean distance between each input row and each
/// weight column: `out[b, j] = -‖x[b, :] - w[:, j]‖²`.
///
/// Expanded this is `2·x·w - ‖w_j‖² - ‖x_b‖²`.
pub fn radial_sim(x: &[f32], w: &[f32], out: &mut [f32], batch: usize, n_in: usize, n_out: usize) {
    check_dense_lengths(x, w, out, batch, n_in, n_out);
    for b in 0..batch {
        let x_row = &x[b * n_in..(b + 1) * n_in];
        for j in 0..n_out {
            let mut dist = 0.0f32;
            for (i, &xi) in x_row.iter().enumerate() {
                let d = xi - w[i * n_out + j];
                dist += d * d;
            }
            out[b * n_out + j] = -dist;
        }
    }
}

/// Input gradient of [`radial_sim`]:
/// `grad_in[b, i] = Σ_j grad_out[b, j] · 2(w[i, j] - x[b, i])`.
pub fn radial_sim_input_grad(
    x: &[f32],
    grad_out: &[f32],
    w: &[f32],
    grad_in: &mut [f32],
    batch: usize,
    n_in: usize,
    n_out: usize,
) {
    assert_eq!(grad_in.len(), batch * n_in, "grad_in length mismatch");
    for b in 0..batch {
        let g_row = &grad_out[b * n_out..(b + 1) * n_out];
        for i in 0..n_in {
            let xi = x[b * n_in + i];
            let w_row = &w[i * n_out..(i + 1) * n_out];
            grad_in[b * n_in + i] = g_row
                .iter()
                .zip(w_row.iter())
                .map(|(&g, &wij)| 2.0 * g * (wij - xi))
                .sum();
        }
    }
}

/// Input gradient of [`radial_sim`] with the `2·x·w` term routed through the
/// feedback matrix instead of the forward weights:
/// `grad_in[b, i] = 2 Σ_j grad_out[b, j] · feedback[j, i] - 2 x[b, i] Σ_j grad_out[b, j]`.
pub fn radial_sim_asym_input_grad(
    x: &[f32],
    grad_out: &[f32],
    feedback: &[f32],
    grad_in: &mut [f32],
    batch: usize,
    n_in: usize,
    n_out: usize,
) {
    matmul_asym_input_grad(grad_out, feedback, grad_in, batch, n_in, n_out);
    for b in 0..batch {
        let g_sum: f32 = grad_out[b * n_out..(b + 1) * n_out].iter().sum();
        for i in 0..n_in {
            let idx = b * n_in + i;
            grad_in[idx] = 2.0 * grad_in[idx] - 2.0 * x[idx] * g_sum;
        }
    }
}

/// Weight gradient of [`radial_sim`]:
/// `grad_w[i, j] += Σ_b grad_out[b, j] · 2(x[b, i] - w[i, j])`.
pub fn radial_sim_weight_grad(
    x: &[f32],
    grad_out: &[f32],
    w: &[f32],
    grad_w: &mut [f32],
    batch: usize,
    n_in: usize,
    n_out: usize,
) {
    assert_eq!(grad_w.len(), n_in * n_out, "grad_w length mismatch");
    for b in 0..batch {
        let g_row = &grad_out[b * n_out..(b + 1) * n_out];
        for i in 0..n_in {
            let xi = x[b * n_in + i];
            for (j, &g) in g_row.iter().enumerate() {
                let idx = i * n_out + j;
                grad_w[idx] += 2.0 * g * (xi - w[idx]);
            }
        }
    }
}

fn check_dense_lengths(x: &[f32], w: &[f32], out: &[f32], batch: usize, n_in: usize, n_out: usize) {
    assert_eq!(
        x.len(),
        batch * n_in,
        "input len mismatch: expected {}, got {}",
        batch * n_in,
        x.len()
    );
    assert_eq!(w.len(), n_in * n_out, "weight length mismatch");
    assert_eq!(
        out.len(),
        batch * n_out,
        "output len mismatch: expected {}, got {}",
        batch * n_out,
        out.len()
    );
}

/// Shape of a 2D convolution over NCHW batches with square kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvGeometry {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub padding: usize,
    pub stride: usize,
    pub input_height: usize,
    pub input_width: usize,
}

impl ConvGeometry {
    /// `(input_height + 2*padding - kernel_size) / stride + 1`
    pub fn output_height(&self) -> usize {
        (self.input_height + 2 * self.padding - self.kernel_size) / self.stride + 1
    }

    /// `(input_width + 2*padding - kernel_size) / stride + 1`
    pub fn output_width(&self) -> usize {
        (self.input_width + 2 * self.padding - self.kernel_size) / self.stride + 1
    }

    pub fn input_len(&self) -> usize {
        self.in_channels * self.input_height * self.input_width
    }

    pub fn output_len(&self) -> usize {
        self.out_channels * self.output_height() * self.output_width()
    }

    pub fn filter_len(&self) -> usize {
        self.out_channels * self.in_channels * self.kernel_size * self.kernel_size
    }

    /// Whether the kernel fits inside the padded input.
    pub fn is_valid(&self) -> bool {
        self.in_channels > 0
            && self.out_channels > 0
            && self.kernel_size > 0
            && self.stride > 0
            && self.input_height + 2 * self.padding >= self.kernel_size
            && self.input_width + 2 * self.padding >= self.kernel_size
    }

    /// Visit every (input index, filter index, output index) triple that
    /// contributes to the convolution of sample `b`.
    fn for_each_tap(&self, b: usize, mut f: impl FnMut(usize, usize, usize)) {
        let out_h = self.output_height();
        let out_w = self.output_width();
        let in_spatial = self.input_height * self.input_width;
        let out_spatial = out_h * out_w;
        let k = self.kernel_size;
        let in_base = b * self.in_channels * in_spatial;
        let out_base_b = b * self.out_channels * out_spatial;

        for oc in 0..self.out_channels {
            let out_base = out_base_b + oc * out_spatial;
            for ic in 0..self.in_channels {
                let w_base = (oc * self.in_channels + ic) * k * k;
                let in_base_c = in_base + ic * in_spatial;
                for oy in 0..out_h {
                    for ox in 0..out_w {
                        let out_idx = out_base + oy * out_w + ox;
                        for ky in 0..k {
                            let iy = (oy * self.stride + ky) as isize - self.padding as isize;
                            if iy < 0 || iy >= self.input_height as isize {
                                continue;
                            }
                            for kx in 0..k {
                                let ix = (ox * self.stride + kx) as isize - self.padding as isize;
                                if ix < 0 || ix >= self.input_width as isize {
                                    continue;
                                }
                                let in_idx =
                                    in_base_c + iy as usize * self.input_width + ix as usize;
                                f(in_idx, w_base + ky * k + kx, out_idx);
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Cross-correlation of a batch with `filters`, without bias.
pub fn conv2d(geometry: &ConvGeometry, x: &[f32], filters: &[f32], out: &mut [f32], batch: usize) {
    assert_eq!(x.len(), batch * geometry.input_len(), "conv input length mismatch");
    assert_eq!(filters.len(), geometry.filter_len(), "filter length mismatch");
    assert_eq!(out.len(), batch * geometry.output_len(), "conv output length mismatch");

    out.fill(0.0);
    for b in 0..batch {
        geometry.for_each_tap(b, |in_idx, w_idx, out_idx| {
            out[out_idx] += x[in_idx] * filters[w_idx];
        });
    }
}

/// Input gradient of [`conv2d`] (a transposed convolution) through `filters`.
///
/// Passing feedback filters instead of the forward filters gives the
/// asymmetric pullback used in feedback alignment.
pub fn conv2d_input_grad(
    geometry: &ConvGeometry,
    grad_out: &[f32],
    filters: &[f32],
    grad_in: &mut [f32],
    batch: usize,
) {
    assert_eq!(filters.len(), geometry.filter_len(), "filter length mismatch");
    assert_eq!(grad_in.len(), batch * geometry.input_len(), "conv grad_in length mismatch");

    grad_in.fill(0.0);
    for b in 0..batch {
        geometry.for_each_tap(b, |in_idx, w_idx, out_idx| {
            grad_in[in_idx] += grad_out[out_idx] * filters[w_idx];
        });
    }
}

/// Filter gradient of [`conv2d`], accumulated into `grad_w`.
pub fn conv2d_weight_grad(
    geometry: &ConvGeometry,
    x: &[f32],
    grad_out: &[f32],
    grad_w: &mut [f32],
    batch: usize,
) {
    assert_eq!(grad_w.len(), geometry.filter_len(), "filter gradient length mismatch");
    for b in 0..batch {
        geometry.for_each_tap(b, |in_idx, w_idx, out_idx| {
            grad_w[w_idx] += grad_out[out_idx] * x[in_idx];
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matmul_known_values() {
        // x = [[1, 2]], w = [[1, 2, 3], [4, 5, 6]]
        let x = vec![1.0, 2.0];
        let w = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut out = vec![0.0; 3];
        matmul(&x, &w, &mut out, 1, 2, 3);
        assert_eq!(out, vec![9.0, 12.0, 15.0]);
    }

    #[test]
    fn test_asym_grad_with_transposed_weights_matches_symmetric() {
        let w = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]; // 2 × 3
        let w_t = vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]; // 3 × 2
        let g = vec![0.5, -1.0, 2.0, 1.0, 0.0, -0.5];

        let mut sym = vec![0.0; 4];
        let mut asym = vec![0.0; 4];
        matmul_input_grad(&g, &w, &mut sym, 2, 2, 3);
        matmul_asym_input_grad(&g, &w_t, &mut asym, 2, 2, 3);
        assert_eq!(sym, asym);
    }

    #[test]
    fn test_radial_sim_is_negative_squared_distance() {
        // One sample at (1, 1); unit 0 at (1, 1), unit 1 at (0, 3).
        let x = vec![1.0, 1.0];
        let w = vec![1.0, 0.0, 1.0, 3.0];
        let mut out = vec![0.0; 2];
        radial_sim(&x, &w, &mut out, 1, 2, 2);
        assert_eq!(out, vec![0.0, -5.0]);
    }

    #[test]
    fn test_radial_asym_with_transposed_weights_matches_symmetric() {
        let x = vec![0.5, -1.0, 2.0, 0.25];
        let w = vec![1.0, -2.0, 0.5, 3.0]; // 2 × 2
        let w_t = vec![1.0, 0.5, -2.0, 3.0];
        let g = vec![1.0, -0.5, 0.25, 2.0];

        let mut sym = vec![0.0; 4];
        let mut asym = vec![0.0; 4];
        radial_sim_input_grad(&x, &g, &w, &mut sym, 2, 2, 2);
        radial_sim_asym_input_grad(&x, &g, &w_t, &mut asym, 2, 2, 2);
        for (a, b) in sym.iter().zip(asym.iter()) {
            assert!((a - b).abs() < 1e-5, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_conv_geometry_output_dims() {
        let geometry = ConvGeometry {
            in_channels: 1,
            out_channels: 8,
            kernel_size: 3,
            padding: 1,
            stride: 1,
            input_height: 28,
            input_width: 28,
        };
        assert_eq!(geometry.output_height(), 28);
        assert_eq!(geometry.output_width(), 28);

        let unpadded = ConvGeometry { padding: 0, ..geometry };
        assert_eq!(unpadded.output_height(), 26);
        assert_eq!(unpadded.output_len(), 8 * 26 * 26);
    }

    #[test]
    fn test_conv2d_identity_kernel() {
        let geometry = ConvGeometry {
            in_channels: 1,
            out_channels: 1,
            kernel_size: 3,
            padding: 1,
            stride: 1,
            input_height: 3,
            input_width: 3,
        };
        let mut filters = vec![0.0; 9];
        filters[4] = 1.0;
        let x: Vec<f32> = (0..9).map(|v| v as f32).collect();
        let mut out = vec![0.0; 9];
        conv2d(&geometry, &x, &filters, &mut out, 1);
        assert_eq!(out, x);
    }
}
