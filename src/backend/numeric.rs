//! Scalar formulas shared by the host and accelerated kernels.
//!
//! The CUDA kernels in `cuda/kernels/functions.cu` mirror these.

#[inline]
pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[inline]
pub(crate) fn sigmoid_grad(y: f32, grad_output: f32) -> f32 {
    grad_output * y * (1.0 - y)
}

/// One element of `x * (t - [x >= 0]) - log(1 + exp(-|x|))`.
///
/// Never evaluates `exp` of a positive argument.
#[inline]
pub(crate) fn sigmoid_cross_entropy_term(x: f32, t: i32) -> f64 {
    let x = x as f64;
    let positive = if x >= 0.0 { 1.0 } else { 0.0 };
    x * (t as f64 - positive) - (-x.abs()).exp().ln_1p()
}

/// Negated mean of the summed terms over the batch.
#[inline]
pub(crate) fn mean_loss(total: f64, batch: usize) -> f32 {
    (-total / batch as f64) as f32
}

#[inline]
pub(crate) fn sigmoid_cross_entropy_grad(coeff: f32, y: f32, t: i32) -> f32 {
    coeff * (y - t as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn term_is_finite_for_huge_logits() {
        for &x in &[-1.0e4f32, -88.0, 88.0, 1.0e4] {
            for t in 0..=1 {
                assert!(sigmoid_cross_entropy_term(x, t).is_finite());
            }
        }
    }

    #[test]
    fn term_matches_log_likelihood() {
        // t*log(y) + (1-t)*log(1-y) with y = sigmoid(x)
        for &x in &[-3.0f32, -0.5, 0.0, 0.7, 4.0] {
            let y = 1.0 / (1.0 + (-(x as f64)).exp());
            assert_abs_diff_eq!(sigmoid_cross_entropy_term(x, 1), y.ln(), epsilon = 1e-12);
            assert_abs_diff_eq!(sigmoid_cross_entropy_term(x, 0), (1.0 - y).ln(), epsilon = 1e-12);
        }
    }

    #[test]
    fn sigmoid_saturates_without_nan() {
        assert_eq!(sigmoid(-1.0e4), 0.0);
        assert_eq!(sigmoid(1.0e4), 1.0);
        assert_eq!(sigmoid(0.0), 0.5);
    }
}
