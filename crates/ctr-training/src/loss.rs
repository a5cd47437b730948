//! Binary cross-entropy for click labels.

use ctr_layers::Tensor;

use crate::error::{Result, TrainingError};

/// Probabilities are clamped to `[EPSILON, 1 - EPSILON]` before taking logs.
pub const EPSILON: f32 = 1e-7;

/// Mean binary cross-entropy `-(y ln p + (1 - y) ln(1 - p))`.
///
/// Returns `0.0` for an empty batch.
///
/// # Errors
///
/// Returns [`TrainingError::LengthMismatch`] if `probs` and `labels` differ in
/// length.
///
/// # Example
///
/// ```
/// use ctr_training::binary_cross_entropy;
///
/// let loss = binary_cross_entropy(&[0.5, 0.5], &[1.0, 0.0]).unwrap();
/// assert!((loss - std::f32::consts::LN_2).abs() < 1e-6);
/// ```
pub fn binary_cross_entropy(probs: &[f32], labels: &[f32]) -> Result<f32> {
    check_lengths(probs, labels)?;
    if labels.is_empty() {
        return Ok(0.0);
    }
    let total: f64 = probs
        .iter()
        .zip(labels)
        .map(|(&p, &y)| {
            let p = f64::from(p.clamp(EPSILON, 1.0 - EPSILON));
            let y = f64::from(y);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum();
    Ok((total / labels.len() as f64) as f32)
}

/// Gradient of the mean cross-entropy with respect to the pre-sigmoid
/// logits: `(p - y) / B`, shaped `[B, 1]`.
///
/// # Errors
///
/// Returns [`TrainingError::LengthMismatch`] if `probs` and `labels` differ in
/// length.
pub fn logit_gradient(probs: &[f32], labels: &[f32]) -> Result<Tensor> {
    check_lengths(probs, labels)?;
    let batch = labels.len().max(1) as f32;
    let grad = probs
        .iter()
        .zip(labels)
        .map(|(p, y)| (p - y) / batch)
        .collect();
    Ok(Tensor::from_data(&[labels.len(), 1], grad))
}

fn check_lengths(probs: &[f32], labels: &[f32]) -> Result<()> {
    if probs.len() != labels.len() {
        return Err(TrainingError::LengthMismatch {
            predictions: probs.len(),
            labels: labels.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confident_correct_predictions_have_small_loss() {
        let loss = binary_cross_entropy(&[0.99, 0.01], &[1.0, 0.0]).unwrap();
        assert!(loss < 0.02);
    }

    #[test]
    fn test_saturated_predictions_are_clamped() {
        let loss = binary_cross_entropy(&[0.0, 1.0], &[1.0, 0.0]).unwrap();
        assert!(loss.is_finite());
        // -ln(1e-7) is about 16.1
        assert!(loss > 15.0 && loss < 16.5);
    }

    #[test]
    fn test_empty_batch() {
        assert_eq!(binary_cross_entropy(&[], &[]).unwrap(), 0.0);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(matches!(
            binary_cross_entropy(&[0.5], &[1.0, 0.0]),
            Err(TrainingError::LengthMismatch {
                predictions: 1,
                labels: 2
            })
        ));
    }

    #[test]
    fn test_logit_gradient() {
        let grad = logit_gradient(&[0.75, 0.25], &[1.0, 1.0]).unwrap();
        assert_eq!(grad.shape(), &[2, 1]);
        assert!((grad.data()[0] - -0.125).abs() < 1e-7);
        assert!((grad.data()[1] - -0.375).abs() < 1e-7);
    }

    #[test]
    fn test_logit_gradient_matches_finite_difference() {
        let logits = [0.3f32, -1.2, 2.0];
        let labels = [1.0, 0.0, 0.0];
        let probs: Vec<f32> = logits.iter().map(|&z| ctr_layers::sigmoid(z)).collect();
        let grad = logit_gradient(&probs, &labels).unwrap();

        let eps = 1e-3;
        for i in 0..logits.len() {
            let mut plus = logits;
            plus[i] += eps;
            let mut minus = logits;
            minus[i] -= eps;
            let p_plus: Vec<f32> = plus.iter().map(|&z| ctr_layers::sigmoid(z)).collect();
            let p_minus: Vec<f32> = minus.iter().map(|&z| ctr_layers::sigmoid(z)).collect();
            let numeric = (binary_cross_entropy(&p_plus, &labels).unwrap()
                - binary_cross_entropy(&p_minus, &labels).unwrap())
                / (2.0 * eps);
            assert!((numeric - grad.data()[i]).abs() < 1e-3);
        }
    }
}
