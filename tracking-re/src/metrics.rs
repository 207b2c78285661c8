//! Evaluation metrics.

use ndarray::Array1;

use crate::error::{Result, TrackingError};

/// Fraction of predictions equal to the true label, in `[0, 1]`.
pub fn accuracy(y_true: &Array1<i64>, y_pred: &Array1<i64>) -> Result<f64> {
    if y_true.len() != y_pred.len() {
        return Err(TrackingError::validation(format!(
            "{} labels but {} predictions",
            y_true.len(),
            y_pred.len()
        )));
    }
    if y_true.is_empty() {
        return Err(TrackingError::validation("accuracy of an empty set is undefined"));
    }
    let correct = y_true.iter().zip(y_pred.iter()).filter(|(a, b)| a == b).count();
    Ok(correct as f64 / y_true.len() as f64)
}
