//! Model signatures: the input and output shapes recorded with a logged model.
//!
//! Shapes use `-1` for the variable batch dimension, so a model trained on
//! four features has the input shape `[-1, 4]`.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, TrackingError};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Float64,
    Int64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TensorSpec {
    pub dtype: DataType,
    pub shape: Vec<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelSignature {
    pub inputs: TensorSpec,
    pub outputs: TensorSpec,
}

impl ModelSignature {
    /// Infer the signature from sample model inputs and the predictions made on them.
    pub fn infer(inputs: &Array2<f64>, outputs: &Array1<i64>) -> Self {
        Self {
            inputs: TensorSpec {
                dtype: DataType::Float64,
                shape: vec![-1, inputs.ncols() as i64],
            },
            outputs: TensorSpec {
                dtype: DataType::Int64,
                shape: vec![-1; outputs.ndim()],
            },
        }
    }

    /// Number of features per input row, if the signature fixes it.
    pub fn input_width(&self) -> Option<usize> {
        match self.inputs.shape.as_slice() {
            [_, width] if *width >= 0 => usize::try_from(*width).ok(),
            _ => None,
        }
    }

    /// Check a batch of rows against the input tensor shape and pack it into a matrix.
    pub fn validate_rows(&self, rows: &[Vec<f64>]) -> Result<Array2<f64>> {
        if rows.is_empty() {
            return Err(TrackingError::validation("no input rows"));
        }
        let width = self.input_width().unwrap_or(rows[0].len());
        for (i, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(TrackingError::validation(format!(
                    "row {i} has {} columns, model signature expects {width}",
                    row.len()
                )));
            }
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        Array2::from_shape_vec((rows.len(), width), flat)
            .map_err(|e| TrackingError::validation(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

impl fmt::Display for ModelSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "inputs: {:?} {:?} -> outputs: {:?} {:?}",
            self.inputs.dtype, self.inputs.shape, self.outputs.dtype, self.outputs.shape
        )
    }
}
