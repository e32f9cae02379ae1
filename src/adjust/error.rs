//! Error types for the adjustment engine.

use super::record::AdjustmentId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdjustError {
    /// Validation failure at construction; never coerced or clamped.
    #[error("Scale {scale} is outside [0.0, 1.0]")]
    InvalidScale { scale: f64 },

    /// A fold step produced an invalid number and the manager is strict.
    /// In lenient mode the step is skipped and reported in the outcome
    /// instead of raising this.
    #[error("Numeric failure applying {id} on node '{node_name}': {detail}")]
    NumericApply {
        id: AdjustmentId,
        node_name: String,
        detail: String,
    },
}
