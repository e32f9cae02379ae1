//! The adjustment engine core: immutable records, declarative filters, and
//! the dual-indexed manager that folds overrides onto computed base values.

pub mod error;
pub mod filter;
pub mod manager;
pub mod record;
pub mod tags;

// Re-export key types for convenient access
pub use error::AdjustError;
pub use filter::{AdjustmentFilter, AdjustmentPredicate, FilterSpec};
pub use manager::{AdjustmentManager, ApplyOutcome, SkippedAdjustment};
pub use record::{Adjustment, AdjustmentDraft, AdjustmentId, AdjustmentType, DEFAULT_SCENARIO};
