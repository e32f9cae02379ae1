//! Discretionary, auditable overrides ("adjustments") on top of computed
//! values, without mutating the underlying computed data.
//!
//! The core pieces:
//! - [`adjust::Adjustment`]: one immutable override record.
//! - [`adjust::AdjustmentFilter`] / [`adjust::FilterSpec`]: declarative
//!   selection of which overrides apply in a given query context.
//! - [`adjust::AdjustmentManager`]: dual-indexed storage with a
//!   deterministic `(priority, timestamp)` fold onto a base value.
//! - [`analysis::Analytics`]: read-only grouped reporting.
//! - [`engine::AdjustmentEngine`]: the caller surface, composing an
//!   external [`engine::BaseValueSource`] with the manager.

pub mod adjust;
pub mod analysis;
pub mod engine;

pub use adjust::{
    AdjustError, Adjustment, AdjustmentDraft, AdjustmentFilter, AdjustmentId, AdjustmentManager,
    AdjustmentPredicate, AdjustmentType, ApplyOutcome, FilterSpec, SkippedAdjustment,
    DEFAULT_SCENARIO,
};
pub use analysis::{Analytics, GroupField, SummaryRow, SummaryTable};
pub use engine::{AdjustmentEngine, BaseValueError, BaseValueSource, EngineError};
