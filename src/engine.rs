//! Caller-facing composition of the base-value supplier and the manager.
//!
//! The engine never computes base values itself; it asks a
//! [`BaseValueSource`] (the calculation layer) and folds the matching
//! adjustments on top. A supplier failure is propagated untouched.

use thiserror::Error;

use crate::adjust::error::AdjustError;
use crate::adjust::filter::FilterSpec;
use crate::adjust::manager::AdjustmentManager;
use crate::adjust::record::{Adjustment, AdjustmentDraft, AdjustmentId, DEFAULT_SCENARIO};

/// The contract consumed from the calculation layer.
pub trait BaseValueSource {
    /// Computes the base value for `(node, period)`.
    fn compute(&self, node: &str, period: &str) -> Result<f64, BaseValueError>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BaseValueError {
    #[error("No base value for node '{node}' at period '{period}'")]
    NotFound { node: String, period: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Base(#[from] BaseValueError),
    #[error(transparent)]
    Adjust(#[from] AdjustError),
}

/// Adjusted-value service over one base-value source.
pub struct AdjustmentEngine<S> {
    source: S,
    manager: AdjustmentManager,
}

impl<S: BaseValueSource> AdjustmentEngine<S> {
    /// Lenient engine (invalid fold steps are skipped and reported).
    pub fn new(source: S) -> Self {
        Self {
            source,
            manager: AdjustmentManager::new(),
        }
    }

    /// Strict engine (an invalid fold step fails the whole query).
    pub fn strict(source: S) -> Self {
        Self {
            source,
            manager: AdjustmentManager::strict(),
        }
    }

    /// Validates and registers a new adjustment; returns its id.
    pub fn add_adjustment(&mut self, draft: AdjustmentDraft) -> Result<AdjustmentId, AdjustError> {
        let adj = draft.build()?;
        let id = adj.id;
        self.manager.add(adj);
        Ok(id)
    }

    /// Removes by id; `false` when the id was unknown.
    pub fn remove_adjustment(&mut self, id: AdjustmentId) -> bool {
        self.manager.remove(id)
    }

    /// Exact-location lookup, defaulting to the default scenario.
    pub fn get_adjustments(
        &self,
        node: &str,
        period: &str,
        scenario: Option<&str>,
    ) -> Vec<Adjustment> {
        self.manager
            .get(node, period, scenario.unwrap_or(DEFAULT_SCENARIO))
    }

    /// Base value with all matching adjustments folded on.
    pub fn get_adjusted_value(
        &self,
        node: &str,
        period: &str,
        spec: &FilterSpec,
    ) -> Result<f64, EngineError> {
        self.get_adjusted_value_flagged(node, period, spec)
            .map(|(value, _)| value)
    }

    /// As [`get_adjusted_value`](Self::get_adjusted_value), also reporting
    /// whether the base value was actually changed.
    pub fn get_adjusted_value_flagged(
        &self,
        node: &str,
        period: &str,
        spec: &FilterSpec,
    ) -> Result<(f64, bool), EngineError> {
        let base = self.source.compute(node, period)?;
        let matched = self.manager.get_filtered(node, period, spec);
        let outcome = self.manager.apply(base, &matched)?;
        Ok((outcome.value, outcome.changed))
    }

    /// Cheap existence check: does anything match here? Never computes the
    /// base value.
    pub fn was_adjusted(&self, node: &str, period: &str, spec: &FilterSpec) -> bool {
        !self.manager.get_filtered(node, period, spec).is_empty()
    }

    /// Every registered adjustment, storage order.
    pub fn list_all_adjustments(&self) -> Vec<Adjustment> {
        self.manager.get_all()
    }

    /// The underlying manager, for the analytics layer and bulk loaders.
    pub fn manager(&self) -> &AdjustmentManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut AdjustmentManager {
        &mut self.manager
    }
}
