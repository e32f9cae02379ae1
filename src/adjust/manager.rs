//! Indexed storage and deterministic application of adjustments.
//!
//! The manager owns two indices over the same record set: a location index
//! keyed by `(scenario, node, period)` holding sorted buckets, and an id
//! index for O(1) existence and removal. Both are private and only ever
//! mutated together, so they cannot diverge.
//!
//! All operations are synchronous and single-threaded: mutations take
//! `&mut self`, reads take `&self`. A caller that needs shared access wraps
//! the whole manager in one lock, keeping the index pair a single unit.

use smallvec::SmallVec;
use std::collections::{BTreeSet, HashMap};

use super::error::AdjustError;
use super::filter::FilterSpec;
use super::record::{Adjustment, AdjustmentId, AdjustmentType};

/// `(scenario, node_name, period)`.
type LocationKey = (String, String, String);

/// Location buckets are almost always one or two records deep.
type Bucket = SmallVec<[Adjustment; 2]>;

/// Result of folding a list of adjustments onto a base value.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    pub value: f64,
    /// True iff the final value differs from the base. An adjustment that
    /// mathematically no-ops (additive zero, or a skipped step) does not
    /// set this.
    pub changed: bool,
    /// Steps skipped in lenient mode, with the reason each was skipped.
    pub skipped: Vec<SkippedAdjustment>,
}

/// Diagnostic for one fold step that was skipped in lenient mode.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedAdjustment {
    pub id: AdjustmentId,
    pub node_name: String,
    pub detail: String,
}

#[derive(Debug, Clone, Default)]
pub struct AdjustmentManager {
    by_location: HashMap<LocationKey, Bucket>,
    by_id: HashMap<AdjustmentId, LocationKey>,
    strict: bool,
}

impl AdjustmentManager {
    /// Lenient manager: numerically invalid fold steps are skipped and
    /// reported in the [`ApplyOutcome`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Strict manager: a numerically invalid fold step fails the whole
    /// `apply` call.
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Every scenario that currently holds at least one adjustment.
    pub fn scenarios(&self) -> BTreeSet<String> {
        self.by_location
            .keys()
            .map(|(scenario, _, _)| scenario.clone())
            .collect()
    }

    /// Inserts `adj`, replacing any existing record with the same id.
    /// The affected bucket is re-sorted by `(priority, timestamp, id)`.
    pub fn add(&mut self, adj: Adjustment) {
        self.detach(adj.id);
        let key: LocationKey = (
            adj.scenario.clone(),
            adj.node_name.clone(),
            adj.period.clone(),
        );
        self.by_id.insert(adj.id, key.clone());
        let bucket = self.by_location.entry(key).or_default();
        bucket.push(adj);
        bucket.sort_by_key(Adjustment::sort_key);
    }

    /// Removes the adjustment with this id; returns whether it existed.
    pub fn remove(&mut self, id: AdjustmentId) -> bool {
        self.detach(id)
    }

    /// Drops every stored adjustment.
    pub fn clear(&mut self) {
        self.by_location.clear();
        self.by_id.clear();
    }

    /// Replaces the whole set: `clear` followed by `add` for each element,
    /// so the last record wins for a duplicated id.
    pub fn load(&mut self, adjustments: Vec<Adjustment>) {
        self.clear();
        for adj in adjustments {
            self.add(adj);
        }
    }

    /// Exact-match lookup; a sorted defensive copy of the bucket, empty if
    /// the location holds nothing. A miss is not an error.
    pub fn get(&self, node: &str, period: &str, scenario: &str) -> Vec<Adjustment> {
        let key: LocationKey = (scenario.to_string(), node.to_string(), period.to_string());
        self.by_location
            .get(&key)
            .map(|bucket| bucket.to_vec())
            .unwrap_or_default()
    }

    /// Every stored adjustment, in storage order. Callers needing a
    /// deterministic order must re-sort.
    pub fn get_all(&self) -> Vec<Adjustment> {
        self.by_location.values().flatten().cloned().collect()
    }

    /// Resolves which adjustments apply at `(node, period)` under `spec`.
    ///
    /// The spec is first normalized (see [`FilterSpec::normalize`]); the
    /// scenario scan set is then resolved:
    /// - explicit include-set: those scenarios, minus any excludes;
    /// - excludes only: every scenario known to the manager, minus them;
    /// - neither: exactly the scenarios with a bucket at this location.
    /// Survivors of the filter (and predicate, if any) come back sorted by
    /// `(priority, timestamp, id)`.
    pub fn get_filtered(&self, node: &str, period: &str, spec: &FilterSpec) -> Vec<Adjustment> {
        let (filter, predicate) = spec.normalize(period);

        let scan: Vec<String> = match (&filter.scenarios, &filter.exclude_scenarios) {
            (Some(include), exclude) => include
                .iter()
                .filter(|s| exclude.as_ref().map_or(true, |ex| !ex.contains(s.as_str())))
                .cloned()
                .collect(),
            (None, Some(exclude)) => self
                .scenarios()
                .into_iter()
                .filter(|s| !exclude.contains(s))
                .collect(),
            (None, None) => self
                .by_location
                .keys()
                .filter(|(_, n, p)| n == node && p == period)
                .map(|(scenario, _, _)| scenario.clone())
                .collect(),
        };

        let mut out = Vec::new();
        for scenario in scan {
            let key: LocationKey = (scenario, node.to_string(), period.to_string());
            let Some(bucket) = self.by_location.get(&key) else {
                continue;
            };
            for adj in bucket {
                if !filter.matches(adj) {
                    continue;
                }
                if let Some(pred) = &predicate {
                    if !pred(adj, period) {
                        continue;
                    }
                }
                out.push(adj.clone());
            }
        }
        out.sort_by_key(Adjustment::sort_key);
        out
    }

    /// Folds `adjustments` onto `base`.
    ///
    /// The input is re-sorted by `(priority, timestamp, id)` first, so the
    /// result does not depend on the order the caller assembled the list in.
    /// An empty list returns `(base, false)` untouched.
    pub fn apply(&self, base: f64, adjustments: &[Adjustment]) -> Result<ApplyOutcome, AdjustError> {
        if adjustments.is_empty() {
            return Ok(ApplyOutcome {
                value: base,
                changed: false,
                skipped: Vec::new(),
            });
        }

        let mut ordered: Vec<&Adjustment> = adjustments.iter().collect();
        ordered.sort_by_key(|adj| adj.sort_key());

        let mut current = base;
        let mut skipped = Vec::new();
        for adj in ordered {
            match fold_step(current, adj) {
                Ok(next) => current = next,
                Err(detail) if self.strict => {
                    return Err(AdjustError::NumericApply {
                        id: adj.id,
                        node_name: adj.node_name.clone(),
                        detail,
                    });
                }
                Err(detail) => skipped.push(SkippedAdjustment {
                    id: adj.id,
                    node_name: adj.node_name.clone(),
                    detail,
                }),
            }
        }

        // Bitwise comparison: a NaN base (the calc engine can produce one)
        // must still read as unchanged when every step no-opped or was
        // skipped, and `NaN != NaN` would flag it.
        Ok(ApplyOutcome {
            value: current,
            changed: current.to_bits() != base.to_bits(),
            skipped,
        })
    }

    /// Unlinks `id` from both indices, dropping the bucket if it empties.
    fn detach(&mut self, id: AdjustmentId) -> bool {
        let Some(key) = self.by_id.remove(&id) else {
            return false;
        };
        let now_empty = match self.by_location.get_mut(&key) {
            Some(bucket) => {
                bucket.retain(|adj| adj.id != id);
                bucket.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.by_location.remove(&key);
        }
        true
    }
}

/// One fold step. Returns the failure reason instead of letting a NaN or
/// infinity leak into the running value.
fn fold_step(current: f64, adj: &Adjustment) -> Result<f64, String> {
    let next = match adj.adj_type {
        AdjustmentType::Additive => current + adj.value * adj.scale,
        AdjustmentType::Multiplicative => {
            // A fractional exponent on a non-positive running value has no
            // real-valued result.
            if current <= 0.0 && adj.scale > 0.0 && adj.scale < 1.0 {
                return Err(format!(
                    "fractional scale {} on non-positive base {}",
                    adj.scale, current
                ));
            }
            current * adj.value.powf(adj.scale)
        }
        AdjustmentType::Replacement => adj.value,
    };
    if !next.is_finite() {
        return Err(format!("non-finite result {} (value {})", next, adj.value));
    }
    Ok(next)
}
