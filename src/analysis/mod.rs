//! Read-only reporting over the manager's public query surface.

pub mod summary;

pub use summary::{Analytics, GroupField, SummaryRow, SummaryTable};
