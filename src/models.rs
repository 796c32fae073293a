//! Data models for the Worklog Engine.
//!
//! The `models` module defines the serialisable structs describing a
//! unit of recorded work, the collaborators who helped with it and the
//! remuneration computed for it.  These types derive `Serialize` and
//! `Deserialize` so they can be persisted or sent over the HTTP API
//! without an extra mapping layer.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A colleague who contributed hours to somebody else's task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collaborator {
    /// Display name.  Must be non-empty, unique within the entry and
    /// different from the primary employee.
    pub name: String,
    /// Hours contributed to the task, in `(0, 24]`.
    pub contributed_hours: f64,
}

/// Raw inputs for one task, as submitted by the user.
///
/// Only `primary_hours`, `hourly_rate`, `additional_charges` and the
/// collaborator hours take part in the arithmetic.  The descriptive
/// fields are checked by [`crate::validation`] and carried into the
/// stored [`WorkRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkEntry {
    /// The employee who owns the task.
    pub employee_name: String,
    /// Free-form description, at least ten characters once trimmed.
    pub task_description: String,
    /// Day the work was performed.
    pub date: NaiveDate,
    /// Hours the primary employee put in, in `(0, 24]`.
    pub primary_hours: f64,
    /// Pay per hour, in `(0, 10_000_000]`.
    pub hourly_rate: f64,
    /// Flat amount added on top of the hourly pay.
    #[serde(default)]
    pub additional_charges: f64,
    /// Helpers in the order the user entered them.
    #[serde(default)]
    pub collaborators: Vec<Collaborator>,
}

impl WorkEntry {
    /// Sum of the primary hours and every collaborator's hours.
    pub fn total_hours(&self) -> f64 {
        self.primary_hours
            + self
                .collaborators
                .iter()
                .map(|c| c.contributed_hours)
                .sum::<f64>()
    }
}

/// One collaborator's slice of the base total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaboratorShare {
    /// Collaborator name as entered.
    pub name: String,
    /// Hours the collaborator contributed.
    pub contributed_hours: f64,
    /// `contributed_hours / total_hours * base_total`.
    pub share: f64,
}

/// The result of a pro-rata split.  Computed fresh from a
/// [`WorkEntry`]; never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemunerationResult {
    /// `primary_hours * hourly_rate + additional_charges`.
    pub base_total: f64,
    /// Portion of `base_total` attributed to the primary employee.
    pub primary_share: f64,
    /// Same order as the input collaborators.
    pub collaborator_shares: Vec<CollaboratorShare>,
}

/// A stored work record: the submitted entry plus its computed pay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkRecord {
    /// Random UUID assigned when the record is first added.
    pub id: String,
    /// The inputs the record was computed from.
    pub entry: WorkEntry,
    /// Equal to `remuneration.base_total`; kept at the top level because
    /// reports and exports only care about this figure.
    pub total_remuneration: f64,
    /// Full split, recomputed on every update.
    pub remuneration: RemunerationResult,
    /// Set once on add; kept across updates.
    pub created_at: DateTime<Utc>,
    /// Time of the latest add or update.
    pub updated_at: DateTime<Utc>,
}
