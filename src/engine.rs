//! Remuneration computation engine.
//!
//! The `engine` module turns a [`WorkEntry`] into a
//! [`RemunerationResult`].  Every function here is pure: no clock, no
//! storage, no logging beyond `debug` traces.
//!
//! The engine does **not** re-validate entries.  Range rules (hours per
//! day, maximum rate, combined hours cap, name uniqueness) are owned by
//! [`crate::validation`] and must be checked by the caller first.  The
//! engine only guards the two conditions that would make its arithmetic
//! meaningless: non-positive hours/rate and a zero hour total.

use crate::models::{CollaboratorShare, RemunerationResult, WorkEntry};
use rayon::prelude::*;
use thiserror::Error;

/// Contract violations detected by the engine.
///
/// These are programming errors on the caller's side rather than user
/// mistakes: an entry that passed validation never produces one.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("division by zero: total hours is not positive")]
    DivisionByZero,
}

/// Returns `primary_hours * hourly_rate + additional_charges`.
///
/// Collaborators never affect the total; they only change how it is
/// split by [`compute_prorated`].
pub fn compute_total(entry: &WorkEntry) -> Result<f64, EngineError> {
    if !entry.primary_hours.is_finite() || entry.primary_hours <= 0.0 {
        return Err(EngineError::InvalidInput(format!(
            "primary hours must be positive, got {}",
            entry.primary_hours
        )));
    }
    if !entry.hourly_rate.is_finite() || entry.hourly_rate <= 0.0 {
        return Err(EngineError::InvalidInput(format!(
            "hourly rate must be positive, got {}",
            entry.hourly_rate
        )));
    }
    if !entry.additional_charges.is_finite() {
        return Err(EngineError::InvalidInput(
            "additional charges must be a finite number".into(),
        ));
    }
    Ok(entry.primary_hours * entry.hourly_rate + entry.additional_charges)
}

/// Splits the base total between the primary employee and the
/// collaborators in proportion to the hours each contributed.
///
/// With no collaborators the primary share is the base total itself, so
/// no division takes place.  Shares are not rounded or reconciled: their
/// sum may differ from `base_total` by floating-point noise.
pub fn compute_prorated(entry: &WorkEntry) -> Result<RemunerationResult, EngineError> {
    let base_total = compute_total(entry)?;

    if entry.collaborators.is_empty() {
        return Ok(RemunerationResult {
            base_total,
            primary_share: base_total,
            collaborator_shares: Vec::new(),
        });
    }

    let total_hours = entry.total_hours();
    if !(total_hours > 0.0) {
        return Err(EngineError::DivisionByZero);
    }

    let collaborator_shares = entry
        .collaborators
        .iter()
        .map(|c| CollaboratorShare {
            name: c.name.clone(),
            contributed_hours: c.contributed_hours,
            share: (c.contributed_hours / total_hours) * base_total,
        })
        .collect();

    let result = RemunerationResult {
        base_total,
        primary_share: (entry.primary_hours / total_hours) * base_total,
        collaborator_shares,
    };
    tracing::debug!(
        base_total,
        total_hours,
        collaborators = entry.collaborators.len(),
        "prorated remuneration computed"
    );
    Ok(result)
}

/// Computes the prorated split for many entries at once.
///
/// Entries are independent, so the work is spread over the [`rayon`]
/// thread pool.  The output keeps the input order; each slot holds that
/// entry's own result so one bad entry does not sink the batch.
pub fn compute_batch(entries: &[WorkEntry]) -> Vec<Result<RemunerationResult, EngineError>> {
    entries.par_iter().map(compute_prorated).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{collaborator, entry};

    #[test]
    fn total_without_collaborators() {
        let e = entry(8.0, 150_000.0, 50_000.0);
        assert_eq!(compute_total(&e).unwrap(), 1_250_000.0);

        let r = compute_prorated(&e).unwrap();
        assert_eq!(r.base_total, 1_250_000.0);
        assert_eq!(r.primary_share, 1_250_000.0);
        assert!(r.collaborator_shares.is_empty());
    }

    #[test]
    fn split_with_one_collaborator() {
        let mut e = entry(6.0, 100_000.0, 0.0);
        e.collaborators.push(collaborator("B", 2.0));

        let r = compute_prorated(&e).unwrap();
        assert_eq!(r.base_total, 600_000.0);
        assert_eq!(r.primary_share, 450_000.0);
        assert_eq!(r.collaborator_shares.len(), 1);
        assert_eq!(r.collaborator_shares[0].name, "B");
        assert_eq!(r.collaborator_shares[0].share, 150_000.0);
    }

    #[test]
    fn shares_keep_input_order() {
        let mut e = entry(4.0, 50_000.0, 10_000.0);
        for (name, h) in [("Zed", 1.0), ("Amy", 3.0), ("Mia", 2.0)] {
            e.collaborators.push(collaborator(name, h));
        }
        let names: Vec<_> = compute_prorated(&e)
            .unwrap()
            .collaborator_shares
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, ["Zed", "Amy", "Mia"]);
    }

    #[test]
    fn rejects_non_positive_hours_and_rate() {
        assert!(matches!(
            compute_total(&entry(0.0, 100.0, 0.0)),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            compute_total(&entry(1.0, -5.0, 0.0)),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            compute_total(&entry(f64::NAN, 100.0, 0.0)),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn zero_hour_total_is_division_by_zero() {
        // Bypasses compute_total's guard by cancelling the primary hours
        // with a negative collaborator, which validation would reject.
        let mut e = entry(2.0, 100.0, 0.0);
        e.collaborators.push(collaborator("X", -2.0));
        assert_eq!(compute_prorated(&e), Err(EngineError::DivisionByZero));
    }

    #[test]
    fn batch_keeps_order_and_isolates_errors() {
        let entries = vec![entry(1.0, 10.0, 0.0), entry(0.0, 10.0, 0.0), entry(2.0, 10.0, 5.0)];
        let out = compute_batch(&entries);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].as_ref().unwrap().base_total, 10.0);
        assert!(out[1].is_err());
        assert_eq!(out[2].as_ref().unwrap().base_total, 25.0);
    }
}
