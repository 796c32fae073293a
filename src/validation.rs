//! Input checks for work entries.
//!
//! Validation collects every violated rule instead of stopping at the
//! first one so that a form can show all problems together.  The
//! function is pure: "today" is passed in by the caller, usually from
//! [`crate::clock::Clock`].

use crate::models::WorkEntry;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

pub const MAX_HOURS_PER_DAY: f64 = 24.0;
pub const MAX_HOURLY_RATE: f64 = 10_000_000.0;
pub const MAX_TASK_HOURS: f64 = 48.0;
pub const MIN_DESCRIPTION_CHARS: usize = 10;

/// Outcome of [`validate_work_entry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    /// Human-readable rule violations in rule order.
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// Converts a failed report into an error, for callers that want `?`.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.valid {
            Ok(())
        } else {
            Err(ValidationError {
                errors: self.errors,
            })
        }
    }
}

/// A rejected entry together with every rule it broke.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("work entry is invalid: {}", errors.join("; "))]
pub struct ValidationError {
    pub errors: Vec<String>,
}

/// Checks an entry against every business rule.
pub fn validate_work_entry(entry: &WorkEntry, today: NaiveDate) -> ValidationReport {
    let mut errors = Vec::new();
    let primary = entry.employee_name.trim();

    if primary.is_empty() {
        errors.push("Employee name is required".to_string());
    }
    if entry.task_description.trim().chars().count() < MIN_DESCRIPTION_CHARS {
        errors.push(format!(
            "Task description must be at least {MIN_DESCRIPTION_CHARS} characters"
        ));
    }
    if entry.date > today {
        errors.push("Date cannot be in the future".to_string());
    }

    // `!(x > 0.0)` also rejects NaN.
    if !(entry.primary_hours > 0.0) {
        errors.push("Hours worked must be greater than 0".to_string());
    } else if entry.primary_hours > MAX_HOURS_PER_DAY {
        errors.push("Hours worked cannot exceed 24 hours per day".to_string());
    }

    if !(entry.hourly_rate > 0.0) {
        errors.push("Hourly rate must be greater than 0".to_string());
    } else if entry.hourly_rate > MAX_HOURLY_RATE {
        errors.push("Hourly rate is too high (maximum 10,000,000)".to_string());
    }

    if !(entry.additional_charges >= 0.0) {
        errors.push("Additional charges cannot be negative".to_string());
    } else if !entry.additional_charges.is_finite() {
        errors.push("Additional charges must be a finite amount".to_string());
    }

    let mut seen = HashSet::new();
    for (index, c) in entry.collaborators.iter().enumerate() {
        let name = c.name.trim();
        let label = if name.is_empty() {
            format!("#{}", index + 1)
        } else {
            name.to_string()
        };

        if name.is_empty() {
            errors.push(format!("Collaborator {} name is required", index + 1));
        }
        if !(c.contributed_hours > 0.0) {
            errors.push(format!(
                "Contributed hours for collaborator {label} must be greater than 0"
            ));
        } else if c.contributed_hours > MAX_HOURS_PER_DAY {
            errors.push(format!(
                "Contributed hours for collaborator {label} cannot exceed 24 hours"
            ));
        }
        if !name.is_empty() {
            if !seen.insert(name) {
                errors.push(format!("Collaborator {name} is listed more than once"));
            }
            if name == primary {
                errors.push(format!(
                    "Collaborator {name} cannot be the primary employee"
                ));
            }
        }
    }

    // Only shared work has a per-task cap.
    if !entry.collaborators.is_empty() && entry.total_hours() > MAX_TASK_HOURS {
        errors.push("Combined hours are too high (maximum 48 hours for one task)".to_string());
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}
