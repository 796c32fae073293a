//! The work-record ledger.
//!
//! Every write goes through validation and then the engine, so a stored
//! record always carries a remuneration computed from its own inputs.
//! Editing a record recomputes from scratch and replaces the old result.

use crate::engine::{compute_prorated, EngineError};
use crate::models::{RemunerationResult, WorkEntry, WorkRecord};
use crate::validation::{validate_work_entry, ValidationError};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("work record `{0}` not found")]
    NotFound(String),
}

/// In-memory ledger, newest record first.
#[derive(Debug, Clone, Default)]
pub struct WorkRecordStore {
    records: Vec<WorkRecord>,
}

impl WorkRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> &[WorkRecord] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&WorkRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Validates, computes and stores a new record at the front.
    pub fn add(&mut self, entry: WorkEntry, now: DateTime<Utc>) -> Result<&WorkRecord, RecordError> {
        let remuneration = remunerate(&entry, now)?;
        let record = WorkRecord {
            id: uuid::Uuid::new_v4().to_string(),
            total_remuneration: remuneration.base_total,
            remuneration,
            entry,
            created_at: now,
            updated_at: now,
        };
        tracing::info!(
            id = %record.id,
            employee = %record.entry.employee_name,
            total = record.total_remuneration,
            collaborators = record.entry.collaborators.len(),
            "work record added"
        );
        self.records.insert(0, record);
        Ok(&self.records[0])
    }

    /// Replaces a record's inputs and result.  `created_at` is kept.
    pub fn update(&mut self, id: &str, entry: WorkEntry, now: DateTime<Utc>) -> Result<&WorkRecord, RecordError> {
        let index = self
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| RecordError::NotFound(id.to_string()))?;
        let remuneration = remunerate(&entry, now)?;
        let old = &self.records[index];
        let record = WorkRecord {
            id: old.id.clone(),
            created_at: old.created_at,
            total_remuneration: remuneration.base_total,
            remuneration,
            entry,
            updated_at: now,
        };
        self.records[index] = record;
        tracing::info!(id, "work record updated");
        Ok(&self.records[index])
    }

    pub fn delete(&mut self, id: &str) -> Result<WorkRecord, RecordError> {
        let index = self
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| RecordError::NotFound(id.to_string()))?;
        tracing::info!(id, "work record deleted");
        Ok(self.records.remove(index))
    }

    /// Renders every record as CSV, one row per record.
    pub fn export_csv(&self) -> String {
        const HEADERS: [&str; 8] = [
            "Employee Name",
            "Task Description",
            "Date",
            "Hours Worked",
            "Hourly Rate",
            "Additional Charges",
            "Total Remuneration",
            "Collaborators",
        ];
        let mut lines = Vec::with_capacity(self.records.len() + 1);
        lines.push(csv_row(HEADERS.iter().map(|h| h.to_string())));
        for r in &self.records {
            let e = &r.entry;
            let collaborators = e
                .collaborators
                .iter()
                .map(|c| format!("{} ({}h)", c.name, c.contributed_hours))
                .collect::<Vec<_>>()
                .join("; ");
            lines.push(csv_row([
                e.employee_name.clone(),
                e.task_description.clone(),
                e.date.to_string(),
                e.primary_hours.to_string(),
                e.hourly_rate.to_string(),
                e.additional_charges.to_string(),
                r.total_remuneration.to_string(),
                collaborators,
            ]));
        }
        lines.join("\n")
    }
}

fn remunerate(entry: &WorkEntry, now: DateTime<Utc>) -> Result<RemunerationResult, RecordError> {
    validate_work_entry(entry, now.date_naive()).into_result()?;
    Ok(compute_prorated(entry)?)
}

fn csv_row(cells: impl IntoIterator<Item = String>) -> String {
    cells
        .into_iter()
        .map(|c| format!("\"{}\"", c.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(",")
}
