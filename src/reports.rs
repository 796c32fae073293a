//! Aggregate figures for dashboards and reports.
//!
//! Totals are attributed to the primary employee of each record, the
//! same way the record list shows them; collaborator shares are not
//! broken out here.

use crate::models::WorkRecord;
use chrono::Datelike;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeTotals {
    pub employee_name: String,
    pub records: usize,
    pub hours: f64,
    pub earnings: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthTotals {
    /// `YYYY-MM`.
    pub month: String,
    pub records: usize,
    pub hours: f64,
    pub earnings: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub record_count: usize,
    pub total_hours: f64,
    pub total_remuneration: f64,
    /// Mean of the records' hourly rates; 0 when there are none.
    pub average_hourly_rate: f64,
    /// Highest earnings first, ties broken by name.
    pub by_employee: Vec<EmployeeTotals>,
    /// Oldest month first.
    pub by_month: Vec<MonthTotals>,
}

#[derive(Default)]
struct Partial {
    hours: f64,
    remuneration: f64,
    rate_sum: f64,
    employees: HashMap<String, (usize, f64, f64)>,
    months: HashMap<(i32, u32), (usize, f64, f64)>,
}

impl Partial {
    fn add(mut self, r: &WorkRecord) -> Self {
        let e = &r.entry;
        self.hours += e.primary_hours;
        self.remuneration += r.total_remuneration;
        self.rate_sum += e.hourly_rate;
        bump(self.employees.entry(e.employee_name.clone()).or_default(), e.primary_hours, r.total_remuneration);
        bump(
            self.months.entry((e.date.year(), e.date.month())).or_default(),
            e.primary_hours,
            r.total_remuneration,
        );
        self
    }

    fn merge(mut self, other: Self) -> Self {
        self.hours += other.hours;
        self.remuneration += other.remuneration;
        self.rate_sum += other.rate_sum;
        for (k, (n, h, m)) in other.employees {
            let slot = self.employees.entry(k).or_default();
            slot.0 += n;
            slot.1 += h;
            slot.2 += m;
        }
        for (k, (n, h, m)) in other.months {
            let slot = self.months.entry(k).or_default();
            slot.0 += n;
            slot.1 += h;
            slot.2 += m;
        }
        self
    }
}

fn bump(slot: &mut (usize, f64, f64), hours: f64, money: f64) {
    slot.0 += 1;
    slot.1 += hours;
    slot.2 += money;
}

/// Folds the records into a [`Summary`] using the rayon thread pool.
pub fn summarize(records: &[WorkRecord]) -> Summary {
    let totals = records
        .par_iter()
        .fold(Partial::default, Partial::add)
        .reduce(Partial::default, Partial::merge);

    let mut by_employee: Vec<EmployeeTotals> = totals
        .employees
        .into_iter()
        .map(|(employee_name, (records, hours, earnings))| EmployeeTotals {
            employee_name,
            records,
            hours,
            earnings,
        })
        .collect();
    by_employee.sort_by(|a, b| {
        b.earnings
            .total_cmp(&a.earnings)
            .then_with(|| a.employee_name.cmp(&b.employee_name))
    });

    let mut months: Vec<_> = totals.months.into_iter().collect();
    months.sort_by_key(|(k, _)| *k);
    let by_month = months
        .into_iter()
        .map(|((year, month), (records, hours, earnings))| MonthTotals {
            month: format!("{year:04}-{month:02}"),
            records,
            hours,
            earnings,
        })
        .collect();

    let average_hourly_rate = if records.is_empty() {
        0.0
    } else {
        totals.rate_sum / records.len() as f64
    };

    Summary {
        record_count: records.len(),
        total_hours: totals.hours,
        total_remuneration: totals.remuneration,
        average_hourly_rate,
        by_employee,
        by_month,
    }
}
