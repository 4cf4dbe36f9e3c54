//! Period/issuer/executive/client narrowing of the session table.
use chrono::{Datelike, NaiveDate};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{ReportError, Result};
use crate::types::Transaction;
use crate::util::month_abbr;

/// Distinct values available for each filter, derived from the loaded table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterOptions {
    pub years: Vec<i32>,
    pub months: Vec<u32>,
    pub issuers: Vec<String>,
    pub executives: Vec<String>,
    pub clients: Vec<String>,
}

impl FilterOptions {
    pub fn from_rows(rows: &[Transaction]) -> Self {
        let years: BTreeSet<i32> = rows.iter().map(|r| r.year).collect();
        let months: BTreeSet<u32> = rows.iter().map(|r| r.month).collect();
        let issuers: BTreeSet<&str> = rows.iter().map(|r| r.issuer.as_str()).collect();
        let executives: BTreeSet<&str> = rows.iter().map(|r| r.executive.as_str()).collect();
        let clients: BTreeSet<&str> = rows.iter().map(|r| r.client.as_str()).collect();
        FilterOptions {
            years: years.into_iter().collect(),
            months: months.into_iter().collect(),
            issuers: issuers.into_iter().map(String::from).collect(),
            executives: executives.into_iter().map(String::from).collect(),
            clients: clients.into_iter().map(String::from).collect(),
        }
    }
}

/// The user's current filter choices.
///
/// `None` means "no restriction" for years, months, issuers and executives.
/// The client filter is opt-in: an empty set keeps every client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSelection {
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub months: Option<BTreeSet<u32>>,
    pub issuers: Option<BTreeSet<String>>,
    pub executives: Option<BTreeSet<String>>,
    pub clients: BTreeSet<String>,
    /// Whether tables are rendered with their totalizer row.
    pub show_total: bool,
}

impl Default for FilterSelection {
    fn default() -> Self {
        FilterSelection {
            year_from: None,
            year_to: None,
            months: None,
            issuers: None,
            executives: None,
            clients: BTreeSet::new(),
            show_total: true,
        }
    }
}

impl FilterSelection {
    pub fn validate(&self) -> Result<()> {
        if let Some(m) = self.months.iter().flatten().find(|m| !(1..=12).contains(*m)) {
            return Err(ReportError::InvalidFilter(format!("month {} is outside 1-12", m)));
        }
        Ok(())
    }

    /// Inclusive year bounds, swapped if given in reverse.
    pub fn year_range(&self) -> (Option<i32>, Option<i32>) {
        match (self.year_from, self.year_to) {
            (Some(a), Some(b)) => (Some(a.min(b)), Some(a.max(b))),
            other => other,
        }
    }

    pub fn matches(&self, row: &Transaction) -> bool {
        let (lo, hi) = self.year_range();
        lo.map_or(true, |lo| row.year >= lo)
            && hi.map_or(true, |hi| row.year <= hi)
            && self.months.as_ref().map_or(true, |m| m.contains(&row.month))
            && self.issuers.as_ref().map_or(true, |s| s.contains(&row.issuer))
            && self.executives.as_ref().map_or(true, |s| s.contains(&row.executive))
            && (self.clients.is_empty() || self.clients.contains(&row.client))
    }

    pub fn apply(&self, rows: &[Transaction]) -> Vec<Transaction> {
        let filtered: Vec<Transaction> = rows.iter().filter(|r| self.matches(r)).cloned().collect();
        debug!("Filter kept {} of {} rows", filtered.len(), rows.len());
        filtered
    }

    /// Restrict months to January through the month of `today`.
    pub fn year_to_date(&mut self, today: NaiveDate) {
        self.months = Some((1..=today.month()).collect());
    }

    /// One `(filter, value)` pair per filter dimension, in display order.
    pub fn summary_rows(&self) -> Vec<(&'static str, String)> {
        let (lo, hi) = self.year_range();
        let years = match (lo, hi) {
            (None, None) => "All".to_string(),
            (lo, hi) => format!(
                "{} to {}",
                lo.map_or("…".to_string(), |y| y.to_string()),
                hi.map_or("…".to_string(), |y| y.to_string())
            ),
        };
        let months = self
            .months
            .as_ref()
            .map(|m| m.iter().map(|&m| month_abbr(m)).collect::<Vec<_>>().join(", "))
            .unwrap_or_else(|| "All".to_string());
        let list = |set: Option<&BTreeSet<String>>| {
            set.map(|s| s.iter().cloned().collect::<Vec<_>>().join(", "))
                .unwrap_or_else(|| "All".to_string())
        };
        let clients = if self.clients.is_empty() {
            "All".to_string()
        } else {
            list(Some(&self.clients))
        };
        vec![
            ("Years", years),
            ("Months", months),
            ("Issuers", list(self.issuers.as_ref())),
            ("Executives", list(self.executives.as_ref())),
            ("Clients", clients),
        ]
    }

    /// Human-readable description of the active filters, for logs and captions.
    pub fn describe(&self) -> String {
        self.summary_rows()
            .into_iter()
            .map(|(filter, value)| format!("{}: {}", filter, value))
            .collect::<Vec<_>>()
            .join(" | ")
    }
}
