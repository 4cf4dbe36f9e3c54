//! Session context: the loaded table plus the current filter selection, and
//! the pipeline that turns them into a bundle of report results.
use chrono::NaiveDate;
use log::{info, warn};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::abc::{classify, AbcMetric, AbcReport, ClassRollup};
use crate::cohort::{analyze, CohortOptions, CohortReport};
use crate::config::ReportConfig;
use crate::efficiency::{
    client_averages, efficiency_headline, volume_table, ClientAverages, EfficiencyHeadline,
    VolumeTable,
};
use crate::error::{ReportError, Result};
use crate::filter::{FilterOptions, FilterSelection};
use crate::loader::{load_and_clean, LoadReport};
use crate::overview::{
    headline, issuer_share, monthly_evolution, years, Headline, IssuerShare, MonthlyPoint,
};
use crate::ranking::{top_clients, Ranking, RankingRequest};
use crate::types::Transaction;
use crate::variance::{
    churn, client_count_by_issuer, target_years, variance_table, ChurnBalance, ChurnReport,
    ClientCountTable, GroupKey, VarianceTable,
};

#[derive(Debug, Clone)]
pub struct Session {
    table: Vec<Transaction>,
    load_report: LoadReport,
    options: FilterOptions,
    selection: FilterSelection,
}

impl Session {
    pub fn new(table: Vec<Transaction>, load_report: LoadReport) -> Self {
        let options = FilterOptions::from_rows(&table);
        Session {
            table,
            load_report,
            options,
            selection: FilterSelection::default(),
        }
    }

    pub fn open(path: &Path, config: &ReportConfig) -> Result<Self> {
        let (table, load_report) = load_and_clean(path, config)?;
        Ok(Session::new(table, load_report))
    }

    pub fn table(&self) -> &[Transaction] {
        &self.table
    }

    pub fn load_report(&self) -> &LoadReport {
        &self.load_report
    }

    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }

    pub fn last_update(&self) -> &str {
        &self.load_report.last_update
    }

    pub fn apply_filters(&mut self, selection: FilterSelection) -> Result<()> {
        selection.validate()?;
        info!("Filters: {}", selection.describe());
        self.selection = selection;
        Ok(())
    }

    pub fn set_year_to_date(&mut self, today: NaiveDate) {
        self.selection.year_to_date(today);
    }

    /// Flip the totalizer row on or off; returns the new state.
    pub fn toggle_total(&mut self) -> bool {
        self.selection.show_total = !self.selection.show_total;
        self.selection.show_total
    }

    pub fn reset_filters(&mut self) {
        self.selection = FilterSelection::default();
    }

    pub fn filtered(&self) -> Vec<Transaction> {
        self.selection.apply(&self.table)
    }

    pub fn save_filters(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.selection)?;
        info!("Saved filters to {:?}", path);
        Ok(())
    }

    /// Restore a saved selection. A missing file leaves the current one as is.
    pub fn restore_filters(&mut self, path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        let file = File::open(path)?;
        let selection: FilterSelection = serde_json::from_reader(BufReader::new(file))?;
        self.apply_filters(selection)?;
        Ok(true)
    }

    /// Filter the table and run every engine over the result.
    pub fn run(&self, request: &PipelineRequest) -> Result<ReportBundle> {
        let rows = self.filtered();
        let Some(years_pair) = target_years(&rows) else {
            warn!("No transactions match the current filters");
            return Err(ReportError::EmptySelection);
        };

        let cohorts = analyze(
            &rows,
            CohortOptions {
                top_shared_limit: request.top_shared_limit,
                issuer_order: &request.issuer_order,
            },
        );
        let variance = [
            GroupKey::Client,
            GroupKey::Issuer,
            GroupKey::Executive,
            GroupKey::Month,
        ]
        .into_iter()
        .map(|g| variance_table(&rows, g, years_pair))
        .collect();

        Ok(ReportBundle {
            years: years(&rows),
            base_year: years_pair.0,
            compare_year: years_pair.1,
            filter_description: self.selection.describe(),
            filter_rows: self.selection.summary_rows(),
            last_update: self.last_update().to_string(),
            show_total: self.selection.show_total,
            row_count: rows.len(),
            headline: headline(&rows, years_pair),
            monthly: monthly_evolution(&rows),
            issuer_share: issuer_share(&rows),
            cohorts,
            variance,
            client_counts: client_count_by_issuer(&rows, years_pair),
            churn: churn(&rows, years_pair),
            abc: classify(&rows, request.abc_metric),
            ranking: top_clients(&rows, &request.ranking),
            client_averages: client_averages(&rows),
            efficiency: efficiency_headline(&rows),
            volume: volume_table(&rows, request.efficiency_year),
        })
    }
}

/// Per-request knobs that are not filters.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRequest {
    pub abc_metric: AbcMetric,
    pub ranking: RankingRequest,
    pub top_shared_limit: usize,
    pub issuer_order: Vec<String>,
    /// Year of the volume table; `None` consolidates every filtered year.
    pub efficiency_year: Option<i32>,
}

impl PipelineRequest {
    pub fn from_config(config: &ReportConfig) -> Self {
        PipelineRequest {
            abc_metric: AbcMetric::Revenue,
            ranking: RankingRequest {
                limit: config.top_n,
                ..RankingRequest::default()
            },
            top_shared_limit: config.top_shared_limit,
            issuer_order: config.issuer_order.clone(),
            efficiency_year: None,
        }
    }
}

impl Default for PipelineRequest {
    fn default() -> Self {
        PipelineRequest::from_config(&ReportConfig::default())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportBundle {
    pub years: Vec<i32>,
    pub base_year: i32,
    pub compare_year: i32,
    pub filter_description: String,
    /// The same filters as `(filter, value)` pairs for the exported Filters sheet.
    pub filter_rows: Vec<(&'static str, String)>,
    pub last_update: String,
    pub show_total: bool,
    pub row_count: usize,
    pub headline: Headline,
    pub monthly: Vec<MonthlyPoint>,
    pub issuer_share: Vec<IssuerShare>,
    pub cohorts: CohortReport,
    /// One table per [`GroupKey`], in client, issuer, executive, month order.
    pub variance: Vec<VarianceTable>,
    pub client_counts: ClientCountTable,
    pub churn: ChurnReport,
    pub abc: AbcReport,
    pub ranking: Ranking,
    pub client_averages: ClientAverages,
    pub efficiency: EfficiencyHeadline,
    pub volume: VolumeTable,
}

impl ReportBundle {
    pub fn variance_by(&self, group: GroupKey) -> Option<&VarianceTable> {
        self.variance.iter().find(|t| t.group == group)
    }

    pub fn summary(&self) -> BundleSummary<'_> {
        BundleSummary {
            filters: &self.filter_description,
            last_update: &self.last_update,
            years: &self.years,
            headline: &self.headline,
            churn: &self.churn.balance,
            abc: &self.abc.rollup,
        }
    }
}

/// Key figures written next to exported sheets.
#[derive(Debug, Serialize)]
pub struct BundleSummary<'a> {
    pub filters: &'a str,
    pub last_update: &'a str,
    pub years: &'a [i32],
    pub headline: &'a Headline,
    pub churn: &'a ChurnBalance,
    pub abc: &'a [ClassRollup],
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn tx(client: &str, issuer: &str, year: i32, month: u32, revenue: f64) -> Transaction {
        Transaction {
            client: client.to_string(),
            issuer: issuer.to_string(),
            executive: "N/A".to_string(),
            year,
            month,
            revenue,
            insertions: 2,
        }
    }

    fn session() -> Session {
        let rows = vec![
            tx("Alpha", "A", 2023, 1, 100.0),
            tx("Alpha", "B", 2024, 3, 50.0),
            tx("Beta", "B", 2024, 7, 70.0),
        ];
        let report = LoadReport {
            total_rows: 3,
            loaded_rows: 3,
            dropped_rows: 0,
            coerced_revenue: 0,
            recoded_rows: 0,
            has_insertions: true,
            last_update: "07/2024".to_string(),
        };
        Session::new(rows, report)
    }

    #[test]
    fn run_produces_every_result() {
        let bundle = session().run(&PipelineRequest::default()).unwrap();
        assert_eq!((bundle.base_year, bundle.compare_year), (2023, 2024));
        assert_eq!(bundle.row_count, 3);
        assert_eq!(bundle.variance.len(), 4);
        assert!(bundle.variance_by(GroupKey::Month).is_some());
        assert_eq!(bundle.churn.gained.len(), 1);
        assert_eq!(bundle.abc.rows.len(), 2);
        assert_eq!(bundle.last_update, "07/2024");
        assert_eq!(bundle.issuer_share.len(), 2);
        assert_eq!(bundle.client_averages.total.clients, 2);
        assert_eq!(bundle.efficiency.insertions, 6);
        assert_eq!(bundle.volume.year, None);
        assert_eq!(bundle.filter_rows[0], ("Years", "All".to_string()));
    }

    #[test]
    fn volume_table_follows_the_requested_year() {
        let request = PipelineRequest {
            efficiency_year: Some(2024),
            ..PipelineRequest::default()
        };
        let bundle = session().run(&request).unwrap();
        assert_eq!(bundle.volume.year, Some(2024));
        let clients: Vec<&str> = bundle.volume.rows.iter().map(|p| p.client.as_str()).collect();
        assert_eq!(clients, vec!["Alpha", "Beta"]);
    }

    #[test]
    fn empty_selection_is_reported() {
        let mut s = session();
        s.apply_filters(FilterSelection {
            year_from: Some(2030),
            ..FilterSelection::default()
        })
        .unwrap();
        assert!(matches!(
            s.run(&PipelineRequest::default()),
            Err(ReportError::EmptySelection)
        ));
    }

    #[test]
    fn year_to_date_and_reset() {
        let mut s = session();
        s.set_year_to_date(NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
        assert_eq!(s.filtered().len(), 2);
        assert!(!s.toggle_total());
        s.reset_filters();
        assert_eq!(s.filtered().len(), s.table().len());
        assert!(s.selection().show_total);
    }

    #[test]
    fn filters_round_trip_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters.json");
        let mut s = session();
        s.apply_filters(FilterSelection {
            issuers: Some(BTreeSet::from(["B".to_string()])),
            ..FilterSelection::default()
        })
        .unwrap();
        s.save_filters(&path).unwrap();

        let mut fresh = session();
        assert!(fresh.restore_filters(&path).unwrap());
        assert_eq!(fresh.selection(), s.selection());
        assert_eq!(fresh.filtered().len(), 2);
        assert!(!fresh.restore_filters(&dir.path().join("missing.json")).unwrap());
    }
}
