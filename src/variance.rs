//! Year-over-year comparison between the two most recent years of the
//! filtered data, plus client churn (lost / gained / retained).
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::types::{Transaction, TOTAL_LABEL};
use crate::util::{month_abbr, pct_change, ratio};

/// Base and compare years: the two largest distinct years present, or the
/// only year twice.
pub fn target_years(rows: &[Transaction]) -> Option<(i32, i32)> {
    let years: BTreeSet<i32> = rows.iter().map(|r| r.year).collect();
    let mut desc = years.iter().rev();
    let compare = *desc.next()?;
    let base = desc.next().copied().unwrap_or(compare);
    Some((base, compare))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum GroupKey {
    Client,
    Issuer,
    Executive,
    Month,
}

impl GroupKey {
    pub fn label(self) -> &'static str {
        match self {
            GroupKey::Client => "Client",
            GroupKey::Issuer => "Issuer",
            GroupKey::Executive => "Executive",
            GroupKey::Month => "Month",
        }
    }

    // Months are keyed by zero-padded number so map order is calendar order.
    fn key_of(self, r: &Transaction) -> String {
        match self {
            GroupKey::Client => r.client.clone(),
            GroupKey::Issuer => r.issuer.clone(),
            GroupKey::Executive => r.executive.clone(),
            GroupKey::Month => format!("{:02}", r.month),
        }
    }

    fn display(self, key: String) -> String {
        match self {
            GroupKey::Month => key
                .parse::<u32>()
                .map(|m| month_abbr(m).to_string())
                .unwrap_or(key),
            _ => key,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct YearPair {
    revenue_base: f64,
    revenue_compare: f64,
    insertions_base: u64,
    insertions_compare: u64,
}

impl YearPair {
    fn add(&mut self, r: &Transaction, (base, compare): (i32, i32)) {
        if r.year == base {
            self.revenue_base += r.revenue;
            self.insertions_base += r.insertions;
        }
        if r.year == compare {
            self.revenue_compare += r.revenue;
            self.insertions_compare += r.insertions;
        }
    }

    fn merge(mut self, other: &YearPair) -> YearPair {
        self.revenue_base += other.revenue_base;
        self.revenue_compare += other.revenue_compare;
        self.insertions_base += other.insertions_base;
        self.insertions_compare += other.insertions_compare;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarianceRow {
    pub entity: String,
    pub revenue_base: f64,
    pub revenue_compare: f64,
    pub delta_absolute: f64,
    pub delta_percent: Option<f64>,
    pub insertions_base: u64,
    pub insertions_compare: u64,
    pub delta_insertions: i64,
    pub unit_cost_base: Option<f64>,
    pub unit_cost_compare: Option<f64>,
}

impl VarianceRow {
    fn from_pair(entity: String, p: &YearPair) -> Self {
        VarianceRow {
            entity,
            revenue_base: p.revenue_base,
            revenue_compare: p.revenue_compare,
            delta_absolute: p.revenue_compare - p.revenue_base,
            delta_percent: pct_change(p.revenue_base, p.revenue_compare),
            insertions_base: p.insertions_base,
            insertions_compare: p.insertions_compare,
            delta_insertions: p.insertions_compare as i64 - p.insertions_base as i64,
            unit_cost_base: ratio(p.revenue_base, p.insertions_base as f64),
            unit_cost_compare: ratio(p.revenue_compare, p.insertions_compare as f64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarianceTable {
    pub group: GroupKey,
    pub base_year: i32,
    pub compare_year: i32,
    pub rows: Vec<VarianceRow>,
    /// Sums across groups with ratios recomputed from the sums.
    pub total: VarianceRow,
}

/// One row per distinct group value of the filtered data. Groups absent from
/// both target years still appear with zero figures.
pub fn variance_table(rows: &[Transaction], group: GroupKey, years: (i32, i32)) -> VarianceTable {
    let mut pivot: BTreeMap<String, YearPair> = BTreeMap::new();
    for r in rows {
        pivot.entry(group.key_of(r)).or_default().add(r, years);
    }

    let sum = pivot.values().fold(YearPair::default(), |acc, p| acc.merge(p));
    let mut out: Vec<VarianceRow> = pivot
        .into_iter()
        .map(|(key, p)| VarianceRow::from_pair(group.display(key), &p))
        .collect();
    if group != GroupKey::Month {
        // Largest losses first.
        out.sort_by(|a, b| {
            a.delta_absolute
                .partial_cmp(&b.delta_absolute)
                .unwrap_or(Ordering::Equal)
        });
    }

    VarianceTable {
        group,
        base_year: years.0,
        compare_year: years.1,
        rows: out,
        total: VarianceRow::from_pair(TOTAL_LABEL.to_string(), &sum),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientFigures {
    pub client: String,
    pub revenue: f64,
    pub insertions: u64,
    pub unit_cost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChurnBalance {
    pub lost_revenue: f64,
    pub gained_revenue: f64,
    pub net_revenue: f64,
    pub lost_clients: usize,
    pub gained_clients: usize,
    pub net_clients: i64,
    pub lost_insertions: u64,
    pub gained_insertions: u64,
    pub net_insertions: i64,
    pub lost_yield: Option<f64>,
    pub gained_yield: Option<f64>,
    pub net_yield: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChurnReport {
    pub base_year: i32,
    pub compare_year: i32,
    /// Active in the base year only; figures come from base-year rows.
    pub lost: Vec<ClientFigures>,
    /// Active in the compare year only; figures come from compare-year rows.
    pub gained: Vec<ClientFigures>,
    /// Active in both years.
    pub retained: Vec<String>,
    pub balance: ChurnBalance,
}

fn clients_in_year(rows: &[Transaction], year: i32) -> BTreeMap<&str, (f64, u64)> {
    let mut map: BTreeMap<&str, (f64, u64)> = BTreeMap::new();
    for r in rows.iter().filter(|r| r.year == year) {
        let e = map.entry(r.client.as_str()).or_insert((0.0, 0));
        e.0 += r.revenue;
        e.1 += r.insertions;
    }
    map
}

fn only_in(
    from: &BTreeMap<&str, (f64, u64)>,
    other: &BTreeMap<&str, (f64, u64)>,
) -> Vec<ClientFigures> {
    let mut out: Vec<ClientFigures> = from
        .iter()
        .filter(|(c, _)| !other.contains_key(*c))
        .map(|(c, (revenue, insertions))| ClientFigures {
            client: c.to_string(),
            revenue: *revenue,
            insertions: *insertions,
            unit_cost: ratio(*revenue, *insertions as f64),
        })
        .collect();
    out.sort_by(|a, b| b.revenue.total_cmp(&a.revenue));
    out
}

pub fn churn(rows: &[Transaction], (base, compare): (i32, i32)) -> ChurnReport {
    let base_clients = clients_in_year(rows, base);
    let compare_clients = clients_in_year(rows, compare);

    let lost = only_in(&base_clients, &compare_clients);
    let gained = only_in(&compare_clients, &base_clients);
    let retained: Vec<String> = base_clients
        .keys()
        .filter(|c| compare_clients.contains_key(*c))
        .map(|c| c.to_string())
        .collect();

    let totals = |v: &[ClientFigures]| {
        v.iter()
            .fold((0.0, 0u64), |(rev, ins), c| (rev + c.revenue, ins + c.insertions))
    };
    let (lost_revenue, lost_insertions) = totals(&lost);
    let (gained_revenue, gained_insertions) = totals(&gained);
    let lost_yield = ratio(lost_revenue, lost_insertions as f64);
    let gained_yield = ratio(gained_revenue, gained_insertions as f64);

    let balance = ChurnBalance {
        lost_revenue,
        gained_revenue,
        net_revenue: gained_revenue - lost_revenue,
        lost_clients: lost.len(),
        gained_clients: gained.len(),
        net_clients: gained.len() as i64 - lost.len() as i64,
        lost_insertions,
        gained_insertions,
        net_insertions: gained_insertions as i64 - lost_insertions as i64,
        lost_yield,
        gained_yield,
        net_yield: gained_yield.zip(lost_yield).map(|(g, l)| g - l),
    };

    ChurnReport {
        base_year: base,
        compare_year: compare,
        lost,
        gained,
        retained,
        balance,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountComparison {
    pub issuer: String,
    pub base: usize,
    pub compare: usize,
    pub delta: i64,
    pub delta_percent: Option<f64>,
}

impl CountComparison {
    fn new(issuer: String, base: usize, compare: usize) -> Self {
        CountComparison {
            issuer,
            base,
            compare,
            delta: compare as i64 - base as i64,
            delta_percent: pct_change(base as f64, compare as f64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientCountTable {
    pub base_year: i32,
    pub compare_year: i32,
    pub rows: Vec<CountComparison>,
    /// Distinct clients across all issuers, not the column sum.
    pub total: CountComparison,
}

/// Distinct active clients per issuer in the base and compare years.
pub fn client_count_by_issuer(rows: &[Transaction], (base, compare): (i32, i32)) -> ClientCountTable {
    let mut per_issuer: BTreeMap<&str, (BTreeSet<&str>, BTreeSet<&str>)> = BTreeMap::new();
    let mut all: (BTreeSet<&str>, BTreeSet<&str>) = Default::default();
    for r in rows {
        let e = per_issuer.entry(r.issuer.as_str()).or_default();
        if r.year == base {
            e.0.insert(r.client.as_str());
            all.0.insert(r.client.as_str());
        }
        if r.year == compare {
            e.1.insert(r.client.as_str());
            all.1.insert(r.client.as_str());
        }
    }
    let mut out: Vec<CountComparison> = per_issuer
        .into_iter()
        .map(|(issuer, (b, c))| CountComparison::new(issuer.to_string(), b.len(), c.len()))
        .collect();
    out.sort_by(|a, b| b.compare.cmp(&a.compare));

    ClientCountTable {
        base_year: base,
        compare_year: compare,
        rows: out,
        total: CountComparison::new(TOTAL_LABEL.to_string(), all.0.len(), all.1.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(client: &str, issuer: &str, year: i32, month: u32, revenue: f64, insertions: u64) -> Transaction {
        Transaction {
            client: client.to_string(),
            issuer: issuer.to_string(),
            executive: "Ana".to_string(),
            year,
            month,
            revenue,
            insertions,
        }
    }

    fn sample() -> Vec<Transaction> {
        vec![
            tx("Alpha", "A", 2023, 1, 100.0, 10),
            tx("Alpha", "A", 2024, 1, 150.0, 10),
            tx("Beta", "B", 2023, 2, 200.0, 0),
            tx("Gamma", "B", 2024, 3, 80.0, 8),
            tx("Delta", "A", 2022, 5, 999.0, 9),
        ]
    }

    #[test]
    fn picks_two_most_recent_years() {
        assert_eq!(target_years(&sample()), Some((2023, 2024)));
        assert_eq!(target_years(&sample()[..1]), Some((2023, 2023)));
        assert_eq!(target_years(&[]), None);
    }

    #[test]
    fn deltas_are_exact_and_percent_undefined_without_base() {
        let table = variance_table(&sample(), GroupKey::Client, (2023, 2024));
        for row in &table.rows {
            assert_eq!(row.delta_absolute, row.revenue_compare - row.revenue_base);
        }
        let gamma = table.rows.iter().find(|r| r.entity == "Gamma").unwrap();
        assert_eq!(gamma.revenue_base, 0.0);
        assert_eq!(gamma.delta_percent, None);
        assert_eq!(gamma.unit_cost_base, None);
        assert_eq!(gamma.unit_cost_compare, Some(10.0));

        let alpha = table.rows.iter().find(|r| r.entity == "Alpha").unwrap();
        assert_eq!(alpha.delta_percent, Some(50.0));

        // Delta only bought in 2022 and still gets a zero row.
        let delta = table.rows.iter().find(|r| r.entity == "Delta").unwrap();
        assert_eq!((delta.revenue_base, delta.revenue_compare), (0.0, 0.0));
        assert_eq!(table.rows.len(), 4);
        // Largest loss first.
        assert_eq!(table.rows[0].entity, "Beta");
    }

    #[test]
    fn total_row_recomputes_ratios_from_sums() {
        let table = variance_table(&sample(), GroupKey::Issuer, (2023, 2024));
        assert_eq!(table.total.entity, TOTAL_LABEL);
        assert_eq!(table.total.revenue_base, 300.0);
        assert_eq!(table.total.revenue_compare, 230.0);
        assert_eq!(table.total.delta_percent, Some(-70.0 / 300.0 * 100.0));
        assert_eq!(table.total.unit_cost_base, Some(30.0));
        assert_eq!(table.total.unit_cost_compare, Some(230.0 / 18.0));
        assert_eq!(table.total.delta_insertions, 8);
    }

    #[test]
    fn single_year_compares_against_itself() {
        let rows = vec![tx("Alpha", "A", 2024, 1, 50.0, 5)];
        let years = target_years(&rows).unwrap();
        let table = variance_table(&rows, GroupKey::Client, years);
        let row = &table.rows[0];
        assert_eq!(row.revenue_base, 50.0);
        assert_eq!(row.revenue_compare, 50.0);
        assert_eq!(row.delta_absolute, 0.0);
        assert_eq!(row.delta_percent, Some(0.0));
        let report = churn(&rows, years);
        assert!(report.lost.is_empty() && report.gained.is_empty());
        assert_eq!(report.retained, vec!["Alpha"]);
    }

    #[test]
    fn months_keep_calendar_order() {
        let table = variance_table(&sample(), GroupKey::Month, (2023, 2024));
        let labels: Vec<&str> = table.rows.iter().map(|r| r.entity.as_str()).collect();
        assert_eq!(labels, vec!["Jan", "Feb", "Mar", "May"]);
    }

    #[test]
    fn lost_client_figures_come_from_base_year() {
        let rows = vec![tx("Solo", "A", 2024, 4, 200.0, 4), tx("Other", "A", 2025, 1, 10.0, 1)];
        let report = churn(&rows, target_years(&rows).unwrap());
        assert_eq!(report.lost.len(), 1);
        assert_eq!(report.lost[0].client, "Solo");
        assert_eq!(report.lost[0].revenue, 200.0);
        assert!(report.gained.iter().all(|c| c.client != "Solo"));
    }

    #[test]
    fn churn_cohorts_partition_active_clients() {
        let rows = sample();
        let years = (2023, 2024);
        let report = churn(&rows, years);
        let lost: BTreeSet<&str> = report.lost.iter().map(|c| c.client.as_str()).collect();
        let gained: BTreeSet<&str> = report.gained.iter().map(|c| c.client.as_str()).collect();
        let retained: BTreeSet<&str> = report.retained.iter().map(String::as_str).collect();
        assert!(lost.is_disjoint(&gained));
        assert!(lost.is_disjoint(&retained) && gained.is_disjoint(&retained));

        let active: BTreeSet<&str> = rows
            .iter()
            .filter(|r| r.year == years.0 || r.year == years.1)
            .map(|r| r.client.as_str())
            .collect();
        let union: BTreeSet<&str> = lost.union(&gained).chain(retained.iter()).copied().collect();
        assert_eq!(union, active);

        assert_eq!(report.balance.net_clients, 0);
        assert_eq!(report.balance.net_revenue, 80.0 - 200.0);
        assert_eq!(report.balance.lost_yield, None);
        assert_eq!(report.balance.gained_yield, Some(10.0));
        assert_eq!(report.balance.net_yield, None);
    }

    #[test]
    fn client_counts_use_distinct_clients_for_total() {
        let mut rows = sample();
        rows.push(tx("Alpha", "B", 2024, 6, 5.0, 1));
        let table = client_count_by_issuer(&rows, (2023, 2024));
        let b = table.rows.iter().find(|r| r.issuer == "B").unwrap();
        assert_eq!((b.base, b.compare), (1, 2));
        assert_eq!(b.delta_percent, Some(100.0));
        assert_eq!((table.total.base, table.total.compare), (2, 2));
    }
}
