//! Client/issuer overlap analysis.
//!
//! Every client of the filtered universe is classified, per issuer, as
//! *exclusive* (buys only from that issuer), *shared* (buys from it and from
//! at least one other) or *absent* (buys elsewhere but not from it). A client
//! "buys" from an issuer when its aggregated revenue there is positive.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::types::{Transaction, TOTAL_LABEL};
use crate::util::ratio;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cohort {
    Exclusive,
    Shared,
    Absent,
}

impl Cohort {
    pub fn label(self) -> &'static str {
        match self {
            Cohort::Exclusive => "Exclusive",
            Cohort::Shared => "Shared",
            Cohort::Absent => "Absent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum MatrixMetric {
    Clients,
    Revenue,
    Insertions,
}

impl MatrixMetric {
    pub const ALL: [MatrixMetric; 3] =
        [MatrixMetric::Clients, MatrixMetric::Revenue, MatrixMetric::Insertions];

    pub fn label(self) -> &'static str {
        match self {
            MatrixMetric::Clients => "Clients in common",
            MatrixMetric::Revenue => "Revenue in common",
            MatrixMetric::Insertions => "Insertions in common",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct PairTotals {
    revenue: f64,
    insertions: u64,
}

impl PairTotals {
    fn value(&self, metric: MatrixMetric) -> f64 {
        match metric {
            MatrixMetric::Clients => f64::from(u8::from(self.revenue > 0.0)),
            MatrixMetric::Revenue => self.revenue,
            MatrixMetric::Insertions => self.insertions as f64,
        }
    }
}

/// Revenue and insertions aggregated per (client, issuer).
#[derive(Debug, Clone, Default)]
pub struct PresenceMatrix {
    issuers: Vec<String>,
    cells: BTreeMap<String, BTreeMap<String, PairTotals>>,
}

impl PresenceMatrix {
    pub fn build(rows: &[Transaction]) -> Self {
        let mut cells: BTreeMap<String, BTreeMap<String, PairTotals>> = BTreeMap::new();
        let mut issuers: BTreeSet<String> = BTreeSet::new();
        for r in rows {
            let e = cells
                .entry(r.client.clone())
                .or_default()
                .entry(r.issuer.clone())
                .or_default();
            e.revenue += r.revenue;
            e.insertions += r.insertions;
            issuers.insert(r.issuer.clone());
        }
        PresenceMatrix {
            issuers: issuers.into_iter().collect(),
            cells,
        }
    }

    pub fn issuers(&self) -> &[String] {
        &self.issuers
    }

    pub fn clients(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    fn pair(&self, client: &str, issuer: &str) -> PairTotals {
        self.cells
            .get(client)
            .and_then(|m| m.get(issuer))
            .copied()
            .unwrap_or_default()
    }

    pub fn is_present(&self, client: &str, issuer: &str) -> bool {
        self.pair(client, issuer).revenue > 0.0
    }

    /// Number of issuers the client has positive revenue with.
    pub fn issuer_count(&self, client: &str) -> usize {
        self.cells
            .get(client)
            .map(|m| m.values().filter(|p| p.revenue > 0.0).count())
            .unwrap_or(0)
    }

    /// Cohort of `client` with respect to `issuer`; `None` for clients outside
    /// the filtered universe.
    pub fn classify(&self, client: &str, issuer: &str) -> Option<Cohort> {
        if !self.cells.contains_key(client) {
            return None;
        }
        if !self.is_present(client, issuer) {
            return Some(Cohort::Absent);
        }
        Some(if self.issuer_count(client) == 1 {
            Cohort::Exclusive
        } else {
            Cohort::Shared
        })
    }

    /// Revenue and insertions of a client across every issuer.
    pub fn client_totals(&self, client: &str) -> (f64, u64) {
        self.cells
            .get(client)
            .map(|m| {
                m.values()
                    .fold((0.0, 0), |(rev, ins), p| (rev + p.revenue, ins + p.insertions))
            })
            .unwrap_or((0.0, 0))
    }

    pub fn issuer_revenue(&self, issuer: &str) -> f64 {
        self.cells.values().filter_map(|m| m.get(issuer)).map(|p| p.revenue).sum()
    }

    pub fn total_revenue(&self) -> f64 {
        self.cells.values().flat_map(|m| m.values()).map(|p| p.revenue).sum()
    }

    /// Issuer × issuer overlap. Off-diagonal cells hold the clients present
    /// for both issuers, or the sum over clients of the smaller of the two
    /// values where that minimum is positive; the diagonal holds the issuer's
    /// own total.
    pub fn intersection(&self, metric: MatrixMetric) -> IntersectionMatrix {
        let n = self.issuers.len();
        let mut values = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in i..n {
                let (a, b) = (&self.issuers[i], &self.issuers[j]);
                let cell: f64 = self
                    .cells
                    .keys()
                    .map(|client| {
                        let (pa, pb) = (self.pair(client, a), self.pair(client, b));
                        if i == j {
                            return pa.value(metric);
                        }
                        match metric {
                            MatrixMetric::Clients => {
                                f64::from(u8::from(pa.revenue > 0.0 && pb.revenue > 0.0))
                            }
                            _ => {
                                let m = pa.value(metric).min(pb.value(metric));
                                if m > 0.0 {
                                    m
                                } else {
                                    0.0
                                }
                            }
                        }
                    })
                    .sum();
                values[i][j] = cell;
                values[j][i] = cell;
            }
        }
        IntersectionMatrix {
            metric,
            issuers: self.issuers.clone(),
            values,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntersectionMatrix {
    pub metric: MatrixMetric,
    pub issuers: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl IntersectionMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.issuers.iter().position(|x| x == a)?;
        let j = self.issuers.iter().position(|x| x == b)?;
        Some(self.values[i][j])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortSummary {
    pub issuer: String,
    pub client_count: usize,
    pub revenue: f64,
    pub insertions: u64,
    pub share_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortTable {
    pub cohort: Cohort,
    pub rows: Vec<CohortSummary>,
    pub total: CohortSummary,
}

/// Per-issuer summary of one cohort, ordered by revenue descending.
///
/// Exclusive and shared figures only count the cohort's business with that
/// issuer, as a share of the issuer's revenue. Absent figures are the absent
/// clients' business everywhere else, as a share of the whole filtered
/// revenue.
pub fn cohort_table(matrix: &PresenceMatrix, cohort: Cohort) -> CohortTable {
    let total_revenue = matrix.total_revenue();
    let mut rows: Vec<CohortSummary> = matrix
        .issuers()
        .iter()
        .map(|issuer| {
            let members: Vec<&str> = matrix
                .clients()
                .filter(|c| matrix.classify(c, issuer) == Some(cohort))
                .collect();
            let (revenue, insertions) = members.iter().fold((0.0, 0u64), |(rev, ins), c| {
                let (r, i) = match cohort {
                    Cohort::Absent => matrix.client_totals(c),
                    _ => {
                        let p = matrix.pair(c, issuer);
                        (p.revenue, p.insertions)
                    }
                };
                (rev + r, ins + i)
            });
            let share_percent = match cohort {
                Cohort::Absent => ratio(revenue, total_revenue),
                _ => ratio(revenue, matrix.issuer_revenue(issuer)),
            }
            .map(|r| r * 100.0);
            CohortSummary {
                issuer: issuer.clone(),
                client_count: members.len(),
                revenue,
                insertions,
                share_percent,
            }
        })
        .collect();
    rows.sort_by(|a, b| b.revenue.total_cmp(&a.revenue));

    let revenue: f64 = rows.iter().map(|r| r.revenue).sum();
    let total = CohortSummary {
        issuer: TOTAL_LABEL.to_string(),
        client_count: rows.iter().map(|r| r.client_count).sum(),
        revenue,
        insertions: rows.iter().map(|r| r.insertions).sum(),
        // Absent clients are counted once per issuer they miss, so their
        // summed revenue has no meaningful share.
        share_percent: match cohort {
            Cohort::Absent => None,
            _ => ratio(revenue, total_revenue).map(|r| r * 100.0),
        },
    };
    CohortTable {
        cohort,
        rows,
        total,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharedClient {
    pub client: String,
    pub revenue: f64,
    pub insertions: u64,
    pub issuers: Vec<String>,
}

/// Orders issuers by their position in `order` (case-insensitive), then by name.
fn issuer_sort_key(order: &[String], issuer: &str) -> (usize, String) {
    let rank = order
        .iter()
        .position(|o| o.eq_ignore_ascii_case(issuer))
        .unwrap_or(usize::MAX);
    (rank, issuer.to_string())
}

/// Clients buying from two or more issuers, by total revenue descending.
pub fn top_shared(matrix: &PresenceMatrix, limit: usize, issuer_order: &[String]) -> Vec<SharedClient> {
    let mut shared: Vec<SharedClient> = matrix
        .clients()
        .filter(|c| matrix.issuer_count(c) >= 2)
        .map(|c| {
            let (revenue, insertions) = matrix.client_totals(c);
            let mut issuers: Vec<String> = matrix
                .issuers()
                .iter()
                .filter(|i| matrix.is_present(c, i))
                .cloned()
                .collect();
            issuers.sort_by_key(|i| issuer_sort_key(issuer_order, i));
            SharedClient {
                client: c.to_string(),
                revenue,
                insertions,
                issuers,
            }
        })
        .collect();
    shared.sort_by(|a, b| b.revenue.total_cmp(&a.revenue));
    shared.truncate(limit);
    shared
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharedUnitCostRow {
    pub client: String,
    /// Aligned with [`SharedUnitCosts::issuers`].
    pub unit_costs: Vec<Option<f64>>,
}

/// Unit cost each shared client pays at each issuer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharedUnitCosts {
    pub issuers: Vec<String>,
    pub rows: Vec<SharedUnitCostRow>,
    /// Per issuer: summed revenue over summed insertions of the rows above.
    pub totals: Vec<Option<f64>>,
}

pub fn shared_unit_costs(matrix: &PresenceMatrix) -> SharedUnitCosts {
    let issuers = matrix.issuers().to_vec();
    let mut shared: Vec<(&str, f64)> = matrix
        .clients()
        .filter(|c| matrix.issuer_count(c) >= 2)
        .map(|c| (c, matrix.client_totals(c).0))
        .collect();
    shared.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut sums = vec![(0.0, 0u64); issuers.len()];
    let rows = shared
        .iter()
        .map(|(client, _)| {
            let unit_costs = issuers
                .iter()
                .enumerate()
                .map(|(idx, issuer)| {
                    let p = matrix.pair(client, issuer);
                    let cost = ratio(p.revenue, p.insertions as f64);
                    if cost.is_some() {
                        sums[idx].0 += p.revenue;
                        sums[idx].1 += p.insertions;
                    }
                    cost
                })
                .collect();
            SharedUnitCostRow {
                client: client.to_string(),
                unit_costs,
            }
        })
        .collect();
    let totals = sums.iter().map(|(rev, ins)| ratio(*rev, *ins as f64)).collect();
    SharedUnitCosts {
        issuers,
        rows,
        totals,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CohortOptions<'a> {
    pub top_shared_limit: usize,
    pub issuer_order: &'a [String],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortReport {
    pub issuers: Vec<String>,
    pub total_revenue: f64,
    pub exclusive: CohortTable,
    pub shared: CohortTable,
    pub absent: CohortTable,
    pub top_shared: Vec<SharedClient>,
    pub matrices: Vec<IntersectionMatrix>,
    pub shared_unit_costs: SharedUnitCosts,
}

impl CohortReport {
    pub fn matrix(&self, metric: MatrixMetric) -> Option<&IntersectionMatrix> {
        self.matrices.iter().find(|m| m.metric == metric)
    }
}

pub fn analyze(rows: &[Transaction], options: CohortOptions<'_>) -> CohortReport {
    let matrix = PresenceMatrix::build(rows);
    CohortReport {
        issuers: matrix.issuers().to_vec(),
        total_revenue: matrix.total_revenue(),
        exclusive: cohort_table(&matrix, Cohort::Exclusive),
        shared: cohort_table(&matrix, Cohort::Shared),
        absent: cohort_table(&matrix, Cohort::Absent),
        top_shared: top_shared(&matrix, options.top_shared_limit, options.issuer_order),
        matrices: MatrixMetric::ALL.iter().map(|m| matrix.intersection(*m)).collect(),
        shared_unit_costs: shared_unit_costs(&matrix),
    }
}
