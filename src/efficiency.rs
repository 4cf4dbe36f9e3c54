//! Per-client averages by issuer and price-versus-volume figures.
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::types::{Transaction, TOTAL_LABEL};
use crate::util::ratio;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssuerAverages {
    pub issuer: String,
    pub clients: usize,
    pub revenue: f64,
    pub insertions: u64,
    pub revenue_per_client: Option<f64>,
    pub insertions_per_client: Option<f64>,
}

impl IssuerAverages {
    fn new(issuer: &str, clients: usize, revenue: f64, insertions: u64) -> Self {
        IssuerAverages {
            issuer: issuer.to_string(),
            clients,
            revenue,
            insertions,
            revenue_per_client: ratio(revenue, clients as f64),
            insertions_per_client: ratio(insertions as f64, clients as f64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientAverages {
    /// Issuers in name order.
    pub rows: Vec<IssuerAverages>,
    /// Averages over distinct clients across all issuers.
    pub total: IssuerAverages,
}

/// Average revenue and insertions per client for each issuer. Every client
/// with a row for the issuer counts, whatever its revenue.
pub fn client_averages(rows: &[Transaction]) -> ClientAverages {
    let mut per_issuer: BTreeMap<&str, (BTreeSet<&str>, f64, u64)> = BTreeMap::new();
    for r in rows {
        let e = per_issuer
            .entry(r.issuer.as_str())
            .or_insert_with(|| (BTreeSet::new(), 0.0, 0));
        e.0.insert(r.client.as_str());
        e.1 += r.revenue;
        e.2 += r.insertions;
    }

    let averages: Vec<IssuerAverages> = per_issuer
        .iter()
        .map(|(issuer, (clients, revenue, insertions))| {
            IssuerAverages::new(issuer, clients.len(), *revenue, *insertions)
        })
        .collect();

    let distinct = rows.iter().map(|r| r.client.as_str()).collect::<BTreeSet<_>>().len();
    let total = IssuerAverages::new(
        TOTAL_LABEL,
        distinct,
        averages.iter().map(|a| a.revenue).sum(),
        averages.iter().map(|a| a.insertions).sum(),
    );
    ClientAverages {
        rows: averages,
        total,
    }
}

/// Consolidated efficiency over rows with positive revenue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EfficiencyHeadline {
    pub revenue: f64,
    pub insertions: u64,
    pub clients: usize,
    /// Revenue per insertion.
    pub yield_per_insertion: Option<f64>,
    pub insertions_per_client: Option<f64>,
}

pub fn efficiency_headline(rows: &[Transaction]) -> EfficiencyHeadline {
    let paid = rows.iter().filter(|r| r.revenue > 0.0);
    let mut revenue = 0.0;
    let mut insertions = 0u64;
    let mut clients = BTreeSet::new();
    for r in paid {
        revenue += r.revenue;
        insertions += r.insertions;
        clients.insert(r.client.as_str());
    }
    EfficiencyHeadline {
        revenue,
        insertions,
        clients: clients.len(),
        yield_per_insertion: ratio(revenue, insertions as f64),
        insertions_per_client: ratio(insertions as f64, clients.len() as f64),
    }
}

/// What one client bought from one issuer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumePoint {
    pub client: String,
    pub issuer: String,
    pub insertions: u64,
    pub revenue: f64,
    pub unit_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeTable {
    /// `None` when every filtered year is consolidated.
    pub year: Option<i32>,
    /// Ordered by client, then issuer.
    pub rows: Vec<VolumePoint>,
}

impl VolumeTable {
    pub fn scope_label(&self) -> String {
        self.year.map_or_else(|| "Consolidated".to_string(), |y| y.to_string())
    }
}

/// Volume against unit cost per (client, issuer) pair, over rows with
/// positive revenue. Pairs without insertions have no unit cost and are left
/// out.
pub fn volume_table(rows: &[Transaction], year: Option<i32>) -> VolumeTable {
    let mut per_pair: BTreeMap<(&str, &str), (f64, u64)> = BTreeMap::new();
    for r in rows {
        if r.revenue <= 0.0 || year.is_some_and(|y| y != r.year) {
            continue;
        }
        let e = per_pair
            .entry((r.client.as_str(), r.issuer.as_str()))
            .or_insert((0.0, 0));
        e.0 += r.revenue;
        e.1 += r.insertions;
    }

    let rows = per_pair
        .into_iter()
        .filter(|(_, (_, insertions))| *insertions > 0)
        .map(|((client, issuer), (revenue, insertions))| VolumePoint {
            client: client.to_string(),
            issuer: issuer.to_string(),
            insertions,
            revenue,
            unit_cost: revenue / insertions as f64,
        })
        .collect();
    VolumeTable { year, rows }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(client: &str, issuer: &str, year: i32, revenue: f64, insertions: u64) -> Transaction {
        Transaction {
            client: client.to_string(),
            issuer: issuer.to_string(),
            executive: "N/A".to_string(),
            year,
            month: 6,
            revenue,
            insertions,
        }
    }

    fn sample() -> Vec<Transaction> {
        vec![
            tx("Alpha", "A", 2023, 400.0, 4),
            tx("Alpha", "B", 2024, 300.0, 10),
            tx("Beta", "A", 2024, 200.0, 0),
            tx("Gamma", "A", 2024, 0.0, 6),
        ]
    }

    #[test]
    fn averages_divide_by_distinct_clients() {
        let averages = client_averages(&sample());
        let issuers: Vec<&str> = averages.rows.iter().map(|a| a.issuer.as_str()).collect();
        assert_eq!(issuers, vec!["A", "B"]);

        let a = &averages.rows[0];
        assert_eq!(a.clients, 3);
        assert_eq!(a.revenue, 600.0);
        assert_eq!(a.revenue_per_client, Some(200.0));
        assert_eq!(a.insertions_per_client, Some(10.0 / 3.0));

        // Alpha buys from both issuers but counts once in the total.
        assert_eq!(averages.total.issuer, TOTAL_LABEL);
        assert_eq!(averages.total.clients, 3);
        assert_eq!(averages.total.revenue, 900.0);
        assert_eq!(averages.total.insertions_per_client, Some(20.0 / 3.0));
    }

    #[test]
    fn averages_of_nothing_are_undefined() {
        let averages = client_averages(&[]);
        assert!(averages.rows.is_empty());
        assert_eq!(averages.total.clients, 0);
        assert_eq!(averages.total.revenue_per_client, None);
    }

    #[test]
    fn headline_ignores_rows_without_revenue() {
        let h = efficiency_headline(&sample());
        assert_eq!(h.revenue, 900.0);
        assert_eq!(h.insertions, 14);
        assert_eq!(h.clients, 2);
        assert_eq!(h.yield_per_insertion, Some(900.0 / 14.0));
        assert_eq!(h.insertions_per_client, Some(7.0));

        let none = efficiency_headline(&[tx("Gamma", "A", 2024, 0.0, 6)]);
        assert_eq!(none.clients, 0);
        assert_eq!(none.yield_per_insertion, None);
    }

    #[test]
    fn volume_table_by_year_or_consolidated() {
        let all = volume_table(&sample(), None);
        assert_eq!(all.scope_label(), "Consolidated");
        let pairs: Vec<(&str, &str)> = all
            .rows
            .iter()
            .map(|p| (p.client.as_str(), p.issuer.as_str()))
            .collect();
        assert_eq!(pairs, vec![("Alpha", "A"), ("Alpha", "B")]);
        assert_eq!(all.rows[0].unit_cost, 100.0);

        let y2024 = volume_table(&sample(), Some(2024));
        assert_eq!(y2024.scope_label(), "2024");
        assert_eq!(y2024.rows.len(), 1);
        assert_eq!(y2024.rows[0].unit_cost, 30.0);
    }
}
