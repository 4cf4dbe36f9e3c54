use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::types::Transaction;
use crate::util::{month_label, pct_change, ratio};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopClient {
    pub client: String,
    pub revenue: f64,
    pub share_percent: Option<f64>,
}

/// Headline figures for the base and compare years.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Headline {
    pub base_year: i32,
    pub compare_year: i32,
    pub revenue_base: f64,
    pub revenue_compare: f64,
    pub delta_absolute: f64,
    pub delta_percent: Option<f64>,
    /// Distinct clients with revenue over the whole filtered range.
    pub active_clients: usize,
    pub top_client: Option<TopClient>,
}

pub fn headline(rows: &[Transaction], (base, compare): (i32, i32)) -> Headline {
    let year_revenue = |year: i32| -> f64 {
        rows.iter().filter(|r| r.year == year).map(|r| r.revenue).sum()
    };
    let revenue_base = year_revenue(base);
    let revenue_compare = year_revenue(compare);

    let mut per_client: HashMap<&str, f64> = HashMap::new();
    for r in rows {
        *per_client.entry(r.client.as_str()).or_insert(0.0) += r.revenue;
    }
    let total: f64 = per_client.values().sum();
    let active_clients = per_client.values().filter(|v| **v > 0.0).count();
    let top_client = per_client
        .iter()
        .filter(|(_, v)| **v > 0.0)
        .max_by(|a, b| a.1.total_cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(client, revenue)| TopClient {
            client: client.to_string(),
            revenue: *revenue,
            share_percent: ratio(*revenue, total).map(|r| r * 100.0),
        });

    Headline {
        base_year: base,
        compare_year: compare,
        revenue_base,
        revenue_compare,
        delta_absolute: revenue_compare - revenue_base,
        delta_percent: pct_change(revenue_base, revenue_compare),
        active_clients,
        top_client,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyPoint {
    pub year: i32,
    pub month: u32,
    pub label: String,
    pub revenue: f64,
    pub insertions: u64,
    pub unit_cost: Option<f64>,
}

/// Revenue and insertions per month, oldest first.
pub fn monthly_evolution(rows: &[Transaction]) -> Vec<MonthlyPoint> {
    let mut by_month: BTreeMap<(i32, u32), (f64, u64)> = BTreeMap::new();
    for r in rows {
        let e = by_month.entry((r.year, r.month)).or_insert((0.0, 0));
        e.0 += r.revenue;
        e.1 += r.insertions;
    }
    by_month
        .into_iter()
        .map(|((year, month), (revenue, insertions))| MonthlyPoint {
            year,
            month,
            label: month_label(year, month),
            revenue,
            insertions,
            unit_cost: ratio(revenue, insertions as f64),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssuerShare {
    pub year: i32,
    pub issuer: String,
    pub revenue: f64,
    /// Percent of that year's revenue; undefined when the year has none.
    pub share_percent: Option<f64>,
}

/// Each issuer's slice of yearly revenue. Years ascend; issuers within a year
/// go from largest to smallest revenue, ties by name.
pub fn issuer_share(rows: &[Transaction]) -> Vec<IssuerShare> {
    let mut by_year: BTreeMap<i32, BTreeMap<&str, f64>> = BTreeMap::new();
    for r in rows {
        *by_year
            .entry(r.year)
            .or_default()
            .entry(r.issuer.as_str())
            .or_insert(0.0) += r.revenue;
    }

    let mut shares = Vec::new();
    for (year, issuers) in by_year {
        let total: f64 = issuers.values().sum();
        let mut ranked: Vec<(&str, f64)> = issuers.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        shares.extend(ranked.into_iter().map(|(issuer, revenue)| IssuerShare {
            year,
            issuer: issuer.to_string(),
            revenue,
            share_percent: ratio(revenue, total).map(|r| r * 100.0),
        }));
    }
    shares
}

/// Distinct years present, ascending.
pub fn years(rows: &[Transaction]) -> Vec<i32> {
    rows.iter().map(|r| r.year).collect::<BTreeSet<_>>().into_iter().collect()
}
