//! ABC (Pareto) classification of clients by cumulative contribution.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::Transaction;
use crate::util::ratio;

pub const CLASS_A_LIMIT: f64 = 0.80;
pub const CLASS_B_LIMIT: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum AbcMetric {
    Revenue,
    Insertions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AbcClass {
    A,
    B,
    C,
}

impl AbcClass {
    pub const ALL: [AbcClass; 3] = [AbcClass::A, AbcClass::B, AbcClass::C];

    /// Boundaries are inclusive: exactly 80% is still A, exactly 95% still B.
    pub fn for_cumulative_share(cumulative: f64) -> Self {
        if cumulative <= CLASS_A_LIMIT {
            AbcClass::A
        } else if cumulative <= CLASS_B_LIMIT {
            AbcClass::B
        } else {
            AbcClass::C
        }
    }
}

impl fmt::Display for AbcClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AbcClass::A => "A",
            AbcClass::B => "B",
            AbcClass::C => "C",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbcRow {
    pub rank: usize,
    pub client: String,
    pub revenue: f64,
    pub insertions: u64,
    pub metric_value: f64,
    pub share: f64,
    pub cumulative_share: f64,
    pub class: AbcClass,
    pub unit_cost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassRollup {
    pub class: AbcClass,
    pub clients: usize,
    pub revenue: f64,
    pub insertions: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbcReport {
    pub metric: AbcMetric,
    pub total: f64,
    pub rows: Vec<AbcRow>,
    /// Always A, B, C in that order.
    pub rollup: Vec<ClassRollup>,
}

pub fn classify(rows: &[Transaction], metric: AbcMetric) -> AbcReport {
    let mut per_client: BTreeMap<&str, (f64, u64)> = BTreeMap::new();
    for r in rows {
        let e = per_client.entry(r.client.as_str()).or_insert((0.0, 0));
        e.0 += r.revenue;
        e.1 += r.insertions;
    }
    let value = |(revenue, insertions): (f64, u64)| match metric {
        AbcMetric::Revenue => revenue,
        AbcMetric::Insertions => insertions as f64,
    };

    // Stable sort over name-ordered clients: ties rank alphabetically.
    let mut ranked: Vec<(&str, (f64, u64))> = per_client.into_iter().collect();
    ranked.sort_by(|a, b| value(b.1).total_cmp(&value(a.1)));

    // Summing in rank order makes the last running sum equal the total, and
    // dividing sums (rather than adding shares) lands on exact boundaries.
    let total: f64 = ranked.iter().map(|(_, t)| value(*t)).sum();
    let mut running = 0.0;
    let out: Vec<AbcRow> = ranked
        .into_iter()
        .enumerate()
        .map(|(idx, (client, totals))| {
            let metric_value = value(totals);
            running += metric_value;
            let share = ratio(metric_value, total).unwrap_or(0.0);
            let cumulative_share = ratio(running, total).unwrap_or(0.0);
            AbcRow {
                rank: idx + 1,
                client: client.to_string(),
                revenue: totals.0,
                insertions: totals.1,
                metric_value,
                share,
                cumulative_share,
                class: AbcClass::for_cumulative_share(cumulative_share),
                unit_cost: ratio(totals.0, totals.1 as f64),
            }
        })
        .collect();

    let rollup = AbcClass::ALL
        .iter()
        .map(|&class| {
            let members = out.iter().filter(|r| r.class == class);
            members.fold(
                ClassRollup {
                    class,
                    clients: 0,
                    revenue: 0.0,
                    insertions: 0,
                },
                |mut acc, r| {
                    acc.clients += 1;
                    acc.revenue += r.revenue;
                    acc.insertions += r.insertions;
                    acc
                },
            )
        })
        .collect();

    AbcReport {
        metric,
        total,
        rows: out,
        rollup,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(client: &str, revenue: f64, insertions: u64) -> Transaction {
        Transaction {
            client: client.to_string(),
            issuer: "A".to_string(),
            executive: "N/A".to_string(),
            year: 2024,
            month: 1,
            revenue,
            insertions,
        }
    }

    #[test]
    fn boundaries_are_inclusive() {
        let rows = vec![tx("Small", 5.0, 1), tx("Big", 80.0, 1), tx("Mid", 15.0, 1)];
        let report = classify(&rows, AbcMetric::Revenue);
        let cumulative: Vec<f64> = report.rows.iter().map(|r| r.cumulative_share).collect();
        assert_eq!(cumulative, vec![0.80, 0.95, 1.0]);
        let classes: Vec<AbcClass> = report.rows.iter().map(|r| r.class).collect();
        assert_eq!(classes, vec![AbcClass::A, AbcClass::B, AbcClass::C]);
        assert_eq!(report.rows[0].client, "Big");
    }

    #[test]
    fn cumulative_share_is_monotonic_and_ends_at_one() {
        let rows: Vec<Transaction> = (1..=17)
            .map(|i| tx(&format!("Client {:02}", i), (i * 37 % 101) as f64 + 0.1, i))
            .collect();
        let report = classify(&rows, AbcMetric::Revenue);
        for pair in report.rows.windows(2) {
            assert!(pair[1].cumulative_share >= pair[0].cumulative_share);
            assert!(pair[1].metric_value <= pair[0].metric_value);
        }
        let last = report.rows.last().unwrap();
        assert!((last.cumulative_share - 1.0).abs() < 1e-12);
    }

    #[test]
    fn ranks_by_insertions_and_keeps_unit_cost() {
        let rows = vec![tx("Cheap", 10.0, 100), tx("Pricey", 500.0, 5), tx("Free", 0.0, 0)];
        let report = classify(&rows, AbcMetric::Insertions);
        assert_eq!(report.rows[0].client, "Cheap");
        assert_eq!(report.rows[0].unit_cost, Some(0.1));
        assert_eq!(report.rows[2].unit_cost, None);
        assert_eq!(report.total, 105.0);
    }

    #[test]
    fn ties_rank_alphabetically() {
        let rows = vec![tx("Zeta", 10.0, 1), tx("Alpha", 10.0, 1)];
        let report = classify(&rows, AbcMetric::Revenue);
        assert_eq!(report.rows[0].client, "Alpha");
        assert_eq!(report.rows[1].client, "Zeta");
    }

    #[test]
    fn zero_total_puts_everyone_in_a() {
        let rows = vec![tx("One", 0.0, 0), tx("Two", 0.0, 0)];
        let report = classify(&rows, AbcMetric::Revenue);
        assert!(report.rows.iter().all(|r| r.share == 0.0 && r.class == AbcClass::A));
    }

    #[test]
    fn rollup_always_lists_three_classes() {
        let rows = vec![tx("Only", 10.0, 2)];
        let report = classify(&rows, AbcMetric::Revenue);
        // A single client holds 100% and lands in C.
        let counts: Vec<(AbcClass, usize)> =
            report.rollup.iter().map(|r| (r.class, r.clients)).collect();
        assert_eq!(counts, vec![(AbcClass::A, 0), (AbcClass::B, 0), (AbcClass::C, 1)]);
        assert_eq!(report.rollup[2].revenue, 10.0);
    }
}
