//! Top-N client rankings.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{Transaction, TOTAL_LABEL};
use crate::util::ratio;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum RankCriterion {
    Revenue,
    Insertions,
    /// Cheapest clients first; clients with no insertions are left out.
    UnitCost,
}

impl RankCriterion {
    pub fn label(self) -> &'static str {
        match self {
            RankCriterion::Revenue => "Revenue",
            RankCriterion::Insertions => "Insertions",
            RankCriterion::UnitCost => "Unit cost",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingRequest {
    pub criterion: RankCriterion,
    pub issuer: Option<String>,
    pub year: Option<i32>,
    pub limit: usize,
}

impl Default for RankingRequest {
    fn default() -> Self {
        RankingRequest {
            criterion: RankCriterion::Revenue,
            issuer: None,
            year: None,
            limit: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedClient {
    pub position: usize,
    pub client: String,
    pub revenue: f64,
    pub insertions: u64,
    pub unit_cost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranking {
    pub request: RankingRequest,
    pub rows: Vec<RankedClient>,
    /// Sums over the listed clients; unit cost recomputed from those sums.
    pub total: RankedClient,
}

pub fn top_clients(rows: &[Transaction], request: &RankingRequest) -> Ranking {
    let mut per_client: BTreeMap<&str, (f64, u64)> = BTreeMap::new();
    for r in rows {
        if request.issuer.as_deref().is_some_and(|i| i != r.issuer)
            || request.year.is_some_and(|y| y != r.year)
        {
            continue;
        }
        let e = per_client.entry(r.client.as_str()).or_insert((0.0, 0));
        e.0 += r.revenue;
        e.1 += r.insertions;
    }

    let mut ranked: Vec<(&str, f64, u64)> = per_client
        .into_iter()
        .map(|(c, (rev, ins))| (c, rev, ins))
        .filter(|&(_, _, ins)| request.criterion != RankCriterion::UnitCost || ins > 0)
        .collect();
    match request.criterion {
        RankCriterion::Revenue => ranked.sort_by(|a, b| b.1.total_cmp(&a.1)),
        RankCriterion::Insertions => ranked.sort_by(|a, b| b.2.cmp(&a.2)),
        RankCriterion::UnitCost => {
            ranked.sort_by(|a, b| (a.1 / a.2 as f64).total_cmp(&(b.1 / b.2 as f64)))
        }
    }
    ranked.truncate(request.limit);

    let rows: Vec<RankedClient> = ranked
        .into_iter()
        .enumerate()
        .map(|(idx, (client, revenue, insertions))| RankedClient {
            position: idx + 1,
            client: client.to_string(),
            revenue,
            insertions,
            unit_cost: ratio(revenue, insertions as f64),
        })
        .collect();

    let revenue: f64 = rows.iter().map(|r| r.revenue).sum();
    let insertions: u64 = rows.iter().map(|r| r.insertions).sum();
    let total = RankedClient {
        position: 0,
        client: TOTAL_LABEL.to_string(),
        revenue,
        insertions,
        unit_cost: ratio(revenue, insertions as f64),
    };

    Ranking {
        request: request.clone(),
        rows,
        total,
    }
}
