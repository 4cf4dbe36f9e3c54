use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::util::{month_label, ratio};

/// Label used for the synthetic totalizer row of every table.
pub const TOTAL_LABEL: &str = "Total";

/// One canonical row of the sales ledger: a client buying from an issuer
/// (radio station brand) in a given month, booked by an executive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub client: String,
    pub issuer: String,
    pub executive: String,
    pub year: i32,
    pub month: u32,
    pub revenue: f64,
    pub insertions: u64,
}

impl Transaction {
    /// Abbreviated month name plus two-digit year, e.g. `Mar/24`.
    pub fn month_label(&self) -> String {
        month_label(self.year, self.month)
    }

    /// Revenue per insertion; undefined when nothing was aired.
    pub fn unit_cost(&self) -> Option<f64> {
        ratio(self.revenue, self.insertions as f64)
    }
}

#[derive(Debug, Tabled, Clone)]
pub struct CohortDisplayRow {
    #[tabled(rename = "#")]
    pub position: String,
    #[tabled(rename = "Issuer")]
    pub issuer: String,
    #[tabled(rename = "Clients")]
    pub clients: String,
    #[tabled(rename = "Revenue")]
    pub revenue: String,
    #[tabled(rename = "Insertions")]
    pub insertions: String,
    #[tabled(rename = "Share")]
    pub share: String,
}

#[derive(Debug, Tabled, Clone)]
pub struct SharedClientDisplayRow {
    #[tabled(rename = "#")]
    pub position: String,
    #[tabled(rename = "Client")]
    pub client: String,
    #[tabled(rename = "Revenue")]
    pub revenue: String,
    #[tabled(rename = "Insertions")]
    pub insertions: String,
    #[tabled(rename = "SharedIssuers")]
    pub issuers: String,
}

#[derive(Debug, Tabled, Clone)]
pub struct ClientFiguresDisplayRow {
    #[tabled(rename = "#")]
    pub position: String,
    #[tabled(rename = "Client")]
    pub client: String,
    #[tabled(rename = "Revenue")]
    pub revenue: String,
    #[tabled(rename = "Insertions")]
    pub insertions: String,
    #[tabled(rename = "UnitCost")]
    pub unit_cost: String,
}

#[derive(Debug, Tabled, Clone)]
pub struct AbcDisplayRow {
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[tabled(rename = "Class")]
    pub class: String,
    #[tabled(rename = "Client")]
    pub client: String,
    #[tabled(rename = "Revenue")]
    pub revenue: String,
    #[tabled(rename = "Insertions")]
    pub insertions: String,
    #[tabled(rename = "UnitCost")]
    pub unit_cost: String,
    #[tabled(rename = "Share")]
    pub share: String,
    #[tabled(rename = "Cumulative")]
    pub cumulative: String,
}

#[derive(Debug, Tabled, Clone)]
pub struct AbcRollupDisplayRow {
    #[tabled(rename = "Class")]
    pub class: String,
    #[tabled(rename = "Clients")]
    pub clients: usize,
    #[tabled(rename = "Revenue")]
    pub revenue: String,
    #[tabled(rename = "Insertions")]
    pub insertions: String,
}

#[derive(Debug, Tabled, Clone)]
pub struct MonthlyDisplayRow {
    #[tabled(rename = "Year")]
    pub year: i32,
    #[tabled(rename = "Month")]
    pub month: String,
    #[tabled(rename = "Revenue")]
    pub revenue: String,
    #[tabled(rename = "Insertions")]
    pub insertions: String,
    #[tabled(rename = "UnitCost")]
    pub unit_cost: String,
}

#[derive(Debug, Tabled, Clone)]
pub struct IssuerAveragesDisplayRow {
    #[tabled(rename = "#")]
    pub position: String,
    #[tabled(rename = "Issuer")]
    pub issuer: String,
    #[tabled(rename = "Clients")]
    pub clients: String,
    #[tabled(rename = "Revenue")]
    pub revenue: String,
    #[tabled(rename = "Insertions")]
    pub insertions: String,
    #[tabled(rename = "RevenuePerClient")]
    pub revenue_per_client: String,
    #[tabled(rename = "InsertionsPerClient")]
    pub insertions_per_client: String,
}

#[derive(Debug, Tabled, Clone)]
pub struct VolumeDisplayRow {
    #[tabled(rename = "Client")]
    pub client: String,
    #[tabled(rename = "Issuer")]
    pub issuer: String,
    #[tabled(rename = "Insertions")]
    pub insertions: String,
    #[tabled(rename = "Revenue")]
    pub revenue: String,
    #[tabled(rename = "UnitCost")]
    pub unit_cost: String,
}

#[derive(Debug, Tabled, Clone)]
pub struct IssuerShareDisplayRow {
    #[tabled(rename = "Year")]
    pub year: i32,
    #[tabled(rename = "Issuer")]
    pub issuer: String,
    #[tabled(rename = "Revenue")]
    pub revenue: String,
    #[tabled(rename = "Share")]
    pub share: String,
}

#[derive(Debug, Tabled, Clone)]
pub struct KeyValueDisplayRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}
