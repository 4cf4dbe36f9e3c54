//! Turns engine results into formatted sheets for previews and exports.
use crate::abc::AbcReport;
use crate::cohort::{CohortReport, CohortSummary, CohortTable, IntersectionMatrix, MatrixMetric};
use crate::efficiency::{ClientAverages, EfficiencyHeadline, IssuerAverages, VolumeTable};
use crate::output::Sheet;
use crate::overview::{Headline, IssuerShare, MonthlyPoint};
use crate::ranking::{RankedClient, Ranking};
use crate::session::ReportBundle;
use crate::types::{
    AbcDisplayRow, AbcRollupDisplayRow, ClientFiguresDisplayRow, CohortDisplayRow,
    IssuerAveragesDisplayRow, IssuerShareDisplayRow, KeyValueDisplayRow, MonthlyDisplayRow,
    SharedClientDisplayRow, VolumeDisplayRow, TOTAL_LABEL,
};
use crate::util::{
    format_brl, format_count, format_int, format_number, format_opt_brl, format_pct,
    format_signed_count, format_signed_pct, month_abbr, ratio,
};
use crate::variance::{ChurnReport, ClientCountTable, ClientFigures, VarianceRow, VarianceTable};

fn kv(metric: impl Into<String>, value: String) -> KeyValueDisplayRow {
    KeyValueDisplayRow {
        metric: metric.into(),
        value,
    }
}

pub fn overview_sheet(h: &Headline, last_update: &str) -> Sheet {
    let mut rows = vec![
        kv(format!("Revenue {}", h.base_year), format_brl(h.revenue_base)),
        kv(format!("Revenue {}", h.compare_year), format_brl(h.revenue_compare)),
        kv("Revenue change", format_brl(h.delta_absolute)),
        kv("Revenue change %", format_signed_pct(h.delta_percent)),
        kv("Active clients", format_int(h.active_clients as u64)),
    ];
    if let Some(top) = &h.top_client {
        rows.push(kv("Top client", top.client.clone()));
        rows.push(kv("Top client revenue", format_brl(top.revenue)));
        rows.push(kv("Top client share", format_pct(top.share_percent)));
    }
    rows.push(kv("Last update", last_update.to_string()));
    Sheet::from_rows("Overview", &rows)
}

pub fn monthly_sheet(points: &[MonthlyPoint]) -> Sheet {
    let rows: Vec<MonthlyDisplayRow> = points
        .iter()
        .map(|p| MonthlyDisplayRow {
            year: p.year,
            month: month_abbr(p.month).to_string(),
            revenue: format_brl(p.revenue),
            insertions: format_count(p.insertions),
            unit_cost: format_opt_brl(p.unit_cost),
        })
        .collect();
    Sheet::from_rows("Monthly evolution", &rows)
}

pub fn issuer_share_sheet(shares: &[IssuerShare]) -> Sheet {
    let rows: Vec<IssuerShareDisplayRow> = shares
        .iter()
        .map(|s| IssuerShareDisplayRow {
            year: s.year,
            issuer: s.issuer.clone(),
            revenue: format_brl(s.revenue),
            share: format_pct(s.share_percent),
        })
        .collect();
    Sheet::from_rows("Issuer share by year", &rows)
}

fn cohort_row(position: String, s: &CohortSummary) -> CohortDisplayRow {
    CohortDisplayRow {
        position,
        issuer: s.issuer.clone(),
        clients: format_int(s.client_count as u64),
        revenue: format_brl(s.revenue),
        insertions: format_count(s.insertions),
        share: format_pct(s.share_percent),
    }
}

pub fn cohort_sheet(table: &CohortTable, show_total: bool) -> Sheet {
    let mut rows: Vec<CohortDisplayRow> = table
        .rows
        .iter()
        .enumerate()
        .map(|(idx, s)| cohort_row((idx + 1).to_string(), s))
        .collect();
    if show_total && !rows.is_empty() {
        rows.push(cohort_row(String::new(), &table.total));
    }
    Sheet::from_rows(format!("{} clients", table.cohort.label()), &rows)
}

pub fn top_shared_sheet(report: &CohortReport) -> Sheet {
    let rows: Vec<SharedClientDisplayRow> = report
        .top_shared
        .iter()
        .enumerate()
        .map(|(idx, c)| SharedClientDisplayRow {
            position: (idx + 1).to_string(),
            client: c.client.clone(),
            revenue: format_brl(c.revenue),
            insertions: format_count(c.insertions),
            issuers: c.issuers.join(", "),
        })
        .collect();
    Sheet::from_rows("Top shared clients", &rows)
}

pub fn matrix_sheet(matrix: &IntersectionMatrix) -> Sheet {
    let cell = |v: f64| match matrix.metric {
        MatrixMetric::Revenue => format_brl(v),
        MatrixMetric::Clients | MatrixMetric::Insertions => format_int(v.round() as u64),
    };
    let headers = std::iter::once("Issuer".to_string())
        .chain(matrix.issuers.iter().cloned())
        .collect();
    let rows = matrix
        .issuers
        .iter()
        .zip(&matrix.values)
        .map(|(issuer, values)| {
            std::iter::once(issuer.clone())
                .chain(values.iter().map(|v| cell(*v)))
                .collect::<Vec<String>>()
        })
        .collect();
    Sheet::new(matrix.metric.label(), headers, rows)
}

pub fn shared_unit_cost_sheet(report: &CohortReport, show_total: bool) -> Sheet {
    let costs = &report.shared_unit_costs;
    let headers = ["#".to_string(), "Client".to_string()]
        .into_iter()
        .chain(costs.issuers.iter().cloned())
        .collect();
    let mut rows: Vec<Vec<String>> = costs
        .rows
        .iter()
        .enumerate()
        .map(|(idx, r)| {
            [(idx + 1).to_string(), r.client.clone()]
                .into_iter()
                .chain(r.unit_costs.iter().map(|c| format_opt_brl(*c)))
                .collect::<Vec<String>>()
        })
        .collect();
    if show_total && !rows.is_empty() {
        rows.push(
            [String::new(), TOTAL_LABEL.to_string()]
                .into_iter()
                .chain(costs.totals.iter().map(|c| format_opt_brl(*c)))
                .collect(),
        );
    }
    Sheet::new("Shared unit cost", headers, rows)
}

/// Cohort tables, top shared clients, the requested matrices and shared
/// unit costs.
pub fn cohort_sheets(
    report: &CohortReport,
    metrics: &[MatrixMetric],
    show_total: bool,
) -> Vec<Sheet> {
    let mut sheets = vec![
        cohort_sheet(&report.exclusive, show_total),
        cohort_sheet(&report.shared, show_total),
        cohort_sheet(&report.absent, show_total),
        top_shared_sheet(report),
    ];
    sheets.extend(metrics.iter().filter_map(|m| report.matrix(*m)).map(matrix_sheet));
    sheets.push(shared_unit_cost_sheet(report, show_total));
    sheets
}

fn variance_cells(r: &VarianceRow) -> Vec<String> {
    vec![
        r.entity.clone(),
        format_brl(r.revenue_base),
        format_brl(r.revenue_compare),
        format_brl(r.delta_absolute),
        format_signed_pct(r.delta_percent),
        format_count(r.insertions_base),
        format_count(r.insertions_compare),
        format_signed_count(r.delta_insertions),
        format_opt_brl(r.unit_cost_base),
        format_opt_brl(r.unit_cost_compare),
    ]
}

pub fn variance_sheet(table: &VarianceTable, show_total: bool) -> Sheet {
    let (b, c) = (table.base_year, table.compare_year);
    let headers = vec![
        table.group.label().to_string(),
        format!("Revenue {}", b),
        format!("Revenue {}", c),
        "Revenue change".to_string(),
        "Revenue change %".to_string(),
        format!("Insertions {}", b),
        format!("Insertions {}", c),
        "Insertions change".to_string(),
        format!("Unit cost {}", b),
        format!("Unit cost {}", c),
    ];
    let mut rows: Vec<Vec<String>> = table.rows.iter().map(variance_cells).collect();
    if show_total && !rows.is_empty() {
        rows.push(variance_cells(&table.total));
    }
    Sheet::new(
        format!("Variance by {}", table.group.label().to_lowercase()),
        headers,
        rows,
    )
}

pub fn client_count_sheet(table: &ClientCountTable, show_total: bool) -> Sheet {
    let headers = vec![
        "Issuer".to_string(),
        format!("Clients {}", table.base_year),
        format!("Clients {}", table.compare_year),
        "Change".to_string(),
        "Change %".to_string(),
    ];
    let total = show_total.then_some(&table.total);
    let rows = table
        .rows
        .iter()
        .chain(total)
        .map(|r| {
            vec![
                r.issuer.clone(),
                format_int(r.base as u64),
                format_int(r.compare as u64),
                format_signed_count(r.delta),
                format_signed_pct(r.delta_percent),
            ]
        })
        .collect();
    Sheet::new("Clients by issuer", headers, rows)
}

fn figures_row(
    position: String,
    client: &str,
    revenue: f64,
    insertions: u64,
    unit_cost: Option<f64>,
) -> ClientFiguresDisplayRow {
    ClientFiguresDisplayRow {
        position,
        client: client.to_string(),
        revenue: format_brl(revenue),
        insertions: format_count(insertions),
        unit_cost: format_opt_brl(unit_cost),
    }
}

fn figures_sheet(name: String, clients: &[ClientFigures], show_total: bool) -> Sheet {
    let mut rows: Vec<ClientFiguresDisplayRow> = clients
        .iter()
        .enumerate()
        .map(|(idx, c)| {
            figures_row((idx + 1).to_string(), &c.client, c.revenue, c.insertions, c.unit_cost)
        })
        .collect();
    if show_total && !rows.is_empty() {
        let revenue: f64 = clients.iter().map(|c| c.revenue).sum();
        let insertions: u64 = clients.iter().map(|c| c.insertions).sum();
        rows.push(figures_row(
            String::new(),
            TOTAL_LABEL,
            revenue,
            insertions,
            ratio(revenue, insertions as f64),
        ));
    }
    Sheet::from_rows(name, &rows)
}

pub fn churn_sheets(report: &ChurnReport, show_total: bool) -> Vec<Sheet> {
    let b = &report.balance;
    let balance = vec![
        kv("Lost clients", format_int(b.lost_clients as u64)),
        kv("Gained clients", format_int(b.gained_clients as u64)),
        kv("Net clients", format_signed_count(b.net_clients)),
        kv("Retained clients", format_int(report.retained.len() as u64)),
        kv("Lost revenue", format_brl(b.lost_revenue)),
        kv("Gained revenue", format_brl(b.gained_revenue)),
        kv("Net revenue", format_brl(b.net_revenue)),
        kv("Lost insertions", format_count(b.lost_insertions)),
        kv("Gained insertions", format_count(b.gained_insertions)),
        kv("Net insertions", format_signed_count(b.net_insertions)),
        kv("Lost yield", format_opt_brl(b.lost_yield)),
        kv("Gained yield", format_opt_brl(b.gained_yield)),
        kv("Yield difference", format_opt_brl(b.net_yield)),
    ];
    vec![
        figures_sheet(format!("Lost clients ({})", report.base_year), &report.lost, show_total),
        figures_sheet(format!("New clients ({})", report.compare_year), &report.gained, show_total),
        Sheet::from_rows("Churn balance", &balance),
    ]
}

pub fn abc_sheets(report: &AbcReport) -> Vec<Sheet> {
    let rows: Vec<AbcDisplayRow> = report
        .rows
        .iter()
        .map(|r| AbcDisplayRow {
            rank: r.rank,
            class: r.class.to_string(),
            client: r.client.clone(),
            revenue: format_brl(r.revenue),
            insertions: format_count(r.insertions),
            unit_cost: format_opt_brl(r.unit_cost),
            share: format_pct(Some(r.share * 100.0)),
            cumulative: format_pct(Some(r.cumulative_share * 100.0)),
        })
        .collect();
    let rollup: Vec<AbcRollupDisplayRow> = report
        .rollup
        .iter()
        .map(|r| AbcRollupDisplayRow {
            class: r.class.to_string(),
            clients: r.clients,
            revenue: format_brl(r.revenue),
            insertions: format_count(r.insertions),
        })
        .collect();
    vec![
        Sheet::from_rows("ABC ranking", &rows),
        Sheet::from_rows("ABC classes", &rollup),
    ]
}

fn ranked_row(r: &RankedClient, position: String) -> ClientFiguresDisplayRow {
    figures_row(position, &r.client, r.revenue, r.insertions, r.unit_cost)
}

pub fn ranking_sheet(ranking: &Ranking, show_total: bool) -> Sheet {
    let mut rows: Vec<ClientFiguresDisplayRow> = ranking
        .rows
        .iter()
        .map(|r| ranked_row(r, r.position.to_string()))
        .collect();
    if show_total && !rows.is_empty() {
        rows.push(ranked_row(&ranking.total, String::new()));
    }
    let mut name = format!(
        "Top {} by {}",
        ranking.request.limit,
        ranking.request.criterion.label().to_lowercase()
    );
    if let Some(issuer) = &ranking.request.issuer {
        name.push_str(&format!(" - {}", issuer));
    }
    if let Some(year) = ranking.request.year {
        name.push_str(&format!(" {}", year));
    }
    Sheet::from_rows(name, &rows)
}

fn averages_row(position: String, a: &IssuerAverages) -> IssuerAveragesDisplayRow {
    IssuerAveragesDisplayRow {
        position,
        issuer: a.issuer.clone(),
        clients: format_int(a.clients as u64),
        revenue: format_brl(a.revenue),
        insertions: format_count(a.insertions),
        revenue_per_client: format_opt_brl(a.revenue_per_client),
        insertions_per_client: a
            .insertions_per_client
            .map(|v| format_number(v, 1))
            .unwrap_or_else(|| "-".to_string()),
    }
}

pub fn client_averages_sheet(averages: &ClientAverages, show_total: bool) -> Sheet {
    let mut rows: Vec<IssuerAveragesDisplayRow> = averages
        .rows
        .iter()
        .enumerate()
        .map(|(idx, a)| averages_row((idx + 1).to_string(), a))
        .collect();
    if show_total && !rows.is_empty() {
        rows.push(averages_row(String::new(), &averages.total));
    }
    Sheet::from_rows("Averages per client", &rows)
}

/// Efficiency headline followed by the volume table it summarizes.
pub fn efficiency_sheets(headline: &EfficiencyHeadline, volume: &VolumeTable) -> Vec<Sheet> {
    let figures = vec![
        kv("Yield per insertion", format_opt_brl(headline.yield_per_insertion)),
        kv(
            "Insertions per client",
            headline
                .insertions_per_client
                .map(|v| format_int(v.trunc() as u64))
                .unwrap_or_else(|| "-".to_string()),
        ),
        kv("Insertions delivered", format_count(headline.insertions)),
        kv("Paying clients", format_int(headline.clients as u64)),
        kv("Revenue", format_brl(headline.revenue)),
    ];
    let rows: Vec<VolumeDisplayRow> = volume
        .rows
        .iter()
        .map(|p| VolumeDisplayRow {
            client: p.client.clone(),
            issuer: p.issuer.clone(),
            insertions: format_count(p.insertions),
            revenue: format_brl(p.revenue),
            unit_cost: format_brl(p.unit_cost),
        })
        .collect();
    vec![
        Sheet::from_rows("Efficiency", &figures),
        Sheet::from_rows(format!("Volume and unit cost ({})", volume.scope_label()), &rows),
    ]
}

/// One-line summary printed before a bundle's sheets.
pub fn bundle_caption(bundle: &ReportBundle) -> String {
    format!(
        "{} rows | comparing {} with {} | last update {} | {}",
        format_number(bundle.row_count as f64, 0),
        bundle.base_year,
        bundle.compare_year,
        bundle.last_update,
        bundle.filter_description
    )
}

/// Every sheet of a bundle, in export order.
pub fn bundle_sheets(bundle: &ReportBundle) -> Vec<Sheet> {
    let total = bundle.show_total;
    let mut sheets = vec![
        overview_sheet(&bundle.headline, &bundle.last_update),
        monthly_sheet(&bundle.monthly),
        issuer_share_sheet(&bundle.issuer_share),
    ];
    sheets.extend(cohort_sheets(&bundle.cohorts, &MatrixMetric::ALL, total));
    sheets.extend(bundle.variance.iter().map(|t| variance_sheet(t, total)));
    sheets.push(client_count_sheet(&bundle.client_counts, total));
    sheets.extend(churn_sheets(&bundle.churn, total));
    sheets.extend(abc_sheets(&bundle.abc));
    sheets.push(ranking_sheet(&bundle.ranking, total));
    sheets.push(client_averages_sheet(&bundle.client_averages, total));
    sheets.extend(efficiency_sheets(&bundle.efficiency, &bundle.volume));
    sheets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::{analyze, CohortOptions};
    use crate::types::Transaction;
    use crate::variance::{variance_table, GroupKey};

    fn tx(client: &str, issuer: &str, year: i32, revenue: f64, insertions: u64) -> Transaction {
        Transaction {
            client: client.to_string(),
            issuer: issuer.to_string(),
            executive: "N/A".to_string(),
            year,
            month: 1,
            revenue,
            insertions,
        }
    }

    fn rows() -> Vec<Transaction> {
        vec![
            tx("Alpha", "A", 2023, 1000.0, 10),
            tx("Alpha", "B", 2024, 500.0, 0),
            tx("Beta", "A", 2024, 250.5, 5),
        ]
    }

    #[test]
    fn cohort_sheet_numbers_rows_and_appends_total() {
        let report = analyze(
            &rows(),
            CohortOptions {
                top_shared_limit: 5,
                issuer_order: &[],
            },
        );
        let sheet = cohort_sheet(&report.shared, true);
        assert_eq!(sheet.name, "Shared clients");
        assert_eq!(sheet.headers[0], "#");
        assert_eq!(sheet.rows[0][0], "1");
        let last = sheet.rows.last().unwrap();
        assert_eq!(last[0], "");
        assert_eq!(last[1], TOTAL_LABEL);

        let without = cohort_sheet(&report.shared, false);
        assert_eq!(without.rows.len(), sheet.rows.len() - 1);
    }

    #[test]
    fn variance_sheet_labels_years_and_marks_undefined() {
        let table = variance_table(&rows(), GroupKey::Issuer, (2023, 2024));
        let sheet = variance_sheet(&table, true);
        assert_eq!(sheet.name, "Variance by issuer");
        assert_eq!(sheet.headers[1], "Revenue 2023");
        assert_eq!(sheet.headers[2], "Revenue 2024");
        let b = sheet.rows.iter().find(|r| r[0] == "B").unwrap();
        assert_eq!(b[4], crate::util::UNDEFINED);
        assert_eq!(b[9], crate::util::UNDEFINED);
        assert_eq!(sheet.rows.last().unwrap()[0], TOTAL_LABEL);
    }

    #[test]
    fn matrix_sheet_has_issuer_headers() {
        let report = analyze(
            &rows(),
            CohortOptions {
                top_shared_limit: 5,
                issuer_order: &[],
            },
        );
        let sheet = matrix_sheet(report.matrix(MatrixMetric::Clients).unwrap());
        assert_eq!(sheet.headers, vec!["Issuer", "A", "B"]);
        assert_eq!(sheet.rows[0], vec!["A", "2", "1"]);
        assert_eq!(sheet.rows[1], vec!["B", "1", "1"]);
    }

    #[test]
    fn averages_sheet_formats_one_decimal_and_total() {
        let averages = crate::efficiency::client_averages(&rows());
        let sheet = client_averages_sheet(&averages, true);
        assert_eq!(sheet.headers[5], "RevenuePerClient");
        assert_eq!(sheet.rows[0][1], "A");
        assert_eq!(sheet.rows[0][2], "2");
        assert_eq!(sheet.rows[0][6], "7,5");
        let total = sheet.rows.last().unwrap();
        assert_eq!(total[1], TOTAL_LABEL);
        assert_eq!(total[2], "2");
        assert_eq!(total[5], "R$ 875,25");
    }

    #[test]
    fn efficiency_sheets_name_the_volume_scope() {
        let rows = rows();
        let headline = crate::efficiency::efficiency_headline(&rows);
        let volume = crate::efficiency::volume_table(&rows, Some(2024));
        let sheets = efficiency_sheets(&headline, &volume);
        assert_eq!(sheets[0].rows[0], vec!["Yield per insertion", "R$ 116,70"]);
        assert_eq!(sheets[1].name, "Volume and unit cost (2024)");
        assert_eq!(sheets[1].rows.len(), 1);
        assert_eq!(sheets[1].rows[0][0], "Beta");
    }
}
