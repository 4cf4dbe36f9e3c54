use crate::config::ReportConfig;
use crate::error::{ReportError, Result};
use crate::schema::{ColumnMap, PeriodColumns};
use crate::types::Transaction;
use crate::util::{
    parse_count, parse_currency_br_opt, parse_date_flexible, parse_i32_safe, parse_month,
    normalize_text, year_month,
};
use csv::{ByteRecord, ReaderBuilder, StringRecord};
use log::{debug, info, warn};
use std::borrow::Cow;
use std::path::Path;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub total_rows: usize,
    pub loaded_rows: usize,
    /// Rows skipped because the record or its period could not be read.
    pub dropped_rows: usize,
    /// Revenue cells that could not be parsed and were read as zero.
    pub coerced_revenue: usize,
    /// Rows with cells that were not valid UTF-8 and were read as Latin-1.
    pub recoded_rows: usize,
    pub has_insertions: bool,
    /// Latest period in the ledger as `MM/YYYY`.
    pub last_update: String,
}

pub fn load_and_clean(path: &Path, config: &ReportConfig) -> Result<(Vec<Transaction>, LoadReport)> {
    info!("Loading ledger from: {:?}", path);
    let content = std::fs::read(path)?;
    parse_ledger(&content, config)
}

/// Normalize raw ledger bytes into canonical transactions. Cells are read as
/// UTF-8, falling back to Latin-1 for legacy exports.
pub fn parse_ledger(content: &[u8], config: &ReportConfig) -> Result<(Vec<Transaction>, LoadReport)> {
    let content = content.strip_prefix(UTF8_BOM).unwrap_or(content);
    let delimiter = config
        .delimiter_byte()
        .unwrap_or_else(|| detect_delimiter(content));
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(content);

    let (headers, _) = decode_record(rdr.byte_headers()?);
    let columns = ColumnMap::resolve(&headers)?;
    debug!("Resolved columns: {:?}", columns);

    let mut total_rows = 0usize;
    let mut dropped_rows = 0usize;
    let mut coerced_revenue = 0usize;
    let mut recoded_rows = 0usize;
    let mut rows: Vec<Transaction> = Vec::new();

    for result in rdr.byte_records() {
        total_rows += 1;
        let record = match result {
            Ok(r) => {
                let (record, recoded) = decode_record(&r);
                if recoded {
                    recoded_rows += 1;
                }
                record
            }
            Err(e) => {
                debug!("Skipping unreadable record {}: {}", total_rows, e);
                dropped_rows += 1;
                continue;
            }
        };

        let Some((year, month)) = read_period(&record, columns.period) else {
            dropped_rows += 1;
            continue;
        };

        let raw_revenue = record.get(columns.revenue).map(str::trim).unwrap_or("");
        let revenue = match parse_currency_br_opt(Some(raw_revenue)) {
            Some(v) => v,
            None => {
                if !raw_revenue.is_empty() {
                    coerced_revenue += 1;
                }
                0.0
            }
        };
        let insertions = columns
            .insertions
            .map(|idx| parse_count(record.get(idx)))
            .unwrap_or(0);

        let text = |idx: usize| normalize_text(record.get(idx).unwrap_or(""));
        let executive = columns
            .executive
            .map(|idx| text(idx))
            .unwrap_or_default();

        rows.push(Transaction {
            client: text(columns.client),
            issuer: text(columns.issuer),
            executive: config.consolidate_executive(&executive),
            year,
            month,
            revenue,
            insertions,
        });
    }

    if dropped_rows > 0 {
        warn!("{} rows dropped: unreadable record or period", dropped_rows);
    }
    if coerced_revenue > 0 {
        warn!("{} revenue values could not be parsed and were read as zero", coerced_revenue);
    }
    if recoded_rows > 0 {
        warn!("{} rows were not valid UTF-8 and were read as Latin-1", recoded_rows);
    }
    if rows.is_empty() {
        return Err(ReportError::NoData);
    }

    let last_update = rows
        .iter()
        .map(|r| (r.year, r.month))
        .max()
        .map(|(y, m)| format!("{:02}/{}", m, y))
        .unwrap_or_default();

    let report = LoadReport {
        total_rows,
        loaded_rows: rows.len(),
        dropped_rows,
        coerced_revenue,
        recoded_rows,
        has_insertions: columns.insertions.is_some(),
        last_update,
    };
    info!(
        "Loaded {} of {} rows (last update {})",
        report.loaded_rows, report.total_rows, report.last_update
    );
    Ok((rows, report))
}

fn read_period(record: &StringRecord, period: PeriodColumns) -> Option<(i32, u32)> {
    match period {
        PeriodColumns::Date(idx) => parse_date_flexible(record.get(idx)).map(year_month),
        PeriodColumns::YearMonth { year, month } => {
            Some((parse_i32_safe(record.get(year))?, parse_month(record.get(month))?))
        }
    }
}

/// Decode every cell; the flag is set when any cell needed the Latin-1 fallback.
fn decode_record(record: &ByteRecord) -> (StringRecord, bool) {
    let mut recoded = false;
    let decoded = record
        .iter()
        .map(|cell| {
            let text = decode_cell(cell);
            recoded |= matches!(text, Cow::Owned(_));
            text
        })
        .collect::<StringRecord>();
    (decoded, recoded)
}

fn decode_cell(cell: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(cell) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => Cow::Owned(cell.iter().map(|&b| char::from(b)).collect()),
    }
}

/// Semicolon-separated exports are common with Brazilian locale settings.
fn detect_delimiter(content: &[u8]) -> u8 {
    let header = content.split(|&b| b == b'\n').next().unwrap_or(&[]);
    let count = |d: u8| header.iter().filter(|&&b| b == d).count();
    if count(b';') > count(b',') {
        b';'
    } else {
        b','
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_semicolon_ledger_with_aliases() {
        let csv = "\u{feff}Ref.;Descrição;Empresa;Contato Coml.;Valor;Inserções\n\
                   15/01/2024;padaria central;NOVABRASIL;ana souza;R$ 1.500,00;10\n\
                   02/2024;Padaria Central;Difusora;VENDA EXTERNA;\"2.000,50\";\n";
        let (rows, report) = parse_ledger(csv.as_bytes(), &ReportConfig::default()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].client, "Padaria Central");
        assert_eq!(rows[0].issuer, "Novabrasil");
        assert_eq!(rows[0].executive, "Ana Souza");
        assert_eq!((rows[0].year, rows[0].month), (2024, 1));
        assert_eq!(rows[0].revenue, 1500.0);
        assert_eq!(rows[0].insertions, 10);
        assert_eq!(rows[1].executive, "N/A");
        assert_eq!(rows[1].revenue, 2000.5);
        assert_eq!(rows[1].insertions, 0);
        assert_eq!(report.last_update, "02/2024");
        assert!(report.has_insertions);
    }

    #[test]
    fn drops_rows_with_bad_dates_and_coerces_bad_revenue() {
        let csv = "data,cliente,emissora,faturamento\n\
                   2024-03-01,A,X,abc\n\
                   someday,B,X,100\n\
                   2024-04-01,C,X,\n";
        let (rows, report) = parse_ledger(csv.as_bytes(), &ReportConfig::default()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(report.total_rows, 3);
        assert_eq!(report.dropped_rows, 1);
        assert_eq!(report.coerced_revenue, 1);
        assert!(rows.iter().all(|r| r.revenue == 0.0));
        assert!(!report.has_insertions);
        assert!(rows.iter().all(|r| r.executive == "N/A"));
    }

    #[test]
    fn year_and_month_columns_define_the_period() {
        let csv = "cliente,emissora,faturamento,ano,mes\nA,X,10,2023,13\nA,X,10,2023,12\n";
        let (rows, report) = parse_ledger(csv.as_bytes(), &ReportConfig::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].month_label(), "Dec/23");
        assert_eq!(report.dropped_rows, 1);
    }

    #[test]
    fn latin1_cells_are_decoded_and_the_row_is_kept() {
        let bytes: &[u8] = b"cliente;emissora;faturamento;data\n\
                             Padaria Central;Radio A;100,00;01/03/2024\n\
                             Padaria S\xe3o Jo\xe3o;Radio A;50,00;02/03/2024\n";
        let (rows, report) = parse_ledger(bytes, &ReportConfig::default()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].client, "Padaria Central");
        assert_eq!(rows[1].client, "Padaria S\u{e3}o Jo\u{e3}o");
        assert_eq!(rows[1].revenue, 50.0);
        assert_eq!(report.dropped_rows, 0);
        assert_eq!(report.recoded_rows, 1);
    }

    #[test]
    fn load_and_clean_reads_latin1_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            b"cliente,emissora,faturamento,data\nJos\xe9 Ltda,FM,10,2024-01-05\n",
        )
        .unwrap();
        let (rows, report) = load_and_clean(file.path(), &ReportConfig::default()).unwrap();
        assert_eq!(rows[0].client, "Jos\u{e9} Ltda");
        assert_eq!(rows[0].issuer, "FM");
        assert_eq!(report.loaded_rows, 1);
    }

    #[test]
    fn empty_ledger_is_no_data() {
        let csv = "data,cliente,emissora,faturamento\nbad,A,X,1\n";
        assert!(matches!(
            parse_ledger(csv.as_bytes(), &ReportConfig::default()),
            Err(ReportError::NoData)
        ));
    }
}
