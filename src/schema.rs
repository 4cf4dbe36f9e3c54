//! Column aliasing: maps the header names found in heterogeneous ledger
//! exports onto the canonical fields the loader understands.
use csv::StringRecord;
use log::debug;
use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::error::{ReportError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalField {
    Date,
    Year,
    Month,
    Client,
    Issuer,
    Executive,
    Revenue,
    Insertions,
}

impl CanonicalField {
    pub fn name(self) -> &'static str {
        match self {
            CanonicalField::Date => "date",
            CanonicalField::Year => "year",
            CanonicalField::Month => "month",
            CanonicalField::Client => "client",
            CanonicalField::Issuer => "issuer",
            CanonicalField::Executive => "executive",
            CanonicalField::Revenue => "revenue",
            CanonicalField::Insertions => "insertions",
        }
    }
}

static COLUMN_ALIASES: Lazy<HashMap<&'static str, CanonicalField>> = Lazy::new(|| {
    use CanonicalField::*;
    HashMap::from([
        ("ref.", Date),
        ("ref", Date),
        ("data_ref", Date),
        ("competencia", Date),
        ("competência", Date),
        ("data", Date),
        ("mês/ano", Date),
        ("mes/ano", Date),
        ("date", Date),
        ("ano", Year),
        ("ano_ref", Year),
        ("year", Year),
        ("mês", Month),
        ("mes", Month),
        ("month", Month),
        ("cliente", Client),
        ("descrição", Client),
        ("descricao", Client),
        ("nome fantasia", Client),
        ("razao social", Client),
        ("razão social", Client),
        ("client", Client),
        ("customer", Client),
        ("emissora", Issuer),
        ("empresa", Issuer),
        ("veículo", Issuer),
        ("veiculo", Issuer),
        ("radio", Issuer),
        ("rádio", Issuer),
        ("issuer", Issuer),
        ("station", Issuer),
        ("executivo", Executive),
        ("contato coml.", Executive),
        ("contato coml", Executive),
        ("contato", Executive),
        ("vendedor", Executive),
        ("executive", Executive),
        ("faturamento", Revenue),
        ("valor", Revenue),
        ("venda", Revenue),
        ("vlr total", Revenue),
        ("valor líquido", Revenue),
        ("valor liquido", Revenue),
        ("revenue", Revenue),
        ("inserções", Insertions),
        ("insercoes", Insertions),
        ("inserts", Insertions),
        ("qtd", Insertions),
        ("insertions", Insertions),
    ])
});

/// Look up the canonical field for a raw header, ignoring case and padding.
pub fn canonical_field(header: &str) -> Option<CanonicalField> {
    let key = header.trim().trim_start_matches('\u{feff}').to_lowercase();
    COLUMN_ALIASES.get(key.as_str()).copied()
}

/// Where the reference period of a row comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodColumns {
    Date(usize),
    YearMonth { year: usize, month: usize },
}

/// Column indices of the canonical fields inside a CSV record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub client: usize,
    pub issuer: usize,
    pub executive: Option<usize>,
    pub revenue: usize,
    pub insertions: Option<usize>,
    pub period: PeriodColumns,
}

impl ColumnMap {
    /// Resolve a header record. The first column matching a field wins.
    pub fn resolve(headers: &StringRecord) -> Result<Self> {
        let mut found: HashMap<CanonicalField, usize> = HashMap::new();
        for (idx, header) in headers.iter().enumerate() {
            match canonical_field(header) {
                Some(field) => {
                    found.entry(field).or_insert(idx);
                }
                None => debug!("Ignoring unrecognized column '{}'", header),
            }
        }

        let required = |field: CanonicalField| {
            found
                .get(&field)
                .copied()
                .ok_or_else(|| ReportError::MissingColumn(field.name().to_string()))
        };

        let period = match (
            found.get(&CanonicalField::Date),
            found.get(&CanonicalField::Year),
            found.get(&CanonicalField::Month),
        ) {
            (Some(&date), _, _) => PeriodColumns::Date(date),
            (None, Some(&year), Some(&month)) => PeriodColumns::YearMonth { year, month },
            _ => return Err(ReportError::MissingColumn("date (or year and month)".to_string())),
        };

        Ok(ColumnMap {
            client: required(CanonicalField::Client)?,
            issuer: required(CanonicalField::Issuer)?,
            executive: found.get(&CanonicalField::Executive).copied(),
            revenue: required(CanonicalField::Revenue)?,
            insertions: found.get(&CanonicalField::Insertions).copied(),
            period,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_portuguese_headers() {
        let headers = StringRecord::from(vec![
            "Ref.", "Descrição", "Empresa", "Contato Coml.", "Valor", "Inserções",
        ]);
        let map = ColumnMap::resolve(&headers).unwrap();
        assert_eq!(map.period, PeriodColumns::Date(0));
        assert_eq!(map.client, 1);
        assert_eq!(map.issuer, 2);
        assert_eq!(map.executive, Some(3));
        assert_eq!(map.revenue, 4);
        assert_eq!(map.insertions, Some(5));
    }

    #[test]
    fn falls_back_to_year_and_month_columns() {
        let headers = StringRecord::from(vec!["cliente", "emissora", "faturamento", "Ano", "Mês"]);
        let map = ColumnMap::resolve(&headers).unwrap();
        assert_eq!(map.period, PeriodColumns::YearMonth { year: 3, month: 4 });
        assert_eq!(map.executive, None);
        assert_eq!(map.insertions, None);
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let headers = StringRecord::from(vec!["cliente", "data", "faturamento"]);
        match ColumnMap::resolve(&headers) {
            Err(ReportError::MissingColumn(field)) => assert_eq!(field, "issuer"),
            other => panic!("expected missing issuer, got {:?}", other),
        }
    }

    #[test]
    fn missing_period_is_an_error() {
        let headers = StringRecord::from(vec!["cliente", "emissora", "faturamento", "ano"]);
        assert!(matches!(
            ColumnMap::resolve(&headers),
            Err(ReportError::MissingColumn(_))
        ));
    }

    #[test]
    fn header_lookup_ignores_case_and_bom() {
        assert_eq!(canonical_field("\u{feff}CLIENTE "), Some(CanonicalField::Client));
        assert_eq!(canonical_field("Agência"), None);
    }
}
