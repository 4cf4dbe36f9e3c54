use chrono::Local;
use log::info;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tabled::{builder::Builder, settings::Style, Tabled};

use crate::error::{ReportError, Result};
use crate::util::UNDEFINED;

const MAX_SHEET_NAME: usize = 31;
const FILTERS_SHEET: &str = "Filters";

/// A titled table of already formatted cells: one console preview or one
/// exported file.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Sheet {
            name: name.into(),
            headers,
            rows,
        }
    }

    pub fn from_rows<T: Tabled>(name: impl Into<String>, rows: &[T]) -> Self {
        let headers = T::headers().into_iter().map(|h| h.into_owned()).collect();
        let rows = rows
            .iter()
            .map(|r| r.fields().into_iter().map(|f| f.into_owned()).collect::<Vec<String>>())
            .collect();
        Sheet::new(name, headers, rows)
    }

    pub fn render_markdown(&self, max_rows: usize) -> String {
        let mut builder = Builder::default();
        builder.push_record(self.headers.iter().cloned());
        for row in self.rows.iter().take(max_rows) {
            builder.push_record(row.iter().cloned());
        }
        builder.build().with(Style::markdown()).to_string()
    }
}

pub fn preview_sheet(sheet: &Sheet, max_rows: usize) {
    println!("\n{}\n", sheet.name);
    if sheet.rows.is_empty() {
        println!("(no rows)\n");
        return;
    }
    println!("{}", sheet.render_markdown(max_rows));
    if sheet.rows.len() > max_rows {
        println!("({} more rows in the export)", sheet.rows.len() - max_rows);
    }
    println!();
}

/// Strip characters spreadsheet tools reject in sheet names and shorten long
/// names to first 20 + ".." + last 9 characters.
pub fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .collect();
    let cleaned = cleaned.trim();
    let chars: Vec<char> = cleaned.chars().collect();
    if chars.is_empty() {
        return "Sheet".to_string();
    }
    if chars.len() <= MAX_SHEET_NAME {
        return cleaned.to_string();
    }
    let head: String = chars[..20].iter().collect();
    let tail: String = chars[chars.len() - 9..].iter().collect();
    format!("{}..{}", head, tail)
}

/// Sanitized name not yet present in `used` (compared case-insensitively).
fn unique_sheet_name(name: &str, used: &mut HashSet<String>) -> String {
    let base = sanitize_sheet_name(name);
    let mut candidate = base.clone();
    let mut n = 2;
    while used.contains(&candidate.to_lowercase()) {
        let suffix = format!(" ({})", n);
        let keep = MAX_SHEET_NAME - suffix.chars().count();
        candidate = base.chars().take(keep).collect::<String>() + &suffix;
        n += 1;
    }
    used.insert(candidate.to_lowercase());
    candidate
}

/// Undefined values become empty cells in exported files.
pub fn write_sheet_csv(path: &Path, sheet: &Sheet) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(&sheet.headers)?;
    for row in &sheet.rows {
        wtr.write_record(row.iter().map(|c| if c == UNDEFINED { "" } else { c.as_str() }))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    fs::write(path, s)?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestEntry {
    pub sheet: String,
    pub file: String,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportManifest {
    pub name: String,
    pub created_at: String,
    pub filters: String,
    pub sheets: Vec<ManifestEntry>,
    #[serde(skip)]
    pub directory: PathBuf,
}

/// Write every sheet as a CSV file into `<dir>/<name>/`, together with the
/// active filters (one `(filter, value)` pair per row), a JSON summary and a
/// manifest.
pub fn export_bundle<S: Serialize>(
    dir: &Path,
    name: &str,
    sheets: &[Sheet],
    filters: &[(&str, String)],
    summary: &S,
) -> Result<ExportManifest> {
    let folder: String = name
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    if folder.is_empty() || folder == "." || folder == ".." {
        return Err(ReportError::InvalidConfig(format!(
            "export name {:?} does not name a folder",
            name
        )));
    }
    let target = dir.join(&folder);
    fs::create_dir_all(&target)?;

    let mut used: HashSet<String> = HashSet::from([FILTERS_SHEET.to_lowercase()]);
    let mut entries = Vec::with_capacity(sheets.len());
    for sheet in sheets {
        let sheet_name = unique_sheet_name(&sheet.name, &mut used);
        let file = format!("{}.csv", sheet_name);
        write_sheet_csv(&target.join(&file), sheet)?;
        entries.push(ManifestEntry {
            sheet: sheet_name,
            file,
            rows: sheet.rows.len(),
        });
    }

    let filter_sheet = Sheet::new(
        FILTERS_SHEET,
        vec!["Filter".to_string(), "Value".to_string()],
        filters
            .iter()
            .map(|(filter, value)| vec![filter.to_string(), value.clone()])
            .collect(),
    );
    write_sheet_csv(&target.join(format!("{}.csv", FILTERS_SHEET)), &filter_sheet)?;
    write_json(&target.join("summary.json"), summary)?;

    let manifest = ExportManifest {
        name: name.to_string(),
        created_at: Local::now().to_rfc3339(),
        filters: filters
            .iter()
            .map(|(filter, value)| format!("{}: {}", filter, value))
            .collect::<Vec<_>>()
            .join(" | "),
        sheets: entries,
        directory: target.clone(),
    };
    write_json(&target.join("manifest.json"), &manifest)?;
    info!("Exported {} sheets to {:?}", manifest.sheets.len(), target);
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KeyValueDisplayRow;

    fn kv(metric: &str, value: &str) -> KeyValueDisplayRow {
        KeyValueDisplayRow {
            metric: metric.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn sheet_names_are_cleaned_and_shortened() {
        assert_eq!(sanitize_sheet_name("Revenue [2024]: A/B?"), "Revenue 2024 AB");
        let long = "Unit cost per issuer for shared clients";
        let short = sanitize_sheet_name(long);
        assert_eq!(short, "Unit cost per issuer..d clients");
        assert_eq!(short.chars().count(), 31);
        assert_eq!(sanitize_sheet_name("*?"), "Sheet");
    }

    #[test]
    fn duplicate_names_get_a_suffix() {
        let mut used = HashSet::new();
        assert_eq!(unique_sheet_name("Totals", &mut used), "Totals");
        assert_eq!(unique_sheet_name("totals", &mut used), "totals (2)");
        assert_eq!(unique_sheet_name("Totals", &mut used), "Totals (3)");
    }

    #[test]
    fn markdown_preview_limits_rows() {
        let sheet = Sheet::from_rows("KV", &[kv("a", "1"), kv("b", "2"), kv("c", "3")]);
        assert_eq!(sheet.headers, vec!["Metric", "Value"]);
        let md = sheet.render_markdown(2);
        assert!(md.contains("| a "));
        assert!(!md.contains("| c "));
    }

    #[test]
    fn export_writes_sheets_filters_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let sheets = vec![
            Sheet::from_rows("Overview", &[kv("Revenue", "R$ 10,00"), kv("Delta %", UNDEFINED)]),
            Sheet::from_rows("Filters", &[kv("x", "y")]),
        ];
        let filters = [
            ("Years", "All".to_string()),
            ("Issuers", "Radio A | FM: Norte".to_string()),
        ];
        let manifest = export_bundle(
            dir.path(),
            "2024 report",
            &sheets,
            &filters,
            &serde_json::json!({"rows": 2}),
        )
        .unwrap();

        let names: Vec<&str> = manifest.sheets.iter().map(|e| e.sheet.as_str()).collect();
        assert_eq!(names, vec!["Overview", "Filters (2)"]);

        let folder = dir.path().join("2024 report");
        let overview = fs::read_to_string(folder.join("Overview.csv")).unwrap();
        assert_eq!(overview, "Metric,Value\nRevenue,\"R$ 10,00\"\nDelta %,\n");
        let written = fs::read_to_string(folder.join("Filters.csv")).unwrap();
        assert_eq!(written, "Filter,Value\nYears,All\nIssuers,Radio A | FM: Norte\n");
        assert!(folder.join("manifest.json").exists());
        assert!(folder.join("summary.json").exists());
    }

    #[test]
    fn export_rejects_names_that_are_not_folders() {
        let dir = tempfile::tempdir().unwrap();
        let sheets = vec![Sheet::from_rows("Overview", &[kv("a", "1")])];
        for name in ["", "   ", ".", "..", " .. "] {
            let result = export_bundle(dir.path(), name, &sheets, &[], &serde_json::json!({}));
            assert!(
                matches!(result, Err(ReportError::InvalidConfig(_))),
                "{:?} accepted",
                name
            );
        }
        assert!(!dir.path().join("Overview.csv").exists());
        assert!(export_bundle(dir.path(), "a..b", &sheets, &[], &serde_json::json!({})).is_ok());
    }
}
