// Utility helpers for parsing and formatting.
//
// This module centralizes the "dirty" spreadsheet handling (Brazilian currency
// strings, mixed date formats, inconsistent capitalization) so the rest of the
// code can assume clean, typed values.
use chrono::{Datelike, Days, NaiveDate};
use num_format::{Locale, ToFormattedString};

pub const MONTH_ABBR: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Placeholder rendered for undefined ratios.
pub const UNDEFINED: &str = "—";

/// Parse a Brazilian currency string (`R$ 1.234,56`, `(1.234,56)`, `-150`).
///
/// - Strips the `R$` prefix and all whitespace, including non-breaking spaces.
/// - A leading `-` or an opening parenthesis marks a negative amount.
/// - When a `,` is present it is the decimal mark and `.` groups thousands.
/// - Without a `,`, a single `.` followed by anything but exactly three digits
///   is read as a decimal point (`100.5`); otherwise dots group thousands.
///
/// Returns `None` for anything that cannot be safely parsed.
pub fn parse_currency_br_opt(s: Option<&str>) -> Option<f64> {
    let cleaned: String = s?
        .replace("R$", "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let negative = cleaned.starts_with('-') || cleaned.starts_with('(');
    let digits: String = cleaned
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | '-' | '+'))
        .collect();
    let value = parse_decimal(&digits)?;
    Some(if negative { -value.abs() } else { value })
}

/// Same as [`parse_currency_br_opt`] but coerces failures to `0.0`.
pub fn parse_currency_br(s: Option<&str>) -> f64 {
    parse_currency_br_opt(s).unwrap_or(0.0)
}

fn parse_decimal(digits: &str) -> Option<f64> {
    if digits.is_empty() || digits.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let normalized = if digits.contains(',') {
        digits.replace('.', "").replace(',', ".")
    } else if is_decimal_point(digits) {
        digits.to_string()
    } else {
        digits.replace('.', "")
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn is_decimal_point(digits: &str) -> bool {
    digits.matches('.').count() == 1
        && digits
            .rsplit('.')
            .next()
            .map(|frac| frac.len() != 3)
            .unwrap_or(false)
}

/// Parse an insertion count. Fractions are rounded, negatives and garbage
/// become zero.
pub fn parse_count(s: Option<&str>) -> u64 {
    let Some(s) = s.map(str::trim) else {
        return 0;
    };
    match parse_decimal(s) {
        Some(v) if v > 0.0 => v.round() as u64,
        _ => 0,
    }
}

pub fn parse_i32_safe(s: Option<&str>) -> Option<i32> {
    // `?` propagates `None` early if the option is missing.
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<i32>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().filter(|v| v.fract() == 0.0).map(|v| v as i32))
}

/// Parse a month number (1-12).
pub fn parse_month(s: Option<&str>) -> Option<u32> {
    let m = parse_i32_safe(s)?;
    (1..=12).contains(&m).then_some(m as u32)
}

/// Parse the reference date of a ledger row.
///
/// Accepted shapes: `YYYY-MM-DD` (optionally followed by a time),
/// `DD/MM/YYYY` or `DD/MM/YY`, `MM/YYYY`, and spreadsheet serial day numbers.
/// Stray apostrophes left by spreadsheet text cells are ignored.
pub fn parse_date_flexible(s: Option<&str>) -> Option<NaiveDate> {
    let s = s?.trim().replace('\'', "");
    let s = s.split([' ', 'T']).next()?.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if s.contains('/') {
        let parts: Vec<&str> = s.split('/').collect();
        return match parts.as_slice() {
            [day, month, year] => {
                let day: u32 = day.parse().ok()?;
                let month: u32 = month.parse().ok()?;
                let year = expand_year(year)?;
                NaiveDate::from_ymd_opt(year, month, day)
            }
            [month, year] if year.len() == 4 => {
                let month: u32 = month.parse().ok()?;
                NaiveDate::from_ymd_opt(year.parse().ok()?, month, 1)
            }
            _ => None,
        };
    }
    if s.len() >= 4 && s.replace('.', "").chars().all(|c| c.is_ascii_digit()) {
        return excel_serial_date(s.parse::<f64>().ok()?);
    }
    None
}

fn expand_year(year: &str) -> Option<i32> {
    let y: i32 = year.parse().ok()?;
    match year.len() {
        4 => Some(y),
        // Same pivot as strptime's %y.
        2 if y < 69 => Some(2000 + y),
        2 => Some(1900 + y),
        _ => None,
    }
}

fn excel_serial_date(serial: f64) -> Option<NaiveDate> {
    if !(1.0..3_000_000.0).contains(&serial) {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_days(Days::new(serial.floor() as u64))
}

/// Year and month of a parsed date.
pub fn year_month(d: NaiveDate) -> (i32, u32) {
    (d.year(), d.month())
}

pub fn month_abbr(month: u32) -> &'static str {
    MONTH_ABBR
        .get((month as usize).wrapping_sub(1))
        .copied()
        .unwrap_or("?")
}

pub fn month_label(year: i32, month: u32) -> String {
    format!("{}/{:02}", month_abbr(month), year.rem_euclid(100))
}

/// Normalize a name to title case per word. All-uppercase tokens of up to
/// three characters (`FM`, `TV`, `TH+`) are kept as acronyms.
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .map(|token| {
            let is_acronym = token.chars().count() <= 3
                && token.chars().any(|c| c.is_alphabetic())
                && token.chars().filter(|c| c.is_alphabetic()).all(|c| c.is_uppercase());
            if is_acronym {
                return token.to_string();
            }
            let mut chars = token.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `num / den` when the denominator is positive, otherwise undefined.
pub fn ratio(num: f64, den: f64) -> Option<f64> {
    if den > 0.0 {
        Some(num / den)
    } else {
        None
    }
}

/// Percentage change from `base` to `compare`; undefined when `base <= 0`.
pub fn pct_change(base: f64, compare: f64) -> Option<f64> {
    ratio(compare - base, base).map(|r| r * 100.0)
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Format a floating-point value with:
    // - a fixed number of decimal places, and
    // - Brazilian thousands separators and decimal comma (`1.234.567,89`).
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::pt);
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push(',');
            res.push_str(frac);
        }
    }
    if neg && res.chars().any(|c| c.is_ascii_digit() && c != '0') {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_brl(n: f64) -> String {
    format!("R$ {}", format_number(n, 2))
}

pub fn format_opt_brl(n: Option<f64>) -> String {
    n.map(format_brl).unwrap_or_else(|| UNDEFINED.to_string())
}

pub fn format_pct(n: Option<f64>) -> String {
    n.map(|v| format!("{}%", format_number(v, 2)))
        .unwrap_or_else(|| UNDEFINED.to_string())
}

/// Signed variant used for deltas (`+12,50%`).
pub fn format_signed_pct(n: Option<f64>) -> String {
    match n {
        Some(v) if v > 0.0 => format!("+{}%", format_number(v, 2)),
        other => format_pct(other),
    }
}

/// Insertion counts; zero renders as `-` like an empty spreadsheet cell.
pub fn format_count(n: u64) -> String {
    if n == 0 {
        "-".to_string()
    } else {
        format_int(n)
    }
}

pub fn format_signed_count(n: i64) -> String {
    match n {
        0 => "-".to_string(),
        n if n > 0 => format!("+{}", format_int(n)),
        n => format_int(n),
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::pt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_brazilian_currency() {
        assert_eq!(parse_currency_br(Some("R$ 1.234,56")), 1234.56);
        assert_eq!(parse_currency_br(Some("(1.234,56)")), -1234.56);
        assert_eq!(parse_currency_br(Some("-150")), -150.0);
        assert_eq!(parse_currency_br(Some("R$\u{a0}2.000.000")), 2_000_000.0);
        assert_eq!(parse_currency_br(Some("1.234")), 1234.0);
        assert_eq!(parse_currency_br(Some("100.5")), 100.5);
    }

    #[test]
    fn unparseable_currency_coerces_to_zero() {
        assert_eq!(parse_currency_br(Some("n/d")), 0.0);
        assert_eq!(parse_currency_br(Some("")), 0.0);
        assert_eq!(parse_currency_br(None), 0.0);
        assert!(parse_currency_br_opt(Some("abc")).is_none());
    }

    #[test]
    fn parses_counts() {
        assert_eq!(parse_count(Some("12")), 12);
        assert_eq!(parse_count(Some("12.0")), 12);
        assert_eq!(parse_count(Some("1.200")), 1200);
        assert_eq!(parse_count(Some("-3")), 0);
        assert_eq!(parse_count(Some("x")), 0);
        assert_eq!(parse_count(None), 0);
    }

    #[test]
    fn parses_date_shapes() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day);
        assert_eq!(parse_date_flexible(Some("2024-03-15")), d(2024, 3, 15));
        assert_eq!(parse_date_flexible(Some("2024-03-15 00:00:00")), d(2024, 3, 15));
        assert_eq!(parse_date_flexible(Some("15/03/2024")), d(2024, 3, 15));
        assert_eq!(parse_date_flexible(Some("15/03/24")), d(2024, 3, 15));
        assert_eq!(parse_date_flexible(Some("03/2024")), d(2024, 3, 1));
        assert_eq!(parse_date_flexible(Some("'03/2024")), d(2024, 3, 1));
        assert_eq!(parse_date_flexible(Some("45366")), d(2024, 3, 15));
        assert_eq!(parse_date_flexible(Some("soon")), None);
        assert_eq!(parse_date_flexible(Some("31/02/2024")), None);
    }

    #[test]
    fn month_labels_use_two_digit_year() {
        assert_eq!(month_label(2024, 3), "Mar/24");
        assert_eq!(month_label(2005, 12), "Dec/05");
    }

    #[test]
    fn normalizes_names_keeping_acronyms() {
        assert_eq!(normalize_text("  padaria   SANTA LUZIA "), "Padaria Santa Luzia");
        assert_eq!(normalize_text("TH+ prime"), "TH+ Prime");
        assert_eq!(normalize_text("FM"), "FM");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn ratios_are_undefined_without_positive_denominator() {
        assert_eq!(ratio(10.0, 4.0), Some(2.5));
        assert_eq!(ratio(10.0, 0.0), None);
        assert_eq!(pct_change(0.0, 50.0), None);
        assert_eq!(pct_change(100.0, 150.0), Some(50.0));
    }

    #[test]
    fn formats_brazilian_numbers() {
        assert_eq!(format_brl(1234567.891), "R$ 1.234.567,89");
        assert_eq!(format_brl(-50.0), "R$ -50,00");
        assert_eq!(format_pct(Some(12.5)), "12,50%");
        assert_eq!(format_pct(None), UNDEFINED);
        assert_eq!(format_count(0), "-");
        assert_eq!(format_count(1500), "1.500");
    }
}
