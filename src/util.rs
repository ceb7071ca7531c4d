// Parsing and formatting helpers.
//
// This module centralizes the "dirty" locale handling of the source CSV so
// the rest of the code can assume clean, typed values: amounts arrive as
// Spanish-formatted strings ("1.234,56") and periods as free-form numerics.
use num_format::{Locale, ToFormattedString};

/// Base path of the official open-data archives the dataset is consolidated
/// from. Used only to build reference links, never fetched.
pub const ARCHIVE_BASE_URL: &str =
    "https://www.comunidad.madrid/transparencia/sites/default/files/open-data/downloads";

/// Normalize a locale-formatted amount ("1.234,56") into `f64`.
///
/// - Strips `.` grouping separators, then turns the decimal comma into a
///   decimal point.
/// - Any parse failure yields `Err(())` so the caller can coerce to `0.0`
///   while keeping count of how often it happened. Negative and non-finite
///   results are treated as failures too: a valid Importe is never negative.
pub fn parse_amount(s: &str) -> Result<f64, ()> {
    let s = s.trim();
    if s.is_empty() {
        return Err(());
    }
    let normalized = s.replace('.', "").replace(',', ".");
    match normalized.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(()),
    }
}

/// Parse a Periodo cell into an integer year.
///
/// The consolidated file mostly carries plain integers, but exports have been
/// seen with float renderings like `2021.0`; accept those when the fraction
/// is zero. Anything else is "missing" and drops the row upstream.
pub fn parse_period(s: &str) -> Option<i32> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(v) = s.parse::<i32>() {
        return Some(v);
    }
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 => Some(v as i32),
        _ => None,
    }
}

/// Display an amount as whole euros with dot-grouped thousands, e.g.
/// `12.345.678 €`. Display convention only; aggregation keeps full precision.
pub fn euros(x: f64) -> String {
    let n = x.round() as i64;
    format!("{} €", n.to_formatted_string(&Locale::es))
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    // Counts in console messages (e.g., "9.855 filas"). Same Spanish
    // grouping as the currency formatter.
    n.to_formatted_string(&Locale::es)
}

/// Two-decimal percentage for display.
pub fn format_percent(p: f64) -> String {
    format!("{:.2}%", p)
}

/// Canonical download link for the official per-period archive.
pub fn archive_url(period: i32) -> String {
    format!("{}/planes_de_medios_{}_excel.zip", ARCHIVE_BASE_URL, period)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_grouped_decimal_comma_amounts() {
        assert_eq!(parse_amount("1.234,56"), Ok(1234.56));
        assert_eq!(parse_amount("1.000,00"), Ok(1000.0));
        assert_eq!(parse_amount("12"), Ok(12.0));
        assert_eq!(parse_amount("0,5"), Ok(0.5));
    }

    #[test]
    fn rejects_malformed_and_negative_amounts() {
        assert_eq!(parse_amount("abc"), Err(()));
        assert_eq!(parse_amount(""), Err(()));
        assert_eq!(parse_amount("  "), Err(()));
        assert_eq!(parse_amount("-5,00"), Err(()));
    }

    #[test]
    fn parses_integer_and_float_periods() {
        assert_eq!(parse_period("2021"), Some(2021));
        assert_eq!(parse_period(" 2024 "), Some(2024));
        assert_eq!(parse_period("2021.0"), Some(2021));
        assert_eq!(parse_period("N/D"), None);
        assert_eq!(parse_period("2021.5"), None);
    }

    #[test]
    fn formats_euros_with_dot_grouping() {
        assert_eq!(euros(12345678.0), "12.345.678 €");
        assert_eq!(euros(999.4), "999 €");
        assert_eq!(euros(0.0), "0 €");
    }

    #[test]
    fn builds_archive_links() {
        assert_eq!(
            archive_url(2022),
            "https://www.comunidad.madrid/transparencia/sites/default/files/open-data/downloads/planes_de_medios_2022_excel.zip"
        );
    }
}
