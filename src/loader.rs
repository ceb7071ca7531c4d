use crate::error::DataLoadError;
use crate::types::{RawRow, SpendRecord};
use crate::util::{parse_amount, parse_period};
use csv::ReaderBuilder;
use log::debug;
use std::fs::File;
use std::ops::RangeInclusive;
use std::path::Path;

/// Periods the consolidated dataset is valid for. Rows outside this range
/// are dropped at load time and never reach aggregation.
pub const VALID_PERIODS: RangeInclusive<i32> = 2021..=2024;

const REQUIRED_COLUMNS: [&str; 5] = ["Periodo", "Tipo", "Soporte", "Importe", "Origen"];

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub total_rows: usize,
    pub loaded_rows: usize,
    pub out_of_range_rows: usize,
    /// Importe cells that could not be parsed and were coerced to 0.0. A
    /// malformed value is indistinguishable from a real zero in the data
    /// itself, so this counter is the only audit trail.
    pub amount_parse_failures: usize,
    pub blank_label_rows: usize,
}

/// Load and clean the consolidated CSV.
///
/// The file is semicolon-delimited UTF-8 (the `csv` reader strips an
/// optional BOM). Importe is normalized from Spanish formatting
/// ("1.234,56"); a cell that fails to parse becomes 0.0 and is counted.
/// Periodo must parse to a year inside [`VALID_PERIODS`] or the row is
/// dropped, as are rows with a blank Tipo or Soporte.
pub fn load(path: &Path) -> Result<(Vec<SpendRecord>, LoadReport), DataLoadError> {
    let file = File::open(path).map_err(|source| DataLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut rdr = ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(file);

    let headers = rdr.headers()?.clone();
    for col in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == col) {
            return Err(DataLoadError::MissingColumn(col.to_string()));
        }
    }

    let mut total_rows = 0usize;
    let mut out_of_range_rows = 0usize;
    let mut amount_parse_failures = 0usize;
    let mut blank_label_rows = 0usize;
    let mut records: Vec<SpendRecord> = Vec::new();

    for result in rdr.deserialize::<RawRow>() {
        total_rows += 1;
        let row = match result {
            Ok(r) => r,
            Err(_) => {
                // Structurally broken line; treat like an unparsable period.
                out_of_range_rows += 1;
                continue;
            }
        };

        let period = match row.periodo.as_deref().and_then(parse_period) {
            Some(p) if VALID_PERIODS.contains(&p) => p,
            _ => {
                out_of_range_rows += 1;
                continue;
            }
        };

        let media_type = row.tipo.unwrap_or_default().trim().to_string();
        let outlet = row.soporte.unwrap_or_default().trim().to_string();
        if media_type.is_empty() || outlet.is_empty() {
            blank_label_rows += 1;
            continue;
        }

        // Parse-to-zero policy: a bad Importe keeps the row, at value 0.0.
        let amount = match row.importe.as_deref().map(parse_amount) {
            Some(Ok(v)) => v,
            _ => {
                amount_parse_failures += 1;
                0.0
            }
        };

        let source = row.origen.unwrap_or_default().trim().to_string();

        records.push(SpendRecord {
            period,
            media_type,
            outlet,
            amount,
            source,
        });
    }

    let report = LoadReport {
        total_rows,
        loaded_rows: records.len(),
        out_of_range_rows,
        amount_parse_failures,
        blank_label_rows,
    };
    debug!(
        "loaded {} of {} rows ({} out of range, {} amount failures, {} blank labels)",
        report.loaded_rows,
        report.total_rows,
        report.out_of_range_rows,
        report.amount_parse_failures,
        report.blank_label_rows
    );
    Ok((records, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    const HEADER: &str = "Periodo;Tipo;Soporte;Importe;Origen\n";

    #[test]
    fn loads_and_normalizes_amounts() {
        let f = write_fixture(&format!(
            "{HEADER}2021;TV;CanalX;1.000,00;O1\n2021;TV;CanalY;2.000,00;O1\n"
        ));
        let (records, report) = load(f.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].amount, 1000.0);
        assert_eq!(records[1].amount, 2000.0);
        assert_eq!(report.amount_parse_failures, 0);
    }

    #[test]
    fn strips_utf8_bom_from_header() {
        let f = write_fixture(&format!("\u{feff}{HEADER}2022;Prensa;DiarioZ;5,50;O1\n"));
        let (records, _) = load(f.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].period, 2022);
        assert_eq!(records[0].amount, 5.5);
    }

    #[test]
    fn malformed_amount_becomes_zero_and_is_counted() {
        let f = write_fixture(&format!("{HEADER}2021;Radio;OndaQ;abc;O1\n"));
        let (records, report) = load(f.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amount, 0.0);
        assert_eq!(report.amount_parse_failures, 1);
    }

    #[test]
    fn out_of_range_periods_are_dropped() {
        let f = write_fixture(&format!(
            "{HEADER}2025;TV;CanalX;1,00;O1\n2020;TV;CanalX;1,00;O1\n2024;TV;CanalX;1,00;O1\n"
        ));
        let (records, report) = load(f.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].period, 2024);
        assert_eq!(report.out_of_range_rows, 2);
    }

    #[test]
    fn non_numeric_period_drops_the_row() {
        let f = write_fixture(&format!("{HEADER}N/D;TV;CanalX;1,00;O1\n"));
        let (records, report) = load(f.path()).unwrap();
        assert!(records.is_empty());
        assert_eq!(report.out_of_range_rows, 1);
    }

    #[test]
    fn blank_labels_drop_the_row() {
        let f = write_fixture(&format!("{HEADER}2021;;CanalX;1,00;O1\n2021;TV; ;1,00;O1\n"));
        let (records, report) = load(f.path()).unwrap();
        assert!(records.is_empty());
        assert_eq!(report.blank_label_rows, 2);
    }

    #[test]
    fn missing_column_is_fatal() {
        let f = write_fixture("Periodo;Tipo;Soporte;Importe\n2021;TV;CanalX;1,00\n");
        match load(f.path()) {
            Err(DataLoadError::MissingColumn(col)) => assert_eq!(col, "Origen"),
            other => panic!("expected MissingColumn, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn missing_file_is_fatal() {
        assert!(matches!(
            load(Path::new("no_such_file.csv")),
            Err(DataLoadError::Io { .. })
        ));
    }
}
