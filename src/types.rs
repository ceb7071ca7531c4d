use serde::{Deserialize, Serialize};
use tabled::Tabled;

/// One raw line of the consolidated CSV, before any cleaning. Everything is
/// optional text: the loader decides what survives.
#[derive(Debug, Deserialize)]
pub struct RawRow {
    #[serde(rename = "Periodo")]
    pub periodo: Option<String>,
    #[serde(rename = "Tipo")]
    pub tipo: Option<String>,
    #[serde(rename = "Soporte")]
    pub soporte: Option<String>,
    #[serde(rename = "Importe")]
    pub importe: Option<String>,
    #[serde(rename = "Origen")]
    pub origen: Option<String>,
}

/// A cleaned spending record. Invariants established by the loader:
/// `period` within [2021, 2024], `amount` finite and non-negative,
/// `media_type` and `outlet` non-empty.
#[derive(Debug, Clone, PartialEq)]
pub struct SpendRecord {
    pub period: i32,
    pub media_type: String,
    pub outlet: String,
    pub amount: f64,
    pub source: String,
}

/// Conjunctive filter over the loaded table. `None` means "Todos".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FilterSelection {
    pub period: Option<i32>,
    pub media_type: Option<String>,
    pub outlet: Option<String>,
}

impl FilterSelection {
    pub fn matches(&self, r: &SpendRecord) -> bool {
        self.period.map_or(true, |p| r.period == p)
            && self.media_type.as_deref().map_or(true, |t| r.media_type == t)
            && self.outlet.as_deref().map_or(true, |s| r.outlet == s)
    }

    /// One-line description used in headers and in the PDF filter block.
    pub fn describe(&self) -> String {
        fn or_todos(v: Option<&str>) -> String {
            v.map_or_else(|| "Todos".to_string(), |s| s.to_string())
        }
        format!(
            "Periodo={}, Tipo={}, Soporte={}",
            self.period
                .map_or_else(|| "Todos".to_string(), |p| p.to_string()),
            or_todos(self.media_type.as_deref()),
            or_todos(self.outlet.as_deref()),
        )
    }
}

/// The three presentation views the shell can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Summary,
    Evolution,
    RawData,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct TypeShareRow {
    #[serde(rename = "Tipo")]
    #[tabled(rename = "Tipo")]
    pub tipo: String,
    #[serde(rename = "Importe")]
    #[tabled(rename = "Importe")]
    pub importe: String,
    #[serde(rename = "PctTotal")]
    #[tabled(rename = "% del total")]
    pub pct_total: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct OutletRankRow {
    #[serde(rename = "Puesto")]
    #[tabled(rename = "Puesto")]
    pub puesto: usize,
    #[serde(rename = "Soporte")]
    #[tabled(rename = "Soporte")]
    pub soporte: String,
    #[serde(rename = "Importe")]
    #[tabled(rename = "Importe")]
    pub importe: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct EvolutionRow {
    #[serde(rename = "Periodo")]
    #[tabled(rename = "Periodo")]
    pub periodo: i32,
    #[serde(rename = "Importe")]
    #[tabled(rename = "Importe")]
    pub importe: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct RawDataRow {
    #[serde(rename = "Periodo")]
    #[tabled(rename = "Periodo")]
    pub periodo: i32,
    #[serde(rename = "Tipo")]
    #[tabled(rename = "Tipo")]
    pub tipo: String,
    #[serde(rename = "Soporte")]
    #[tabled(rename = "Soporte")]
    pub soporte: String,
    #[serde(rename = "Importe")]
    #[tabled(rename = "Importe")]
    pub importe: String,
    #[serde(rename = "Origen")]
    #[tabled(rename = "Origen")]
    pub origen: String,
}

/// Headline metrics for the current selection, written to `summary.json`
/// and shown at the top of every view.
#[derive(Debug, Serialize)]
pub struct SelectionMetrics {
    pub registros: usize,
    pub inversion_total: f64,
    pub soportes_unicos: usize,
}
