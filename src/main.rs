// Entry point and interactive query flow.
//
// The shell is a plain menu loop over the core pipeline:
// filter -> aggregate -> (tables | charts) -> optional PDF export.
// Each interaction re-evaluates the pipeline from the loaded table; the
// table itself is loaded once and never mutated.
use clap::Parser;
use log::info;
use once_cell::sync::Lazy;
use plan_medios::aggregate::{
    self, AggregateCache, GroupField, DEFAULT_TOP_N,
};
use plan_medios::types::{
    EvolutionRow, FilterSelection, OutletRankRow, RawDataRow, SelectionMetrics, SpendRecord,
    TypeShareRow, View,
};
use plan_medios::{charts, loader, output, report, util};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;

const REPORT_TITLE: &str = "Consulta Plan de Medios – Comunidad de Madrid";
const SUMMARY_JSON: &str = "summary.json";
const RAW_DATA_CSV: &str = "consulta_datos.csv";
const RAW_PREVIEW_ROWS: usize = 20;

/// Selections above this size are refused for PDF export before any chart
/// is rasterized.
const MAX_REPORT_ROWS: usize = 3000;

// In-memory session state: the table is loaded once, filters and the memo
// cache live alongside it for the rest of the run.
static APP_STATE: Lazy<Mutex<AppState>> = Lazy::new(|| {
    Mutex::new(AppState {
        data: None,
        filter: FilterSelection::default(),
        view: View::Summary,
        cache: AggregateCache::default(),
    })
});

struct AppState {
    data: Option<Vec<SpendRecord>>,
    filter: FilterSelection,
    view: View,
    cache: AggregateCache,
}

#[derive(Parser, Debug)]
#[command(name = "plan_medios", about = "Consulta del gasto en planes de medios (2021-2024)")]
struct Cli {
    /// Fichero CSV consolidado a cargar.
    #[arg(long, default_value = "Plan_consolidado.csv")]
    data: PathBuf,

    /// Tamaño del ranking de soportes.
    #[arg(long, default_value_t = DEFAULT_TOP_N)]
    top: usize,
}

fn read_line(prompt: &str) -> String {
    print!("{}", prompt);
    let _ = io::stdout().flush();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    buf.trim().to_string()
}

/// Fetch a clone of the loaded table, or complain and return `None`.
fn loaded_data() -> Option<Vec<SpendRecord>> {
    let state = APP_STATE.lock().unwrap();
    let data = state.data.clone();
    if data.is_none() {
        println!("Error: no hay datos cargados. Usa la opción 1 primero.\n");
    }
    data
}

fn handle_load(path: &PathBuf) {
    match loader::load(path) {
        Ok((data, load_report)) => {
            println!(
                "Procesando datos... ({} filas leídas, {} válidas para 2021–2024)",
                util::format_int(load_report.total_rows as i64),
                util::format_int(load_report.loaded_rows as i64)
            );
            if load_report.out_of_range_rows > 0 {
                println!(
                    "Nota: {} filas descartadas por periodo ausente o fuera de rango.",
                    util::format_int(load_report.out_of_range_rows as i64)
                );
            }
            if load_report.blank_label_rows > 0 {
                println!(
                    "Nota: {} filas descartadas por Tipo o Soporte vacíos.",
                    util::format_int(load_report.blank_label_rows as i64)
                );
            }
            if load_report.amount_parse_failures > 0 {
                println!(
                    "Aviso: {} importes ilegibles contabilizados como 0.",
                    util::format_int(load_report.amount_parse_failures as i64)
                );
            }
            println!();
            let mut state = APP_STATE.lock().unwrap();
            state.cache.rebind(&data);
            state.data = Some(data);
        }
        Err(e) => {
            eprintln!("No se pudo cargar el fichero: {}\n", e);
        }
    }
}

fn handle_filters() {
    let Some(data) = loaded_data() else { return };

    println!(
        "Periodos disponibles: {}",
        aggregate::sorted_periods(&data)
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    let period_input = read_line("Periodo [Todos]: ");
    let period = match period_input.as_str() {
        "" | "Todos" | "todos" => None,
        s => match s.parse::<i32>() {
            Ok(p) => Some(p),
            Err(_) => {
                println!("Periodo no reconocido, se usa Todos.");
                None
            }
        },
    };

    println!(
        "Tipos disponibles: {}",
        aggregate::sorted_types(&data).join(", ")
    );
    let tipo_input = read_line("Tipo de medio [Todos]: ");
    let media_type = match tipo_input.as_str() {
        "" | "Todos" | "todos" => None,
        s => Some(s.to_string()),
    };

    let soporte_input = read_line("Soporte [Todos]: ");
    let outlet = match soporte_input.as_str() {
        "" | "Todos" | "todos" => None,
        s => Some(s.to_string()),
    };

    let filter = FilterSelection {
        period,
        media_type,
        outlet,
    };
    println!("Filtros activos: {}\n", filter.describe());
    APP_STATE.lock().unwrap().filter = filter;
}

fn selection_metrics(filtered: &[SpendRecord]) -> SelectionMetrics {
    SelectionMetrics {
        registros: filtered.len(),
        inversion_total: filtered.iter().map(|r| r.amount).sum(),
        soportes_unicos: aggregate::distinct_outlets(filtered),
    }
}

fn metrics_pairs(m: &SelectionMetrics) -> Vec<(String, String)> {
    vec![
        ("Registros".to_string(), util::format_int(m.registros as i64)),
        ("Inversión total".to_string(), util::euros(m.inversion_total)),
        (
            "Soportes únicos".to_string(),
            util::format_int(m.soportes_unicos as i64),
        ),
    ]
}

fn print_metrics(m: &SelectionMetrics) {
    for (label, value) in metrics_pairs(m) {
        println!("  {}: {}", label, value);
    }
    println!();
}

/// Evaluate the current selection; the empty-selection path reports and
/// short-circuits before any aggregation runs.
fn current_selection(data: &[SpendRecord], filter: &FilterSelection) -> Option<Vec<SpendRecord>> {
    let filtered = aggregate::apply_filter(data, filter);
    if filtered.is_empty() {
        println!("No hay datos para esta combinación.\n");
        return None;
    }
    Some(filtered)
}

fn handle_view(view: View, top_n: usize) {
    let Some(data) = loaded_data() else { return };
    let filter = {
        let mut state = APP_STATE.lock().unwrap();
        state.view = view;
        state.filter.clone()
    };
    let Some(filtered) = current_selection(&data, &filter) else {
        return;
    };

    println!("Filtros activos: {}", filter.describe());
    let metrics = selection_metrics(&filtered);
    print_metrics(&metrics);

    match view {
        View::Summary => {
            let (by_type, by_outlet) = {
                let mut state = APP_STATE.lock().unwrap();
                (
                    state.cache.grouped(&data, &filter, GroupField::Type),
                    state.cache.grouped(&data, &filter, GroupField::Outlet),
                )
            };
            let total = by_type.total();
            let share_rows: Vec<TypeShareRow> = by_type
                .iter()
                .map(|(tipo, importe)| TypeShareRow {
                    tipo: tipo.to_string(),
                    importe: util::euros(importe),
                    pct_total: util::format_percent(aggregate::percentage_of_total(
                        importe, total,
                    )),
                })
                .collect();
            println!("Inversión por tipo de medio:");
            output::preview_table(&share_rows, share_rows.len());

            let ranking = aggregate::rank_top_n(&by_outlet, top_n);
            let rank_rows: Vec<OutletRankRow> = ranking
                .into_iter()
                .enumerate()
                .map(|(i, (soporte, importe))| OutletRankRow {
                    puesto: i + 1,
                    soporte,
                    importe: util::euros(importe),
                })
                .collect();
            println!("Top {} soportes por inversión:", top_n);
            output::preview_table(&rank_rows, rank_rows.len());
        }
        View::Evolution => {
            let series = aggregate::time_series(&filtered);
            let rows: Vec<EvolutionRow> = series
                .into_iter()
                .map(|(periodo, importe)| EvolutionRow {
                    periodo,
                    importe: util::euros(importe),
                })
                .collect();
            println!("Evolución de la inversión:");
            output::preview_table(&rows, rows.len());
        }
        View::RawData => {
            let mut sorted = filtered.clone();
            sorted.sort_by(|a, b| {
                b.period.cmp(&a.period).then_with(|| {
                    b.amount
                        .partial_cmp(&a.amount)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
            });
            let rows: Vec<RawDataRow> = sorted
                .iter()
                .map(|r| RawDataRow {
                    periodo: r.period,
                    tipo: r.media_type.clone(),
                    soporte: r.outlet.clone(),
                    importe: util::euros(r.amount),
                    origen: r.source.clone(),
                })
                .collect();
            output::preview_table(&rows, RAW_PREVIEW_ROWS);
            if let Err(e) = output::write_csv(RAW_DATA_CSV, &rows) {
                eprintln!("Error al escribir el CSV: {}", e);
            } else {
                println!("(Tabla completa exportada a {})\n", RAW_DATA_CSV);
            }
        }
    }
}

/// Quick per-outlet query: totals, share, rank and evolution for a single
/// media vehicle, answered from the unfiltered table (plus the active
/// period filter, matching the interactive app's behavior).
fn handle_quick_lookup() {
    let Some(data) = loaded_data() else { return };
    let outlet = read_line("Nombre del soporte: ");
    if outlet.is_empty() {
        return;
    }
    if !data.iter().any(|r| r.outlet == outlet) {
        println!("'{}' no aparece en el conjunto de datos.\n", outlet);
        return;
    }

    let period = APP_STATE.lock().unwrap().filter.period;
    let outlet_filter = FilterSelection {
        period,
        media_type: None,
        outlet: Some(outlet.clone()),
    };
    let outlet_rows = aggregate::apply_filter(&data, &outlet_filter);
    let Some(first) = outlet_rows.first() else {
        println!("No hay datos de '{}' para el periodo activo.\n", outlet);
        return;
    };
    let media_type = first.media_type.clone();
    let outlet_total: f64 = outlet_rows.iter().map(|r| r.amount).sum();
    let global_total: f64 = data.iter().map(|r| r.amount).sum();

    // The outlet was just checked against the base table, so the ranking
    // lookup cannot miss; surface a bug loudly if it ever does.
    let base_ranking = aggregate::sum_by(&data, GroupField::Outlet);
    let position = match aggregate::rank_position(&base_ranking, &outlet) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error interno de ranking: {}", e);
            return;
        }
    };

    println!("\nConsulta rápida: {}", outlet);
    println!("  Inversión total: {}", util::euros(outlet_total));
    println!(
        "  % del total: {}",
        util::format_percent(aggregate::percentage_of_total(outlet_total, global_total))
    );
    println!("  Tipo de medio: {}", media_type);
    println!("  Ranking: #{}\n", position);

    let rows: Vec<EvolutionRow> = aggregate::time_series(&outlet_rows)
        .into_iter()
        .map(|(periodo, importe)| EvolutionRow {
            periodo,
            importe: util::euros(importe),
        })
        .collect();
    output::preview_table(&rows, rows.len());

    println!(
        "Entre 2021 y 2024, la Comunidad de Madrid destinó {} en publicidad institucional a {}.\n",
        util::euros(outlet_total),
        outlet
    );
}

fn handle_export(top_n: usize) {
    let Some(data) = loaded_data() else { return };
    let (filter, view) = {
        let state = APP_STATE.lock().unwrap();
        (state.filter.clone(), state.view)
    };
    let Some(filtered) = current_selection(&data, &filter) else {
        return;
    };
    if filtered.len() > MAX_REPORT_ROWS {
        println!(
            "La selección tiene {} registros; el informe PDF se limita a {}. Ajusta los filtros para exportar.\n",
            util::format_int(filtered.len() as i64),
            util::format_int(MAX_REPORT_ROWS as i64)
        );
        return;
    }

    let metrics = selection_metrics(&filtered);
    let pairs = metrics_pairs(&metrics);

    let charts_result = match view {
        View::Summary => {
            let (by_type, by_outlet) = {
                let mut state = APP_STATE.lock().unwrap();
                (
                    state.cache.grouped(&data, &filter, GroupField::Type),
                    state.cache.grouped(&data, &filter, GroupField::Outlet),
                )
            };
            let ranking = aggregate::rank_top_n(&by_outlet, top_n);
            charts::spend_by_type(&by_type)
                .and_then(|a| charts::top_outlets(&ranking).map(|b| vec![a, b]))
        }
        View::Evolution => {
            charts::evolution(&aggregate::time_series(&filtered)).map(|c| vec![c])
        }
        // Metrics-only report for the raw-data view.
        View::RawData => Ok(Vec::new()),
    };
    let chart_images = match charts_result {
        Ok(c) => c,
        Err(e) => {
            eprintln!("No se pudo generar el informe: {}\n", e);
            return;
        }
    };

    match report::build_report(REPORT_TITLE, &filter.describe(), &pairs, &chart_images) {
        Ok(bytes) => {
            info!("report assembled: {} bytes, {} charts", bytes.len(), chart_images.len());
            let path = PathBuf::from(report::PDF_FILENAME);
            if let Err(e) = output::write_pdf(&path, &bytes) {
                eprintln!("Error al escribir el PDF: {}", e);
                return;
            }
            if let Err(e) = output::write_json(SUMMARY_JSON, &metrics) {
                eprintln!("Error al escribir {}: {}", SUMMARY_JSON, e);
            }
            println!(
                "Informe exportado a {} ({}); métricas en {}.\n",
                report::PDF_FILENAME,
                report::PDF_MIME,
                SUMMARY_JSON
            );
        }
        Err(e) => eprintln!("No se pudo generar el informe: {}\n", e),
    }
}

fn handle_sources() {
    let Some(data) = loaded_data() else { return };
    let filter = APP_STATE.lock().unwrap().filter.clone();
    let Some(filtered) = current_selection(&data, &filter) else {
        return;
    };
    println!("Fuentes oficiales:");
    for p in aggregate::sorted_periods(&filtered) {
        println!("  {}: {}", p, util::archive_url(p));
    }
    println!();
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    loop {
        println!("Plan de Medios · Comunidad de Madrid (2021–2024)");
        println!("[1] Cargar datos");
        println!("[2] Definir filtros");
        println!("[3] Vista Resumen");
        println!("[4] Vista Evolución");
        println!("[5] Vista Datos");
        println!("[6] Consulta rápida de un soporte");
        println!("[7] Exportar informe PDF");
        println!("[8] Fuentes oficiales");
        println!("[0] Salir\n");
        match read_line("Opción: ").as_str() {
            "1" => handle_load(&cli.data),
            "2" => handle_filters(),
            "3" => handle_view(View::Summary, cli.top),
            "4" => handle_view(View::Evolution, cli.top),
            "5" => handle_view(View::RawData, cli.top),
            "6" => handle_quick_lookup(),
            "7" => handle_export(cli.top),
            "8" => handle_sources(),
            "0" | "q" => {
                println!("Hasta pronto.");
                break;
            }
            _ => println!("Opción no válida.\n"),
        }
    }
}
