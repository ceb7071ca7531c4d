// Chart rasterization.
//
// Charts are drawn with plotters into an in-memory RGB buffer and encoded
// to PNG, so no temporary file ever exists no matter how report assembly
// ends. The rasters carry no text: numeric detail lives in the tables next
// to them, which keeps rendering independent of any font machinery.
use crate::aggregate::Aggregate;
use crate::error::ReportError;
use plotters::prelude::*;
use std::io::Cursor;

/// 16:9 raster, placed at 16x9 cm in the PDF.
pub const CHART_WIDTH: u32 = 960;
pub const CHART_HEIGHT: u32 = 540;

const SERIES_COLORS: [RGBColor; 6] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
];

/// A chart already rendered to PNG bytes, ready for PDF embedding.
#[derive(Debug, Clone)]
pub struct ChartImage {
    pub png: Vec<u8>,
}

fn encode_png(buf: Vec<u8>) -> Result<ChartImage, ReportError> {
    let img = image::RgbImage::from_raw(CHART_WIDTH, CHART_HEIGHT, buf)
        .ok_or_else(|| ReportError::Chart("unexpected raster buffer size".to_string()))?;
    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| ReportError::Chart(e.to_string()))?;
    Ok(ChartImage { png })
}

fn chart_err<E: std::fmt::Display>(e: E) -> ReportError {
    ReportError::Chart(e.to_string())
}

/// Vertical bars, one per media type, in the aggregate's insertion order.
pub fn spend_by_type(agg: &Aggregate) -> Result<ChartImage, ReportError> {
    let mut buf = vec![0u8; (CHART_WIDTH * CHART_HEIGHT * 3) as usize];
    {
        let root =
            BitMapBackend::with_buffer(&mut buf, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(chart_err)?;
        if !agg.is_empty() {
            let n = agg.len();
            let max = agg.iter().map(|(_, v)| v).fold(0.0f64, f64::max).max(1.0);
            let mut chart = ChartBuilder::on(&root)
                .margin(24)
                .build_cartesian_2d(0.0..n as f64, 0.0..max * 1.1)
                .map_err(chart_err)?;
            chart
                .draw_series(agg.iter().enumerate().map(|(i, (_, v))| {
                    let color = SERIES_COLORS[i % SERIES_COLORS.len()];
                    Rectangle::new([(i as f64 + 0.2, 0.0), (i as f64 + 0.8, v)], color.filled())
                }))
                .map_err(chart_err)?;
        }
        root.present().map_err(chart_err)?;
    }
    encode_png(buf)
}

/// Horizontal bars for an already-ranked outlet list, largest at the top.
pub fn top_outlets(ranking: &[(String, f64)]) -> Result<ChartImage, ReportError> {
    let mut buf = vec![0u8; (CHART_WIDTH * CHART_HEIGHT * 3) as usize];
    {
        let root =
            BitMapBackend::with_buffer(&mut buf, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(chart_err)?;
        if !ranking.is_empty() {
            let n = ranking.len();
            let max = ranking.iter().map(|(_, v)| *v).fold(0.0f64, f64::max).max(1.0);
            let mut chart = ChartBuilder::on(&root)
                .margin(24)
                .build_cartesian_2d(0.0..max * 1.1, 0.0..n as f64)
                .map_err(chart_err)?;
            chart
                .draw_series(ranking.iter().enumerate().map(|(i, (_, v))| {
                    // First entry drawn at the top of the axis.
                    let base = (n - 1 - i) as f64;
                    Rectangle::new(
                        [(0.0, base + 0.2), (*v, base + 0.8)],
                        SERIES_COLORS[0].filled(),
                    )
                }))
                .map_err(chart_err)?;
        }
        root.present().map_err(chart_err)?;
    }
    encode_png(buf)
}

/// Per-period spending line with point markers, chronological left to right.
pub fn evolution(series: &[(i32, f64)]) -> Result<ChartImage, ReportError> {
    let mut buf = vec![0u8; (CHART_WIDTH * CHART_HEIGHT * 3) as usize];
    {
        let root =
            BitMapBackend::with_buffer(&mut buf, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(chart_err)?;
        if !series.is_empty() {
            let min_p = series[0].0 as f64;
            let max_p = series[series.len() - 1].0 as f64;
            let max = series.iter().map(|(_, v)| *v).fold(0.0f64, f64::max).max(1.0);
            let mut chart = ChartBuilder::on(&root)
                .margin(24)
                .build_cartesian_2d(min_p - 0.5..max_p + 0.5, 0.0..max * 1.1)
                .map_err(chart_err)?;
            let points: Vec<(f64, f64)> =
                series.iter().map(|(p, v)| (*p as f64, *v)).collect();
            chart
                .draw_series(LineSeries::new(
                    points.iter().copied(),
                    SERIES_COLORS[0].stroke_width(3),
                ))
                .map_err(chart_err)?;
            chart
                .draw_series(
                    points
                        .iter()
                        .map(|p| Circle::new(*p, 6, SERIES_COLORS[0].filled())),
                )
                .map_err(chart_err)?;
        }
        root.present().map_err(chart_err)?;
    }
    encode_png(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{sum_by, GroupField};
    use crate::types::SpendRecord;

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

    fn sample() -> Vec<SpendRecord> {
        vec![
            SpendRecord {
                period: 2021,
                media_type: "TV".into(),
                outlet: "CanalX".into(),
                amount: 1000.0,
                source: "O1".into(),
            },
            SpendRecord {
                period: 2022,
                media_type: "Prensa".into(),
                outlet: "DiarioZ".into(),
                amount: 500.0,
                source: "O1".into(),
            },
        ]
    }

    #[test]
    fn renders_type_bars_as_png() {
        let agg = sum_by(&sample(), GroupField::Type);
        let img = spend_by_type(&agg).unwrap();
        assert_eq!(&img.png[..8], &PNG_MAGIC);
    }

    #[test]
    fn renders_outlet_ranking_as_png() {
        let ranking = vec![("CanalX".to_string(), 1000.0), ("DiarioZ".to_string(), 500.0)];
        let img = top_outlets(&ranking).unwrap();
        assert_eq!(&img.png[..8], &PNG_MAGIC);
    }

    #[test]
    fn renders_evolution_line_as_png() {
        let img = evolution(&[(2021, 1000.0), (2022, 500.0)]).unwrap();
        assert_eq!(&img.png[..8], &PNG_MAGIC);
    }

    #[test]
    fn empty_inputs_still_render() {
        assert!(spend_by_type(&Aggregate::default()).is_ok());
        assert!(top_outlets(&[]).is_ok());
        assert!(evolution(&[]).is_ok());
    }
}
