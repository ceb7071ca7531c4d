// PDF report assembly.
//
// The builder lays out a title block, the active-filter line, a two-column
// metrics table and the supplied chart rasters on A4 pages, breaking to a
// new page whenever the cursor would run past the bottom margin. It places
// no limit on input size itself; the shell guards row counts before any
// chart is rasterized.
use crate::charts::ChartImage;
use crate::error::ReportError;
use printpdf::graphics::{LinePoint, PaintMode, Point, Polygon, PolygonRing, WindingOrder};
use printpdf::image::RawImage;
use printpdf::ops::Op;
use printpdf::text::TextItem;
use printpdf::xobject::{XObject, XObjectTransform};
use printpdf::{BuiltinFont, Mm, PdfDocument, PdfPage, PdfSaveOptions, Pt, Rgb, XObjectId};

/// Download filename offered for the exported report.
pub const PDF_FILENAME: &str = "consulta_plan_medios.pdf";
pub const PDF_MIME: &str = "application/pdf";

const PAGE_W_MM: f32 = 210.0;
const PAGE_H_MM: f32 = 297.0;
const MARGIN_MM: f32 = 20.0;
// Charts are placed at 16x9 cm regardless of raster resolution.
const CHART_W_MM: f32 = 160.0;
const CHART_H_MM: f32 = 90.0;

const TITLE_SIZE: f32 = 20.0;
const BODY_SIZE: f32 = 10.0;
const VALUE_COLUMN_PT: f32 = 220.0;

fn mm_to_pt(mm: f32) -> f32 {
    Mm(mm).into_pt().0
}

fn black() -> printpdf::color::Color {
    printpdf::color::Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None))
}

/// Cursor-based page composer. `cursor_y` is measured in points from the
/// top of the page; PDF coordinates are flipped at emission time.
struct Composer {
    pages: Vec<PdfPage>,
    ops: Vec<Op>,
    cursor_y: f32,
}

impl Composer {
    fn new() -> Self {
        Composer {
            pages: Vec::new(),
            ops: Vec::new(),
            cursor_y: mm_to_pt(MARGIN_MM),
        }
    }

    fn page_height_pt(&self) -> f32 {
        mm_to_pt(PAGE_H_MM)
    }

    fn break_page(&mut self) {
        let ops = std::mem::take(&mut self.ops);
        self.pages.push(PdfPage::new(Mm(PAGE_W_MM), Mm(PAGE_H_MM), ops));
        self.cursor_y = mm_to_pt(MARGIN_MM);
    }

    fn ensure_space(&mut self, height_pt: f32) {
        if self.cursor_y + height_pt > self.page_height_pt() - mm_to_pt(MARGIN_MM) {
            self.break_page();
        }
    }

    fn space(&mut self, pt: f32) {
        self.cursor_y += pt;
    }

    /// Write one text run at a given x offset without advancing the cursor.
    fn text_at(&mut self, x_pt: f32, text: &str, size: f32, font: BuiltinFont) {
        let baseline = self.page_height_pt() - self.cursor_y - size;
        self.ops.push(Op::StartTextSection);
        self.ops.push(Op::SetFillColor { col: black() });
        self.ops.push(Op::SetFontSizeBuiltinFont {
            size: Pt(size),
            font,
        });
        self.ops.push(Op::SetTextCursor {
            pos: Point {
                x: Pt(x_pt),
                y: Pt(baseline),
            },
        });
        self.ops.push(Op::WriteTextBuiltinFont {
            items: vec![TextItem::Text(text.to_string())],
            font,
        });
        self.ops.push(Op::EndTextSection);
    }

    fn line(&mut self, text: &str, size: f32, font: BuiltinFont) {
        self.ensure_space(size * 1.5);
        self.text_at(mm_to_pt(MARGIN_MM), text, size, font);
        self.cursor_y += size * 1.5;
    }

    /// Thin horizontal rule across the content width.
    fn rule(&mut self) {
        let x0 = mm_to_pt(MARGIN_MM);
        let x1 = mm_to_pt(PAGE_W_MM - MARGIN_MM);
        let y = self.page_height_pt() - self.cursor_y;
        let polygon = Polygon {
            rings: vec![PolygonRing {
                points: vec![
                    LinePoint {
                        p: Point { x: Pt(x0), y: Pt(y) },
                        bezier: false,
                    },
                    LinePoint {
                        p: Point { x: Pt(x1), y: Pt(y) },
                        bezier: false,
                    },
                    LinePoint {
                        p: Point {
                            x: Pt(x1),
                            y: Pt(y - 0.7),
                        },
                        bezier: false,
                    },
                    LinePoint {
                        p: Point {
                            x: Pt(x0),
                            y: Pt(y - 0.7),
                        },
                        bezier: false,
                    },
                ],
            }],
            mode: PaintMode::Fill,
            winding_order: WindingOrder::EvenOdd,
        };
        self.ops.push(Op::SetFillColor { col: black() });
        self.ops.push(Op::DrawPolygon { polygon });
        self.cursor_y += 4.0;
    }

    /// Two-column metrics table in insertion order.
    fn metrics_table(&mut self, metrics: &[(String, String)]) {
        let label_x = mm_to_pt(MARGIN_MM);
        let value_x = mm_to_pt(MARGIN_MM) + VALUE_COLUMN_PT;
        self.ensure_space(BODY_SIZE * 2.0);
        self.text_at(label_x, "Métrica", BODY_SIZE, BuiltinFont::HelveticaBold);
        self.text_at(value_x, "Valor", BODY_SIZE, BuiltinFont::HelveticaBold);
        self.cursor_y += BODY_SIZE * 1.6;
        self.rule();
        for (label, value) in metrics {
            self.ensure_space(BODY_SIZE * 1.6);
            self.text_at(label_x, label, BODY_SIZE, BuiltinFont::Helvetica);
            self.text_at(value_x, value, BODY_SIZE, BuiltinFont::Helvetica);
            self.cursor_y += BODY_SIZE * 1.6;
        }
    }

    fn chart(&mut self, doc: &mut PdfDocument, chart: &ChartImage) -> Result<(), ReportError> {
        let mut warnings = Vec::new();
        let raw = RawImage::decode_from_bytes(&chart.png, &mut warnings)
            .map_err(|e| ReportError::Image(format!("{}", e)))?;
        let (px_w, px_h) = (raw.width as f32, raw.height as f32);
        let id = XObjectId::new();
        doc.resources
            .xobjects
            .map
            .insert(id.clone(), XObject::Image(raw));

        let target_w = mm_to_pt(CHART_W_MM);
        let target_h = mm_to_pt(CHART_H_MM);
        self.ensure_space(target_h);
        let y = self.page_height_pt() - self.cursor_y - target_h;
        self.ops.push(Op::UseXobject {
            id,
            transform: XObjectTransform {
                translate_x: Some(Pt(mm_to_pt(MARGIN_MM))),
                translate_y: Some(Pt(y)),
                scale_x: Some(target_w / px_w),
                scale_y: Some(target_h / px_h),
                rotate: None,
                dpi: Some(72.0),
            },
        });
        self.cursor_y += target_h;
        Ok(())
    }

    fn into_pages(mut self) -> Vec<PdfPage> {
        if !self.ops.is_empty() || self.pages.is_empty() {
            self.break_page();
        }
        self.pages
    }
}

/// Assemble the report document and return its bytes.
///
/// Pages hold, in order: the title, one line describing the active filters,
/// the metrics table (insertion order) and each chart at 16x9 cm followed by
/// spacing. An empty chart list yields a valid metrics-only report.
pub fn build_report(
    title: &str,
    filter_description: &str,
    metrics: &[(String, String)],
    charts: &[ChartImage],
) -> Result<Vec<u8>, ReportError> {
    let mut doc = PdfDocument::new(title);
    let mut composer = Composer::new();

    composer.line(title, TITLE_SIZE, BuiltinFont::HelveticaBold);
    composer.space(8.0);
    composer.line(
        &format!("Filtros activos: {}", filter_description),
        BODY_SIZE,
        BuiltinFont::Helvetica,
    );
    composer.space(10.0);
    composer.metrics_table(metrics);
    composer.space(16.0);

    for chart in charts {
        composer.chart(&mut doc, chart)?;
        composer.space(16.0);
    }

    doc.pages = composer.into_pages();
    let mut warnings = Vec::new();
    let mut out = Vec::new();
    doc.save_writer(&mut out, &PdfSaveOptions::default(), &mut warnings);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts;

    fn metrics() -> Vec<(String, String)> {
        vec![
            ("Registros".to_string(), "2".to_string()),
            ("Inversión total".to_string(), "3.000 €".to_string()),
            ("Soportes únicos".to_string(), "2".to_string()),
        ]
    }

    #[test]
    fn metrics_only_report_is_valid_pdf() {
        let bytes = build_report("Consulta", "Periodo=Todos, Tipo=Todos, Soporte=Todos", &metrics(), &[])
            .unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(!bytes.is_empty());
    }

    #[test]
    fn report_embeds_charts() {
        let chart = charts::evolution(&[(2021, 1000.0), (2022, 2000.0)]).unwrap();
        let bytes = build_report("Consulta", "Periodo=Todos", &metrics(), &[chart.clone(), chart])
            .unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn many_charts_paginate() {
        let chart = charts::evolution(&[(2021, 1.0)]).unwrap();
        let charts: Vec<_> = std::iter::repeat(chart).take(5).collect();
        let bytes = build_report("Consulta", "Periodo=Todos", &metrics(), &charts).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
