//! Coordinate grid for authoring overlay boxes against a template.

use crate::canvas::{Canvas, Page};
use crate::error::ComposeError;
use crate::finalize::{ComposedPdf, PdfComposer};
use crate::font::StandardFont;
use crate::overlay::draw_rect;
use crate::template::{TemplateAsset, page_size};
use crate::types::{Color, Pt, Size};
use intake_form_contract::{OverlayMapping, TEMPLATE_PAGES, overlay_mappings};
use std::collections::BTreeMap;

pub const GRID_STEP: u32 = 50;
const GRID_LINE_GRAY: f32 = 0.8;
const GRID_OPACITY: f32 = 0.5;
const LABEL_SIZE: i32 = 8;
const OUTLINE_LABEL_SIZE: i32 = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridOptions {
    /// 1-indexed template pages that receive the grid.
    pub pages: Vec<usize>,
    pub step: u32,
    /// Also outline every overlay mapping box on the pages it targets.
    pub outline_mappings: bool,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            pages: TEMPLATE_PAGES.iter().map(|p| usize::from(*p)).collect(),
            step: GRID_STEP,
            outline_mappings: false,
        }
    }
}

/// Light gray lines every `step` points, labelled in red along the bottom
/// and left edges.
pub fn draw_grid(canvas: &mut Canvas, size: Size, step: u32) {
    let step = step.max(1) as i32;
    let width = size.width;
    let height = size.height;

    canvas.save_state();
    canvas.set_opacity(GRID_OPACITY);
    canvas.set_stroke_color(Color::gray(GRID_LINE_GRAY));
    canvas.set_line_width(Pt::from_i32(1));
    let mut x = 0;
    while Pt::from_i32(x) < width {
        canvas.line(Pt::from_i32(x), Pt::ZERO, Pt::from_i32(x), height);
        x += step;
    }
    let mut y = 0;
    while Pt::from_i32(y) < height {
        canvas.line(Pt::ZERO, Pt::from_i32(y), width, Pt::from_i32(y));
        y += step;
    }
    canvas.restore_state();

    canvas.set_fill_color(Color::rgb(1.0, 0.0, 0.0));
    canvas.set_font(StandardFont::Helvetica, Pt::from_i32(LABEL_SIZE));
    let mut x = 0;
    while Pt::from_i32(x) < width {
        canvas.draw_string(Pt::from_i32(x + 2), Pt::from_i32(10), x.to_string());
        x += step;
    }
    let mut y = 0;
    while Pt::from_i32(y) < height {
        canvas.draw_string(Pt::from_i32(5), Pt::from_i32(y + 2), y.to_string());
        y += step;
    }
}

fn outline_label(mapping: &OverlayMapping) -> String {
    let source = mapping
        .source_key
        .or(mapping.date_dependency_key)
        .or(mapping.literal_text)
        .unwrap_or("-");
    format!("{}:{}", mapping.kind.as_str(), source)
}

pub fn outline_page_mappings(canvas: &mut Canvas, page_number: usize, page_height: f32, mappings: &[OverlayMapping]) {
    let on_page: Vec<&OverlayMapping> = mappings
        .iter()
        .filter(|m| usize::from(m.page_index) == page_number)
        .collect();
    if on_page.is_empty() {
        return;
    }
    canvas.set_stroke_color(Color::rgb(0.0, 0.0, 1.0));
    canvas.set_fill_color(Color::rgb(0.0, 0.0, 1.0));
    canvas.set_line_width(Pt::from_f32(0.5));
    canvas.set_font(StandardFont::Helvetica, Pt::from_i32(OUTLINE_LABEL_SIZE));
    for mapping in on_page {
        let rect = draw_rect(&mapping.bbox, page_height);
        canvas.stroke_rect(rect);
        canvas.draw_string(rect.x, rect.top() + Pt::from_i32(1), outline_label(mapping));
    }
}

/// Renders every template page, with the grid on the selected ones.
pub fn render_grid_pdf(template: &TemplateAsset, options: &GridOptions) -> Result<ComposedPdf, ComposeError> {
    let loaded = template.load()?;
    let page_total = loaded.page_ids.len();
    if let Some(bad) = options.pages.iter().find(|p| **p == 0 || **p > page_total) {
        return Err(ComposeError::Configuration(format!(
            "grid page {} out of range (template has {} pages)",
            bad, page_total
        )));
    }
    let sizes: Vec<Size> = loaded
        .page_ids
        .iter()
        .map(|id| {
            page_size(&loaded.document, *id)
                .map(|(w, h)| Size::new(w, h))
                .unwrap_or_else(Size::letter)
        })
        .collect();

    let mut overlays: BTreeMap<usize, Page> = BTreeMap::new();
    for page_number in &options.pages {
        let size = sizes[page_number - 1];
        let mut canvas = Canvas::new(size);
        draw_grid(&mut canvas, size, options.step);
        if options.outline_mappings {
            outline_page_mappings(&mut canvas, *page_number, size.height.to_f32(), overlay_mappings());
        }
        if let Some(page) = canvas.finish().pages.into_iter().next() {
            overlays.insert(*page_number, page);
        }
    }

    let mut composer = PdfComposer::new();
    let page_ids = composer.import_template(loaded)?;
    let images = BTreeMap::new();
    for (idx, page_id) in page_ids.into_iter().enumerate() {
        composer.append_template_page(page_id, overlays.get(&(idx + 1)), &images)?;
    }
    let composed = composer.finish()?;
    tracing::info!(
        pages = composed.page_count,
        gridded = overlays.len(),
        "grid document written"
    );
    Ok(composed)
}
