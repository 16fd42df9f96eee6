use crate::canvas::{Canvas, Document};
use crate::dates::format_stamp_date;
use crate::error::ComposeError;
use crate::font::StandardFont;
use crate::layout::sanitize_text;
use crate::signature::SignatureRegistry;
use crate::submission::IntakeSubmission;
use crate::types::{Pt, Rect, Size};
use chrono::NaiveDate;
use intake_form_contract::{
    OVERLAY_MAPPINGS, OverlayBox, OverlayKind, OverlayMapping, PAGE_HEIGHT, PATIENT_NAME_KEY,
    TEMPLATE_PAGES, validate_mappings,
};

pub const OVERLAY_FONT: StandardFont = StandardFont::Helvetica;
pub const OVERLAY_FONT_SIZE: i32 = 10;

/// Lower-left corner of a top-left-origin box: `x = left`, `y = page_height - (top + height)`.
pub fn draw_origin(bbox: &OverlayBox, page_height: f32) -> (Pt, Pt) {
    let x = Pt::from_f32(bbox.left);
    let y = Pt::from_f32(page_height) - (Pt::from_f32(bbox.top) + Pt::from_f32(bbox.height));
    (x, y)
}

pub fn draw_rect(bbox: &OverlayBox, page_height: f32) -> Rect {
    let (x, y) = draw_origin(bbox, page_height);
    Rect::new(x, y, Pt::from_f32(bbox.width), Pt::from_f32(bbox.height))
}

/// Baseline that centres cap-height text vertically inside `rect`.
pub fn centred_baseline(rect: &Rect, font: StandardFont, size: Pt) -> Pt {
    let cap = font.metrics().cap_height_at(size);
    rect.y + (rect.height - cap) / 2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingSignature,
    UndecodableSignature,
    UnsignedDependency,
    EmptyText,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayOutcome {
    pub page_index: u8,
    pub kind: OverlayKind,
    pub key: Option<&'static str>,
    pub rect: Rect,
    pub skipped: Option<SkipReason>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayReport {
    pub outcomes: Vec<OverlayOutcome>,
}

impl OverlayReport {
    pub fn stamped(&self) -> usize {
        self.outcomes.iter().filter(|o| o.skipped.is_none()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.stamped()
    }

    pub fn outcome_for(&self, kind: OverlayKind, key: &str) -> Option<&OverlayOutcome> {
        // Date outcomes are keyed by the signer they depend on.
        self.outcomes
            .iter()
            .find(|o| o.kind == kind && o.key == Some(key))
    }
}

/// Draws signatures, dates and text onto the three copied template pages.
pub struct OverlayRenderer<'a> {
    mappings: &'a [OverlayMapping],
    registry: &'a SignatureRegistry,
    stamp_date: NaiveDate,
    page_size: Size,
}

impl<'a> OverlayRenderer<'a> {
    pub fn new(registry: &'a SignatureRegistry, stamp_date: NaiveDate) -> Self {
        Self {
            mappings: &OVERLAY_MAPPINGS,
            registry,
            stamp_date,
            page_size: Size::letter(),
        }
    }

    /// Uses a caller-supplied table after checking it against page bounds and overlap rules.
    pub fn with_mappings(mut self, mappings: &'a [OverlayMapping]) -> Result<Self, ComposeError> {
        let violations = validate_mappings(mappings);
        if let Some(first) = violations.first() {
            return Err(ComposeError::Configuration(format!(
                "overlay table rejected ({} issue(s)): {}",
                violations.len(),
                first
            )));
        }
        self.mappings = mappings;
        Ok(self)
    }

    /// One overlay page per template page, in template order.
    pub fn render(&self, submission: &IntakeSubmission) -> (Document, OverlayReport) {
        let mut canvas = Canvas::new(self.page_size);
        let mut report = OverlayReport::default();
        for page_index in TEMPLATE_PAGES {
            for mapping in self.mappings.iter().filter(|m| m.page_index == page_index) {
                let outcome = self.apply(&mut canvas, mapping, submission);
                match outcome.skipped {
                    None => tracing::debug!(
                        page = page_index,
                        kind = mapping.kind.as_str(),
                        key = outcome.key.unwrap_or("-"),
                        "overlay stamped"
                    ),
                    Some(reason) => tracing::debug!(
                        page = page_index,
                        kind = mapping.kind.as_str(),
                        key = outcome.key.unwrap_or("-"),
                        ?reason,
                        "overlay skipped"
                    ),
                }
                report.outcomes.push(outcome);
            }
            canvas.show_page();
        }
        (canvas.finish_pages(TEMPLATE_PAGES.len()), report)
    }

    fn apply(&self, canvas: &mut Canvas, mapping: &OverlayMapping, submission: &IntakeSubmission) -> OverlayOutcome {
        let rect = draw_rect(&mapping.bbox, PAGE_HEIGHT);
        let (key, skipped) = match mapping.kind {
            OverlayKind::Signature => (mapping.source_key, self.stamp_signature(canvas, mapping, rect, submission)),
            OverlayKind::Date => (mapping.date_dependency_key, self.stamp_date(canvas, mapping, rect, submission)),
            OverlayKind::Text => (mapping.source_key, self.stamp_text(canvas, mapping, rect, submission)),
        };
        OverlayOutcome {
            page_index: mapping.page_index,
            kind: mapping.kind,
            key,
            rect,
            skipped,
        }
    }

    fn stamp_signature(
        &self,
        canvas: &mut Canvas,
        mapping: &OverlayMapping,
        rect: Rect,
        submission: &IntakeSubmission,
    ) -> Option<SkipReason> {
        let Some(key) = mapping.source_key else {
            return Some(SkipReason::MissingSignature);
        };
        let Some(payload) = self.registry.resolve_payload(key, &submission.form_data) else {
            return Some(SkipReason::MissingSignature);
        };
        let Some(image) = payload.decode_image() else {
            tracing::warn!(signer = key, "signature data did not decode; image omitted");
            return Some(SkipReason::UndecodableSignature);
        };
        let id = canvas.register_image(image);
        canvas.draw_image(rect, id);
        None
    }

    fn stamp_date(
        &self,
        canvas: &mut Canvas,
        mapping: &OverlayMapping,
        rect: Rect,
        submission: &IntakeSubmission,
    ) -> Option<SkipReason> {
        if !self
            .registry
            .should_stamp_date(mapping.date_dependency_key, &submission.form_data)
        {
            return Some(SkipReason::UnsignedDependency);
        }
        self.draw_line(canvas, rect, format_stamp_date(self.stamp_date));
        None
    }

    fn stamp_text(
        &self,
        canvas: &mut Canvas,
        mapping: &OverlayMapping,
        rect: Rect,
        submission: &IntakeSubmission,
    ) -> Option<SkipReason> {
        let value = text_value(mapping, submission);
        if value.is_empty() {
            return Some(SkipReason::EmptyText);
        }
        self.draw_line(canvas, rect, value);
        None
    }

    fn draw_line(&self, canvas: &mut Canvas, rect: Rect, text: String) {
        let size = Pt::from_i32(OVERLAY_FONT_SIZE);
        canvas.set_font(OVERLAY_FONT, size);
        let baseline = centred_baseline(&rect, OVERLAY_FONT, size);
        canvas.draw_string(rect.x, baseline, text);
    }
}

/// Literal text wins; `patientName` always resolves from the submission's
/// name fields; anything else reads `formData`.
pub fn text_value(mapping: &OverlayMapping, submission: &IntakeSubmission) -> String {
    let raw = if let Some(literal) = mapping.literal_text {
        literal.to_string()
    } else {
        match mapping.source_key {
            Some(PATIENT_NAME_KEY) => submission.patient_name(),
            Some(key) => submission
                .form_data
                .display_value(key)
                .unwrap_or_default(),
            None => String::new(),
        }
    };
    sanitize_text(&raw)
}
