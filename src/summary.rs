use crate::canvas::{Canvas, Document};
use crate::dates::{format_dob, format_stamp_date};
use crate::fields::{is_listable_key, label};
use crate::font::{MeasureText, StandardFont};
use crate::layout::wrap;
use crate::signature::SignatureRegistry;
use crate::submission::IntakeSubmission;
use crate::types::{Color, Margins, Pt, Rect, Size};
use chrono::NaiveDate;
use intake_form_contract::{SUMMARY_SECTIONS, TERMS_PATIENT_SIGNER};
use std::collections::BTreeSet;

pub const SUMMARY_TITLE: &str = "Patient Intake Summary";
pub const ADDITIONAL_SECTION_TITLE: &str = "Additional Information";
pub const SIGNATURE_STRIP_TEXT: &str =
    "Patient signature ______________________________________________________ Date __________";

pub const CERTIFICATION_TEXT: &str = "I certify that the above information is complete and accurate to the best of my knowledge. If the health plan information is not accurate, or if I am not eligible to receive a healthcare benefit through this practitioner, I understand that I am liable for all charges for services. I agreed to notify this practitioner immediately whenever I have changes in my health condition or health plan coverage. I understand that my practitioner of acupuncture services needs to contact my primary care physician or treating physician if my condition needs to be comanaged. Therefore, I will give authorization to my practitioner of acupuncture services to contact my medical doctor if necessary.";

/// Vertical metrics of the summary page, in points.
#[derive(Debug, Clone, Copy)]
pub struct SummaryLayout {
    pub page_size: Size,
    pub margins: Margins,
    pub title_size: Pt,
    pub title_step: Pt,
    pub header_size: Pt,
    pub header_step: Pt,
    pub section_gap: Pt,
    pub section_step: Pt,
    pub body_size: Pt,
    pub body_step: Pt,
    pub certification_size: Pt,
    pub certification_leading: Pt,
    pub signature_gap: Pt,
    pub signature_offset_x: Pt,
    pub signature_size: Size,
    pub signature_date_offset_x: Pt,
}

impl Default for SummaryLayout {
    fn default() -> Self {
        Self {
            page_size: Size::letter(),
            margins: Margins::all(50.0),
            title_size: Pt::from_i32(18),
            title_step: Pt::from_i32(30),
            header_size: Pt::from_i32(12),
            header_step: Pt::from_i32(25),
            section_gap: Pt::from_i32(10),
            section_step: Pt::from_i32(20),
            body_size: Pt::from_i32(10),
            body_step: Pt::from_i32(15),
            certification_size: Pt::from_i32(9),
            certification_leading: Pt::from_i32(12),
            signature_gap: Pt::from_i32(40),
            signature_offset_x: Pt::from_i32(100),
            signature_size: Size::new(150.0, 40.0),
            signature_date_offset_x: Pt::from_i32(450),
        }
    }
}

impl SummaryLayout {
    pub fn top(&self) -> Pt {
        self.page_size.height - self.margins.top
    }

    pub fn content_width(&self) -> Pt {
        self.page_size.width - self.margins.left - self.margins.right
    }
}

/// Write position on the current summary page. `y` is the next baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderCursor {
    pub page: usize,
    pub y: Pt,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryReport {
    pub pages: usize,
    pub fields_rendered: usize,
    pub signature_embedded: bool,
    pub date_stamped: bool,
}

pub struct SummaryRenderer<'a> {
    layout: SummaryLayout,
    registry: &'a SignatureRegistry,
    stamp_date: NaiveDate,
}

struct Pass<'a> {
    layout: &'a SummaryLayout,
    canvas: Canvas,
    cursor: RenderCursor,
}

impl Pass<'_> {
    /// Starts a new page unless one more step of `needed` fits above the bottom margin.
    fn ensure(&mut self, needed: Pt) {
        if self.cursor.y - needed < self.layout.margins.bottom {
            self.canvas.show_page();
            self.cursor = RenderCursor {
                page: self.cursor.page + 1,
                y: self.layout.top(),
            };
        }
    }

    fn line(&mut self, font: StandardFont, size: Pt, step: Pt, text: &str) {
        self.ensure(step);
        self.canvas.set_font(font, size);
        self.canvas
            .draw_string(self.layout.margins.left, self.cursor.y, text);
        self.cursor.y -= step;
    }

    fn section_header(&mut self, title: &str) {
        let layout = self.layout;
        self.cursor.y -= layout.section_gap;
        // Keep a header on the same page as its first field.
        self.ensure(layout.section_step + layout.body_step);
        self.canvas.set_font(StandardFont::HelveticaBold, layout.header_size);
        self.canvas
            .draw_string(layout.margins.left, self.cursor.y, title);
        let rule_y = self.cursor.y - Pt::from_i32(4);
        self.canvas.save_state();
        self.canvas.set_stroke_color(Color::gray(0.6));
        self.canvas.set_line_width(Pt::from_f32(0.5));
        self.canvas.line(
            layout.margins.left,
            rule_y,
            layout.page_size.width - layout.margins.right,
            rule_y,
        );
        self.canvas.restore_state();
        self.cursor.y -= layout.section_step;
    }

    fn field(&mut self, key: &str, value: &str) {
        let layout = self.layout;
        let text = format!("{}: {}", label(key), value);
        let font = StandardFont::Helvetica;
        for line in wrap(&text, layout.content_width(), &font, layout.body_size) {
            self.line(font, layout.body_size, layout.body_step, &line);
        }
    }
}

impl<'a> SummaryRenderer<'a> {
    pub fn new(registry: &'a SignatureRegistry, stamp_date: NaiveDate) -> Self {
        Self {
            layout: SummaryLayout::default(),
            registry,
            stamp_date,
        }
    }

    pub fn with_layout(mut self, layout: SummaryLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn layout(&self) -> &SummaryLayout {
        &self.layout
    }

    pub fn render(&self, submission: &IntakeSubmission) -> (Document, SummaryReport) {
        let layout = &self.layout;
        let mut pass = Pass {
            layout,
            canvas: Canvas::new(layout.page_size),
            cursor: RenderCursor {
                page: 0,
                y: layout.top(),
            },
        };
        let mut report = SummaryReport::default();

        pass.line(
            StandardFont::HelveticaBold,
            layout.title_size,
            layout.title_step,
            SUMMARY_TITLE,
        );
        let header = format!(
            "Patient: {} {}   Date of Birth: {}",
            submission.first_name.trim(),
            submission.last_name.trim(),
            format_dob(&submission.dob)
        );
        pass.line(
            StandardFont::HelveticaBold,
            layout.header_size,
            layout.header_step,
            &header,
        );

        let form_data = &submission.form_data;
        let mut listed: BTreeSet<&str> = BTreeSet::new();
        for section in SUMMARY_SECTIONS.iter() {
            pass.section_header(section.title);
            for field in section.fields {
                listed.insert(field.key);
                let Some(value) = form_data.display_value(field.key) else {
                    continue;
                };
                pass.field(field.key, &value);
                report.fields_rendered += 1;
            }
        }

        let extras: Vec<(&str, String)> = form_data
            .keys()
            .filter(|key| is_listable_key(key) && !listed.contains(key))
            .filter_map(|key| form_data.display_value(key).map(|value| (key, value)))
            .collect();
        if !extras.is_empty() {
            pass.section_header(ADDITIONAL_SECTION_TITLE);
            for (key, value) in &extras {
                pass.field(key, value);
                report.fields_rendered += 1;
            }
        }

        pass.cursor.y -= layout.section_gap;
        let font = StandardFont::Helvetica;
        for line in wrap(
            CERTIFICATION_TEXT,
            layout.content_width(),
            &font,
            layout.certification_size,
        ) {
            pass.line(
                font,
                layout.certification_size,
                layout.certification_leading,
                &line,
            );
        }

        self.signature_strip(&mut pass, submission, &mut report);

        report.pages = pass.cursor.page + 1;
        let document = pass.canvas.finish();
        tracing::debug!(
            pages = report.pages,
            fields = report.fields_rendered,
            "summary rendered"
        );
        (document, report)
    }

    fn signature_strip(&self, pass: &mut Pass<'_>, submission: &IntakeSubmission, report: &mut SummaryReport) {
        let layout = &self.layout;
        pass.ensure(layout.signature_gap + layout.body_step);
        pass.cursor.y -= layout.signature_gap;
        let y = pass.cursor.y;
        pass.canvas
            .set_font(StandardFont::HelveticaBold, layout.body_size);
        pass.canvas
            .draw_string(layout.margins.left, y, SIGNATURE_STRIP_TEXT);

        let Some(payload) = self
            .registry
            .resolve_payload(TERMS_PATIENT_SIGNER, &submission.form_data)
        else {
            tracing::debug!("summary signature strip left unsigned");
            return;
        };

        match payload.decode_image() {
            Some(image) => {
                let id = pass.canvas.register_image(image);
                let rect = Rect::new(
                    layout.margins.left + layout.signature_offset_x,
                    y - Pt::from_i32(5),
                    layout.signature_size.width,
                    layout.signature_size.height,
                );
                pass.canvas.draw_image(rect, id);
                report.signature_embedded = true;
            }
            None => {
                tracing::warn!(
                    signer = TERMS_PATIENT_SIGNER,
                    "signature data did not decode; image omitted"
                );
            }
        }

        let date = format_stamp_date(self.stamp_date);
        pass.canvas
            .set_font(StandardFont::Helvetica, layout.body_size);
        pass.canvas.draw_string(
            layout.margins.left + layout.signature_date_offset_x,
            y,
            date,
        );
        report.date_stamped = true;
        pass.cursor.y -= layout.body_step;
    }
}

/// Width of `text` in the body font, for callers aligning against summary lines.
pub fn body_text_width(text: &str, layout: &SummaryLayout) -> Pt {
    StandardFont::Helvetica.measure(text, layout.body_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::signature::test_images::png_reference;
    use crate::submission::FormData;

    fn stamp_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 2).expect("date")
    }

    fn render(submission: &IntakeSubmission) -> (Document, SummaryReport) {
        let registry = SignatureRegistry::new();
        SummaryRenderer::new(&registry, stamp_date()).render(submission)
    }

    fn all_strings(doc: &Document) -> Vec<(usize, Pt, Pt, String)> {
        doc.pages
            .iter()
            .enumerate()
            .flat_map(|(i, page)| page.strings().map(move |(x, y, t)| (i, x, y, t.to_string())))
            .collect()
    }

    fn jane() -> IntakeSubmission {
        IntakeSubmission::new("Jane", "Doe", "1990-05-02").with_form_data(
            FormData::new()
                .with("sex", "F")
                .with("cellPhone", "555-0100"),
        )
    }

    #[test]
    fn header_reformats_date_of_birth() {
        let (doc, report) = render(&jane());
        let strings = all_strings(&doc);
        assert_eq!(strings[0].3, SUMMARY_TITLE);
        assert_eq!(strings[0].2, Pt::from_i32(742));
        assert_eq!(strings[1].3, "Patient: Jane Doe   Date of Birth: 05-02-1990");
        assert_eq!(strings[1].2, Pt::from_i32(712));
        assert!(strings.iter().any(|s| s.3 == "Sex: F"));
        assert!(strings.iter().any(|s| s.3 == "Cell Phone: 555-0100"));
        assert_eq!(report.fields_rendered, 2);
        assert_eq!(report.pages, doc.page_count());
    }

    #[test]
    fn multi_select_renders_as_one_field() {
        let submission = IntakeSubmission::new("A", "B", "2000-01-01").with_form_data(
            FormData::new().with("conditions", vec!["Diabetes", "Hypertension"]),
        );
        let (doc, _) = render(&submission);
        let hits: Vec<_> = all_strings(&doc)
            .into_iter()
            .filter(|s| s.3.starts_with("Conditions:"))
            .collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].3, "Conditions: Diabetes, Hypertension");
    }

    #[test]
    fn reserved_and_signature_keys_never_render_as_fields() {
        let submission = IntakeSubmission::new("A", "B", "2000-01-01").with_form_data(
            FormData::new()
                .with("firstName", "A")
                .with("lastName", "B")
                .with("dob", "2000-01-01")
                .with("patientName", "A B")
                .with("formData", "nested")
                .with("sigTermsPatient", "yes")
                .with("sigTermsPatientData", "data:image/png;base64,AAAA")
                .with("signatureNote", "hidden")
                .with("favoriteColor", "blue"),
        );
        let (doc, report) = render(&submission);
        let strings = all_strings(&doc);
        for (_, _, _, text) in &strings {
            for banned in [
                "FirstName:",
                "LastName:",
                "Dob:",
                "PatientName:",
                "FormData:",
                "Patient Signature (Terms):",
                "SigTermsPatientData:",
                "SignatureNote:",
            ] {
                assert!(!text.starts_with(banned), "{text}");
            }
        }
        assert!(strings.iter().any(|s| s.3 == ADDITIONAL_SECTION_TITLE));
        assert!(strings.iter().any(|s| s.3 == "FavoriteColor: blue"));
        assert_eq!(report.fields_rendered, 1);
    }

    #[test]
    fn skips_empty_and_placeholder_values() {
        let submission = IntakeSubmission::new("A", "B", "2000-01-01").with_form_data(
            FormData::new()
                .with("sex", "")
                .with("city", "undefined")
                .with("state", "null")
                .with("zip", "12345"),
        );
        let (doc, report) = render(&submission);
        let strings = all_strings(&doc);
        assert!(!strings.iter().any(|s| s.3.starts_with("Sex:")));
        assert!(!strings.iter().any(|s| s.3.starts_with("City:")));
        assert!(!strings.iter().any(|s| s.3.starts_with("State:")));
        assert!(strings.iter().any(|s| s.3 == "Zip Code: 12345"));
        assert_eq!(report.fields_rendered, 1);
        assert!(!strings.iter().any(|s| s.3 == ADDITIONAL_SECTION_TITLE));
    }

    #[test]
    fn overflow_appends_pages_and_respects_bottom_margin() {
        let mut data = FormData::new();
        for i in 0..120 {
            data.insert(format!("extraQuestion{i:03}"), format!("answer number {i}"));
        }
        let submission = IntakeSubmission::new("A", "B", "2000-01-01").with_form_data(data);
        let (doc, report) = render(&submission);
        assert!(doc.page_count() >= 3, "pages: {}", doc.page_count());
        assert_eq!(report.pages, doc.page_count());

        let bottom = Pt::from_i32(50);
        for (_, _, y, text) in all_strings(&doc) {
            assert!(y >= bottom, "{text} drawn at {:?}", y);
        }
        for page in doc.pages.iter().skip(1) {
            let first = page.strings().next().expect("page has text");
            assert_eq!(first.1, Pt::from_i32(742));
        }
        let keys: Vec<_> = all_strings(&doc)
            .into_iter()
            .filter(|s| s.3.starts_with("ExtraQuestion"))
            .map(|s| s.3)
            .collect();
        assert_eq!(keys.len(), 120);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn long_values_wrap_within_content_width() {
        let long = "word ".repeat(200);
        let submission = IntakeSubmission::new("A", "B", "2000-01-01")
            .with_form_data(FormData::new().with("medications", long.as_str()));
        let (doc, _) = render(&submission);
        let layout = SummaryLayout::default();
        let lines: Vec<_> = all_strings(&doc)
            .into_iter()
            .filter(|s| s.3.contains("word"))
            .collect();
        assert!(lines.len() > 1);
        for (_, x, _, text) in lines {
            assert_eq!(x, Pt::from_i32(50));
            assert!(body_text_width(&text, &layout) <= layout.content_width());
        }
    }

    #[test]
    fn certification_paragraph_is_wrapped_in_order() {
        let (doc, _) = render(&jane());
        let strings = all_strings(&doc);
        let start = strings
            .iter()
            .position(|s| s.3.starts_with("I certify"))
            .expect("certification");
        let end = strings
            .iter()
            .position(|s| s.3 == SIGNATURE_STRIP_TEXT)
            .expect("strip");
        let joined: Vec<_> = strings[start..end].iter().map(|s| s.3.as_str()).collect();
        assert_eq!(joined.join(" "), CERTIFICATION_TEXT);
    }

    #[test]
    fn terms_signature_embeds_image_and_date() {
        let mut submission = jane();
        submission
            .form_data
            .insert("sigTermsPatientData", png_reference());
        let (doc, report) = render(&submission);
        assert!(report.signature_embedded);
        assert!(report.date_stamped);
        let last = doc.pages.last().expect("page");
        let (strip_x, strip_y) = last
            .strings()
            .find(|s| s.2 == SIGNATURE_STRIP_TEXT)
            .map(|s| (s.0, s.1))
            .expect("strip");
        assert_eq!(strip_x, Pt::from_i32(50));
        let (rect, _) = last.images().next().expect("signature image");
        assert_eq!(rect.x, Pt::from_i32(150));
        assert_eq!(rect.y, strip_y - Pt::from_i32(5));
        assert_eq!(rect.width, Pt::from_i32(150));
        assert_eq!(rect.height, Pt::from_i32(40));
        assert!(
            last.strings()
                .any(|s| s.0 == Pt::from_i32(500) && s.1 == strip_y && s.2 == "5/2/2025")
        );
        assert_eq!(doc.images.len(), 1);
    }

    #[test]
    fn missing_terms_signature_leaves_strip_blank() {
        let mut submission = jane();
        submission.form_data.insert("sigTermsPatientData", "");
        let (doc, report) = render(&submission);
        assert!(!report.signature_embedded);
        assert!(!report.date_stamped);
        assert!(doc.pages.iter().all(|p| p.images().next().is_none()));
        assert!(!all_strings(&doc).iter().any(|s| s.3 == "5/2/2025"));
    }

    #[test]
    fn undecodable_terms_signature_keeps_date_and_omits_image() {
        let mut submission = jane();
        submission
            .form_data
            .insert("sigTermsPatientData", "data:image/png;base64,AAAA");
        let (doc, report) = render(&submission);
        assert!(!report.signature_embedded);
        assert!(report.date_stamped);
        assert!(doc.images.is_empty());
        assert!(
            !doc.pages
                .iter()
                .flat_map(|p| p.commands.iter())
                .any(|c| matches!(c, Command::DrawImage { .. }))
        );
    }
}
