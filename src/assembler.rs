use crate::canvas::Document;
use crate::dates::today;
use crate::error::ComposeError;
use crate::finalize::PdfComposer;
use crate::metrics::{BatchMetrics, BuildMetrics};
use crate::overlay::{OverlayRenderer, OverlayReport};
use crate::signature::SignatureRegistry;
use crate::submission::IntakeSubmission;
use crate::summary::{SummaryLayout, SummaryRenderer, SummaryReport};
use crate::template::TemplateAsset;
use chrono::NaiveDate;
use intake_form_contract::{OverlayMapping, TEMPLATE_PAGES, validate_mappings};
use std::time::Instant;

/// Generated drawing layers for one submission, before PDF assembly.
#[derive(Debug, Clone)]
pub struct ComposedLayers {
    pub summary: Document,
    pub summary_report: SummaryReport,
    pub overlay: Document,
    pub overlay_report: OverlayReport,
}

/// Builds the intake PDF: summary page(s) followed by template pages 2, 3, 4
/// with the overlay table stamped on them.
#[derive(Debug, Clone)]
pub struct IntakeComposer {
    template: TemplateAsset,
    registry: SignatureRegistry,
    stamp_date: Option<NaiveDate>,
    mappings: Option<Vec<OverlayMapping>>,
    layout: SummaryLayout,
}

#[derive(Debug, Clone)]
pub struct IntakeComposerBuilder {
    template: Option<TemplateAsset>,
    template_sha256: Option<String>,
    registry: SignatureRegistry,
    stamp_date: Option<NaiveDate>,
    mappings: Option<Vec<OverlayMapping>>,
    layout: SummaryLayout,
    verify_template: bool,
}

impl IntakeComposer {
    pub fn builder() -> IntakeComposerBuilder {
        IntakeComposerBuilder::new()
    }

    pub fn template(&self) -> &TemplateAsset {
        &self.template
    }

    pub fn registry(&self) -> &SignatureRegistry {
        &self.registry
    }

    fn stamp_date(&self) -> NaiveDate {
        self.stamp_date.unwrap_or_else(today)
    }

    /// Renders the summary and overlay layers without touching the template.
    pub fn render_layers(&self, submission: &IntakeSubmission) -> Result<ComposedLayers, ComposeError> {
        let stamp_date = self.stamp_date();
        let (summary, summary_report) = SummaryRenderer::new(&self.registry, stamp_date)
            .with_layout(self.layout)
            .render(submission);
        let overlay_renderer = OverlayRenderer::new(&self.registry, stamp_date);
        let overlay_renderer = match &self.mappings {
            Some(mappings) => overlay_renderer.with_mappings(mappings)?,
            None => overlay_renderer,
        };
        let (overlay, overlay_report) = overlay_renderer.render(submission);
        Ok(ComposedLayers {
            summary,
            summary_report,
            overlay,
            overlay_report,
        })
    }

    pub fn build(&self, submission: &IntakeSubmission) -> Result<Vec<u8>, ComposeError> {
        self.build_with_metrics(submission).map(|(bytes, _)| bytes)
    }

    pub fn build_with_metrics(&self, submission: &IntakeSubmission) -> Result<(Vec<u8>, BuildMetrics), ComposeError> {
        let started = Instant::now();
        tracing::info!(template = %self.template.describe(), "intake build started");

        let template = self.template.load()?;
        let layers = self.render_layers(submission)?;

        let mut composer = PdfComposer::new();
        let summary_pages = composer.append_document(&layers.summary)?;
        let template_ids = composer.import_template(template)?;
        for (slot, page_number) in TEMPLATE_PAGES.iter().enumerate() {
            let page_id = template_ids
                .get(usize::from(*page_number) - 1)
                .copied()
                .ok_or_else(|| {
                    ComposeError::Configuration(format!("template page {} missing", page_number))
                })?;
            composer.append_template_page(page_id, layers.overlay.pages.get(slot), &layers.overlay.images)?;
        }
        let composed = composer.finish()?;

        let metrics = BuildMetrics {
            summary_pages,
            template_pages: TEMPLATE_PAGES.len(),
            total_pages: composed.page_count,
            fields_rendered: layers.summary_report.fields_rendered,
            overlays_stamped: layers.overlay_report.stamped(),
            overlays_skipped: layers.overlay_report.skipped(),
            images_embedded: composed.images_embedded,
            bytes: composed.bytes.len(),
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        };
        tracing::info!(
            pages = metrics.total_pages,
            bytes = metrics.bytes,
            elapsed_ms = metrics.elapsed_ms,
            "intake build finished"
        );
        Ok((composed.bytes, metrics))
    }

    // Parallel batch build; results stay in input order.
    pub fn build_many(&self, submissions: &[IntakeSubmission]) -> Vec<Result<Vec<u8>, ComposeError>> {
        use rayon::prelude::*;

        submissions
            .par_iter()
            .map(|submission| self.build(submission))
            .collect()
    }

    /// Fails on the first build error, otherwise returns every document with
    /// aggregated metrics.
    pub fn build_many_with_metrics(
        &self,
        submissions: &[IntakeSubmission],
    ) -> Result<(Vec<Vec<u8>>, BatchMetrics), ComposeError> {
        use rayon::prelude::*;

        let results: Vec<Result<(Vec<u8>, BuildMetrics), ComposeError>> = submissions
            .par_iter()
            .map(|submission| self.build_with_metrics(submission))
            .collect();
        let mut documents = Vec::with_capacity(results.len());
        let mut batch = BatchMetrics::default();
        for result in results {
            let (bytes, metrics) = result?;
            documents.push(bytes);
            batch.push(metrics);
        }
        Ok((documents, batch))
    }
}

impl Default for IntakeComposerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IntakeComposerBuilder {
    pub fn new() -> Self {
        Self {
            template: None,
            template_sha256: None,
            registry: SignatureRegistry::new(),
            stamp_date: None,
            mappings: None,
            layout: SummaryLayout::default(),
            verify_template: false,
        }
    }

    pub fn template(mut self, template: TemplateAsset) -> Self {
        self.template = Some(template);
        self
    }

    pub fn template_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.template = Some(TemplateAsset::from_path(path));
        self
    }

    pub fn template_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.template = Some(TemplateAsset::from_bytes(bytes));
        self
    }

    pub fn template_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.template_sha256 = Some(sha256.into());
        self
    }

    pub fn signature_registry(mut self, registry: SignatureRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Pre-registers a signer such as the office signature.
    pub fn signer(mut self, key: &str, data_reference: impl Into<String>) -> Result<Self, ComposeError> {
        self.registry.register(key, data_reference)?;
        Ok(self)
    }

    /// Fixes the date stamped next to signatures. Defaults to the local date at build time.
    pub fn stamp_date(mut self, date: NaiveDate) -> Self {
        self.stamp_date = Some(date);
        self
    }

    pub fn overlay_mappings(mut self, mappings: Vec<OverlayMapping>) -> Self {
        self.mappings = Some(mappings);
        self
    }

    pub fn summary_layout(mut self, layout: SummaryLayout) -> Self {
        self.layout = layout;
        self
    }

    // Load the template once during build() so deployment defects surface at startup.
    pub fn verify_template(mut self, enabled: bool) -> Self {
        self.verify_template = enabled;
        self
    }

    pub fn build(self) -> Result<IntakeComposer, ComposeError> {
        let Some(mut template) = self.template else {
            return Err(ComposeError::Configuration(
                "template source is required".to_string(),
            ));
        };
        if let Some(sha256) = self.template_sha256 {
            template = template.with_sha256(sha256);
        }
        if let Some(mappings) = &self.mappings {
            let violations = validate_mappings(mappings);
            if let Some(first) = violations.first() {
                return Err(ComposeError::Configuration(format!(
                    "overlay table rejected ({} issue(s)): {}",
                    violations.len(),
                    first
                )));
            }
        }
        if self.verify_template {
            let loaded = template.load()?;
            tracing::debug!(
                pages = loaded.page_ids.len(),
                sha256 = %loaded.sha256,
                "template verified"
            );
        }
        Ok(IntakeComposer {
            template,
            registry: self.registry,
            stamp_date: self.stamp_date,
            mappings: self.mappings,
            layout: self.layout,
        })
    }
}
