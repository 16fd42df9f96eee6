use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildMetrics {
    pub summary_pages: usize,
    pub template_pages: usize,
    pub total_pages: usize,
    pub fields_rendered: usize,
    pub overlays_stamped: usize,
    pub overlays_skipped: usize,
    pub images_embedded: usize,
    pub bytes: usize,
    pub elapsed_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchMetrics {
    pub builds: Vec<BuildMetrics>,
    pub total_pages: usize,
    pub total_bytes: usize,
    pub total_elapsed_ms: f64,
}

impl BatchMetrics {
    pub fn push(&mut self, metrics: BuildMetrics) {
        self.total_pages += metrics.total_pages;
        self.total_bytes += metrics.bytes;
        self.total_elapsed_ms += metrics.elapsed_ms;
        self.builds.push(metrics);
    }
}
