mod assembler;
mod canvas;
mod config;
mod dates;
mod delivery;
mod error;
mod fields;
mod finalize;
mod font;
mod grid;
mod intake;
mod layout;
mod metrics;
mod overlay;
mod pdf;
mod signature;
mod submission;
mod summary;
mod template;
mod types;

pub use assembler::{ComposedLayers, IntakeComposer, IntakeComposerBuilder};
pub use canvas::{Canvas, Command, Document, Page};
pub use config::{ComposerConfig, DEFAULT_OUTBOX_DIR, DEFAULT_STORE_DIR, DEFAULT_TEMPLATE_PATH};
pub use dates::{format_dob, format_stamp_date, today};
pub use delivery::{
    Attachment, DEFAULT_FROM, DEFAULT_OFFICE_ADDRESS, DeliveryChannel, EmailMessage, MailSettings,
    OutboxDir, attachment_filename, compose_intake_email, recipient_for,
};
pub use error::ComposeError;
pub use fields::{is_listable_key, is_registered, is_reserved_key, is_signature_key, label};
pub use finalize::{ComposedPdf, PdfComposer};
pub use font::{FontMetrics, MeasureText, StandardFont};
pub use grid::{GRID_STEP, GridOptions, draw_grid, outline_page_mappings, render_grid_pdf};
pub use intake::{
    JsonDirStore, MemoryStore, NewSubmission, RecordId, SubmissionReceipt, SubmissionStore,
    submit_and_notify,
};
pub use intake_form_contract as contract;
pub use layout::{sanitize_text, wrap};
pub use metrics::{BatchMetrics, BuildMetrics};
pub use overlay::{
    OVERLAY_FONT, OVERLAY_FONT_SIZE, OverlayOutcome, OverlayRenderer, OverlayReport, SkipReason,
    centred_baseline, draw_origin, draw_rect, text_value,
};
pub use pdf::{AlphaData, ImageData, ImageKind, RenderedPage, ResourceWriter, decode_image_bytes, render_page};
pub use signature::{
    SignaturePayload, SignatureRegistry, data_reference_from_file, encode_data_reference,
    is_recognized_signature,
};
pub use submission::{FormData, FormValue, IntakeSubmission, is_blank_answer};
pub use summary::{
    ADDITIONAL_SECTION_TITLE, CERTIFICATION_TEXT, RenderCursor, SIGNATURE_STRIP_TEXT, SUMMARY_TITLE,
    SummaryLayout, SummaryRenderer, SummaryReport, body_text_width,
};
pub use template::{
    FormFieldInfo, LoadedTemplate, TemplateAsset, TemplateIssue, TemplateReport, TemplateSource,
    hex_sha256, inspect_template_bytes, inspect_template_path,
};
pub use types::{Color, Margins, Pt, Rect, Size};
