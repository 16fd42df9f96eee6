use crate::error::ComposeError;
use intake_form_contract::TEMPLATE_MIN_PAGES;
use lopdf::{Dictionary, Document as LoDocument, Object as LoObject, ObjectId as LoObjectId};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where the fixed multi-page template comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    Path(PathBuf),
    Bytes(Arc<Vec<u8>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateAsset {
    pub source: TemplateSource,
    /// Expected lowercase hex SHA-256 of the template bytes.
    pub sha256: Option<String>,
}

#[derive(Debug)]
pub struct LoadedTemplate {
    pub document: LoDocument,
    pub page_ids: Vec<LoObjectId>,
    pub sha256: String,
}

impl TemplateAsset {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: TemplateSource::Path(path.into()),
            sha256: None,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            source: TemplateSource::Bytes(Arc::new(bytes)),
            sha256: None,
        }
    }

    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into().trim().to_ascii_lowercase());
        self
    }

    pub fn describe(&self) -> String {
        match &self.source {
            TemplateSource::Path(path) => path.display().to_string(),
            TemplateSource::Bytes(bytes) => format!("<{} embedded bytes>", bytes.len()),
        }
    }

    pub fn read_bytes(&self) -> Result<Arc<Vec<u8>>, ComposeError> {
        match &self.source {
            TemplateSource::Bytes(bytes) => Ok(bytes.clone()),
            TemplateSource::Path(path) => std::fs::read(path).map(Arc::new).map_err(|err| {
                ComposeError::Configuration(format!(
                    "template unreadable: {}: {}",
                    path.display(),
                    err
                ))
            }),
        }
    }

    /// Loads and checks the template: checksum pin, parse, encryption and page count.
    pub fn load(&self) -> Result<LoadedTemplate, ComposeError> {
        let bytes = self.read_bytes()?;
        let digest = hex_sha256(&bytes);
        if let Some(expected) = &self.sha256 {
            if *expected != digest {
                return Err(ComposeError::Configuration(format!(
                    "template checksum mismatch for {}: expected {} found {}",
                    self.describe(),
                    expected,
                    digest
                )));
            }
        }
        let document = LoDocument::load_mem(&bytes).map_err(|err| {
            ComposeError::Configuration(format!("template malformed: {}: {}", self.describe(), err))
        })?;
        if document.is_encrypted() {
            return Err(ComposeError::Configuration(format!(
                "template PDF is encrypted: {}",
                self.describe()
            )));
        }
        let page_ids: Vec<LoObjectId> = document.get_pages().values().copied().collect();
        if page_ids.len() < TEMPLATE_MIN_PAGES {
            return Err(ComposeError::Configuration(format!(
                "template has {} page(s), at least {} required",
                page_ids.len(),
                TEMPLATE_MIN_PAGES
            )));
        }
        Ok(LoadedTemplate {
            document,
            page_ids,
            sha256: digest,
        })
    }
}

pub fn hex_sha256(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn deref<'a>(doc: &'a LoDocument, obj: &'a LoObject) -> Option<&'a LoObject> {
    match obj {
        LoObject::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

pub(crate) fn deref_dict<'a>(doc: &'a LoDocument, obj: &'a LoObject) -> Option<&'a Dictionary> {
    deref(doc, obj).and_then(|o| o.as_dict().ok())
}

/// Looks up a page attribute, walking `Parent` links for inheritable keys.
pub(crate) fn inherited_attribute(doc: &LoDocument, page_id: LoObjectId, key: &[u8]) -> Option<LoObject> {
    let mut current = doc.get_object(page_id).ok()?.as_dict().ok()?;
    // Page trees are shallow; the bound guards against Parent cycles.
    for _ in 0..32 {
        if let Ok(value) = current.get(key) {
            return Some(value.clone());
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_object(parent).ok()?.as_dict().ok()?;
    }
    None
}

pub(crate) fn page_size(doc: &LoDocument, page_id: LoObjectId) -> Option<(f32, f32)> {
    let media_box = inherited_attribute(doc, page_id, b"MediaBox")?;
    let values = deref(doc, &media_box)?.as_array().ok()?;
    let nums: Vec<f32> = values
        .iter()
        .filter_map(|v| deref(doc, v).and_then(|o| o.as_float().ok()))
        .collect();
    if nums.len() != 4 {
        return None;
    }
    Some(((nums[2] - nums[0]).abs(), (nums[3] - nums[1]).abs()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormFieldInfo {
    pub name: String,
    pub field_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateIssue {
    Encrypted,
    TooFewPages,
    NotLetterSized,
}

impl TemplateIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateIssue::Encrypted => "PDF_ENCRYPTED_UNSUPPORTED",
            TemplateIssue::TooFewPages => "PDF_TOO_FEW_PAGES",
            TemplateIssue::NotLetterSized => "PDF_NOT_LETTER_SIZED",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateReport {
    pub pdf_version: String,
    pub page_count: usize,
    pub encrypted: bool,
    pub file_size_bytes: usize,
    pub sha256: String,
    pub page_sizes: Vec<Option<(f32, f32)>>,
    pub form_fields: Vec<FormFieldInfo>,
}

impl TemplateReport {
    /// Problems that would stop (or visibly misplace) composition with this template.
    pub fn composition_issues(&self) -> Vec<TemplateIssue> {
        let mut issues = Vec::new();
        if self.encrypted {
            issues.push(TemplateIssue::Encrypted);
        }
        if self.page_count < TEMPLATE_MIN_PAGES {
            issues.push(TemplateIssue::TooFewPages);
        }
        let off_letter = self.page_sizes.iter().flatten().any(|(w, h)| {
            (w - intake_form_contract::PAGE_WIDTH).abs() > 1.0
                || (h - intake_form_contract::PAGE_HEIGHT).abs() > 1.0
        });
        if off_letter {
            issues.push(TemplateIssue::NotLetterSized);
        }
        issues
    }

    pub fn is_compatible(&self) -> bool {
        self.composition_issues()
            .iter()
            .all(|issue| *issue == TemplateIssue::NotLetterSized)
    }
}

fn collect_fields(doc: &LoDocument, field: &Dictionary, prefix: &str, depth: usize, out: &mut Vec<FormFieldInfo>) {
    let partial = field
        .get(b"T")
        .ok()
        .and_then(|t| t.as_str().ok())
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned());
    let name = match (&partial, prefix.is_empty()) {
        (Some(part), true) => part.clone(),
        (Some(part), false) => format!("{prefix}.{part}"),
        (None, _) => prefix.to_string(),
    };
    let kids = field
        .get(b"Kids")
        .ok()
        .and_then(|k| deref(doc, k))
        .and_then(|k| k.as_array().ok());
    let has_named_kids = kids
        .map(|k| {
            k.iter()
                .filter_map(|kid| deref_dict(doc, kid))
                .any(|kid| kid.has(b"T"))
        })
        .unwrap_or(false);
    if has_named_kids && depth < 16 {
        for kid in kids.into_iter().flatten() {
            if let Some(kid) = deref_dict(doc, kid) {
                collect_fields(doc, kid, &name, depth + 1, out);
            }
        }
        return;
    }
    let field_type = field
        .get(b"FT")
        .ok()
        .and_then(|ft| ft.as_name().ok())
        .map(|n| String::from_utf8_lossy(n).into_owned())
        .unwrap_or_else(|| "unknown".to_string());
    if !name.is_empty() {
        out.push(FormFieldInfo { name, field_type });
    }
}

fn form_fields(doc: &LoDocument) -> Vec<FormFieldInfo> {
    let mut out = Vec::new();
    let Ok(catalog) = doc.catalog() else {
        return out;
    };
    let Some(acro_form) = catalog.get(b"AcroForm").ok().and_then(|a| deref_dict(doc, a)) else {
        return out;
    };
    let Some(fields) = acro_form
        .get(b"Fields")
        .ok()
        .and_then(|f| deref(doc, f))
        .and_then(|f| f.as_array().ok())
    else {
        return out;
    };
    for field in fields {
        if let Some(dict) = deref_dict(doc, field) {
            collect_fields(doc, dict, "", 0, &mut out);
        }
    }
    out
}

pub fn inspect_template_bytes(bytes: &[u8]) -> Result<TemplateReport, ComposeError> {
    let doc = LoDocument::load_mem(bytes)
        .map_err(|err| ComposeError::Configuration(format!("template malformed: {err}")))?;
    let pages: Vec<LoObjectId> = doc.get_pages().values().copied().collect();
    Ok(TemplateReport {
        pdf_version: doc.version.clone(),
        page_count: pages.len(),
        encrypted: doc.is_encrypted(),
        file_size_bytes: bytes.len(),
        sha256: hex_sha256(bytes),
        page_sizes: pages.iter().map(|id| page_size(&doc, *id)).collect(),
        form_fields: form_fields(&doc),
    })
}

pub fn inspect_template_path(path: &Path) -> Result<TemplateReport, ComposeError> {
    let data = std::fs::read(path)?;
    inspect_template_bytes(&data)
}
