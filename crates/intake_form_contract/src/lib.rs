use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

pub const CONTRACT_ID: &str = "intake.form_contract";
pub const CONTRACT_VERSION: &str = "2025.1";

// US Letter at 72pt/in. Every template page and every summary page uses it.
pub const PAGE_WIDTH: f32 = 612.0;
pub const PAGE_HEIGHT: f32 = 792.0;

/// 1-indexed template pages copied into the packet, in output order.
pub const TEMPLATE_PAGES: [u8; 3] = [2, 3, 4];
pub const TEMPLATE_MIN_PAGES: usize = 4;

pub const SIGNATURE_KEY_PREFIX: &str = "sig";
pub const SIGNATURE_DATA_SUFFIX: &str = "Data";
pub const PATIENT_NAME_KEY: &str = "patientName";
pub const TERMS_PATIENT_SIGNER: &str = "sigTermsPatient";
pub const OFFICE_SIGNER: &str = "sigArbOffice";

/// Keys the summary never lists as answers.
pub const RESERVED_KEYS: [&str; 5] = ["formData", "firstName", "lastName", "dob", PATIENT_NAME_KEY];

// Authored boxes come from a 50pt measuring grid; neighbours may touch by less than this.
pub const OVERLAP_TOLERANCE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub key: &'static str,
    pub label: &'static str,
}

const fn field(key: &'static str, label: &'static str) -> FieldDef {
    FieldDef { key, label }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionDef {
    pub title: &'static str,
    pub fields: &'static [FieldDef],
}

const DEMOGRAPHICS: [FieldDef; 12] = [
    field("sex", "Sex"),
    field("address", "Address"),
    field("city", "City"),
    field("state", "State"),
    field("zip", "Zip Code"),
    field("cellPhone", "Cell Phone"),
    field("homePhone", "Home Phone"),
    field("email", "Email"),
    field("occupation", "Occupation"),
    field("emergencyContact", "Emergency Contact"),
    field("emergencyPhone", "Emergency Phone"),
    field("referredBy", "Referred By"),
];

const CURRENT_CONDITION: [FieldDef; 7] = [
    field("chiefComplaint", "Chief Complaint"),
    field("conditionOnset", "Onset"),
    field("conditionCause", "Cause"),
    field("otherCondition", "Other Condition"),
    field("priorTreatment", "Prior Treatment"),
    field("treatmentOther", "Other Treatment"),
    field("treatmentGoals", "Treatment Goals"),
];

const PAIN_AND_SYMPTOMS: [FieldDef; 7] = [
    field("painLevel", "Pain Level (0-10)"),
    field("painLocation", "Pain Location"),
    field("painType", "Pain Type"),
    field("painFrequency", "Pain Frequency"),
    field("painWorse", "Worse With"),
    field("symptoms", "Symptoms"),
    field("lastMenses", "Last Menses"),
];

const MEDICAL_HISTORY: [FieldDef; 12] = [
    field("conditions", "Conditions"),
    field("otherConditionDetails", "Other Conditions"),
    field("medications", "Medications"),
    field("allergies", "Allergies"),
    field("surgeries", "Surgeries"),
    field("familyHistory", "Family History"),
    field("familyHistoryOtherDetails", "Family History (Other)"),
    field("tobaccoUseRef", "Tobacco Use"),
    field("tobaccoDetails", "Tobacco Details"),
    field("alcoholUse", "Alcohol Use"),
    field("pregnant", "Pregnant"),
    field("primaryPhysician", "Primary Physician"),
];

pub const SUMMARY_SECTIONS: [SectionDef; 4] = [
    SectionDef {
        title: "Demographics",
        fields: &DEMOGRAPHICS,
    },
    SectionDef {
        title: "Current Condition",
        fields: &CURRENT_CONDITION,
    },
    SectionDef {
        title: "Pain & Symptoms",
        fields: &PAIN_AND_SYMPTOMS,
    },
    SectionDef {
        title: "Medical History",
        fields: &MEDICAL_HISTORY,
    },
];

/// Answers collected on the consent steps; labelled, but not part of any summary section.
pub const CONSENT_FIELDS: [FieldDef; 4] = [
    field("isPatientSigner", "Patient Is Signer"),
    field("arbGuardianName", "Parent or Guardian"),
    field("consentRelationship", "Relationship to Patient"),
    field("retroactiveCoverage", "Retroactive Arbitration Coverage"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerSource {
    /// Captured on the form and submitted as `<key>Data`.
    Submission,
    /// Supplied by deployment configuration, never by the patient.
    PreRegistered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureFieldDef {
    pub key: &'static str,
    pub data_key: &'static str,
    pub label: &'static str,
    pub source: SignerSource,
}

const fn signer(key: &'static str, data_key: &'static str, label: &'static str) -> SignatureFieldDef {
    SignatureFieldDef {
        key,
        data_key,
        label,
        source: SignerSource::Submission,
    }
}

pub const SIGNATURE_FIELDS: [SignatureFieldDef; 8] = [
    signer("sigTermsPatient", "sigTermsPatientData", "Patient Signature (Terms)"),
    signer("sigTermsRep", "sigTermsRepData", "Representative Signature (Terms)"),
    signer("sigPrivacyPatient", "sigPrivacyPatientData", "Patient Signature (Privacy)"),
    signer("sigPrivacyRep", "sigPrivacyRepData", "Representative Signature (Privacy)"),
    signer("sigArbPatient", "sigArbPatientData", "Patient Signature (Arbitration)"),
    signer("sigArbGuardian", "sigArbGuardianData", "Guardian Signature (Arbitration)"),
    SignatureFieldDef {
        key: OFFICE_SIGNER,
        data_key: "sigArbOfficeData",
        label: "Office Signature (Arbitration)",
        source: SignerSource::PreRegistered,
    },
    signer("sigConsentPatient", "sigConsentPatientData", "Signature (Consent)"),
];

pub fn signature_field(key: &str) -> Option<&'static SignatureFieldDef> {
    SIGNATURE_FIELDS.iter().find(|def| def.key == key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    Signature,
    Date,
    Text,
}

impl OverlayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayKind::Signature => "signature",
            OverlayKind::Date => "date",
            OverlayKind::Text => "text",
        }
    }
}

/// Top-left origin rectangle in page points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayBox {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl OverlayBox {
    pub const fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    pub fn fits_page(&self, page_width: f32, page_height: f32) -> bool {
        self.left >= 0.0
            && self.top >= 0.0
            && self.width >= 0.0
            && self.height >= 0.0
            && self.right() <= page_width
            && self.bottom() <= page_height
    }

    fn overlap_extent(&self, other: &OverlayBox) -> (f32, f32) {
        let dx = self.right().min(other.right()) - self.left.max(other.left);
        let dy = self.bottom().min(other.bottom()) - self.top.max(other.top);
        (dx, dy)
    }

    pub fn overlaps(&self, other: &OverlayBox, tolerance: f32) -> bool {
        let (dx, dy) = self.overlap_extent(other);
        dx > tolerance && dy > tolerance
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayMapping {
    /// 1-indexed template page the box belongs to.
    pub page_index: u8,
    pub kind: OverlayKind,
    pub source_key: Option<&'static str>,
    pub bbox: OverlayBox,
    pub literal_text: Option<&'static str>,
    pub date_dependency_key: Option<&'static str>,
}

const fn signature_box(page_index: u8, signer: &'static str, bbox: OverlayBox) -> OverlayMapping {
    OverlayMapping {
        page_index,
        kind: OverlayKind::Signature,
        source_key: Some(signer),
        bbox,
        literal_text: None,
        date_dependency_key: None,
    }
}

const fn date_box(page_index: u8, signer: &'static str, bbox: OverlayBox) -> OverlayMapping {
    OverlayMapping {
        page_index,
        kind: OverlayKind::Date,
        source_key: None,
        bbox,
        literal_text: None,
        date_dependency_key: Some(signer),
    }
}

const fn sourced_text(page_index: u8, key: &'static str, bbox: OverlayBox) -> OverlayMapping {
    OverlayMapping {
        page_index,
        kind: OverlayKind::Text,
        source_key: Some(key),
        bbox,
        literal_text: None,
        date_dependency_key: None,
    }
}

const fn literal_text(page_index: u8, text: &'static str, bbox: OverlayBox) -> OverlayMapping {
    OverlayMapping {
        page_index,
        kind: OverlayKind::Text,
        source_key: None,
        bbox,
        literal_text: Some(text),
        date_dependency_key: None,
    }
}

pub const PRACTICE_NAME: &str = "Castle Acupuncture";
pub const PRACTITIONER_NAME: &str = "Georgina Castle, L.Ac";

pub const OVERLAY_MAPPINGS: [OverlayMapping; 22] = [
    // Page 2: financial terms and privacy acknowledgement.
    signature_box(2, "sigTermsPatient", OverlayBox::new(87.74, 562.33, 91.29, 22.26)),
    date_box(2, "sigTermsPatient", OverlayBox::new(192.89, 558.92, 51.45, 22.26)),
    signature_box(2, "sigTermsRep", OverlayBox::new(322.99, 559.42, 104.69, 22.26)),
    date_box(2, "sigTermsRep", OverlayBox::new(442.92, 559.22, 49.64, 23.26)),
    sourced_text(2, PATIENT_NAME_KEY, OverlayBox::new(79.34, 627.9, 176.68, 17.97)),
    signature_box(2, "sigPrivacyPatient", OverlayBox::new(88.49, 660.82, 95.79, 24.87)),
    date_box(2, "sigPrivacyPatient", OverlayBox::new(201.74, 660.56, 51.03, 24.87)),
    signature_box(2, "sigPrivacyRep", OverlayBox::new(321.12, 663.71, 112.79, 21.91)),
    date_box(2, "sigPrivacyRep", OverlayBox::new(444.21, 663.28, 44.13, 21.49)),
    // Page 3: arbitration agreement.
    sourced_text(3, PATIENT_NAME_KEY, OverlayBox::new(120.38, 662.06, 125.21, 18.68)),
    signature_box(3, "sigArbPatient", OverlayBox::new(301.04, 661.99, 153.85, 18.68)),
    date_box(3, "sigArbPatient", OverlayBox::new(492.18, 659.97, 73.36, 21.49)),
    sourced_text(3, "arbGuardianName", OverlayBox::new(145.09, 683.79, 100.52, 23.15)),
    signature_box(3, "sigArbGuardian", OverlayBox::new(297.42, 685.38, 160.88, 21.81)),
    date_box(3, "sigArbGuardian", OverlayBox::new(494.03, 682.13, 79.08, 21.81)),
    literal_text(3, PRACTICE_NAME, OverlayBox::new(93.47, 709.05, 153.75, 17.31)),
    signature_box(3, OFFICE_SIGNER, OverlayBox::new(300.72, 706.96, 158.47, 18.33)),
    date_box(3, OFFICE_SIGNER, OverlayBox::new(493.93, 704.99, 77.19, 18.33)),
    // Page 4: informed consent to treat.
    sourced_text(4, PATIENT_NAME_KEY, OverlayBox::new(137.95, 585.83, 416.15, 20.64)),
    literal_text(4, PRACTITIONER_NAME, OverlayBox::new(160.56, 636.79, 408.37, 20.64)),
    signature_box(4, "sigConsentPatient", OverlayBox::new(171.81, 688.98, 158.56, 23.31)),
    date_box(4, "sigConsentPatient", OverlayBox::new(372.03, 685.88, 112.65, 23.31)),
];

pub fn overlay_mappings() -> &'static [OverlayMapping] {
    &OVERLAY_MAPPINGS
}

pub fn mappings_for_page(page_index: u8) -> impl Iterator<Item = &'static OverlayMapping> {
    OVERLAY_MAPPINGS
        .iter()
        .filter(move |mapping| mapping.page_index == page_index)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContractViolation {
    PageOutOfRange { index: usize, page_index: u8 },
    OutOfBounds { index: usize },
    Overlap { first: usize, second: usize },
    MissingSource { index: usize },
    UnknownSigner { index: usize, key: String },
    DuplicateFieldKey { key: String },
}

impl std::fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContractViolation::PageOutOfRange { index, page_index } => {
                write!(f, "mapping {index} targets template page {page_index}, expected 2..=4")
            }
            ContractViolation::OutOfBounds { index } => {
                write!(f, "mapping {index} box lies outside the page")
            }
            ContractViolation::Overlap { first, second } => {
                write!(f, "mappings {first} and {second} overlap on the same page")
            }
            ContractViolation::MissingSource { index } => {
                write!(f, "mapping {index} has neither a source key nor literal text")
            }
            ContractViolation::UnknownSigner { index, key } => {
                write!(f, "mapping {index} references unregistered signer {key}")
            }
            ContractViolation::DuplicateFieldKey { key } => {
                write!(f, "field key {key} is defined more than once")
            }
        }
    }
}

impl std::error::Error for ContractViolation {}

/// Checks a mapping table against page bounds, overlap and signer registration rules.
pub fn validate_mappings(mappings: &[OverlayMapping]) -> Vec<ContractViolation> {
    let mut violations = Vec::new();
    for (index, mapping) in mappings.iter().enumerate() {
        if !TEMPLATE_PAGES.contains(&mapping.page_index) {
            violations.push(ContractViolation::PageOutOfRange {
                index,
                page_index: mapping.page_index,
            });
        }
        if !mapping.bbox.fits_page(PAGE_WIDTH, PAGE_HEIGHT) {
            violations.push(ContractViolation::OutOfBounds { index });
        }
        match mapping.kind {
            OverlayKind::Signature => match mapping.source_key {
                Some(key) if signature_field(key).is_some() => {}
                Some(key) => violations.push(ContractViolation::UnknownSigner {
                    index,
                    key: key.to_string(),
                }),
                None => violations.push(ContractViolation::MissingSource { index }),
            },
            OverlayKind::Date => {
                if let Some(key) = mapping.date_dependency_key {
                    if signature_field(key).is_none() {
                        violations.push(ContractViolation::UnknownSigner {
                            index,
                            key: key.to_string(),
                        });
                    }
                }
            }
            OverlayKind::Text => {
                if mapping.source_key.is_none() && mapping.literal_text.is_none() {
                    violations.push(ContractViolation::MissingSource { index });
                }
            }
        }
    }

    for (first, a) in mappings.iter().enumerate() {
        for (offset, b) in mappings[first + 1..].iter().enumerate() {
            if a.page_index == b.page_index && a.bbox.overlaps(&b.bbox, OVERLAP_TOLERANCE) {
                violations.push(ContractViolation::Overlap {
                    first,
                    second: first + 1 + offset,
                });
            }
        }
    }
    violations
}

/// Validates the compiled-in tables; returns every violation found.
pub fn validate_contract() -> Vec<ContractViolation> {
    let mut violations = validate_mappings(&OVERLAY_MAPPINGS);
    let mut seen = std::collections::BTreeSet::new();
    let keys = SUMMARY_SECTIONS
        .iter()
        .flat_map(|section| section.fields.iter())
        .chain(CONSENT_FIELDS.iter())
        .map(|field| field.key);
    for key in keys {
        if !seen.insert(key) {
            violations.push(ContractViolation::DuplicateFieldKey {
                key: key.to_string(),
            });
        }
    }
    violations
}

fn field_json(fields: &[FieldDef]) -> Value {
    Value::Array(
        fields
            .iter()
            .map(|f| json!({ "key": f.key, "label": f.label }))
            .collect(),
    )
}

fn contract_json() -> Value {
    let sections: Vec<Value> = SUMMARY_SECTIONS
        .iter()
        .map(|section| json!({ "title": section.title, "fields": field_json(section.fields) }))
        .collect();
    let signers: Vec<Value> = SIGNATURE_FIELDS
        .iter()
        .map(|def| {
            json!({
                "key": def.key,
                "data_key": def.data_key,
                "pre_registered": def.source == SignerSource::PreRegistered,
            })
        })
        .collect();
    let mappings: Vec<Value> = OVERLAY_MAPPINGS
        .iter()
        .map(|m| {
            json!({
                "page": m.page_index,
                "kind": m.kind.as_str(),
                "source": m.source_key,
                "literal": m.literal_text,
                "depends_on": m.date_dependency_key,
                // Milli-points keep the digest independent of float formatting.
                "box": [
                    (m.bbox.left * 1000.0).round() as i64,
                    (m.bbox.top * 1000.0).round() as i64,
                    (m.bbox.width * 1000.0).round() as i64,
                    (m.bbox.height * 1000.0).round() as i64,
                ],
            })
        })
        .collect();
    json!({
        "id": CONTRACT_ID,
        "version": CONTRACT_VERSION,
        "page": [PAGE_WIDTH as i64, PAGE_HEIGHT as i64],
        "template_pages": TEMPLATE_PAGES,
        "sections": sections,
        "consent_fields": field_json(&CONSENT_FIELDS),
        "signers": signers,
        "mappings": mappings,
    })
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

static CONTRACT_FINGERPRINT: OnceLock<String> = OnceLock::new();

/// SHA-256 over the canonical JSON form of every table in this crate.
pub fn contract_fingerprint_sha256() -> String {
    CONTRACT_FINGERPRINT
        .get_or_init(|| hex_sha256(contract_json().to_string().as_bytes()))
        .clone()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormContractMetadata {
    pub contract_id: &'static str,
    pub contract_version: &'static str,
    pub contract_fingerprint_sha256: String,
    pub mapping_count: usize,
    pub signer_count: usize,
}

pub fn metadata() -> FormContractMetadata {
    FormContractMetadata {
        contract_id: CONTRACT_ID,
        contract_version: CONTRACT_VERSION,
        contract_fingerprint_sha256: contract_fingerprint_sha256(),
        mapping_count: OVERLAY_MAPPINGS.len(),
        signer_count: SIGNATURE_FIELDS.len(),
    }
}
