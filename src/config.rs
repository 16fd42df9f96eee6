use crate::assembler::{IntakeComposer, IntakeComposerBuilder};
use crate::delivery::MailSettings;
use crate::error::ComposeError;
use crate::signature::data_reference_from_file;
use chrono::NaiveDate;
use intake_form_contract::OFFICE_SIGNER;
use std::path::PathBuf;

pub const DEFAULT_TEMPLATE_PATH: &str = "new_pt_packet_2025.pdf";
pub const DEFAULT_OUTBOX_DIR: &str = "outbox";
pub const DEFAULT_STORE_DIR: &str = "submissions";

/// Deployment settings, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposerConfig {
    pub template_path: PathBuf,
    pub template_sha256: Option<String>,
    /// PNG or JPEG image registered as the office signature.
    pub office_signature: Option<PathBuf>,
    pub stamp_date: Option<NaiveDate>,
    pub mail: MailSettings,
    pub outbox_dir: PathBuf,
    pub store_dir: PathBuf,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            template_path: PathBuf::from(DEFAULT_TEMPLATE_PATH),
            template_sha256: None,
            office_signature: None,
            stamp_date: None,
            mail: MailSettings::default(),
            outbox_dir: PathBuf::from(DEFAULT_OUTBOX_DIR),
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
        }
    }
}

impl ComposerConfig {
    pub fn from_env() -> Result<Self, ComposeError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads `INTAKE_*` settings through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ComposeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();
        if let Some(path) = get("INTAKE_TEMPLATE_PATH") {
            config.template_path = PathBuf::from(path);
        }
        config.template_sha256 = get("INTAKE_TEMPLATE_SHA256");
        config.office_signature = get("INTAKE_OFFICE_SIGNATURE").map(PathBuf::from);
        if let Some(raw) = get("INTAKE_STAMP_DATE") {
            let date = NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|err| {
                ComposeError::Configuration(format!("INTAKE_STAMP_DATE={raw}: {err}"))
            })?;
            config.stamp_date = Some(date);
        }
        if let Some(from) = get("INTAKE_MAIL_FROM") {
            config.mail.from = from;
        }
        if let Some(fallback) = get("INTAKE_MAIL_FALLBACK") {
            config.mail.fallback_recipient = fallback;
        }
        if let Some(reply_to) = get("INTAKE_MAIL_REPLY_TO") {
            config.mail.reply_to = reply_to;
        }
        if let Some(cc) = get("INTAKE_MAIL_CC") {
            config.mail.cc = cc
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(dir) = get("INTAKE_OUTBOX_DIR") {
            config.outbox_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("INTAKE_STORE_DIR") {
            config.store_dir = PathBuf::from(dir);
        }
        Ok(config)
    }

    pub fn composer_builder(&self) -> Result<IntakeComposerBuilder, ComposeError> {
        let mut builder = IntakeComposer::builder().template_path(self.template_path.clone());
        if let Some(sha256) = &self.template_sha256 {
            builder = builder.template_sha256(sha256.clone());
        }
        if let Some(date) = self.stamp_date {
            builder = builder.stamp_date(date);
        }
        if let Some(path) = &self.office_signature {
            let reference = data_reference_from_file(path, true)?;
            builder = builder.signer(OFFICE_SIGNER, reference)?;
        }
        Ok(builder)
    }

    /// Builds a composer and checks the template up front.
    pub fn build_composer(&self) -> Result<IntakeComposer, ComposeError> {
        self.composer_builder()?.verify_template(true).build()
    }
}
