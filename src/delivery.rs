use crate::error::ComposeError;
use crate::submission::IntakeSubmission;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

pub const DEFAULT_FROM: &str = "Castle Acupuncture <no-reply@castleacupuncture.com>";
pub const DEFAULT_OFFICE_ADDRESS: &str = "philsgu@icloud.com";

/// Fixed addressing for intake notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailSettings {
    pub from: String,
    pub fallback_recipient: String,
    pub reply_to: String,
    pub cc: Vec<String>,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            from: DEFAULT_FROM.to_string(),
            fallback_recipient: DEFAULT_OFFICE_ADDRESS.to_string(),
            reply_to: DEFAULT_OFFICE_ADDRESS.to_string(),
            cc: vec![DEFAULT_OFFICE_ADDRESS.to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    /// Standard base64 of the file bytes.
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub reply_to: String,
    pub cc: Vec<String>,
    pub subject: String,
    pub html: String,
    pub attachments: Vec<Attachment>,
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn patient_email(submission: &IntakeSubmission) -> Option<String> {
    submission
        .form_data
        .display_value("email")
        .filter(|email| email.contains('@'))
}

/// `formData.email` when it looks like an address, otherwise the fallback.
pub fn recipient_for(submission: &IntakeSubmission, settings: &MailSettings) -> String {
    patient_email(submission).unwrap_or_else(|| settings.fallback_recipient.clone())
}

pub fn attachment_filename(submission: &IntakeSubmission) -> String {
    format!(
        "Intake_{}_{}.pdf",
        submission.last_name.trim(),
        submission.first_name.trim()
    )
}

pub fn compose_intake_email(submission: &IntakeSubmission, pdf: &[u8], settings: &MailSettings) -> EmailMessage {
    let first = submission.first_name.trim();
    let last = submission.last_name.trim();
    let email_line = submission
        .form_data
        .display_value("email")
        .unwrap_or_else(|| "N/A".to_string());
    let html = format!(
        "<h1>New Patient Intake Form Submitted</h1>\n\
         <p><strong>Name:</strong> {} {}</p>\n\
         <p><strong>DOB:</strong> {}</p>\n\
         <p><strong>Patient Email:</strong> {}</p>\n\
         <p>A PDF copy of the intake packet is attached.</p>\n",
        escape_html(first),
        escape_html(last),
        escape_html(submission.dob.trim()),
        escape_html(&email_line),
    );
    EmailMessage {
        from: settings.from.clone(),
        to: vec![recipient_for(submission, settings)],
        reply_to: settings.reply_to.clone(),
        cc: settings.cc.clone(),
        subject: format!("New Patient Intake: {}, {}", last, first),
        html,
        attachments: vec![Attachment {
            filename: attachment_filename(submission),
            content: base64::engine::general_purpose::STANDARD.encode(pdf),
        }],
    }
}

/// Hands a composed message to a mail provider.
pub trait DeliveryChannel: Send + Sync {
    fn provider(&self) -> &str;
    fn deliver(&self, message: &EmailMessage) -> Result<(), ComposeError>;
}

/// Writes each message as a JSON file into a directory for a relay to pick up.
#[derive(Debug)]
pub struct OutboxDir {
    dir: PathBuf,
    sequence: AtomicU64,
}

impl OutboxDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn failure(&self, detail: impl std::fmt::Display) -> ComposeError {
        ComposeError::Delivery {
            provider: self.provider().to_string(),
            detail: detail.to_string(),
        }
    }
}

impl DeliveryChannel for OutboxDir {
    fn provider(&self) -> &str {
        "outbox"
    }

    fn deliver(&self, message: &EmailMessage) -> Result<(), ComposeError> {
        std::fs::create_dir_all(&self.dir).map_err(|err| self.failure(err))?;
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let path = self.dir.join(format!("{stamp}-{seq:04}.json"));
        let json = serde_json::to_vec_pretty(message).map_err(|err| self.failure(err))?;
        std::fs::write(&path, json).map_err(|err| self.failure(format!("{}: {}", path.display(), err)))?;
        tracing::info!(
            provider = self.provider(),
            to = ?message.to,
            path = %path.display(),
            "intake email queued"
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_channels {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    pub(crate) struct RecordingChannel {
        pub(crate) sent: Mutex<Vec<EmailMessage>>,
        pub(crate) reject: bool,
    }

    impl DeliveryChannel for RecordingChannel {
        fn provider(&self) -> &str {
            "recording"
        }

        fn deliver(&self, message: &EmailMessage) -> Result<(), ComposeError> {
            if self.reject {
                return Err(ComposeError::Delivery {
                    provider: "recording".to_string(),
                    detail: "validation_error - invalid recipient".to_string(),
                });
            }
            self.sent.lock().expect("lock").push(message.clone());
            Ok(())
        }
    }
}
