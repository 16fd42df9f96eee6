use crate::assembler::IntakeComposer;
use crate::delivery::{DeliveryChannel, MailSettings, compose_intake_email};
use crate::error::ComposeError;
use crate::submission::{FormData, IntakeSubmission};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// The persisted shape of a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubmission {
    pub first_name: String,
    pub last_name: String,
    pub dob: String,
    pub submitted_at: DateTime<Utc>,
    pub form_data: FormData,
}

impl NewSubmission {
    pub fn new(submission: &IntakeSubmission, submitted_at: DateTime<Utc>) -> Self {
        Self {
            first_name: submission.first_name.clone(),
            last_name: submission.last_name.clone(),
            dob: submission.dob.clone(),
            submitted_at,
            form_data: submission.form_data.clone(),
        }
    }
}

/// Opaque identifier assigned by a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub patient_id: RecordId,
    pub status: String,
}

pub trait SubmissionStore: Send + Sync {
    fn persist(&self, record: &NewSubmission) -> Result<RecordId, ComposeError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<(RecordId, NewSubmission)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(RecordId, NewSubmission)> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl SubmissionStore for MemoryStore {
    fn persist(&self, record: &NewSubmission) -> Result<RecordId, ComposeError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| ComposeError::Persistence("memory store lock poisoned".to_string()))?;
        let id = RecordId(format!("mem-{}", records.len() + 1));
        records.push((id.clone(), record.clone()));
        Ok(id)
    }
}

/// One pretty-printed JSON file per record, named after its id.
#[derive(Debug)]
pub struct JsonDirStore {
    dir: PathBuf,
    sequence: AtomicU64,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &RecordId) -> PathBuf {
        self.dir.join(format!("{}.json", id.0))
    }

    pub fn load(&self, id: &RecordId) -> Result<NewSubmission, ComposeError> {
        let path = self.record_path(id);
        let data = std::fs::read(&path)
            .map_err(|err| ComposeError::Persistence(format!("{}: {}", path.display(), err)))?;
        serde_json::from_slice(&data)
            .map_err(|err| ComposeError::Persistence(format!("{}: {}", path.display(), err)))
    }
}

impl SubmissionStore for JsonDirStore {
    fn persist(&self, record: &NewSubmission) -> Result<RecordId, ComposeError> {
        use std::io::Write;

        std::fs::create_dir_all(&self.dir)
            .map_err(|err| ComposeError::Persistence(format!("{}: {}", self.dir.display(), err)))?;
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let id = RecordId(format!(
            "{}-{:04}",
            record.submitted_at.format("%Y%m%dT%H%M%S%3fZ"),
            seq
        ));
        let path = self.record_path(&id);
        let json = serde_json::to_vec_pretty(record)
            .map_err(|err| ComposeError::Persistence(err.to_string()))?;
        // create_new: two processes sharing a directory must not overwrite each other.
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|err| ComposeError::Persistence(format!("{}: {}", path.display(), err)))?;
        file.write_all(&json)
            .map_err(|err| ComposeError::Persistence(format!("{}: {}", path.display(), err)))?;
        Ok(id)
    }
}

/// Persists the submission, composes the PDF and delivers it. Failures after
/// persistence leave the stored record in place; nothing is rolled back.
pub fn submit_and_notify(
    store: &dyn SubmissionStore,
    composer: &IntakeComposer,
    delivery: &dyn DeliveryChannel,
    submission: &IntakeSubmission,
    mail: &MailSettings,
) -> Result<SubmissionReceipt, ComposeError> {
    let record = NewSubmission::new(submission, Utc::now());
    let patient_id = store.persist(&record)?;
    tracing::info!(patient_id = %patient_id, "submission persisted");

    let pdf = composer.build(submission).inspect_err(|err| {
        tracing::error!(patient_id = %patient_id, error = %err, "intake pdf build failed after persistence");
    })?;
    let message = compose_intake_email(submission, &pdf, mail);
    delivery.deliver(&message).inspect_err(|err| {
        tracing::error!(
            patient_id = %patient_id,
            provider = delivery.provider(),
            error = %err,
            "intake delivery failed after persistence"
        );
    })?;

    Ok(SubmissionReceipt {
        patient_id,
        status: "sent".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::test_channels::RecordingChannel;
    use crate::template::test_pdfs::template_pdf_bytes;
    use chrono::NaiveDate;

    fn composer(pages: usize) -> IntakeComposer {
        IntakeComposer::builder()
            .template_bytes(template_pdf_bytes(pages))
            .stamp_date(NaiveDate::from_ymd_opt(2025, 5, 2).expect("date"))
            .build()
            .expect("composer")
    }

    fn jane() -> IntakeSubmission {
        IntakeSubmission::new("Jane", "Doe", "1990-05-02")
            .with_form_data(FormData::new().with("email", "jane@example.com"))
    }

    #[test]
    fn record_serializes_with_submitted_at() {
        let at = DateTime::parse_from_rfc3339("2025-05-02T15:04:05Z")
            .expect("ts")
            .with_timezone(&Utc);
        let record = NewSubmission::new(&jane(), at);
        let json = serde_json::to_value(&record).expect("json");
        assert_eq!(json["firstName"], "Jane");
        assert_eq!(json["submittedAt"], "2025-05-02T15:04:05Z");
        assert_eq!(json["formData"]["email"], "jane@example.com");
    }

    #[test]
    fn receipt_uses_patient_id_field() {
        let receipt = SubmissionReceipt {
            patient_id: RecordId("abc".to_string()),
            status: "sent".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&receipt).expect("json"),
            r#"{"patientId":"abc","status":"sent"}"#
        );
    }

    #[test]
    fn submit_persists_then_delivers() {
        let store = MemoryStore::new();
        let channel = RecordingChannel::default();
        let receipt = submit_and_notify(&store, &composer(4), &channel, &jane(), &MailSettings::default())
            .expect("submit");
        assert_eq!(receipt.status, "sent");
        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, receipt.patient_id);

        let sent = channel.sent.lock().expect("lock");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["jane@example.com".to_string()]);
        assert_eq!(sent[0].attachments[0].filename, "Intake_Doe_Jane.pdf");
    }

    #[test]
    fn delivery_failure_surfaces_after_persistence() {
        let store = MemoryStore::new();
        let channel = RecordingChannel {
            reject: true,
            ..RecordingChannel::default()
        };
        let err = submit_and_notify(&store, &composer(4), &channel, &jane(), &MailSettings::default())
            .expect_err("rejected");
        assert!(err.to_string().contains("invalid recipient"));
        assert_eq!(store.records().len(), 1);
    }

    #[test]
    fn build_failure_skips_delivery() {
        let store = MemoryStore::new();
        let channel = RecordingChannel::default();
        let err = submit_and_notify(&store, &composer(2), &channel, &jane(), &MailSettings::default())
            .expect_err("short template");
        assert!(err.is_configuration());
        assert_eq!(store.records().len(), 1);
        assert!(channel.sent.lock().expect("lock").is_empty());
    }

    #[test]
    fn json_dir_store_round_trips_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonDirStore::new(dir.path().join("records"));
        let record = NewSubmission::new(&jane(), Utc::now());
        let first = store.persist(&record).expect("persist");
        let second = store.persist(&record).expect("persist");
        assert_ne!(first, second);
        assert_eq!(store.load(&first).expect("load"), record);
    }
}
