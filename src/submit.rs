//! Submission pipeline: validate the candidate and the deadline, score the
//! four perspectives, upload evidence, email the awards office, and write
//! the record. Evidence or email failures degrade to warnings on the
//! receipt; a record write that fails even after the store fallback is the
//! only terminal error.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AwardsError, Result};
use crate::evidence::{self, EvidenceStore};
use crate::models::{
    EvidenceFile, LockState, Perspective, PerspectiveEntry, SubmissionRecord,
};
use crate::notify::{Attachment, Notification, Notifier};
use crate::review::STATUS_STAGE1_PENDING;
use crate::scoring;
use crate::store::RecordStore;

pub const DEADLINE_KEY: &str = "submission_deadline";

/// One perspective's slice of the incoming form.
#[derive(Debug, Clone, Default)]
pub struct PerspectiveInput {
    pub action: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Default)]
pub struct SubmissionInput {
    pub candidate_name: String,
    pub perspectives: BTreeMap<Perspective, PerspectiveInput>,
}

#[derive(Debug)]
pub struct SubmissionReceipt {
    pub record_id: Uuid,
    pub candidate_name: String,
    pub submitted_at: DateTime<Utc>,
    pub total_score: f64,
    /// Partial failures (evidence uploads, notification) kept for manual
    /// follow-up; the submission itself still went through.
    pub warnings: Vec<String>,
}

/// Reads the deadline setting and decides whether the window is open.
/// An absent or empty value means submissions are always open.
pub async fn submissions_open_at(
    store: &dyn RecordStore,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    let raw = store.get_setting(DEADLINE_KEY).await?;
    let Some(raw) = raw.filter(|v| !v.trim().is_empty()) else {
        return Ok(None);
    };
    let deadline = DateTime::parse_from_rfc3339(raw.trim())
        .map_err(|e| {
            AwardsError::Config(format!(
                "stored submission_deadline '{raw}' is not a valid RFC 3339 timestamp: {e}"
            ))
        })?
        .with_timezone(&Utc);
    if now > deadline {
        return Err(AwardsError::Validation(format!(
            "the submission window closed on {}",
            deadline.to_rfc3339()
        )));
    }
    Ok(Some(deadline))
}

pub async fn submit(
    store: &dyn RecordStore,
    evidence_store: &dyn EvidenceStore,
    notifier: &dyn Notifier,
    awards_email: &str,
    input: SubmissionInput,
    now: DateTime<Utc>,
) -> Result<SubmissionReceipt> {
    let candidate_name = input.candidate_name.trim().to_string();
    if candidate_name.is_empty() {
        return Err(AwardsError::Validation(
            "please provide your name and surname".to_string(),
        ));
    }

    submissions_open_at(store, now).await?;

    let record_id = Uuid::new_v4();
    let folder = evidence::candidate_folder(&candidate_name, now);
    let mut warnings = Vec::new();
    let mut entries = BTreeMap::new();
    let mut all_attachments = Vec::new();

    for perspective in Perspective::ALL {
        let slice = input
            .perspectives
            .get(&perspective)
            .cloned()
            .unwrap_or_default();
        let score = scoring::score(&slice.action, slice.attachments.len());

        let mut files = Vec::new();
        for attachment in &slice.attachments {
            let path = format!(
                "{folder}/{}/{}",
                perspective.slug(),
                evidence::sanitize_component(&attachment.file_name)
            );
            match evidence_store
                .store(&path, &attachment.bytes, &attachment.content_type)
                .await
            {
                Ok(url) => files.push(EvidenceFile {
                    file_name: attachment.file_name.clone(),
                    storage_path: path,
                    url,
                }),
                Err(err) => {
                    warn!(error = %err, file = %attachment.file_name,
                        "evidence upload failed; submission continues");
                    warnings.push(format!(
                        "evidence '{}' ({perspective}) was not stored: {err}",
                        attachment.file_name
                    ));
                }
            }
        }
        all_attachments.extend(slice.attachments.iter().cloned());

        entries.insert(
            perspective,
            PerspectiveEntry {
                action: slice.action.trim().to_string(),
                score,
                evidence: files,
            },
        );
    }

    let total_score = scoring::total_score(
        Perspective::ALL
            .iter()
            .map(|p| entries.get(p).map(|e| e.score).unwrap_or(0.0)),
    );

    let record = SubmissionRecord {
        id: record_id,
        candidate_name: candidate_name.clone(),
        submitted_at: now,
        entries,
        total_score,
        stage1: None,
        stage1_comment: String::new(),
        committee_votes: Vec::new(),
        current_status: STATUS_STAGE1_PENDING.to_string(),
        lock: LockState::default(),
    };

    let notification = Notification {
        sender: awards_email.to_string(),
        recipient: awards_email.to_string(),
        subject: format!("New Award Submission: {candidate_name}"),
        body: submission_email_body(&record),
        attachments: all_attachments,
    };
    if let Err(err) = notifier.send(&notification).await {
        warn!(error = %err, "submission notification failed; submission continues");
        warnings.push(format!("the notification email was not sent: {err}"));
    }

    store.insert(&record).await?;
    info!(candidate = %candidate_name, total_score, "submission recorded");

    Ok(SubmissionReceipt {
        record_id,
        candidate_name,
        submitted_at: now,
        total_score,
        warnings,
    })
}

/// Plain-text report in the format the awards office has always received.
fn submission_email_body(record: &SubmissionRecord) -> String {
    use std::fmt::Write;

    let mut body = String::new();
    let _ = writeln!(body, "QUALITY & EXCELLENCE AWARDS SUBMISSION");
    let _ = writeln!(body, "Submitted by: {}", record.candidate_name);
    let _ = writeln!(body, "Submitted at: {}", record.submitted_at.to_rfc3339());
    let _ = writeln!(body, "{}", "=".repeat(40));
    let _ = writeln!(body);

    for perspective in Perspective::ALL {
        let entry = record.entry(perspective);
        let _ = writeln!(body, "PERSPECTIVE: {perspective}");
        let _ = writeln!(body, "Goal: {}", perspective.goal());
        let _ = writeln!(body, "Action Taken: {}", entry.action);
        let _ = writeln!(body, "Score: {:.1} / 25", entry.score);
        let _ = writeln!(body, "Evidence: {} file(s) stored", entry.evidence.len());
        let _ = writeln!(body, "{}", "-".repeat(20));
        let _ = writeln!(body);
    }

    let _ = writeln!(body, "TOTAL SCORE: {:.1} / 100", record.total_score);
    body
}

/// Loads realistic sample submissions, mainly for demos and local runs.
pub async fn seed(store: &dyn RecordStore) -> Result<usize> {
    let samples: [(&str, [&str; 4]); 3] = [
        (
            "Rudo Banda",
            [
                "Renegotiated the fleet maintenance contract, saving 12% on cost while \
                 keeping the same service levels across all three depots.",
                "Retained our two largest guarding contracts through quarterly service \
                 reviews and a customer satisfaction survey programme.",
                "Closed every SHEQ audit finding from last year and cut incident \
                 response time through a new escalation procedure.",
                "Mentored four new control-room operators to full competency sign-off.",
            ],
        ),
        (
            "Tendai Chirwa",
            [
                "Introduced route optimisation for cash-in-transit runs, reducing fuel \
                 cost and overtime while lifting on-time performance.",
                "Resolved a long-running complaint from a key retail customer and \
                 converted the account to a three-year retention agreement.",
                "Led the ISO compliance self-assessment and fixed the efficiency gaps \
                 it surfaced in the dispatch process.",
                "Ran monthly training clinics that lifted team engagement scores.",
            ],
        ),
        (
            "Chipo Dube",
            [
                "Recovered outstanding receivables and tightened invoicing, improving \
                 revenue collection for the quarter.",
                "Set up a customer feedback loop for alarm-response clients.",
                "Documented the armoury handover procedure to close an audit finding.",
                "Completed the supervisory competency programme with distinction.",
            ],
        ),
    ];

    let mut inserted = 0usize;
    for (index, (name, actions)) in samples.iter().enumerate() {
        let mut entries = BTreeMap::new();
        for (perspective, action) in Perspective::ALL.into_iter().zip(actions.iter()) {
            entries.insert(
                perspective,
                PerspectiveEntry {
                    action: action.to_string(),
                    score: scoring::score(action, 0),
                    evidence: Vec::new(),
                },
            );
        }
        let total_score = scoring::total_score(
            Perspective::ALL
                .iter()
                .map(|p| entries.get(p).map(|e| e.score).unwrap_or(0.0)),
        );
        let submitted_at = Utc::now() - chrono::Duration::hours(index as i64 + 1);
        store
            .insert(&SubmissionRecord {
                id: Uuid::new_v4(),
                candidate_name: name.to_string(),
                submitted_at,
                entries,
                total_score,
                stage1: None,
                stage1_comment: String::new(),
                committee_votes: Vec::new(),
                current_status: STATUS_STAGE1_PENDING.to_string(),
                lock: LockState::default(),
            })
            .await?;
        inserted += 1;
    }
    Ok(inserted)
}

/// Bulk-imports submissions from a CSV export. Evidence cannot travel
/// through CSV, so only the per-perspective attachment counts feed the
/// scores.
pub async fn import_csv(store: &dyn RecordStore, csv_path: &std::path::Path) -> Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        candidate_name: String,
        submitted_at: Option<DateTime<Utc>>,
        financial_action: String,
        #[serde(default)]
        financial_files: usize,
        customer_action: String,
        #[serde(default)]
        customer_files: usize,
        process_action: String,
        #[serde(default)]
        process_files: usize,
        learning_action: String,
        #[serde(default)]
        learning_files: usize,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .map_err(|e| AwardsError::Validation(format!("cannot read {}: {e}", csv_path.display())))?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row =
            result.map_err(|e| AwardsError::Validation(format!("malformed CSV row: {e}")))?;
        let name = row.candidate_name.trim().to_string();
        if name.is_empty() {
            continue;
        }

        let slices = [
            (Perspective::Financial, &row.financial_action, row.financial_files),
            (Perspective::Customer, &row.customer_action, row.customer_files),
            (Perspective::InternalProcesses, &row.process_action, row.process_files),
            (Perspective::LearningGrowth, &row.learning_action, row.learning_files),
        ];

        let mut entries = BTreeMap::new();
        for (perspective, action, files) in slices {
            entries.insert(
                perspective,
                PerspectiveEntry {
                    action: action.trim().to_string(),
                    score: scoring::score(action, files),
                    evidence: Vec::new(),
                },
            );
        }
        let total_score = scoring::total_score(
            Perspective::ALL
                .iter()
                .map(|p| entries.get(p).map(|e| e.score).unwrap_or(0.0)),
        );

        store
            .insert(&SubmissionRecord {
                id: Uuid::new_v4(),
                candidate_name: name,
                submitted_at: row.submitted_at.unwrap_or_else(Utc::now),
                entries,
                total_score,
                stage1: None,
                stage1_comment: String::new(),
                committee_votes: Vec::new(),
                current_status: STATUS_STAGE1_PENDING.to_string(),
                lock: LockState::default(),
            })
            .await?;
        inserted += 1;
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::RecordKey;

    struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn new(fail: bool) -> Self {
            RecordingNotifier {
                sent: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, message: &Notification) -> Result<()> {
            if self.fail {
                return Err(AwardsError::Notify("smtp relay down".to_string()));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct FailingEvidence;

    #[async_trait]
    impl EvidenceStore for FailingEvidence {
        async fn store(&self, _path: &str, _bytes: &[u8], _ct: &str) -> Result<String> {
            Err(AwardsError::Evidence("bucket unavailable".to_string()))
        }
    }

    struct NullEvidence;

    #[async_trait]
    impl EvidenceStore for NullEvidence {
        async fn store(&self, path: &str, _bytes: &[u8], _ct: &str) -> Result<String> {
            Ok(format!("https://evidence.example/{path}"))
        }
    }

    fn form(name: &str) -> SubmissionInput {
        let mut perspectives = BTreeMap::new();
        perspectives.insert(
            Perspective::Financial,
            PerspectiveInput {
                action: "Cut fuel cost through route planning and saved revenue on the \
                         two biggest contracts this quarter."
                    .to_string(),
                attachments: vec![Attachment {
                    file_name: "fuel report.pdf".to_string(),
                    content_type: "application/pdf".to_string(),
                    bytes: b"pdf".to_vec(),
                }],
            },
        );
        perspectives.insert(
            Perspective::Customer,
            PerspectiveInput {
                action: "Customer retention drive with satisfaction surveys.".to_string(),
                attachments: Vec::new(),
            },
        );
        SubmissionInput {
            candidate_name: name.to_string(),
            perspectives,
        }
    }

    #[tokio::test]
    async fn happy_path_scores_uploads_notifies_and_persists() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new(false);
        let receipt = submit(
            &store,
            &NullEvidence,
            &notifier,
            "awards@example.co.zw",
            form("Rudo Banda"),
            Utc::now(),
        )
        .await
        .unwrap();

        assert!(receipt.warnings.is_empty());
        assert!(receipt.total_score > 0.0);

        let record = store
            .find(&RecordKey::new("Rudo Banda", Some(receipt.submitted_at)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.total_score, receipt.total_score);
        assert_eq!(record.current_status, STATUS_STAGE1_PENDING);
        let financial = record.entry(Perspective::Financial);
        assert_eq!(financial.evidence.len(), 1);
        assert!(financial.evidence[0].url.starts_with("https://evidence.example/"));
        assert!(financial.evidence[0].storage_path.contains("/financial/"));

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "awards@example.co.zw");
        assert!(sent[0].subject.contains("Rudo Banda"));
        assert_eq!(sent[0].attachments.len(), 1);
    }

    #[tokio::test]
    async fn blank_name_is_rejected_before_any_side_effect() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new(false);
        let result = submit(
            &store,
            &NullEvidence,
            &notifier,
            "awards@example.co.zw",
            form("   "),
            Utc::now(),
        )
        .await;

        assert!(matches!(result, Err(AwardsError::Validation(_))));
        assert!(store.list_all().await.unwrap().is_empty());
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn closed_deadline_blocks_the_submission() {
        let store = MemoryStore::new();
        store
            .set_setting(DEADLINE_KEY, "2026-01-31T17:00:00Z")
            .await
            .unwrap();

        let after = DateTime::parse_from_rfc3339("2026-02-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let result = submit(
            &store,
            &NullEvidence,
            &RecordingNotifier::new(false),
            "awards@example.co.zw",
            form("Rudo Banda"),
            after,
        )
        .await;
        assert!(matches!(result, Err(AwardsError::Validation(_))));

        let before = DateTime::parse_from_rfc3339("2026-01-30T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(submit(
            &store,
            &NullEvidence,
            &RecordingNotifier::new(false),
            "awards@example.co.zw",
            form("Rudo Banda"),
            before,
        )
        .await
        .is_ok());
    }

    #[tokio::test]
    async fn evidence_failure_is_a_warning_not_a_rejection() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new(false);
        let receipt = submit(
            &store,
            &FailingEvidence,
            &notifier,
            "awards@example.co.zw",
            form("Rudo Banda"),
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(receipt.warnings.len(), 1);
        assert!(receipt.warnings[0].contains("fuel report.pdf"));
        // the record still landed and the email still went out
        assert_eq!(store.list_all().await.unwrap().len(), 1);
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn notification_failure_is_a_warning_not_a_rejection() {
        let store = MemoryStore::new();
        let receipt = submit(
            &store,
            &NullEvidence,
            &RecordingNotifier::new(true),
            "awards@example.co.zw",
            form("Rudo Banda"),
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(receipt.warnings.len(), 1);
        assert!(receipt.warnings[0].contains("notification"));
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn scores_are_set_once_and_sum_to_the_total() {
        let store = MemoryStore::new();
        let receipt = submit(
            &store,
            &NullEvidence,
            &RecordingNotifier::new(false),
            "awards@example.co.zw",
            form("Rudo Banda"),
            Utc::now(),
        )
        .await
        .unwrap();

        let record = store
            .find(&RecordKey::new("Rudo Banda", Some(receipt.submitted_at)))
            .await
            .unwrap()
            .unwrap();
        let sum: f64 = Perspective::ALL
            .iter()
            .map(|p| record.entry(*p).score)
            .sum();
        assert!((record.total_score - (sum * 10.0).round() / 10.0).abs() < 1e-9);
    }
}
