//! Record store abstraction shared by every backend.
//!
//! All review and lock mutations go through [`RecordStore::apply`], a
//! conditional write: the guard expresses what the stored lock fields must
//! look like for the update to land. The Postgres backend folds the guard
//! into the UPDATE's WHERE clause, which closes the check-then-write race;
//! the file backends re-check the guard under a read-modify-write cycle and
//! keep the residual race, acceptable for a human-paced workflow.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{CommitteeVote, LockState, Stage1Decision, SubmissionRecord};

/// Addresses one record: exact (name, submitted_at) when the timestamp is
/// known, otherwise the most recent record for the name.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordKey {
    pub candidate_name: String,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl RecordKey {
    pub fn new(candidate_name: &str, submitted_at: Option<DateTime<Utc>>) -> Self {
        RecordKey {
            candidate_name: candidate_name.to_string(),
            submitted_at,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.submitted_at {
            Some(ts) => write!(f, "{} @ {}", self.candidate_name, ts.to_rfc3339()),
            None => write!(f, "{} (latest)", self.candidate_name),
        }
    }
}

/// Review and lock fields a guarded write may set. Identity and score
/// fields are deliberately absent: scores are written once, at insert.
#[derive(Debug, Clone, Default)]
pub struct FieldUpdates {
    pub stage1: Option<Stage1Decision>,
    pub stage1_comment: Option<String>,
    pub committee_votes: Option<Vec<CommitteeVote>>,
    pub current_status: Option<String>,
    pub lock: Option<LockState>,
}

impl FieldUpdates {
    pub fn is_empty(&self) -> bool {
        self.stage1.is_none()
            && self.stage1_comment.is_none()
            && self.committee_votes.is_none()
            && self.current_status.is_none()
            && self.lock.is_none()
    }
}

/// Precondition on the stored lock fields for a guarded write.
#[derive(Debug, Clone)]
pub enum WriteGuard {
    /// No precondition.
    Any,
    /// Stored token must equal the given token exactly (release path).
    HeldBy(String),
    /// Stored token must equal the given token or be empty (review writes).
    TokenOrFree(String),
    /// Record must be unlocked or hold an expired lock (acquire path).
    Free(DateTime<Utc>),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, record: &SubmissionRecord) -> Result<()>;

    async fn find(&self, key: &RecordKey) -> Result<Option<SubmissionRecord>>;

    async fn list_all(&self) -> Result<Vec<SubmissionRecord>>;

    /// Applies `updates` to the record at `key` when `guard` holds.
    /// Returns false, without mutating anything, when the guard fails or
    /// no record matches the key.
    async fn apply(&self, key: &RecordKey, updates: FieldUpdates, guard: WriteGuard)
        -> Result<bool>;

    async fn get_setting(&self, key: &str) -> Result<Option<String>>;

    async fn set_setting(&self, key: &str, value: &str) -> Result<()>;
}

/// Key resolution shared by the in-process backends: exact match on
/// (name, submitted_at), otherwise the newest record for the name.
pub(crate) fn select_index(records: &[SubmissionRecord], key: &RecordKey) -> Option<usize> {
    match key.submitted_at {
        Some(ts) => records
            .iter()
            .position(|r| r.candidate_name == key.candidate_name && r.submitted_at == ts),
        None => records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.candidate_name == key.candidate_name)
            .max_by_key(|(_, r)| r.submitted_at)
            .map(|(index, _)| index),
    }
}

pub(crate) fn guard_allows(lock: &LockState, guard: &WriteGuard) -> bool {
    match guard {
        WriteGuard::Any => true,
        WriteGuard::HeldBy(token) => lock.token == *token,
        WriteGuard::TokenOrFree(token) => lock.token.is_empty() || lock.token == *token,
        WriteGuard::Free(now) => {
            lock.token.is_empty() || !lock.expires_at.is_some_and(|e| e > *now)
        }
    }
}

pub(crate) fn apply_updates(record: &mut SubmissionRecord, updates: FieldUpdates) {
    if let Some(decision) = updates.stage1 {
        record.stage1 = Some(decision);
    }
    if let Some(comment) = updates.stage1_comment {
        record.stage1_comment = comment;
    }
    if let Some(votes) = updates.committee_votes {
        record.committee_votes = votes;
    }
    if let Some(status) = updates.current_status {
        record.current_status = status;
    }
    if let Some(lock) = updates.lock {
        record.lock = lock;
    }
}
