//! Two-stage review workflow over locked records.
//!
//! Stage 1 is a single reviewer's recommend/reject call; stage 2 is the
//! committee vote, open only to records recommended for the finals. Every
//! mutation requires the caller to hold the record's live lock, and the
//! lock is released in the same guarded write that lands the decision.

use chrono::Utc;
use tracing::info;

use crate::error::{AwardsError, Result};
use crate::lock;
use crate::models::{CommitteeVote, LockState, Stage1Decision, SubmissionRecord, VoteChoice};
use crate::store::{FieldUpdates, RecordKey, RecordStore};

pub const STATUS_STAGE1_PENDING: &str = "Submitted - Stage 1 review pending";
pub const STATUS_STAGE1_RECOMMENDED: &str = "Recommended for Finals - committee voting open";
pub const STATUS_STAGE1_REJECTED: &str = "Rejected at Stage 1";

pub fn voting_status(vote_count: usize) -> String {
    format!("Committee voting - {vote_count} vote(s) recorded")
}

/// Compares the supplied evaluator password against the configured shared
/// secret. A missing secret is a configuration problem, not a bad password.
pub fn verify_evaluator(supplied: &str, secret: Option<&str>) -> Result<()> {
    let secret = secret.filter(|s| !s.is_empty()).ok_or_else(|| {
        AwardsError::Config(
            "EVALUATOR_PASSWORD is not set; evaluator actions are disabled".to_string(),
        )
    })?;
    if supplied != secret {
        return Err(AwardsError::Validation(
            "evaluator password does not match".to_string(),
        ));
    }
    Ok(())
}

/// Records the stage-1 decision and releases the lock in the same write.
pub async fn record_stage1(
    store: &dyn RecordStore,
    key: &RecordKey,
    token: &str,
    decision: Stage1Decision,
    comment: &str,
) -> Result<()> {
    fetch_locked(store, key, token).await?;

    let status = match decision {
        Stage1Decision::RecommendForFinals => STATUS_STAGE1_RECOMMENDED,
        Stage1Decision::Reject => STATUS_STAGE1_REJECTED,
    };
    let updates = FieldUpdates {
        stage1: Some(decision),
        stage1_comment: Some(comment.to_string()),
        current_status: Some(status.to_string()),
        lock: Some(LockState::default()),
        ..Default::default()
    };

    if !lock::update_with_lock(store, key, token, updates).await? {
        return Err(AwardsError::LockConflict(format!(
            "lock on {key} changed hands before the stage 1 decision was saved"
        )));
    }

    info!(key = %key, decision = %decision, "stage 1 decision recorded");
    Ok(())
}

/// Records one committee member's stage-2 vote and releases the lock.
/// Votes are keyed by evaluator name: voting again replaces that
/// evaluator's earlier entry, other members' entries are untouched.
/// Returns the number of votes now on the record.
pub async fn record_vote(
    store: &dyn RecordStore,
    key: &RecordKey,
    token: &str,
    evaluator: &str,
    choice: VoteChoice,
) -> Result<usize> {
    let evaluator = evaluator.trim();
    if evaluator.is_empty() {
        return Err(AwardsError::Validation(
            "an evaluator name is required to vote".to_string(),
        ));
    }
    // these would corrupt the stored evaluator:vote list
    if evaluator.contains([':', ';', ',']) {
        return Err(AwardsError::Validation(format!(
            "evaluator name '{evaluator}' may not contain ':', ';' or ','"
        )));
    }

    let record = fetch_locked(store, key, token).await?;
    if record.stage1 != Some(Stage1Decision::RecommendForFinals) {
        return Err(AwardsError::Validation(format!(
            "{} is not recommended for the finals; committee voting is closed",
            record.candidate_name
        )));
    }

    let mut votes = record.committee_votes;
    match votes.iter_mut().find(|v| v.evaluator == evaluator) {
        Some(existing) => existing.vote = choice.as_str().to_string(),
        None => votes.push(CommitteeVote::new(evaluator, choice)),
    }
    let vote_count = votes.len();

    let updates = FieldUpdates {
        committee_votes: Some(votes),
        current_status: Some(voting_status(vote_count)),
        lock: Some(LockState::default()),
        ..Default::default()
    };
    if !lock::update_with_lock(store, key, token, updates).await? {
        return Err(AwardsError::LockConflict(format!(
            "lock on {key} changed hands before the vote was saved"
        )));
    }

    info!(key = %key, evaluator, vote = %choice, "committee vote recorded");
    Ok(vote_count)
}

/// Loads the record and insists the caller's token is the live lock.
async fn fetch_locked(
    store: &dyn RecordStore,
    key: &RecordKey,
    token: &str,
) -> Result<SubmissionRecord> {
    let record = store
        .find(key)
        .await?
        .ok_or_else(|| AwardsError::NotFound(format!("no submission for {key}")))?;

    let now = Utc::now();
    if token.is_empty() || !record.lock.is_held_at(now) || record.lock.token != token {
        return Err(AwardsError::LockConflict(format!(
            "acquire lock first: no valid lock held on {key}"
        )));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use uuid::Uuid;

    use super::*;
    use crate::models::{Perspective, PerspectiveEntry};
    use crate::store::memory::MemoryStore;

    async fn seeded_store(name: &str) -> (MemoryStore, RecordKey) {
        let store = MemoryStore::new();
        let submitted_at = Utc::now();
        let mut entries = BTreeMap::new();
        entries.insert(
            Perspective::InternalProcesses,
            PerspectiveEntry {
                action: "passed the SHEQ audit".to_string(),
                score: 20.0,
                evidence: Vec::new(),
            },
        );
        store
            .insert(&SubmissionRecord {
                id: Uuid::new_v4(),
                candidate_name: name.to_string(),
                submitted_at,
                entries,
                total_score: 20.0,
                stage1: None,
                stage1_comment: String::new(),
                committee_votes: Vec::new(),
                current_status: STATUS_STAGE1_PENDING.to_string(),
                lock: LockState::default(),
            })
            .await
            .unwrap();
        (store, RecordKey::new(name, Some(submitted_at)))
    }

    async fn locked(store: &MemoryStore, key: &RecordKey) -> String {
        lock::acquire(store, key, "eval", lock::DEFAULT_TTL_SECS)
            .await
            .unwrap()
            .unwrap()
            .token
    }

    #[tokio::test]
    async fn stage1_without_a_lock_is_rejected_with_no_mutation() {
        let (store, key) = seeded_store("Tapiwa Ncube").await;

        let result = record_stage1(
            &store,
            &key,
            "",
            Stage1Decision::RecommendForFinals,
            "solid work",
        )
        .await;
        assert!(matches!(result, Err(AwardsError::LockConflict(_))));

        let record = store.find(&key).await.unwrap().unwrap();
        assert_eq!(record.stage1, None);
        assert_eq!(record.current_status, STATUS_STAGE1_PENDING);
    }

    #[tokio::test]
    async fn stage1_records_the_decision_and_releases_the_lock() {
        let (store, key) = seeded_store("Tapiwa Ncube").await;
        let token = locked(&store, &key).await;

        record_stage1(
            &store,
            &key,
            &token,
            Stage1Decision::RecommendForFinals,
            "strong evidence",
        )
        .await
        .unwrap();

        let record = store.find(&key).await.unwrap().unwrap();
        assert_eq!(record.stage1, Some(Stage1Decision::RecommendForFinals));
        assert_eq!(record.stage1_comment, "strong evidence");
        assert_eq!(record.current_status, STATUS_STAGE1_RECOMMENDED);
        assert!(record.lock.token.is_empty());

        // the lock came off, so the next evaluator can get in
        assert!(lock::acquire(&store, &key, "next", 60).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn stage1_rejection_is_terminal_for_voting() {
        let (store, key) = seeded_store("Tapiwa Ncube").await;
        let token = locked(&store, &key).await;
        record_stage1(&store, &key, &token, Stage1Decision::Reject, "")
            .await
            .unwrap();

        let token = locked(&store, &key).await;
        let result = record_vote(&store, &key, &token, "chair", VoteChoice::Winner).await;
        assert!(matches!(result, Err(AwardsError::Validation(_))));
    }

    #[tokio::test]
    async fn votes_accumulate_across_evaluators() {
        let (store, key) = seeded_store("Tapiwa Ncube").await;
        let token = locked(&store, &key).await;
        record_stage1(&store, &key, &token, Stage1Decision::RecommendForFinals, "")
            .await
            .unwrap();

        let token = locked(&store, &key).await;
        assert_eq!(
            record_vote(&store, &key, &token, "chair", VoteChoice::Winner)
                .await
                .unwrap(),
            1
        );
        let token = locked(&store, &key).await;
        assert_eq!(
            record_vote(&store, &key, &token, "member", VoteChoice::RunnerUp)
                .await
                .unwrap(),
            2
        );

        let record = store.find(&key).await.unwrap().unwrap();
        assert_eq!(record.committee_votes.len(), 2);
        assert_eq!(record.current_status, voting_status(2));
        assert!(record.lock.token.is_empty());
    }

    #[tokio::test]
    async fn revote_replaces_the_same_evaluators_entry() {
        let (store, key) = seeded_store("Tapiwa Ncube").await;
        let token = locked(&store, &key).await;
        record_stage1(&store, &key, &token, Stage1Decision::RecommendForFinals, "")
            .await
            .unwrap();

        let token = locked(&store, &key).await;
        record_vote(&store, &key, &token, "chair", VoteChoice::RunnerUp)
            .await
            .unwrap();
        let token = locked(&store, &key).await;
        let count = record_vote(&store, &key, &token, "chair", VoteChoice::Winner)
            .await
            .unwrap();

        assert_eq!(count, 1);
        let record = store.find(&key).await.unwrap().unwrap();
        assert_eq!(record.committee_votes.len(), 1);
        assert_eq!(record.committee_votes[0].vote, "Winner");
    }

    #[tokio::test]
    async fn vote_requires_a_lock() {
        let (store, key) = seeded_store("Tapiwa Ncube").await;
        let token = locked(&store, &key).await;
        record_stage1(&store, &key, &token, Stage1Decision::RecommendForFinals, "")
            .await
            .unwrap();

        let result = record_vote(&store, &key, "stale-token", "chair", VoteChoice::Winner).await;
        assert!(matches!(result, Err(AwardsError::LockConflict(_))));
        let record = store.find(&key).await.unwrap().unwrap();
        assert!(record.committee_votes.is_empty());
    }

    #[tokio::test]
    async fn separator_characters_in_evaluator_names_are_rejected() {
        let (store, key) = seeded_store("Tapiwa Ncube").await;
        let token = locked(&store, &key).await;
        record_stage1(&store, &key, &token, Stage1Decision::RecommendForFinals, "")
            .await
            .unwrap();

        let token = locked(&store, &key).await;
        let result = record_vote(&store, &key, &token, "a:b", VoteChoice::Winner).await;
        assert!(matches!(result, Err(AwardsError::Validation(_))));
    }

    #[test]
    fn evaluator_gate_checks_the_shared_secret() {
        assert!(verify_evaluator("open-sesame", Some("open-sesame")).is_ok());
        assert!(matches!(
            verify_evaluator("wrong", Some("open-sesame")),
            Err(AwardsError::Validation(_))
        ));
        assert!(matches!(
            verify_evaluator("anything", None),
            Err(AwardsError::Config(_))
        ));
        assert!(matches!(
            verify_evaluator("anything", Some("")),
            Err(AwardsError::Config(_))
        ));
    }
}
