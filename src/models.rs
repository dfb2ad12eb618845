use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The four fixed balanced-scorecard perspectives every submission is
/// scored against.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Perspective {
    Financial,
    Customer,
    #[serde(rename = "Internal Business Processes")]
    InternalProcesses,
    #[serde(rename = "Learning & Growth")]
    LearningGrowth,
}

impl Perspective {
    pub const ALL: [Perspective; 4] = [
        Perspective::Financial,
        Perspective::Customer,
        Perspective::InternalProcesses,
        Perspective::LearningGrowth,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Perspective::Financial => "Financial",
            Perspective::Customer => "Customer",
            Perspective::InternalProcesses => "Internal Business Processes",
            Perspective::LearningGrowth => "Learning & Growth",
        }
    }

    pub fn goal(&self) -> &'static str {
        match self {
            Perspective::Financial => "Grow Revenue / Manage Costs",
            Perspective::Customer => "Retain Profitable Business / Satisfy Customer",
            Perspective::InternalProcesses => "Comply with SHEQ / Improve Efficiencies",
            Perspective::LearningGrowth => "Develop Staff Competencies / Increase Engagement",
        }
    }

    /// Short identifier used for storage columns and evidence folder names.
    pub fn slug(&self) -> &'static str {
        match self {
            Perspective::Financial => "financial",
            Perspective::Customer => "customer",
            Perspective::InternalProcesses => "process",
            Perspective::LearningGrowth => "learning",
        }
    }
}

impl fmt::Display for Perspective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One uploaded evidence file as recorded in the submission manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceFile {
    pub file_name: String,
    pub storage_path: String,
    pub url: String,
}

/// Per-perspective slice of a submission: the free-text action, the score
/// assigned at creation time, and the evidence files behind it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerspectiveEntry {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub evidence: Vec<EvidenceFile>,
}

/// Stage-1 reviewer decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage1Decision {
    RecommendForFinals,
    Reject,
}

impl Stage1Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage1Decision::RecommendForFinals => "Recommend for Finals",
            Stage1Decision::Reject => "Reject",
        }
    }

    /// Tolerant parse of the stored text: any value containing "recommend"
    /// (case-insensitive) counts as a recommendation, any value containing
    /// "reject" as a rejection. Anything else reads as undecided.
    pub fn parse(raw: &str) -> Option<Stage1Decision> {
        let lower = raw.trim().to_lowercase();
        if lower.contains("recommend") {
            Some(Stage1Decision::RecommendForFinals)
        } else if lower.contains("reject") {
            Some(Stage1Decision::Reject)
        } else {
            None
        }
    }
}

impl fmt::Display for Stage1Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage-2 committee vote choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteChoice {
    Winner,
    RunnerUp,
    Shortlist,
    Reject,
}

impl VoteChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteChoice::Winner => "Winner",
            VoteChoice::RunnerUp => "Runner-up",
            VoteChoice::Shortlist => "Shortlist",
            VoteChoice::Reject => "Reject",
        }
    }
}

impl fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One committee member's vote. The vote text is kept as stored so that
/// unknown values survive a round-trip; unknown votes weigh 0 in ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeVote {
    pub evaluator: String,
    pub vote: String,
}

impl CommitteeVote {
    pub fn new(evaluator: &str, choice: VoteChoice) -> Self {
        CommitteeVote {
            evaluator: evaluator.to_string(),
            vote: choice.as_str().to_string(),
        }
    }

    /// Parses the stored `evaluator:vote` list. Both the semicolon and the
    /// comma separator seen in historic rows are accepted; malformed
    /// fragments are dropped.
    pub fn parse_list(raw: &str) -> Vec<CommitteeVote> {
        raw.split([';', ','])
            .filter_map(|entry| {
                let entry = entry.trim();
                let (evaluator, vote) = entry.split_once(':')?;
                let evaluator = evaluator.trim();
                if evaluator.is_empty() {
                    return None;
                }
                Some(CommitteeVote {
                    evaluator: evaluator.to_string(),
                    vote: vote.trim().to_string(),
                })
            })
            .collect()
    }

    pub fn join_list(votes: &[CommitteeVote]) -> String {
        votes
            .iter()
            .map(|v| format!("{}:{}", v.evaluator, v.vote))
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Advisory lock fields carried on every record. An empty token means the
/// record is unlocked; an expiry at or before "now" means the lock is
/// implicitly released.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockState {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub holder: String,
}

impl LockState {
    pub fn is_held_at(&self, now: DateTime<Utc>) -> bool {
        !self.token.is_empty() && self.expires_at.is_some_and(|e| e > now)
    }
}

/// One candidate submission. Identity is the (name, submitted_at) pair;
/// names are not guaranteed unique on their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: Uuid,
    pub candidate_name: String,
    pub submitted_at: DateTime<Utc>,
    pub entries: BTreeMap<Perspective, PerspectiveEntry>,
    pub total_score: f64,
    #[serde(default)]
    pub stage1: Option<Stage1Decision>,
    #[serde(default)]
    pub stage1_comment: String,
    #[serde(default)]
    pub committee_votes: Vec<CommitteeVote>,
    #[serde(default)]
    pub current_status: String,
    #[serde(default)]
    pub lock: LockState,
}

impl SubmissionRecord {
    pub fn entry(&self, perspective: Perspective) -> PerspectiveEntry {
        self.entries.get(&perspective).cloned().unwrap_or_default()
    }
}

/// One row of the final leaderboard.
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub candidate_name: String,
    pub submitted_at: DateTime<Utc>,
    pub total_score: f64,
    pub committee_weight: f64,
    pub vote_count: usize,
    pub final_rank: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn committee_votes_round_trip_through_wire_format() {
        let votes = vec![
            CommitteeVote::new("T. Moyo", VoteChoice::Winner),
            CommitteeVote::new("R. Chikomo", VoteChoice::RunnerUp),
        ];
        let joined = CommitteeVote::join_list(&votes);
        assert_eq!(joined, "T. Moyo:Winner;R. Chikomo:Runner-up");
        assert_eq!(CommitteeVote::parse_list(&joined), votes);
    }

    #[test]
    fn vote_parsing_drops_malformed_fragments() {
        let votes = CommitteeVote::parse_list("alice:Winner;;garbage;:Reject;bob:Shortlist");
        assert_eq!(votes.len(), 2);
        assert_eq!(votes[0].evaluator, "alice");
        assert_eq!(votes[1].vote, "Shortlist");
    }

    #[test]
    fn stage1_parse_is_case_insensitive_substring() {
        assert_eq!(
            Stage1Decision::parse("Recommend for Finals"),
            Some(Stage1Decision::RecommendForFinals)
        );
        assert_eq!(
            Stage1Decision::parse("RECOMMENDED"),
            Some(Stage1Decision::RecommendForFinals)
        );
        assert_eq!(Stage1Decision::parse("Reject"), Some(Stage1Decision::Reject));
        assert_eq!(Stage1Decision::parse(""), None);
        assert_eq!(Stage1Decision::parse("pending"), None);
    }

    #[test]
    fn lock_state_held_requires_token_and_future_expiry() {
        let now = Utc::now();
        let unlocked = LockState::default();
        assert!(!unlocked.is_held_at(now));

        let expired = LockState {
            token: "t".to_string(),
            expires_at: Some(now - chrono::Duration::seconds(1)),
            holder: "eval".to_string(),
        };
        assert!(!expired.is_held_at(now));

        let held = LockState {
            token: "t".to_string(),
            expires_at: Some(now + chrono::Duration::seconds(60)),
            holder: "eval".to_string(),
        };
        assert!(held.is_held_at(now));
    }
}
