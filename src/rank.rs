//! Final ranking of recommended candidates: a weighted blend of the
//! automated submission score and the committee's votes.

use crate::models::{CommitteeVote, RankedCandidate, Stage1Decision, SubmissionRecord};

const SCORE_WEIGHT: f64 = 0.4;
const COMMITTEE_WEIGHT: f64 = 0.6;

pub fn vote_weight(vote: &str) -> f64 {
    match vote.trim() {
        "Winner" => 1.0,
        "Runner-up" => 0.7,
        "Shortlist" => 0.5,
        // Reject and anything unrecognized weigh nothing
        _ => 0.0,
    }
}

/// Mean vote weight across the committee; zero when nobody has voted yet.
pub fn committee_weight(votes: &[CommitteeVote]) -> f64 {
    if votes.is_empty() {
        return 0.0;
    }
    votes.iter().map(|v| vote_weight(&v.vote)).sum::<f64>() / votes.len() as f64
}

/// Ranks every stage-1-recommended candidate, best first. The sort is
/// stable, so candidates with equal blended ranks keep their input order;
/// the head of the list is the designated winner.
pub fn rank_candidates(records: &[SubmissionRecord]) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = records
        .iter()
        .filter(|r| r.stage1 == Some(Stage1Decision::RecommendForFinals))
        .map(|r| {
            let weight = committee_weight(&r.committee_votes);
            RankedCandidate {
                candidate_name: r.candidate_name.clone(),
                submitted_at: r.submitted_at,
                total_score: r.total_score,
                committee_weight: weight,
                vote_count: r.committee_votes.len(),
                final_rank: r.total_score * SCORE_WEIGHT + weight * 100.0 * COMMITTEE_WEIGHT,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.final_rank
            .partial_cmp(&a.final_rank)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}
