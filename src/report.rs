use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::SubmissionRecord;
use crate::rank;

pub fn summarize_by_status(records: &[SubmissionRecord]) -> Vec<(String, usize)> {
    let mut map: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    for record in records {
        let status = if record.current_status.is_empty() {
            "(no status)".to_string()
        } else {
            record.current_status.clone()
        };
        *map.entry(status).or_insert(0) += 1;
    }

    let mut summaries: Vec<(String, usize)> = map.into_iter().collect();
    summaries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    summaries
}

pub fn build_report(records: &[SubmissionRecord], generated_at: DateTime<Utc>) -> String {
    let summaries = summarize_by_status(records);
    let ranked = rank::rank_candidates(records);

    let mut output = String::new();
    let _ = writeln!(output, "# Quality & Excellence Awards Report");
    let _ = writeln!(
        output,
        "Generated {} ({} submissions on record)",
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        records.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Review Status Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No submissions recorded yet.");
    } else {
        for (status, count) in summaries.iter() {
            let _ = writeln!(output, "- {}: {} submission(s)", status, count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Final Ranking");

    if ranked.is_empty() {
        let _ = writeln!(output, "No candidates recommended for the finals yet.");
    } else {
        for (position, candidate) in ranked.iter().enumerate() {
            let _ = writeln!(
                output,
                "{}. {} - final rank {:.1} (system score {:.1}, committee weight {:.2} \
                 over {} vote(s)){}",
                position + 1,
                candidate.candidate_name,
                candidate.final_rank,
                candidate.total_score,
                candidate.committee_weight,
                candidate.vote_count,
                if position == 0 { "  <- designated winner" } else { "" }
            );
        }
    }

    let mut recent: Vec<&SubmissionRecord> = records.iter().collect();
    recent.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Submissions");

    if recent.is_empty() {
        let _ = writeln!(output, "No submissions recorded yet.");
    } else {
        for record in recent.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} on {} scored {:.1}{}",
                record.candidate_name,
                record.submitted_at.format("%Y-%m-%d"),
                record.total_score,
                if record.stage1_comment.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", record.stage1_comment)
                }
            );
        }
    }

    output
}
