//! Automated scoring of submission text, computed once at submission time.
//!
//! Keyword-weighted policy: up to 15 points for distinct keyword matches,
//! up to 10 points for text length, and a 3-point extra-mile bonus for long
//! answers backed by at least two evidence files. Capped at 25 per
//! perspective, so a full submission tops out at 100.

/// Terms the awards committee looks for across the four perspectives.
const KEYWORDS: [&str; 20] = [
    "revenue",
    "cost",
    "saving",
    "profit",
    "customer",
    "retention",
    "satisfaction",
    "complaint",
    "sheq",
    "safety",
    "compliance",
    "efficiency",
    "quality",
    "audit",
    "training",
    "mentor",
    "competency",
    "engagement",
    "innovation",
    "improvement",
];

pub const MAX_PERSPECTIVE_SCORE: f64 = 25.0;

const KEYWORD_CAP: usize = 5;
const LENGTH_CAP: usize = 300;
const EXTRA_MILE_LENGTH: usize = 200;
const EXTRA_MILE_ATTACHMENTS: usize = 2;

/// Scores one perspective's action text. Whitespace-only text scores zero
/// regardless of attachments; the result is in [0, 25], one decimal place.
pub fn score(action_text: &str, attachment_count: usize) -> f64 {
    let text = action_text.trim();
    if text.is_empty() {
        return 0.0;
    }

    let lower = text.to_lowercase();
    let matched = KEYWORDS
        .iter()
        .filter(|keyword| lower.contains(**keyword))
        .count()
        .min(KEYWORD_CAP);
    let keyword_points = matched as f64 / KEYWORD_CAP as f64 * 15.0;

    let length = text.chars().count();
    let length_points = length.min(LENGTH_CAP) as f64 / LENGTH_CAP as f64 * 10.0;

    let mut total = keyword_points + length_points;
    if length > EXTRA_MILE_LENGTH && attachment_count >= EXTRA_MILE_ATTACHMENTS {
        total += 3.0;
    }

    round_one_decimal(total.min(MAX_PERSPECTIVE_SCORE))
}

/// Sums the four perspective scores into the 0-100 total.
pub fn total_score(perspective_scores: impl IntoIterator<Item = f64>) -> f64 {
    round_one_decimal(perspective_scores.into_iter().sum())
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    // Pads with filler to an exact length so length points stay fixed
    // while the keyword count varies.
    fn text_with_keywords(count: usize, length: usize) -> String {
        let mut text = KEYWORDS[..count].join(" ");
        assert!(text.chars().count() <= length);
        while text.chars().count() < length {
            text.push('x');
        }
        text
    }

    #[test]
    fn empty_text_scores_zero_regardless_of_attachments() {
        assert_eq!(score("", 0), 0.0);
        assert_eq!(score("   \n\t ", 5), 0.0);
    }

    #[test]
    fn score_stays_within_bounds() {
        let stuffed =
            "revenue cost saving profit customer retention satisfaction quality ".repeat(10);
        let inputs: [(&str, usize); 4] = [
            ("", 0),
            ("short note", 0),
            ("cut costs and grew revenue with a customer retention drive", 3),
            (stuffed.as_str(), 9),
        ];
        for (text, attachments) in inputs {
            let value = score(text, attachments);
            assert!((0.0..=MAX_PERSPECTIVE_SCORE).contains(&value), "{value}");
        }
    }

    #[test]
    fn more_matched_keywords_never_lowers_the_score() {
        let length = 120;
        let mut previous = 0.0;
        for count in 0..=6 {
            let text = if count == 0 {
                "z".repeat(length)
            } else {
                text_with_keywords(count, length)
            };
            let value = score(&text, 0);
            assert!(
                value >= previous,
                "score dropped from {previous} to {value} at {count} keywords"
            );
            previous = value;
        }
    }

    #[test]
    fn longer_text_never_lowers_the_score() {
        let mut previous = 0.0;
        for length in [10, 50, 150, 300, 400] {
            let value = score(&"z".repeat(length), 0);
            assert!(value >= previous);
            previous = value;
        }
    }

    #[test]
    fn extra_mile_bonus_beats_the_truncated_submission() {
        let long_text = text_with_keywords(3, 250);
        let short_text: String = long_text.chars().take(180).collect();
        assert!(score(&long_text, 2) >= score(&short_text, 0) + 3.0 - 0.2);
        assert!(score(&long_text, 2) > score(&long_text, 1));
    }

    #[test]
    fn bonus_requires_both_length_and_attachments() {
        let long_plain = "z".repeat(250);
        assert_eq!(score(&long_plain, 1), score(&long_plain, 0));
    }

    #[test]
    fn total_is_the_sum_of_perspectives() {
        assert_eq!(total_score([25.0, 25.0, 25.0, 25.0]), 100.0);
        assert_eq!(total_score([10.5, 0.0, 3.2, 1.3]), 15.0);
    }
}
