//! Prompt builders and reply parsing for scoring, matching and summaries.

use std::sync::OnceLock;

use regex::Regex;

use scout_core::{CandidateItem, CategoryInfo, Error, Result, SummaryDepth, UserProfile};

/// Longest abstract excerpt sent to the light model.
const SCORING_ABSTRACT_CHARS: usize = 2_000;

/// System prompt for relevance scoring.
pub const SCORING_SYSTEM: &str = "You are a research assistant who rates how relevant a \
newly published paper is to a researcher's interests. Be strict: only papers that \
directly address the stated interests deserve high scores.";

/// System prompt for category matching.
pub const MATCHING_SYSTEM: &str = "You are a research librarian who judges how well a \
paper category fits a researcher's description of their work.";

/// System prompt for summaries.
pub const SUMMARY_SYSTEM: &str = "You are a research assistant who writes accurate, \
concise paper digests for a specific reader. Never invent results that are not in the \
abstract.";

fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "- (none)".to_string();
    }
    items
        .iter()
        .map(|i| format!("- {}", i.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt asking the light model to rate one paper for one profile.
pub fn scoring_prompt(profile: &UserProfile, item: &CandidateItem) -> String {
    format!(
        r#"Researcher interests:
{}

Topics the researcher wants to avoid:
{}

Paper title: {}
Authors: {}
Abstract: {}

Rate the paper's relevance to the researcher from 0 (irrelevant) to 100 (must read).
Respond in the format:
SCORE: <0-100>
REASON: <one sentence>
"#,
        bullet_list(&profile.positive_interests),
        bullet_list(&profile.negative_interests),
        item.title.trim(),
        item.authors.join(", "),
        excerpt(&item.abstract_text, SCORING_ABSTRACT_CHARS),
    )
}

/// Prompt asking the light model how well a category fits a description.
pub fn matching_prompt(user_input: &str, category: &CategoryInfo) -> String {
    let description = if category.description.trim().is_empty() {
        "(no description)".to_string()
    } else {
        category.description.trim().to_string()
    };
    format!(
        r#"Research description:
{}

Category: {} ({})
Category scope: {}

Rate how well this category fits the research description from 0 (unrelated) to 100 (perfect fit).
Respond in the format:
SCORE: <0-100>
REASON: <one sentence>
"#,
        user_input.trim(),
        category.name.trim(),
        category.id,
        description,
    )
}

/// Prompt asking the heavy model for a summary at the given depth.
pub fn summary_prompt(profile: &UserProfile, item: &CandidateItem, depth: SummaryDepth) -> String {
    let instructions = match depth {
        SummaryDepth::Detailed => {
            "Write a detailed digest with these sections:\n\
             1. Problem: what the paper addresses\n\
             2. Approach: the method in two or three sentences\n\
             3. Findings: the main results\n\
             4. Relevance: why it matters for this researcher's interests"
        }
        SummaryDepth::Brief => {
            "Write two sentences: what the paper does and why this researcher might care."
        }
    };
    format!(
        r#"Reader interests:
{}

Paper title: {}
Authors: {}
Categories: {}
Abstract: {}

{}
"#,
        bullet_list(&profile.positive_interests),
        item.title.trim(),
        item.authors.join(", "),
        item.source_categories.join(", "),
        item.abstract_text.trim(),
        instructions,
    )
}

/// Drop reasoning emitted by thinking models before the final answer.
pub fn strip_thinking(reply: &str) -> &str {
    match reply.rfind("</think>") {
        Some(pos) => &reply[pos + "</think>".len()..],
        None => reply,
    }
}

fn score_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bscore\b\s*[:=]?\s*\**\s*(-?\d+(?:\.\d+)?)").expect("valid score regex")
    })
}

fn number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("valid number regex"))
}

/// Extract a 0–100 score from a model reply.
///
/// Prefers a `SCORE: <n>` line; otherwise takes the first number in the
/// reply. Values are clamped to [0, 100].
pub fn parse_score(reply: &str) -> Result<f32> {
    let answer = strip_thinking(reply);

    let raw = score_line_regex()
        .captures(answer)
        .and_then(|c| c.get(1))
        .or_else(|| number_regex().find(answer))
        .map(|m| m.as_str())
        .ok_or_else(|| {
            Error::Inference(format!(
                "No score found in model reply: {}",
                excerpt(answer, 120)
            ))
        })?;

    let value: f32 = raw
        .parse()
        .map_err(|_| Error::Inference(format!("Unparseable score: {}", raw)))?;
    if !value.is_finite() {
        return Err(Error::Inference(format!("Non-finite score: {}", raw)));
    }
    Ok(value.clamp(0.0, 100.0))
}
