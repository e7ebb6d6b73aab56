//! Pure pipeline stages: penalty, filter, rank, tier assignment and report
//! assembly. Nothing here performs I/O.

use scout_core::{
    defaults, AnalyzedItem, CandidateItem, CategoryInfo, CategoryMatch, Error, PipelineConfig,
    ScoredItem, Tier, UserProfile,
};

/// First negative interest mentioned in the item's title or abstract,
/// compared case-insensitively.
pub fn negative_interest_hit<'a>(profile: &'a UserProfile, item: &CandidateItem) -> Option<&'a str> {
    let title = item.title.to_lowercase();
    let abstract_text = item.abstract_text.to_lowercase();
    profile
        .negative_interests
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .find(|interest| {
            let needle = interest.to_lowercase();
            title.contains(&needle) || abstract_text.contains(&needle)
        })
}

/// Subtract `penalty` points (floor 0) when the item hits a negative interest.
pub fn apply_negative_penalty(
    profile: &UserProfile,
    item: &CandidateItem,
    score: f32,
    penalty: f32,
) -> f32 {
    match negative_interest_hit(profile, item) {
        Some(_) => (score - penalty).max(0.0),
        None => score,
    }
}

/// Outcome of filtering and ranking a scored batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    /// Surviving items in rank order, tiers assigned.
    pub ranked: Vec<ScoredItem>,
    /// Items dropped by the relevance threshold.
    pub discarded: usize,
}

impl Ranking {
    pub fn count(&self, tier: Tier) -> usize {
        self.ranked.iter().filter(|i| i.tier == tier).count()
    }

    /// Items that should be summarized, in rank order.
    pub fn reported(&self) -> impl Iterator<Item = &ScoredItem> {
        self.ranked.iter().filter(|i| i.tier != Tier::Excluded)
    }
}

/// Drop items below the threshold, sort the rest and assign tiers.
///
/// Scores are on the 0–100 scale; the threshold is on 0–10 and an item is
/// discarded when `score / 10` is strictly below it. Equal scores keep fetch
/// order. The first `num_detailed_papers` survivors are detailed, the next
/// `num_brief_papers` brief, the rest excluded.
pub fn filter_rank_tier(scored: Vec<(CandidateItem, f32)>, config: &PipelineConfig) -> Ranking {
    let before = scored.len();
    let mut survivors: Vec<(CandidateItem, f32)> = scored
        .into_iter()
        .filter(|(_, score)| score / 10.0 >= config.relevance_filter_threshold)
        .collect();
    let discarded = before - survivors.len();

    survivors.sort_by(|(a_item, a), (b_item, b)| {
        b.total_cmp(a)
            .then_with(|| a_item.raw_rank.cmp(&b_item.raw_rank))
    });

    let detailed = config.num_detailed_papers;
    let brief = config.num_brief_papers;
    let ranked = survivors
        .into_iter()
        .enumerate()
        .map(|(position, (item, score))| {
            let tier = if position < detailed {
                Tier::Detailed
            } else if position < detailed + brief {
                Tier::Brief
            } else {
                Tier::Excluded
            };
            ScoredItem { item, score, tier }
        })
        .collect();

    Ranking { ranked, discarded }
}

/// Placeholder summary recorded when analysis of an item fails.
pub fn failed_summary(error: &Error) -> String {
    format!("{} ({})", defaults::ANALYSIS_FAILED_PLACEHOLDER, error)
}

/// Pair reported items with their summaries: detailed first, then brief,
/// each in rank order.
pub fn assemble(
    reported: Vec<ScoredItem>,
    summaries: Vec<std::result::Result<String, Error>>,
) -> Vec<AnalyzedItem> {
    let mut items: Vec<AnalyzedItem> = reported
        .into_iter()
        .zip(summaries)
        .map(|(scored, summary)| match summary {
            Ok(summary) => AnalyzedItem {
                scored,
                summary,
                analysis_failed: false,
            },
            Err(e) => AnalyzedItem {
                scored,
                summary: failed_summary(&e),
                analysis_failed: true,
            },
        })
        .collect();
    // Stable: rank order is kept inside each tier.
    items.sort_by_key(|i| match i.scored.tier {
        Tier::Detailed => 0,
        Tier::Brief => 1,
        Tier::Excluded => 2,
    });
    items
}

/// Rank scored categories (descending, ties in input order) and keep `limit`.
pub fn rank_categories(scored: Vec<(CategoryInfo, f32)>, limit: usize) -> Vec<CategoryMatch> {
    let mut scored = scored;
    scored.sort_by(|(_, a), (_, b)| b.total_cmp(a));
    scored
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, (category, score))| CategoryMatch {
            category,
            score,
            rank: i + 1,
        })
        .collect()
}
