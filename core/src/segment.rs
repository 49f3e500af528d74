//! Segmenter: ordered rule table over the RFM score triple.
//!
//! Rules are evaluated top to bottom and the first match wins. The table
//! is configuration; the last rule is always an unconditional catch-all.

use crate::{scorer::RfmScore, types::Score};
use serde::{Deserialize, Serialize};

/// Inclusive score range for one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRange {
    pub min: Score,
    pub max: Score,
}

impl ScoreRange {
    pub fn new(min: Score, max: Score) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, score: Score) -> bool {
        (self.min..=self.max).contains(&score)
    }
}

/// One row of the segment table. An absent range matches any score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRule {
    pub label:     String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recency:   Option<ScoreRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<ScoreRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monetary:  Option<ScoreRange>,
}

impl SegmentRule {
    pub fn catch_all(label: impl Into<String>) -> Self {
        Self {
            label:     label.into(),
            recency:   None,
            frequency: None,
            monetary:  None,
        }
    }

    pub fn matches(&self, score: &RfmScore) -> bool {
        let hit = |range: &Option<ScoreRange>, value: Score| range.map_or(true, |r| r.contains(value));
        hit(&self.recency, score.recency)
            && hit(&self.frequency, score.frequency)
            && hit(&self.monetary, score.monetary)
    }

    pub fn is_unconditional(&self) -> bool {
        self.recency.is_none() && self.frequency.is_none() && self.monetary.is_none()
    }

    pub fn ranges(&self) -> impl Iterator<Item = &ScoreRange> {
        [&self.recency, &self.frequency, &self.monetary]
            .into_iter()
            .flatten()
    }
}

/// Label of the first rule matching `score`.
///
/// Returns `None` only for a table without a catch-all, which
/// `EngineConfig::validate` never lets through.
pub fn assign_segment<'a>(rules: &'a [SegmentRule], score: &RfmScore) -> Option<&'a str> {
    rules
        .iter()
        .find(|rule| rule.matches(score))
        .map(|rule| rule.label.as_str())
}

// Default table, written on a 1..=5 scale and rescaled to K.
// (label, recency, frequency, monetary)
type RuleTemplate = (&'static str, Option<(Score, Score)>, Option<(Score, Score)>, Option<(Score, Score)>);

const DEFAULT_TABLE: &[RuleTemplate] = &[
    ("Champions",           Some((4, 5)), Some((4, 5)), Some((4, 5))),
    ("Loyal Customers",     Some((3, 5)), Some((4, 5)), None),
    ("New Customers",       Some((5, 5)), Some((1, 1)), None),
    ("Promising",           Some((4, 5)), Some((1, 2)), None),
    ("Potential Loyalists", Some((3, 5)), Some((2, 3)), None),
    ("Cannot Lose Them",    Some((1, 2)), Some((4, 5)), Some((4, 5))),
    ("At Risk of Churning", Some((1, 2)), Some((3, 5)), None),
    ("At Risk of Churning", Some((1, 2)), None,         Some((3, 5))),
    ("Needs Attention",     Some((3, 3)), None,         None),
];

pub const CATCH_ALL_LABEL: &str = "Lost/Hibernating";

/// The default rule table for `bucket_count` buckets.
pub fn default_rules(bucket_count: Score) -> Vec<SegmentRule> {
    let k = bucket_count.max(2);
    let scale = |range: Option<(Score, Score)>| {
        range.map(|(lo, hi)| ScoreRange::new(rescale(lo, k), rescale(hi, k)))
    };

    DEFAULT_TABLE
        .iter()
        .map(|&(label, r, f, m)| SegmentRule {
            label:     label.to_string(),
            recency:   scale(r),
            frequency: scale(f),
            monetary:  scale(m),
        })
        .chain(std::iter::once(SegmentRule::catch_all(CATCH_ALL_LABEL)))
        .collect()
}

/// Map a score on the 1..=5 scale onto 1..=k, keeping 1 → 1 and 5 → k.
fn rescale(score_on_five: Score, k: Score) -> Score {
    let s = u32::from(score_on_five.clamp(1, 5));
    let k = u32::from(k);
    (((s - 1) * (k - 1) + 2) / 4 + 1) as Score
}
