//! 評価結果からプロンプト改訂用のフィードバックを組み立てる。

use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::metrics::Metrics;

const LOW_PRECISION_THRESHOLD: f64 = 0.5;
const LOW_RECALL_THRESHOLD: f64 = 0.5;
const LOW_TAG_COVERAGE_THRESHOLD: f64 = 0.5;
const LOW_REFERENCE_MATCH_THRESHOLD: f64 = 0.3;
/// 提案文で言及するギャップ数の上限。
const SUGGESTED_GAPS: usize = 2;

/// 推薦リストに不足している要素の種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapKind {
    Tag,
    Reference,
}

/// 推薦リストで欠けているタグまたは参照作品。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    pub kind: GapKind,
    pub name: String,
    /// この要素を持つ正解アイテムの件数。
    pub support: usize,
}

/// 構造化フィードバック。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub under_covered_tags: BTreeSet<String>,
    pub missing_references: BTreeSet<String>,
    pub suggestion: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl Feedback {
    /// ギャップとメトリクスからフィードバックを生成する。
    #[must_use]
    pub fn from_gaps(gaps: Vec<Gap>, metrics: &Metrics, has_favorites: bool) -> Self {
        let mut under_covered_tags = BTreeSet::new();
        let mut missing_references = BTreeSet::new();
        for gap in &gaps {
            match gap.kind {
                GapKind::Tag => under_covered_tags.insert(gap.name.clone()),
                GapKind::Reference => missing_references.insert(gap.name.clone()),
            };
        }

        Self {
            under_covered_tags,
            missing_references,
            suggestion: suggestion(gaps),
            notes: advisory_notes(metrics, has_favorites),
        }
    }

    #[must_use]
    pub fn has_gaps(&self) -> bool {
        !self.under_covered_tags.is_empty() || !self.missing_references.is_empty()
    }
}

/// 上位2件のギャップを引用した提案文。
///
/// 正解アイテム中の出現件数の降順、同数なら名前の昇順で並べる。
#[must_use]
pub fn suggestion(mut gaps: Vec<Gap>) -> String {
    if gaps.is_empty() {
        return "Recommendations already cover every preferred tag and favorite reference; \
                keep the current emphasis."
            .to_string();
    }

    gaps.sort_by(|a, b| {
        b.support
            .cmp(&a.support)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.kind.cmp(&b.kind))
    });

    let mut text = String::from("Prioritize ");
    for (index, gap) in gaps.iter().take(SUGGESTED_GAPS).enumerate() {
        if index > 0 {
            text.push_str(" and ");
        }
        match gap.kind {
            GapKind::Tag => {
                let _ = write!(text, "stories tagged \"{}\"", gap.name);
            }
            GapKind::Reference => {
                let _ = write!(text, "stories connected to {}", gap.name);
            }
        }
        let _ = write!(text, " ({} of the reference picks)", gap.support);
    }
    text.push('.');
    text
}

fn advisory_notes(metrics: &Metrics, has_favorites: bool) -> Vec<String> {
    let mut notes = Vec::new();
    if metrics.precision < LOW_PRECISION_THRESHOLD {
        notes.push(
            "The recommendations have low precision. Consider better matching user preferences."
                .to_string(),
        );
    }
    if metrics.recall < LOW_RECALL_THRESHOLD {
        notes.push(
            "The recommendations are missing many relevant stories. Consider broadening the criteria."
                .to_string(),
        );
    }
    if has_favorites && metrics.reference_match_rate < LOW_REFERENCE_MATCH_THRESHOLD {
        notes.push(
            "Consider including more stories related to the user's favorite references."
                .to_string(),
        );
    }
    if metrics.tag_coverage < LOW_TAG_COVERAGE_THRESHOLD {
        notes.push("The recommendations could better cover the user's preferred tags.".to_string());
    }
    notes
}
