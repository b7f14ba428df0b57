use std::sync::Arc;

use serde::Serialize;

use crate::{
    scoring::Scorer,
    store::{Profile, RankedList},
    util::{error::DataIntegrityError, text::normalize},
};

use super::{
    feedback::{Feedback, Gap, GapKind},
    metrics::{Metrics, OverlapCounts, ratio},
};

/// 1回分の評価結果。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub metrics: Metrics,
    pub feedback: Feedback,
}

/// 推薦リストを正解リストと比較する評価器。
///
/// タグ・参照作品の判定はスコアラーの正規化済みテーブルを使う。
#[derive(Debug, Clone)]
pub struct Evaluator {
    scorer: Arc<Scorer>,
    top_k: usize,
}

impl Evaluator {
    #[must_use]
    pub fn new(scorer: Arc<Scorer>, top_k: usize) -> Self {
        Self { scorer, top_k }
    }

    /// # Errors
    /// 正解リストが空、または推薦リストにカタログ外のIDが含まれる場合。
    pub fn evaluate(
        &self,
        profile: &Profile,
        candidate: &RankedList,
        ground_truth: &RankedList,
    ) -> Result<Evaluation, DataIntegrityError> {
        if ground_truth.is_empty() {
            return Err(DataIntegrityError::EmptyGroundTruth {
                profile_id: profile.id.clone(),
            });
        }

        let recommended = candidate.top(self.top_k);
        let relevant = ground_truth.top(self.top_k);

        if let Some(unknown) = recommended
            .iter()
            .find(|id| !self.scorer.catalog().contains(id))
        {
            return Err(DataIntegrityError::UnknownItem {
                item_id: unknown.to_string(),
            });
        }

        let counts = OverlapCounts::between(&recommended, &relevant);
        let mut gaps = Vec::new();

        let preferred: Vec<(&str, String)> = profile
            .preferred_tags
            .keys()
            .map(|tag| (tag.as_str(), normalize(tag)))
            .collect();
        let mut covered_tags = 0;
        for (tag, normalized) in &preferred {
            if recommended
                .iter()
                .any(|id| self.scorer.item_has_tag(id, normalized))
            {
                covered_tags += 1;
            } else {
                gaps.push(Gap {
                    kind: GapKind::Tag,
                    name: (*tag).to_string(),
                    support: relevant
                        .iter()
                        .filter(|id| self.scorer.item_has_tag(id, normalized))
                        .count(),
                });
            }
        }
        let tag_coverage = if preferred.is_empty() {
            1.0
        } else {
            ratio(covered_tags, preferred.len())
        };

        let favorites: Vec<(&str, String)> = profile
            .favorite_references
            .iter()
            .map(|favorite| (favorite.as_str(), normalize(favorite)))
            .filter(|(_, normalized)| !normalized.is_empty())
            .collect();
        for (favorite, normalized) in &favorites {
            let present = recommended
                .iter()
                .any(|id| self.scorer.item_matches_reference(id, normalized));
            let already_reported = gaps
                .iter()
                .any(|gap| gap.kind == GapKind::Reference && gap.name == *favorite);
            if !present && !already_reported {
                gaps.push(Gap {
                    kind: GapKind::Reference,
                    name: (*favorite).to_string(),
                    support: relevant
                        .iter()
                        .filter(|id| self.scorer.item_matches_reference(id, normalized))
                        .count(),
                });
            }
        }
        let matching_items = recommended
            .iter()
            .filter(|id| {
                favorites
                    .iter()
                    .any(|(_, normalized)| self.scorer.item_matches_reference(id, normalized))
            })
            .count();

        let metrics = Metrics {
            precision: counts.precision(),
            recall: counts.recall(),
            f1: counts.f1(),
            tag_coverage,
            reference_match_rate: ratio(matching_items, recommended.len()),
        };
        let feedback = Feedback::from_gaps(gaps, &metrics, !favorites.is_empty());

        Ok(Evaluation { metrics, feedback })
    }
}
