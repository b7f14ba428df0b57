use std::sync::Arc;

use tracing::debug;

use crate::{
    scoring::{Scorer, validate_profile},
    store::{Profile, RankedList},
    util::error::DataIntegrityError,
};

/// スコアラーによる正解リストの生成器。
///
/// プロファイルごとに1回だけ計算し、全イテレーションで使い回す。
#[derive(Debug, Clone)]
pub struct GroundTruthGenerator {
    scorer: Arc<Scorer>,
}

impl GroundTruthGenerator {
    #[must_use]
    pub fn new(scorer: Arc<Scorer>) -> Self {
        Self { scorer }
    }

    /// スコアが正のアイテムをスコア降順・ID昇順で返す。
    ///
    /// # Errors
    /// プロファイルの重みが不正な場合、または関連アイテムが1件も無い場合。
    pub fn generate(&self, profile: &Profile) -> Result<RankedList, DataIntegrityError> {
        validate_profile(profile)?;

        let scored = self.scorer.scored_items(profile);
        let relevant = RankedList::from_ids(
            scored
                .iter()
                .filter(|(_, score)| *score > 0.0)
                .map(|(id, _)| *id),
            scored.len(),
        );

        if relevant.is_empty() {
            return Err(DataIntegrityError::EmptyGroundTruth {
                profile_id: profile.id.clone(),
            });
        }

        debug!(
            profile_id = %profile.id,
            relevant = relevant.len(),
            catalog = scored.len(),
            "computed ground truth"
        );
        Ok(relevant)
    }
}
