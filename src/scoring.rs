//! Profile/item relevance scoring.
//!
//! The same scorer backs the recommendation fallback and the ground-truth ranking, so it
//! must stay pure: identical inputs always produce identical scores and orderings.

use std::{cmp::Ordering, sync::Arc};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::{
    store::{Catalog, Item, Profile, RankedList},
    util::{
        error::DataIntegrityError,
        text::{keywords, normalize},
    },
};

/// スコアリング定数。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// 2つ以上の好みタグに一致した場合の乗数ボーナス（0.2 = +20%）
    pub multi_tag_bonus: f32,
    /// お気に入り作品との完全一致1件あたりの加点
    pub reference_bonus: f32,
    /// 部分一致の割引率（完全一致の加点に掛ける）
    pub partial_reference_discount: f32,
    /// 興味キーワード1件あたりの加点
    pub interest_bonus: f32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            multi_tag_bonus: 0.2,
            reference_bonus: 2.0,
            partial_reference_discount: 0.5,
            interest_bonus: 1.5,
        }
    }
}

/// 参照作品名の一致種別。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReferenceMatch {
    Partial,
    Exact,
}

/// 正規化済みの2つの作品名を比較する。
///
/// 完全一致、部分文字列、もしくは4文字以上のキーワード共有で一致とみなす。
#[must_use]
pub fn match_reference(favorite: &str, reference: &str) -> Option<ReferenceMatch> {
    if favorite.is_empty() || reference.is_empty() {
        return None;
    }
    if favorite == reference {
        return Some(ReferenceMatch::Exact);
    }
    if favorite.contains(reference) || reference.contains(favorite) {
        return Some(ReferenceMatch::Partial);
    }
    let favorite_words = keywords(favorite);
    if keywords(reference)
        .iter()
        .any(|word| favorite_words.contains(word))
    {
        return Some(ReferenceMatch::Partial);
    }
    None
}

/// Precomputed per-item comparison data.
#[derive(Debug, Clone, Default)]
struct ItemComponents {
    title: String,
    tags: FxHashSet<String>,
    references: Vec<String>,
}

impl ItemComponents {
    fn from_item(item: &Item) -> Self {
        Self {
            title: normalize(&item.title),
            tags: item.tags.iter().map(|tag| normalize(tag)).collect(),
            references: item
                .references
                .iter()
                .map(|reference| normalize(reference))
                .filter(|reference| !reference.is_empty())
                .collect(),
        }
    }

    fn best_reference_match(&self, favorite: &str) -> Option<ReferenceMatch> {
        self.references
            .iter()
            .filter_map(|reference| match_reference(favorite, reference))
            .max()
    }
}

/// スコアの内訳。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreBreakdown {
    pub tag_score: f32,
    pub matched_tags: usize,
    pub multiplier: f32,
    pub interest_score: f32,
    pub reference_score: f32,
    pub excluded: bool,
    pub total: f32,
}

/// カタログ全体に対するスコアラー。
///
/// アイテムごとの正規化済みデータをインスタンス内のテーブルに保持する。
#[derive(Debug)]
pub struct Scorer {
    catalog: Arc<Catalog>,
    weights: ScoringWeights,
    components: FxHashMap<String, ItemComponents>,
}

impl Scorer {
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, weights: ScoringWeights) -> Self {
        let components = catalog
            .items()
            .iter()
            .map(|item| (item.id.clone(), ItemComponents::from_item(item)))
            .collect();
        Self {
            catalog,
            weights,
            components,
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub fn weights(&self) -> ScoringWeights {
        self.weights
    }

    #[must_use]
    pub fn score(&self, profile: &Profile, item: &Item) -> f32 {
        self.breakdown(profile, item).total
    }

    /// スコアを内訳付きで計算する。
    #[must_use]
    pub fn breakdown(&self, profile: &Profile, item: &Item) -> ScoreBreakdown {
        let computed;
        let components = if let Some(cached) = self.components.get(&item.id) {
            cached
        } else {
            computed = ItemComponents::from_item(item);
            &computed
        };

        if profile
            .exclusions
            .iter()
            .any(|excluded| components.tags.contains(&normalize(excluded)))
        {
            return ScoreBreakdown {
                excluded: true,
                multiplier: 1.0,
                ..ScoreBreakdown::default()
            };
        }

        let mut tag_score = 0.0;
        let mut matched_tags = 0;
        for (tag, weight) in &profile.preferred_tags {
            if components.tags.contains(&normalize(tag)) {
                tag_score += weight.max(0.0);
                matched_tags += 1;
            }
        }
        let multiplier = if matched_tags >= 2 {
            1.0 + self.weights.multi_tag_bonus
        } else {
            1.0
        };

        let interest_score = profile
            .interests
            .iter()
            .map(|interest| normalize(interest))
            .filter(|interest| !interest.is_empty())
            .filter(|interest| {
                components.title.contains(interest.as_str())
                    || components
                        .tags
                        .iter()
                        .any(|tag| tag.contains(interest.as_str()))
            })
            .count() as f32
            * self.weights.interest_bonus;

        let reference_score: f32 = profile
            .favorite_references
            .iter()
            .map(|favorite| match components.best_reference_match(&normalize(favorite)) {
                Some(ReferenceMatch::Exact) => self.weights.reference_bonus,
                Some(ReferenceMatch::Partial) => {
                    self.weights.reference_bonus * self.weights.partial_reference_discount
                }
                None => 0.0,
            })
            .sum();

        let total = (tag_score * multiplier + interest_score + reference_score).max(0.0);
        ScoreBreakdown {
            tag_score,
            matched_tags,
            multiplier,
            interest_score,
            reference_score,
            excluded: false,
            total,
        }
    }

    /// カタログ全件をスコア降順・ID昇順で並べる。
    #[must_use]
    pub fn scored_items(&self, profile: &Profile) -> Vec<(&str, f32)> {
        let mut scored: Vec<(&str, f32)> = self
            .catalog
            .items()
            .iter()
            .map(|item| (item.id.as_str(), self.score(profile, item)))
            .collect();
        scored.sort_by(|a, b| by_score_then_id(*a, *b));
        scored
    }

    /// 上位 `k` 件の順位付きリスト。
    #[must_use]
    pub fn rank(&self, profile: &Profile, k: usize) -> RankedList {
        RankedList::from_ids(
            self.scored_items(profile).into_iter().map(|(id, _)| id),
            k,
        )
    }

    /// アイテムが正規化済みタグを持つかどうか。
    #[must_use]
    pub fn item_has_tag(&self, item_id: &str, normalized_tag: &str) -> bool {
        self.components
            .get(item_id)
            .is_some_and(|components| components.tags.contains(normalized_tag))
    }

    /// アイテムの参照作品がお気に入り（正規化済み）に一致するかどうか。
    #[must_use]
    pub fn item_matches_reference(&self, item_id: &str, normalized_favorite: &str) -> bool {
        self.components.get(item_id).is_some_and(|components| {
            components
                .best_reference_match(normalized_favorite)
                .is_some()
        })
    }
}

fn by_score_then_id(a: (&str, f32), b: (&str, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0))
}

/// タグ重みが有限かつ非負であることを確認する。
///
/// # Errors
/// 不正な重みがある場合は [`DataIntegrityError::InvalidTagWeight`] を返す。
pub fn validate_profile(profile: &Profile) -> Result<(), DataIntegrityError> {
    for (tag, weight) in &profile.preferred_tags {
        if !weight.is_finite() || *weight < 0.0 {
            return Err(DataIntegrityError::InvalidTagWeight {
                profile_id: profile.id.clone(),
                tag: tag.clone(),
                weight: *weight,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use rstest::rstest;

    use super::*;

    fn item(id: &str, tags: &[&str], references: &[&str]) -> Item {
        Item {
            id: id.to_string(),
            title: format!("Story {id}"),
            intro: None,
            tags: tags.iter().map(ToString::to_string).collect(),
            attributes: BTreeSet::new(),
            references: references.iter().map(ToString::to_string).collect(),
        }
    }

    fn profile(tags: &[(&str, f32)], favorites: &[&str]) -> Profile {
        Profile {
            id: "reader".to_string(),
            preferences: String::new(),
            preferred_tags: tags
                .iter()
                .map(|(tag, weight)| ((*tag).to_string(), *weight))
                .collect::<BTreeMap<_, _>>(),
            favorite_references: favorites.iter().map(ToString::to_string).collect(),
            interests: vec![],
            exclusions: BTreeSet::new(),
        }
    }

    fn scorer(items: Vec<Item>) -> Scorer {
        Scorer::new(
            Arc::new(Catalog::new(items).expect("catalog")),
            ScoringWeights::default(),
        )
    }

    #[test]
    fn multi_tag_item_outranks_single_tag_item() {
        let scorer = scorer(vec![
            item("C", &["romance"], &[]),
            item("B", &["academy"], &[]),
            item("A", &["academy", "supernatural"], &[]),
        ]);
        let reader = profile(&[("academy", 1.0), ("supernatural", 0.8)], &[]);

        let ranked = scorer.rank(&reader, 10);

        assert_eq!(ranked.ids(), &["A", "B", "C"]);
        let a = scorer.catalog().get("A").expect("item A");
        let breakdown = scorer.breakdown(&reader, a);
        assert_eq!(breakdown.matched_tags, 2);
        assert!((breakdown.total - 1.8 * 1.2).abs() < 1e-5);
    }

    #[test]
    fn ties_are_broken_by_identifier() {
        let scorer = scorer(vec![
            item("300", &["action"], &[]),
            item("100", &["action"], &[]),
            item("200", &["action"], &[]),
        ]);
        let reader = profile(&[("action", 1.0)], &[]);

        assert_eq!(scorer.rank(&reader, 3).ids(), &["100", "200", "300"]);
    }

    #[test]
    fn score_is_idempotent() {
        let scorer = scorer(vec![item("A", &["action", "isekai"], &["Naruto"])]);
        let reader = profile(&[("action", 1.0), ("isekai", 1.4)], &["Naruto"]);
        let target = scorer.catalog().get("A").expect("item");

        let first = scorer.score(&reader, target);
        for _ in 0..10 {
            assert_eq!(scorer.score(&reader, target).to_bits(), first.to_bits());
        }
    }

    #[rstest]
    #[case("naruto", "naruto", Some(ReferenceMatch::Exact))]
    #[case("naruto", "naruto shippuden", Some(ReferenceMatch::Partial))]
    #[case("one piece", "one piece film: red", Some(ReferenceMatch::Partial))]
    #[case("dragon ball", "dragon ball z", Some(ReferenceMatch::Partial))]
    #[case("my hero academia", "academia chronicles", Some(ReferenceMatch::Partial))]
    #[case("naruto", "bleach", None)]
    #[case("", "bleach", None)]
    fn reference_matching(
        #[case] favorite: &str,
        #[case] reference: &str,
        #[case] expected: Option<ReferenceMatch>,
    ) {
        assert_eq!(match_reference(favorite, reference), expected);
    }

    #[test]
    fn partial_reference_scores_lower_than_exact() {
        let scorer = scorer(vec![
            item("exact", &[], &["Naruto"]),
            item("partial", &[], &["Naruto Shippuden"]),
        ]);
        let reader = profile(&[], &["naruto"]);
        let exact = scorer.score(&reader, scorer.catalog().get("exact").expect("exact"));
        let partial = scorer.score(&reader, scorer.catalog().get("partial").expect("partial"));

        assert!((exact - 2.0).abs() < 1e-6);
        assert!((partial - 1.0).abs() < 1e-6);
    }

    #[test]
    fn excluded_tags_zero_the_score() {
        let scorer = scorer(vec![item("A", &["action", "violent reactions"], &[])]);
        let mut reader = profile(&[("action", 1.0)], &[]);
        reader.exclusions.insert("Violent Reactions".to_string());

        let breakdown = scorer.breakdown(&reader, scorer.catalog().get("A").expect("item"));

        assert!(breakdown.excluded);
        assert!(breakdown.total.abs() < f32::EPSILON);
    }

    #[test]
    fn interests_match_titles_and_tags() {
        let mut dojo = item("A", &["martial arts"], &[]);
        dojo.title = "School Life Dojo".to_string();
        let scorer = scorer(vec![dojo]);
        let mut reader = profile(&[], &[]);
        reader.interests = vec!["martial arts".to_string(), "school life".to_string()];

        let breakdown = scorer.breakdown(&reader, scorer.catalog().get("A").expect("item"));

        assert!((breakdown.interest_score - 3.0).abs() < 1e-6);
    }

    #[test]
    fn validate_profile_rejects_nan_weights() {
        let reader = profile(&[("action", f32::NAN)], &[]);
        let error = validate_profile(&reader).expect_err("NaN weight");
        assert_eq!(error.label(), "invalid_tag_weight");
    }
}
