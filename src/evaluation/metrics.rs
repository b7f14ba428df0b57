use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::store::RankedList;

/// 推薦リストの評価メトリクス（すべて [0, 1]）。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub tag_coverage: f64,
    pub reference_match_rate: f64,
}

/// 推薦リストと正解リストの一致件数。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlapCounts {
    pub hits: usize,
    pub recommended: usize,
    pub relevant: usize,
}

impl OverlapCounts {
    /// 両リストは呼び出し側で top-K に切り詰めておくこと。
    #[must_use]
    pub fn between(recommended: &RankedList, relevant: &RankedList) -> Self {
        let relevant_ids: FxHashSet<&str> = relevant.iter().collect();
        let hits = recommended
            .iter()
            .filter(|id| relevant_ids.contains(id))
            .count();
        Self {
            hits,
            recommended: recommended.len(),
            relevant: relevant.len(),
        }
    }

    #[must_use]
    pub fn precision(self) -> f64 {
        ratio(self.hits, self.recommended)
    }

    #[must_use]
    pub fn recall(self) -> f64 {
        ratio(self.hits, self.relevant)
    }

    #[must_use]
    pub fn f1(self) -> f64 {
        f1_score(self.precision(), self.recall())
    }
}

/// 分母0のときは0を返す比率。
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[must_use]
pub fn f1_score(precision: f64, recall: f64) -> f64 {
    if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    }
}

/// 複数プロファイルにわたる平均メトリクスの集計器。
#[derive(Debug, Default, Clone, Copy)]
pub struct MeanMetrics {
    sum: Metrics,
    count: usize,
}

impl MeanMetrics {
    pub fn push(&mut self, metrics: &Metrics) {
        self.sum.precision += metrics.precision;
        self.sum.recall += metrics.recall;
        self.sum.f1 += metrics.f1;
        self.sum.tag_coverage += metrics.tag_coverage;
        self.sum.reference_match_rate += metrics.reference_match_rate;
        self.count += 1;
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average(&self) -> Metrics {
        if self.count == 0 {
            return Metrics::default();
        }
        let n = self.count as f64;
        Metrics {
            precision: self.sum.precision / n,
            recall: self.sum.recall / n,
            f1: self.sum.f1 / n,
            tag_coverage: self.sum.tag_coverage / n,
            reference_match_rate: self.sum.reference_match_rate / n,
        }
    }
}
