/// Prometheusメトリクス定義。
use prometheus::{
    Counter, CounterVec, Histogram, Registry, register_counter_vec_with_registry,
    register_counter_with_registry, register_histogram_with_registry,
};
use std::sync::Arc;

const F1_BUCKETS: &[f64] = &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 0.95, 1.0];

/// 最適化ループのメトリクス。
#[derive(Debug, Clone)]
pub struct TunerMetrics {
    // カウンター
    pub iterations: Counter,
    pub generation_calls: Counter,
    pub fallbacks: CounterVec,
    pub stops: CounterVec,
    pub profile_failures: CounterVec,

    // ヒストグラム
    pub f1: Histogram,
    pub iteration_duration: Histogram,
    pub profile_duration: Histogram,
}

impl TunerMetrics {
    /// 新しいメトリクスコレクターを作成する。
    ///
    /// # Errors
    /// 同名メトリクスが既に登録されている場合。
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            iterations: register_counter_with_registry!(
                "tuner_iterations_total",
                "Total number of optimization iterations executed",
                registry
            )?,
            generation_calls: register_counter_with_registry!(
                "tuner_generation_calls_total",
                "Number of recommendation requests sent to an enabled generator",
                registry
            )?,
            fallbacks: register_counter_vec_with_registry!(
                "tuner_fallbacks_total",
                "Recommendations served by the scored fallback, by cause",
                &["cause"],
                registry
            )?,
            stops: register_counter_vec_with_registry!(
                "tuner_stops_total",
                "Profiles that finished optimization, by stop reason",
                &["reason"],
                registry
            )?,
            profile_failures: register_counter_vec_with_registry!(
                "tuner_profile_failures_total",
                "Profiles aborted by data integrity errors, by kind",
                &["kind"],
                registry
            )?,
            f1: register_histogram_with_registry!(
                "tuner_iteration_f1",
                "F1 score observed at each iteration",
                F1_BUCKETS.to_vec(),
                registry
            )?,
            iteration_duration: register_histogram_with_registry!(
                "tuner_iteration_duration_seconds",
                "Duration of a single recommend/evaluate iteration",
                registry
            )?,
            profile_duration: register_histogram_with_registry!(
                "tuner_profile_duration_seconds",
                "Duration of the whole optimization for one profile",
                registry
            )?,
        })
    }
}
