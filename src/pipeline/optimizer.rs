//! プロンプト最適化ループ。
//!
//! 1イテレーション = 推薦 → 評価 → 履歴追加 → 停止判定 → プロンプト改訂。
//! 停止条件は target_reached, plateau, time_budget, iteration_limit の順に判定し、
//! 最初に成立したものを採用する。
//!
//! 実行中の状態は [`OptimizationState`]、停止後は [`OptimizationSummary`] で表す。
//! `OptimizationState::finish` が状態を消費するため、停止後のループ継続は型で防がれる。

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::{
    clients::generation::TextGenerator,
    config::ConfigError,
    evaluation::{Evaluator, Metrics},
    observability::TunerMetrics,
    scoring::Scorer,
    store::Profile,
    util::error::DataIntegrityError,
};

use super::{
    ground_truth::GroundTruthGenerator,
    prompt::{PromptComponents, revise},
    recommend::{Recommendation, Recommender},
};

/// 最適化ループの設定値。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizerSettings {
    pub top_k: usize,
    pub f1_target: f64,
    pub plateau_window: usize,
    pub time_budget: Duration,
    pub iteration_limit: usize,
    pub improvement_epsilon: f64,
    pub call_timeout: Duration,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            top_k: 10,
            f1_target: 0.95,
            plateau_window: 3,
            time_budget: Duration::from_secs(300),
            iteration_limit: 10,
            improvement_epsilon: 1e-6,
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl OptimizerSettings {
    /// # Errors
    /// 値が許容範囲外の場合は [`ConfigError::Invalid`] を返す。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError::invalid("top_k", "must be greater than zero"));
        }
        if !(self.f1_target > 0.0 && self.f1_target <= 1.0) {
            return Err(ConfigError::invalid("f1_target", "must be within (0, 1]"));
        }
        if self.plateau_window == 0 {
            return Err(ConfigError::invalid(
                "plateau_window",
                "must be greater than zero",
            ));
        }
        if self.iteration_limit == 0 {
            return Err(ConfigError::invalid(
                "iteration_limit",
                "must be greater than zero",
            ));
        }
        if !self.improvement_epsilon.is_finite() || self.improvement_epsilon < 0.0 {
            return Err(ConfigError::invalid(
                "improvement_epsilon",
                "must be a finite non-negative number",
            ));
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "call_timeout",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// 最新イテレーション記録後の停止判定。
    #[must_use]
    pub fn stop_reason(&self, state: &OptimizationState, elapsed: Duration) -> Option<StopReason> {
        let latest_f1 = state.latest_metrics()?.f1;
        if latest_f1 >= self.f1_target {
            Some(StopReason::TargetReached)
        } else if state.no_improvement() >= self.plateau_window {
            Some(StopReason::Plateau)
        } else if elapsed >= self.time_budget {
            Some(StopReason::TimeBudget)
        } else if state.iteration() >= self.iteration_limit {
            Some(StopReason::IterationLimit)
        } else {
            None
        }
    }
}

/// 停止理由。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TargetReached,
    Plateau,
    TimeBudget,
    IterationLimit,
}

impl StopReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TargetReached => "target_reached",
            Self::Plateau => "plateau",
            Self::TimeBudget => "time_budget",
            Self::IterationLimit => "iteration_limit",
        }
    }
}

/// 1イテレーション分の記録。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationRecord {
    /// 1始まり。
    pub iteration: usize,
    pub prompt: String,
    pub metrics: Metrics,
    pub recommendation: Recommendation,
    pub duration_ms: u64,
}

/// プロファイルごとの最適化状態。
#[derive(Debug, Clone)]
pub struct OptimizationState {
    profile_id: String,
    prompt: String,
    history: Vec<IterationRecord>,
    best_f1: Option<f64>,
    best_prompt: Option<String>,
    no_improvement: usize,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl OptimizationState {
    #[must_use]
    pub fn new(profile_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            profile_id: profile_id.into(),
            prompt: prompt.into(),
            history: Vec::new(),
            best_f1: None,
            best_prompt: None,
            no_improvement: 0,
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// イテレーション結果を履歴に追加し、改善カウンタを更新する。
    ///
    /// 最初の記録はベースラインとして扱う。戻り値はベストF1が更新されたかどうか。
    pub fn record(
        &mut self,
        recommendation: Recommendation,
        metrics: Metrics,
        duration: Duration,
        epsilon: f64,
    ) -> bool {
        let improved = match self.best_f1 {
            None => true,
            Some(best) => metrics.f1 > best + epsilon,
        };
        if improved {
            self.best_f1 = Some(metrics.f1);
            self.best_prompt = Some(self.prompt.clone());
            self.no_improvement = 0;
        } else {
            self.no_improvement += 1;
        }

        self.history.push(IterationRecord {
            iteration: self.history.len() + 1,
            prompt: self.prompt.clone(),
            metrics,
            recommendation,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        });
        improved
    }

    /// 次イテレーションのプロンプトに差し替える。
    pub fn advance(&mut self, prompt: String) {
        self.prompt = prompt;
    }

    #[must_use]
    pub fn profile_id(&self) -> &str {
        &self.profile_id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// 完了したイテレーション数。
    #[must_use]
    pub fn iteration(&self) -> usize {
        self.history.len()
    }

    #[must_use]
    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }

    #[must_use]
    pub fn latest_metrics(&self) -> Option<&Metrics> {
        self.history.last().map(|record| &record.metrics)
    }

    #[must_use]
    pub fn best_f1(&self) -> Option<f64> {
        self.best_f1
    }

    #[must_use]
    pub fn best_prompt(&self) -> Option<&str> {
        self.best_prompt.as_deref()
    }

    #[must_use]
    pub fn no_improvement(&self) -> usize {
        self.no_improvement
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// 停止理由を確定してサマリへ変換する。
    #[must_use]
    pub fn finish(self, reason: StopReason) -> OptimizationSummary {
        let final_metrics = self.latest_metrics().copied().unwrap_or_default();
        let fallback_iterations = self
            .history
            .iter()
            .filter(|record| record.recommendation.is_fallback())
            .count();
        OptimizationSummary {
            elapsed_ms: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
            profile_id: self.profile_id,
            stop_reason: reason,
            iterations: self.history.len(),
            fallback_iterations,
            best_f1: self.best_f1.unwrap_or_default(),
            best_prompt: self.best_prompt.unwrap_or(self.prompt),
            final_metrics,
            started_at: self.started_at,
            history: self.history,
        }
    }
}

/// プロファイル1件分の最適化結果。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationSummary {
    pub profile_id: String,
    pub stop_reason: StopReason,
    pub iterations: usize,
    pub fallback_iterations: usize,
    pub best_f1: f64,
    pub best_prompt: String,
    pub final_metrics: Metrics,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub history: Vec<IterationRecord>,
}

/// プロファイルごとの終了状態。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProfileOutcome {
    Completed { summary: OptimizationSummary },
    Failed { kind: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileReport {
    pub profile_id: String,
    #[serde(flatten)]
    pub outcome: ProfileOutcome,
}

impl ProfileReport {
    #[must_use]
    pub fn summary(&self) -> Option<&OptimizationSummary> {
        match &self.outcome {
            ProfileOutcome::Completed { summary } => Some(summary),
            ProfileOutcome::Failed { .. } => None,
        }
    }
}

/// 推薦器・評価器・正解生成器を束ねた最適化ループ。
#[derive(Debug)]
pub struct Optimizer {
    recommender: Recommender,
    evaluator: Evaluator,
    ground_truth: GroundTruthGenerator,
    components: PromptComponents,
    settings: OptimizerSettings,
    metrics: Option<Arc<TunerMetrics>>,
}

impl Optimizer {
    /// # Errors
    /// 設定値が不正な場合は [`ConfigError`] を返す（ループ開始前に失敗させる）。
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        scorer: Arc<Scorer>,
        settings: OptimizerSettings,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            recommender: Recommender::new(
                generator,
                Arc::clone(&scorer),
                settings.top_k,
                settings.call_timeout,
            ),
            evaluator: Evaluator::new(Arc::clone(&scorer), settings.top_k),
            ground_truth: GroundTruthGenerator::new(scorer),
            components: PromptComponents::default(),
            settings,
            metrics: None,
        })
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<TunerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn with_components(mut self, components: PromptComponents) -> Self {
        self.components = components;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    /// プロファイルを順番に処理する。失敗はそのプロファイルの結果としてのみ記録する。
    pub async fn run(&self, profiles: &[Profile]) -> Vec<ProfileReport> {
        let mut reports = Vec::with_capacity(profiles.len());
        for profile in profiles {
            let outcome = match self.optimize_profile(profile).await {
                Ok(summary) => ProfileOutcome::Completed { summary },
                Err(error) => {
                    warn!(
                        profile_id = %profile.id,
                        kind = error.label(),
                        error = %error,
                        "profile optimization aborted"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics
                            .profile_failures
                            .with_label_values(&[error.label()])
                            .inc();
                    }
                    ProfileOutcome::Failed {
                        kind: error.label().to_string(),
                        message: error.to_string(),
                    }
                }
            };
            reports.push(ProfileReport {
                profile_id: profile.id.clone(),
                outcome,
            });
        }
        reports
    }

    /// 1プロファイル分の最適化ループ。
    ///
    /// # Errors
    /// 正解リストが作れない場合や評価時にデータ不整合が見つかった場合。
    #[instrument(skip_all, fields(profile_id = %profile.id))]
    pub async fn optimize_profile(
        &self,
        profile: &Profile,
    ) -> Result<OptimizationSummary, DataIntegrityError> {
        let ground_truth = self.ground_truth.generate(profile)?;
        let mut state = OptimizationState::new(profile.id.clone(), self.components.template());

        let reason = loop {
            let iteration_start = Instant::now();
            let recommendation = self.recommender.recommend(profile, state.prompt()).await;
            let evaluation =
                self.evaluator
                    .evaluate(profile, recommendation.list(), &ground_truth)?;
            let duration = iteration_start.elapsed();

            self.observe_iteration(&recommendation, &evaluation.metrics, duration);

            let improved = state.record(
                recommendation,
                evaluation.metrics,
                duration,
                self.settings.improvement_epsilon,
            );
            info!(
                iteration = state.iteration(),
                f1 = evaluation.metrics.f1,
                precision = evaluation.metrics.precision,
                recall = evaluation.metrics.recall,
                tag_coverage = evaluation.metrics.tag_coverage,
                reference_match_rate = evaluation.metrics.reference_match_rate,
                improved,
                no_improvement = state.no_improvement(),
                "iteration evaluated"
            );

            if let Some(reason) = self.settings.stop_reason(&state, state.elapsed()) {
                info!(
                    reason = reason.as_str(),
                    iterations = state.iteration(),
                    best_f1 = state.best_f1().unwrap_or_default(),
                    "optimization stopped"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.stops.with_label_values(&[reason.as_str()]).inc();
                    metrics.profile_duration.observe(state.elapsed().as_secs_f64());
                }
                break reason;
            }

            let revised = revise(state.prompt(), &evaluation.feedback);
            state.advance(revised);
        };

        Ok(state.finish(reason))
    }

    fn observe_iteration(
        &self,
        recommendation: &Recommendation,
        metrics: &Metrics,
        duration: Duration,
    ) {
        let Some(tuner_metrics) = &self.metrics else {
            return;
        };
        tuner_metrics.iterations.inc();
        if self.recommender.generator_enabled() {
            tuner_metrics.generation_calls.inc();
        }
        if let Some(cause) = recommendation.fallback_cause() {
            tuner_metrics
                .fallbacks
                .with_label_values(&[cause.as_str()])
                .inc();
        }
        tuner_metrics.f1.observe(metrics.f1);
        tuner_metrics
            .iteration_duration
            .observe(duration.as_secs_f64());
    }
}
