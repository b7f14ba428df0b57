// 最適化ループの停止規則とプロファイル単位の失敗分離を確認する。
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use recommend_tuner::clients::{DisabledGenerator, GenerationError, TextGenerator};
use recommend_tuner::observability::Telemetry;
use recommend_tuner::pipeline::{
    Optimizer, OptimizerSettings, ProfileOutcome, StopReason,
};
use recommend_tuner::scoring::{Scorer, ScoringWeights};
use recommend_tuner::store::{Catalog, Item, Profile, sample_dataset};

/// 用意した応答を順番に返し、尽きたら最後の応答を繰り返す生成器。
struct ScriptedGenerator {
    replies: Vec<String>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: replies.iter().map(ToString::to_string).collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let index = call.min(self.replies.len() - 1);
        Ok(self.replies[index].clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn item(id: &str, tag: &str) -> Item {
    Item {
        id: id.to_string(),
        title: format!("Story {id}"),
        intro: None,
        tags: BTreeSet::from([tag.to_string()]),
        attributes: BTreeSet::new(),
        references: vec![],
    }
}

/// s01..s10 は action（関連）、x01..x10 は romance（無関係）。
fn scorer() -> Arc<Scorer> {
    let mut items = Vec::new();
    for n in 1..=10 {
        items.push(item(&format!("s{n:02}"), "action"));
        items.push(item(&format!("x{n:02}"), "romance"));
    }
    let catalog = Arc::new(Catalog::new(items).expect("catalog"));
    Arc::new(Scorer::new(catalog, ScoringWeights::default()))
}

fn profile(id: &str, tags: &[&str]) -> Profile {
    Profile {
        id: id.to_string(),
        preferences: String::new(),
        preferred_tags: tags
            .iter()
            .map(|tag| ((*tag).to_string(), 1.0))
            .collect::<BTreeMap<_, _>>(),
        favorite_references: vec![],
        interests: vec![],
        exclusions: BTreeSet::new(),
    }
}

const ONE_HIT: &str = "s01, x01, x02, x03, x04, x05, x06, x07, x08, x09";
const FIVE_HITS: &str = "s01, s02, s03, s04, s05, x01, x02, x03, x04, x05";
const ALL_HITS: &str = "s01, s02, s03, s04, s05, s06, s07, s08, s09, s10";

fn optimizer(generator: Arc<dyn TextGenerator>, settings: OptimizerSettings) -> Optimizer {
    Optimizer::new(generator, scorer(), settings).expect("valid settings")
}

#[tokio::test]
async fn plateau_stops_on_third_equal_value_after_improvement() {
    let generator = Arc::new(ScriptedGenerator::new(&[ONE_HIT, FIVE_HITS]));
    let optimizer = optimizer(generator, OptimizerSettings::default());

    let summary = optimizer
        .optimize_profile(&profile("reader", &["action"]))
        .await
        .expect("optimization");

    assert_eq!(summary.stop_reason, StopReason::Plateau);
    assert_eq!(summary.iterations, 5);
    assert_eq!(summary.fallback_iterations, 0);
    assert!((summary.best_f1 - 0.5).abs() < 1e-9);
    let f1s: Vec<f64> = summary.history.iter().map(|r| r.metrics.f1).collect();
    assert!((f1s[0] - 0.1).abs() < 1e-9);
    assert!(f1s[1..].iter().all(|f1| (f1 - 0.5).abs() < 1e-9));
    assert_eq!(summary.best_prompt, summary.history[1].prompt);
}

#[tokio::test]
async fn target_reached_wins_over_iteration_limit() {
    let settings = OptimizerSettings {
        iteration_limit: 1,
        ..OptimizerSettings::default()
    };
    let optimizer = optimizer(Arc::new(ScriptedGenerator::new(&[ALL_HITS])), settings);

    let summary = optimizer
        .optimize_profile(&profile("reader", &["action"]))
        .await
        .expect("optimization");

    assert_eq!(summary.stop_reason, StopReason::TargetReached);
    assert_eq!(summary.iterations, 1);
}

#[tokio::test]
async fn zero_time_budget_stops_after_first_iteration() {
    let settings = OptimizerSettings {
        time_budget: Duration::ZERO,
        ..OptimizerSettings::default()
    };
    let optimizer = optimizer(Arc::new(ScriptedGenerator::new(&[ONE_HIT])), settings);

    let summary = optimizer
        .optimize_profile(&profile("reader", &["action"]))
        .await
        .expect("optimization");

    assert_eq!(summary.stop_reason, StopReason::TimeBudget);
    assert_eq!(summary.iterations, 1);
}

#[tokio::test]
async fn iteration_limit_counts_completed_iterations() {
    let settings = OptimizerSettings {
        iteration_limit: 2,
        ..OptimizerSettings::default()
    };
    let optimizer = optimizer(
        Arc::new(ScriptedGenerator::new(&[ONE_HIT, FIVE_HITS])),
        settings,
    );

    let summary = optimizer
        .optimize_profile(&profile("reader", &["action"]))
        .await
        .expect("optimization");

    assert_eq!(summary.stop_reason, StopReason::IterationLimit);
    assert_eq!(summary.iterations, 2);
}

#[tokio::test]
async fn prompt_revision_addresses_gaps_once() {
    let settings = OptimizerSettings {
        iteration_limit: 3,
        ..OptimizerSettings::default()
    };
    let optimizer = optimizer(Arc::new(ScriptedGenerator::new(&[ONE_HIT])), settings);

    let summary = optimizer
        .optimize_profile(&profile("reader", &["action", "mystery"]))
        .await
        .expect("optimization");

    let clause = "Make sure to include stories tagged \"mystery\".";
    let prompts: Vec<&str> = summary.history.iter().map(|r| r.prompt.as_str()).collect();
    assert!(!prompts[0].contains(clause));
    assert_eq!(prompts[1].matches(clause).count(), 1);
    assert_eq!(prompts[1], prompts[2]);
}

#[tokio::test]
async fn failing_profile_does_not_abort_the_run() {
    let optimizer = optimizer(
        Arc::new(ScriptedGenerator::new(&[ALL_HITS])),
        OptimizerSettings::default(),
    );
    let profiles = vec![
        profile("nothing-relevant", &["horror"]),
        profile("reader", &["action"]),
    ];

    let reports = optimizer.run(&profiles).await;

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].profile_id, "nothing-relevant");
    assert!(matches!(
        &reports[0].outcome,
        ProfileOutcome::Failed { kind, .. } if kind == "empty_ground_truth"
    ));
    let summary = reports[1].summary().expect("second profile completes");
    assert_eq!(summary.stop_reason, StopReason::TargetReached);
}

#[tokio::test]
async fn generation_calls_count_only_enabled_generators() {
    let settings = OptimizerSettings {
        iteration_limit: 2,
        ..OptimizerSettings::default()
    };
    let disabled = Telemetry::without_tracing().expect("telemetry");
    let scripted = Telemetry::without_tracing().expect("telemetry");

    Optimizer::new(Arc::new(DisabledGenerator), scorer(), settings.clone())
        .expect("valid settings")
        .with_metrics(Arc::clone(disabled.metrics()))
        .optimize_profile(&profile("reader", &["action"]))
        .await
        .expect("optimization");
    optimizer(Arc::new(ScriptedGenerator::new(&[ONE_HIT])), settings)
        .with_metrics(Arc::clone(scripted.metrics()))
        .optimize_profile(&profile("reader", &["action"]))
        .await
        .expect("optimization");

    let disabled = disabled.metrics();
    assert!(disabled.iterations.get() > 0.0);
    assert!(disabled.generation_calls.get().abs() < f64::EPSILON);
    let scripted = scripted.metrics();
    assert!((scripted.generation_calls.get() - scripted.iterations.get()).abs() < f64::EPSILON);
    assert!(scripted.iterations.get() > 0.0);
}

#[tokio::test]
async fn disabled_generation_is_deterministic_on_sample_data() {
    let dataset = sample_dataset().expect("sample dataset");
    let scorer = Arc::new(Scorer::new(
        Arc::clone(&dataset.catalog),
        ScoringWeights::default(),
    ));
    let optimizer = Optimizer::new(
        Arc::new(DisabledGenerator),
        scorer,
        OptimizerSettings::default(),
    )
    .expect("valid settings");

    let first = optimizer.run(dataset.profiles.profiles()).await;
    let second = optimizer.run(dataset.profiles.profiles()).await;

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        let (a, b) = (
            a.summary().expect("completed"),
            b.summary().expect("completed"),
        );
        assert_eq!(a.stop_reason, b.stop_reason);
        assert_eq!(a.iterations, b.iterations);
        assert_eq!(a.fallback_iterations, a.iterations);
        for (x, y) in a.history.iter().zip(&b.history) {
            assert_eq!(x.recommendation, y.recommendation);
            assert_eq!(x.metrics, y.metrics);
            assert_eq!(x.prompt, y.prompt);
        }
    }
}
