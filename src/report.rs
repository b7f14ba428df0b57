//! 実行結果のテキストレポートと履歴ファイル出力。

use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    evaluation::{MeanMetrics, Metrics},
    pipeline::{OptimizerSettings, ProfileOutcome, ProfileReport},
};

/// 1回の実行全体の履歴（JSONとして保存する）。
#[derive(Debug, Serialize)]
pub struct RunHistory<'a> {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub generator: &'a str,
    pub settings: &'a OptimizerSettings,
    pub average: Metrics,
    pub profiles: &'a [ProfileReport],
}

impl<'a> RunHistory<'a> {
    #[must_use]
    pub fn new(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        generator: &'a str,
        settings: &'a OptimizerSettings,
        profiles: &'a [ProfileReport],
    ) -> Self {
        Self {
            run_id,
            started_at,
            generator,
            settings,
            average: average_metrics(profiles).average(),
            profiles,
        }
    }
}

fn average_metrics(reports: &[ProfileReport]) -> MeanMetrics {
    let mut mean = MeanMetrics::default();
    for summary in reports.iter().filter_map(ProfileReport::summary) {
        mean.push(&summary.final_metrics);
    }
    mean
}

/// `optimization_history_<timestamp>.json`
#[must_use]
pub fn history_file_name(at: DateTime<Utc>) -> String {
    format!("optimization_history_{}.json", at.format("%Y%m%d_%H%M%S"))
}

#[must_use]
pub fn metrics_file_name(at: DateTime<Utc>) -> String {
    format!("optimization_metrics_{}.prom", at.format("%Y%m%d_%H%M%S"))
}

/// 履歴JSONをディレクトリへ書き出し、書き出したパスを返す。
///
/// # Errors
/// ディレクトリ作成・シリアライズ・書き込みに失敗した場合。
pub fn write_history(dir: &Path, history: &RunHistory<'_>) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create history directory: {}", dir.display()))?;
    let path = dir.join(history_file_name(history.started_at));
    let body = serde_json::to_string_pretty(history).context("failed to serialize history")?;
    fs::write(&path, body)
        .with_context(|| format!("failed to write history: {}", path.display()))?;
    Ok(path)
}

/// Prometheus テキストを履歴と同じディレクトリへ書き出す。
///
/// # Errors
/// 書き込みに失敗した場合。
pub fn write_metrics(dir: &Path, at: DateTime<Utc>, rendered: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create history directory: {}", dir.display()))?;
    let path = dir.join(metrics_file_name(at));
    fs::write(&path, rendered)
        .with_context(|| format!("failed to write metrics: {}", path.display()))?;
    Ok(path)
}

/// 標準出力向けのプロファイル別サマリ。
#[must_use]
pub fn render_text(reports: &[ProfileReport]) -> String {
    let mut out = String::new();
    for report in reports {
        let _ = writeln!(out, "Profile: {}", report.profile_id);
        match &report.outcome {
            ProfileOutcome::Completed { summary } => {
                let _ = writeln!(
                    out,
                    "  stopped: {} after {} iteration(s) ({} via scored fallback)",
                    summary.stop_reason.as_str(),
                    summary.iterations,
                    summary.fallback_iterations
                );
                let _ = writeln!(out, "  best F1: {:.3}", summary.best_f1);
                let _ = writeln!(out, "  final: {}", format_metrics(&summary.final_metrics));
                let _ = writeln!(out, "  best prompt:");
                for line in summary.best_prompt.lines() {
                    let _ = writeln!(out, "    {line}");
                }
            }
            ProfileOutcome::Failed { kind, message } => {
                let _ = writeln!(out, "  failed ({kind}): {message}");
            }
        }
        out.push('\n');
    }

    let mean = average_metrics(reports);
    let _ = writeln!(
        out,
        "Completed {} of {} profile(s); average {}",
        mean.count(),
        reports.len(),
        format_metrics(&mean.average())
    );
    out
}

fn format_metrics(metrics: &Metrics) -> String {
    format!(
        "precision {:.3}, recall {:.3}, f1 {:.3}, tag coverage {:.3}, reference match {:.3}",
        metrics.precision,
        metrics.recall,
        metrics.f1,
        metrics.tag_coverage,
        metrics.reference_match_rate
    )
}
