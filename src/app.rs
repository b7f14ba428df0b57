use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::{
    clients::{ChatCompletionClient, DisabledGenerator, TextGenerator},
    config::Config,
    observability::Telemetry,
    pipeline::{Optimizer, ProfileReport},
    report::{RunHistory, write_history, write_metrics},
    scoring::Scorer,
    store::{Dataset, load_dataset, sample_dataset},
};

/// 実行に必要なコンポーネントをまとめたレジストリ。
pub struct ComponentRegistry {
    config: Arc<Config>,
    telemetry: Telemetry,
    dataset: Dataset,
    generator_name: String,
    optimizer: Optimizer,
}

impl ComponentRegistry {
    /// 設定からデータセット・生成クライアント・最適化ループを初期化する。
    ///
    /// # Errors
    /// Telemetry の初期化、データセット読み込み、HTTP クライアント構築、設定検証のいずれかが失敗した場合。
    pub fn build(config: Config) -> Result<Self> {
        let telemetry = Telemetry::new()?;
        let dataset = match config.dataset_path() {
            Some(path) => load_dataset(path)?,
            None => sample_dataset()?,
        };
        let generator: Arc<dyn TextGenerator> = match config.generation_settings() {
            Some(settings) => Arc::new(
                ChatCompletionClient::new(settings).context("failed to build generation client")?,
            ),
            None => Arc::new(DisabledGenerator),
        };
        Self::from_parts(config, telemetry, dataset, generator)
    }

    /// 組み立て済みの部品からレジストリを作る。
    ///
    /// # Errors
    /// 最適化ループの設定が不正な場合。
    pub fn from_parts(
        config: Config,
        telemetry: Telemetry,
        dataset: Dataset,
        generator: Arc<dyn TextGenerator>,
    ) -> Result<Self> {
        let scorer = Arc::new(Scorer::new(
            Arc::clone(&dataset.catalog),
            config.scoring_weights(),
        ));
        let generator_name = generator.name().to_string();
        let optimizer = Optimizer::new(generator, scorer, config.optimizer_settings())
            .context("invalid optimizer settings")?
            .with_metrics(Arc::clone(telemetry.metrics()));

        info!(
            items = dataset.catalog.len(),
            profiles = dataset.profiles.len(),
            generator = %generator_name,
            "components initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            telemetry,
            dataset,
            generator_name,
            optimizer,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn generator_name(&self) -> &str {
        &self.generator_name
    }

    /// 全プロファイルをデータセットの順に最適化する。
    pub async fn run(&self) -> Vec<ProfileReport> {
        self.optimizer.run(self.dataset.profiles.profiles()).await
    }

    /// 履歴ディレクトリが設定されていれば履歴JSONとメトリクスを書き出す。
    ///
    /// # Errors
    /// ファイル書き込みに失敗した場合。
    pub fn persist(
        &self,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        reports: &[ProfileReport],
    ) -> Result<Option<PathBuf>> {
        let Some(dir) = self.config.history_dir() else {
            return Ok(None);
        };
        let history = RunHistory::new(
            run_id,
            started_at,
            &self.generator_name,
            self.optimizer.settings(),
            reports,
        );
        let path = write_history(dir, &history)?;
        let metrics_path = write_metrics(dir, started_at, &self.telemetry.render_prometheus())?;
        info!(
            %run_id,
            history = %path.display(),
            metrics = %metrics_path.display(),
            "run history written"
        );
        Ok(Some(path))
    }
}
