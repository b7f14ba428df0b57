//! データセット（カタログ＋プロファイル）の読み込み。

use std::{fs, path::Path, sync::Arc};

use anyhow::{Context, Result};
use serde::Deserialize;

use super::{
    catalog::{Catalog, ProfileStore},
    models::{Item, Profile},
};

const SAMPLE_DATASET: &str = include_str!("../../resources/sample_dataset.json");

#[derive(Debug, Deserialize)]
struct RawDataset {
    #[serde(default)]
    items: Vec<Item>,
    #[serde(default)]
    profiles: Vec<Profile>,
}

/// 検証済みのカタログとプロファイル。
#[derive(Debug, Clone)]
pub struct Dataset {
    pub catalog: Arc<Catalog>,
    pub profiles: Arc<ProfileStore>,
}

impl Dataset {
    /// JSON文字列からデータセットを構築する。
    ///
    /// # Errors
    /// JSONのパースに失敗した場合、もしくはIDが重複している場合はエラーを返す。
    pub fn from_json(raw: &str) -> Result<Self> {
        let dataset: RawDataset =
            serde_json::from_str(raw).context("failed to parse dataset JSON")?;
        let catalog = Catalog::new(dataset.items).context("invalid catalog")?;
        let profiles = ProfileStore::new(dataset.profiles).context("invalid profile list")?;
        Ok(Self {
            catalog: Arc::new(catalog),
            profiles: Arc::new(profiles),
        })
    }
}

/// データセットをファイルから読み込む。
///
/// # Errors
/// ファイルの読み込み・パース・検証に失敗した場合はエラーを返す。
pub fn load_dataset(path: &Path) -> Result<Dataset> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read dataset: {}", path.display()))?;
    Dataset::from_json(&data).with_context(|| format!("invalid dataset: {}", path.display()))
}

/// 同梱のサンプルデータセット（`resources/sample_dataset.json`）を読み込む。
///
/// # Errors
/// 同梱JSONが壊れている場合のみ失敗する。
pub fn sample_dataset() -> Result<Dataset> {
    Dataset::from_json(SAMPLE_DATASET).context("bundled sample dataset is invalid")
}
