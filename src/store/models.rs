//! Catalog and profile records.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// 推薦対象のストーリー。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub intro: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub attributes: BTreeSet<String>,
    /// 元ネタ作品名（クロスオーバー作品など）
    #[serde(default)]
    pub references: Vec<String>,
}

/// 推薦リクエスト元のプロファイル。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub preferences: String,
    /// タグ → 重み
    #[serde(default)]
    pub preferred_tags: BTreeMap<String, f32>,
    #[serde(default)]
    pub favorite_references: Vec<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub exclusions: BTreeSet<String>,
}

/// 重複なし・長さK以下の順位付きID列。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RankedList {
    ids: Vec<String>,
}

impl RankedList {
    /// 先頭から重複を除きつつ最大 `k` 件を取り込む。
    #[must_use]
    pub fn from_ids<I, S>(ids: I, k: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = FxHashSet::default();
        let mut kept = Vec::with_capacity(k);
        for id in ids {
            if kept.len() >= k {
                break;
            }
            let id = id.into();
            if seen.insert(id.clone()) {
                kept.push(id);
            }
        }
        Self { ids: kept }
    }

    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|candidate| candidate == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// 先頭 `k` 件のみのリストを返す。
    #[must_use]
    pub fn top(&self, k: usize) -> Self {
        Self {
            ids: self.ids.iter().take(k).cloned().collect(),
        }
    }
}
