//! In-memory catalog and profile store. Read-only once built.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use rustc_hash::FxHashMap;

use crate::util::error::DataIntegrityError;

use super::models::{Item, Profile};

/// ストーリーカタログ（読み込み順を保持する）。
#[derive(Debug, Clone)]
pub struct Catalog {
    items: Vec<Item>,
    index: FxHashMap<String, usize>,
    matcher: AhoCorasick,
}

impl Catalog {
    /// # Errors
    /// 同じIDのアイテムが複数ある場合は [`DataIntegrityError::DuplicateItem`]、
    /// ID照合用のオートマトンを構築できない場合は [`DataIntegrityError::IdentifierIndex`]。
    pub fn new(items: Vec<Item>) -> Result<Self, DataIntegrityError> {
        let mut index = FxHashMap::default();
        for (position, item) in items.iter().enumerate() {
            if index.insert(item.id.clone(), position).is_some() {
                return Err(DataIntegrityError::DuplicateItem(item.id.clone()));
            }
        }

        let patterns: Vec<&str> = items
            .iter()
            .map(|item| item.id.as_str())
            .filter(|id| !id.is_empty())
            .collect();
        let matcher = AhoCorasickBuilder::new()
            .match_kind(MatchKind::LeftmostLongest)
            .build(&patterns)
            .map_err(|error| DataIntegrityError::IdentifierIndex(error.to_string()))?;

        Ok(Self {
            items,
            index,
            matcher,
        })
    }

    /// テキスト中に現れるカタログIDを出現順に返す。
    ///
    /// 前後が識別子文字（英数字・`_`・`-`）に接している一致は、より長い語の一部とみなして除外する。
    pub fn find_identifiers<'a>(
        &'a self,
        text: &'a str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.matcher
            .find_iter(text)
            .filter(move |mat| is_bounded(text, mat.start(), mat.end()))
            .map(move |mat| &text[mat.start()..mat.end()])
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Item> {
        self.index.get(id).map(|&position| &self.items[position])
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    #[must_use]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn is_bounded(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(is_identifier_char) && !after.is_some_and(is_identifier_char)
}

/// プロファイル一覧。
#[derive(Debug, Clone, Default)]
pub struct ProfileStore {
    profiles: Vec<Profile>,
}

impl ProfileStore {
    /// # Errors
    /// 同じIDのプロファイルが複数ある場合は [`DataIntegrityError::DuplicateProfile`] を返す。
    pub fn new(profiles: Vec<Profile>) -> Result<Self, DataIntegrityError> {
        let mut seen = FxHashMap::default();
        for profile in &profiles {
            if seen.insert(profile.id.as_str(), ()).is_some() {
                return Err(DataIntegrityError::DuplicateProfile(profile.id.clone()));
            }
        }
        Ok(Self { profiles })
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Profile> {
        self.profiles.iter().find(|profile| profile.id == id)
    }

    #[must_use]
    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
