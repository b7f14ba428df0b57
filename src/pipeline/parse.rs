//! 生成モデルの自由形式応答からアイテムIDを取り出す。

use once_cell::sync::Lazy;
use regex::Regex;

use crate::store::{Catalog, RankedList};

static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:\d+[.)]|[-*•])\s+").expect("compile list marker regex"));

/// 応答から有効なリストを作れなかった理由。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailure {
    /// 英数字が1つもない。
    Unparseable,
    /// 文字はあるがカタログに存在するIDが見つからない。
    NoValidIdentifiers,
}

/// 応答を行ごとに走査し、カタログIDを出現順に最大 `k` 件取り出す。
///
/// 行頭のリスト番号・箇条書き記号は読み飛ばす。`:` で終わる複数語の見出し行は無視し、
/// `前置き: ...` の形の行は後半にIDがあれば後半だけを使う。
///
/// # Errors
/// 英数字が無い場合は [`ParseFailure::Unparseable`]、有効なIDが無い場合は
/// [`ParseFailure::NoValidIdentifiers`]。
pub fn extract_identifiers(
    text: &str,
    catalog: &Catalog,
    k: usize,
) -> Result<RankedList, ParseFailure> {
    if !text.chars().any(char::is_alphanumeric) {
        return Err(ParseFailure::Unparseable);
    }

    let ids = text
        .lines()
        .flat_map(|line| catalog.find_identifiers(listed_part(line, catalog)));
    let list = RankedList::from_ids(ids, k);
    if list.is_empty() {
        Err(ParseFailure::NoValidIdentifiers)
    } else {
        Ok(list)
    }
}

/// 1行のうちIDを探す範囲。
fn listed_part<'a>(line: &'a str, catalog: &Catalog) -> &'a str {
    let line = LIST_MARKER
        .find(line)
        .map_or(line, |marker| &line[marker.end()..]);
    let trimmed = line.trim_end();
    let is_heading = trimmed
        .strip_suffix(':')
        .is_some_and(|heading| heading.trim().contains(char::is_whitespace));
    if is_heading {
        return "";
    }
    match trimmed.split_once(": ") {
        Some((_, rest)) if catalog.find_identifiers(rest).next().is_some() => rest,
        _ => line,
    }
}
