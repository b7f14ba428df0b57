/// テキスト比較ユーティリティ。
///
/// タグ・参照作品名の比較はすべて正規化後の文字列で行う。
use rustc_hash::FxHashSet;

/// エラーメッセージの最大長
pub const MAX_ERROR_MESSAGE_LENGTH: usize = 500;

/// キーワードとして扱う最小文字数
pub const MIN_KEYWORD_CHARS: usize = 4;

/// Normalize a string value for comparison.
#[must_use]
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// 正規化済み文字列からキーワード集合を抽出する。
///
/// 英数字以外で分割し、短すぎる語（"the" や "of" など）は捨てる。
#[must_use]
pub fn keywords(normalized: &str) -> FxHashSet<&str> {
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= MIN_KEYWORD_CHARS)
        .collect()
}

/// エラーメッセージを要約して切り詰める。
#[must_use]
pub fn truncate_error_message(msg: &str) -> String {
    let char_count = msg.chars().count();
    if char_count <= MAX_ERROR_MESSAGE_LENGTH {
        return msg.to_string();
    }
    let truncated: String = msg.chars().take(MAX_ERROR_MESSAGE_LENGTH).collect();
    format!("{truncated}... (truncated, {char_count} chars)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize("  My Hero Academia "), "my hero academia");
    }

    #[test]
    fn keywords_skip_short_words() {
        let words = keywords("my hero academia");
        assert!(words.contains("hero"));
        assert!(words.contains("academia"));
        assert!(!words.contains("my"));
    }

    #[test]
    fn truncate_keeps_short_messages() {
        assert_eq!(truncate_error_message("boom"), "boom");
    }

    #[test]
    fn truncate_marks_long_messages() {
        let message = truncate_error_message(&"x".repeat(2_000));
        assert!(message.contains("truncated, 2000 chars"));
        assert!(message.len() < 600);
    }
}
