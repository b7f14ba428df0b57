//! プロンプトテンプレートの組み立て・描画・改訂。
//!
//! テンプレートは `{stories}` `{profile}` `{k}` のプレースホルダを含み、
//! 推薦時にカタログとプロファイルで置換される。

use std::fmt::Write as _;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::{
    evaluation::Feedback,
    store::{Catalog, Profile},
};

pub const STORIES_PLACEHOLDER: &str = "{stories}";
pub const PROFILE_PLACEHOLDER: &str = "{profile}";
pub const K_PLACEHOLDER: &str = "{k}";

/// 改訂時に毎回差し替える提案行の接頭辞。
pub const SUGGESTION_PREFIX: &str = "Focus for this round: ";

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{(?:stories|profile|k)\}").expect("compile placeholder regex")
});

/// 初期プロンプトを構成する固定パーツ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptComponents {
    pub context: String,
    pub instruction: String,
    pub emphasis: String,
    pub format: String,
}

impl Default for PromptComponents {
    fn default() -> Self {
        Self {
            context: "You are a personalized story recommendation engine.".to_string(),
            instruction: "Recommend stories that match the user's preferences and interests."
                .to_string(),
            emphasis: "Pay special attention to the user's favorite references and preferred tags."
                .to_string(),
            format: "Return only the story IDs in a comma-separated list, ordered by relevance \
                     (most relevant first)."
                .to_string(),
        }
    }
}

impl PromptComponents {
    /// パーツを並べた初期テンプレート。
    #[must_use]
    pub fn template(&self) -> String {
        format!(
            "{context}\n\n{instruction}\n{emphasis}\n\nStories:\n{STORIES_PLACEHOLDER}\n\n\
             User Profile:\n{PROFILE_PLACEHOLDER}\n\n\
             Please recommend {K_PLACEHOLDER} stories that would be most relevant to this user.\n\
             {format}",
            context = self.context,
            instruction = self.instruction,
            emphasis = self.emphasis,
            format = self.format,
        )
    }
}

/// テンプレートにカタログとプロファイルを埋め込む。
///
/// 置換はテンプレートに対する1回の走査で行い、埋め込んだ本文中の `{...}` はそのまま残る。
#[must_use]
pub fn render(template: &str, profile: &Profile, catalog: &Catalog, k: usize) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| match &caps[0] {
            STORIES_PLACEHOLDER => describe_catalog(catalog),
            PROFILE_PLACEHOLDER => describe_profile(profile),
            _ => k.to_string(),
        })
        .into_owned()
}

fn describe_catalog(catalog: &Catalog) -> String {
    let mut out = String::new();
    for item in catalog.items() {
        let tags: Vec<&str> = item.tags.iter().map(String::as_str).collect();
        let _ = writeln!(out, "ID: {}", item.id);
        let _ = writeln!(out, "Title: {}", item.title);
        if let Some(intro) = item
            .intro
            .as_deref()
            .map(str::trim)
            .filter(|intro| !intro.is_empty())
        {
            let _ = writeln!(out, "Intro: {intro}");
        }
        let _ = writeln!(out, "Tags: {}", tags.join(", "));
        if !item.attributes.is_empty() {
            let attributes: Vec<&str> = item.attributes.iter().map(String::as_str).collect();
            let _ = writeln!(out, "Attributes: {}", attributes.join(", "));
        }
        if !item.references.is_empty() {
            let _ = writeln!(out, "References: {}", item.references.join(", "));
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

fn describe_profile(profile: &Profile) -> String {
    let tags: Vec<&str> = profile.preferred_tags.keys().map(String::as_str).collect();
    let mut out = String::new();
    let _ = writeln!(out, "User Preferences: {}", profile.preferences);
    let _ = writeln!(out, "Interests: {}", profile.interests.join(", "));
    let _ = writeln!(
        out,
        "Favorite References: {}",
        profile.favorite_references.join(", ")
    );
    let _ = write!(out, "Preferred Tags: {}", tags.join(", "));
    if !profile.exclusions.is_empty() {
        let excluded: Vec<&str> = profile.exclusions.iter().map(String::as_str).collect();
        let _ = write!(out, "\nAvoid Tags: {}", excluded.join(", "));
    }
    out
}

/// フィードバックに応じた指示文をテンプレート末尾に追加する。
///
/// 既に含まれている指示文は追加しない。ギャップがある場合は提案文を
/// [`SUGGESTION_PREFIX`] 付きの1行として末尾に置き、前回の提案行は取り除く。
/// 同じフィードバックで2回改訂しても結果は変わらない。
#[must_use]
pub fn revise(template: &str, feedback: &Feedback) -> String {
    let suggestion = feedback.suggestion.trim();
    let replace_suggestion = feedback.has_gaps() && !suggestion.is_empty();

    let mut revised = if replace_suggestion {
        template
            .lines()
            .filter(|line| !line.starts_with(SUGGESTION_PREFIX))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        template.to_string()
    };
    let clauses = feedback
        .under_covered_tags
        .iter()
        .map(|tag| tag_clause(tag))
        .chain(
            feedback
                .missing_references
                .iter()
                .map(|reference| reference_clause(reference)),
        );
    for clause in clauses {
        if !revised.contains(&clause) {
            revised.push('\n');
            revised.push_str(&clause);
        }
    }
    if replace_suggestion {
        revised.push('\n');
        revised.push_str(SUGGESTION_PREFIX);
        revised.push_str(suggestion);
    }
    revised
}

fn tag_clause(tag: &str) -> String {
    format!("Make sure to include stories tagged \"{tag}\".")
}

fn reference_clause(reference: &str) -> String {
    format!("Make sure to include stories related to {reference}.")
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::*;
    use crate::store::Item;

    fn catalog() -> Catalog {
        Catalog::new(vec![Item {
            id: "217107".to_string(),
            title: "Naruto: Jiraiya's Favorite".to_string(),
            intro: None,
            tags: BTreeSet::from(["action".to_string(), "crossover".to_string()]),
            attributes: BTreeSet::new(),
            references: vec!["Naruto".to_string()],
        }])
        .expect("catalog")
    }

    fn profile() -> Profile {
        Profile {
            id: "reader".to_string(),
            preferences: "Action-packed crossovers".to_string(),
            preferred_tags: BTreeMap::from([("action".to_string(), 1.0)]),
            favorite_references: vec!["Naruto".to_string()],
            interests: vec!["martial arts".to_string()],
            exclusions: BTreeSet::new(),
        }
    }

    fn feedback(tags: &[&str], references: &[&str]) -> Feedback {
        Feedback {
            under_covered_tags: tags.iter().map(ToString::to_string).collect(),
            missing_references: references.iter().map(ToString::to_string).collect(),
            ..Feedback::default()
        }
    }

    #[test]
    fn render_fills_every_placeholder() {
        let template = PromptComponents::default().template();
        let rendered = render(&template, &profile(), &catalog(), 10);

        assert!(!rendered.contains(STORIES_PLACEHOLDER));
        assert!(!rendered.contains(PROFILE_PLACEHOLDER));
        assert!(!rendered.contains(K_PLACEHOLDER));
        assert!(rendered.contains("ID: 217107"));
        assert!(rendered.contains("Favorite References: Naruto"));
        assert!(rendered.contains("recommend 10 stories"));
    }

    #[test]
    fn render_shows_intro_and_attributes_when_present() {
        let catalog = Catalog::new(vec![
            Item {
                id: "301004".to_string(),
                title: "Quiet Harbor".to_string(),
                intro: Some("  A lighthouse keeper adopts a stray dragon.  ".to_string()),
                tags: BTreeSet::from(["slice of life".to_string()]),
                attributes: BTreeSet::from(["complete".to_string(), "long".to_string()]),
                references: vec![],
            },
            Item {
                id: "301005".to_string(),
                title: "Blank Intro".to_string(),
                intro: Some("   ".to_string()),
                tags: BTreeSet::new(),
                attributes: BTreeSet::new(),
                references: vec![],
            },
        ])
        .expect("catalog");

        let rendered = render(STORIES_PLACEHOLDER, &profile(), &catalog, 10);

        assert_eq!(
            rendered,
            "ID: 301004\nTitle: Quiet Harbor\n\
             Intro: A lighthouse keeper adopts a stray dragon.\n\
             Tags: slice of life\nAttributes: complete, long\n\n\
             ID: 301005\nTitle: Blank Intro\nTags:"
        );
    }

    #[test]
    fn render_leaves_braces_inside_catalog_text_alone() {
        let catalog = Catalog::new(vec![Item {
            id: "301006".to_string(),
            title: "The {profile} of {k} Kings".to_string(),
            intro: None,
            tags: BTreeSet::from(["{stories}".to_string()]),
            attributes: BTreeSet::new(),
            references: vec![],
        }])
        .expect("catalog");

        let rendered = render("{stories}\n--\n{k}", &profile(), &catalog, 3);

        assert_eq!(
            rendered,
            "ID: 301006\nTitle: The {profile} of {k} Kings\nTags: {stories}\n--\n3"
        );
    }

    #[test]
    fn revise_appends_clauses_in_order() {
        let revised = revise("base", &feedback(&["isekai", "action"], &["One Piece"]));

        assert_eq!(
            revised,
            "base\nMake sure to include stories tagged \"action\".\n\
             Make sure to include stories tagged \"isekai\".\n\
             Make sure to include stories related to One Piece."
        );
    }

    #[test]
    fn revise_is_idempotent() {
        let feedback = feedback(&["isekai"], &["Naruto"]);
        let once = revise("base", &feedback);
        let twice = revise(&once, &feedback);
        assert_eq!(once, twice);
    }

    #[test]
    fn revise_replaces_the_previous_suggestion_line() {
        let first = Feedback {
            suggestion: "Prioritize stories tagged \"isekai\" (3 of the reference picks)."
                .to_string(),
            ..feedback(&["isekai"], &[])
        };
        let second = Feedback {
            suggestion: "Prioritize stories tagged \"action\" (2 of the reference picks)."
                .to_string(),
            ..feedback(&["action"], &[])
        };

        let once = revise("base", &first);
        assert_eq!(revise(&once, &first), once);

        let revised = revise(&once, &second);
        assert_eq!(
            revised,
            "base\nMake sure to include stories tagged \"isekai\".\n\
             Make sure to include stories tagged \"action\".\n\
             Focus for this round: Prioritize stories tagged \"action\" (2 of the reference picks)."
        );
        assert_eq!(revised.matches(SUGGESTION_PREFIX).count(), 1);
    }

    #[test]
    fn revise_without_gaps_keeps_template() {
        assert_eq!(revise("base", &Feedback::default()), "base");
    }
}
