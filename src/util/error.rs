/// データ整合性エラー。
///
/// カタログ・プロファイル・正解リストが評価に使えない状態を表す。
/// プロファイル単位で致命的として扱い、リトライはしない。
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataIntegrityError {
    #[error("duplicate item identifier in catalog: {0}")]
    DuplicateItem(String),
    #[error("duplicate profile identifier: {0}")]
    DuplicateProfile(String),
    #[error("ground truth for profile {profile_id} is empty")]
    EmptyGroundTruth { profile_id: String },
    #[error("candidate references unknown item {item_id}")]
    UnknownItem { item_id: String },
    #[error("profile {profile_id} has invalid weight {weight} for tag {tag}")]
    InvalidTagWeight {
        profile_id: String,
        tag: String,
        weight: f32,
    },
    #[error("failed to build catalog identifier index: {0}")]
    IdentifierIndex(String),
}

impl DataIntegrityError {
    /// レポート用の短いラベル。
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::DuplicateItem(_) => "duplicate_item",
            Self::DuplicateProfile(_) => "duplicate_profile",
            Self::EmptyGroundTruth { .. } => "empty_ground_truth",
            Self::UnknownItem { .. } => "unknown_item",
            Self::InvalidTagWeight { .. } => "invalid_tag_weight",
            Self::IdentifierIndex(_) => "identifier_index",
        }
    }
}
