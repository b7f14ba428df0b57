//! 生成モデルによる推薦と、スコアリングによるフォールバック。

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::{
    clients::generation::{GenerationError, TextGenerator},
    scoring::Scorer,
    store::{Profile, RankedList},
};

use super::{
    parse::{ParseFailure, extract_identifiers},
    prompt::render,
};

/// フォールバックに切り替えた理由。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackCause {
    CallFailed,
    Timeout,
    Unparseable,
    NoValidIdentifiers,
}

impl FallbackCause {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CallFailed => "call_failed",
            Self::Timeout => "timeout",
            Self::Unparseable => "unparseable",
            Self::NoValidIdentifiers => "no_valid_identifiers",
        }
    }
}

impl From<ParseFailure> for FallbackCause {
    fn from(failure: ParseFailure) -> Self {
        match failure {
            ParseFailure::Unparseable => Self::Unparseable,
            ParseFailure::NoValidIdentifiers => Self::NoValidIdentifiers,
        }
    }
}

impl From<&GenerationError> for FallbackCause {
    fn from(error: &GenerationError) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::CallFailed
        }
    }
}

/// 推薦結果とその出所。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Recommendation {
    ModelGenerated { list: RankedList },
    ScoredFallback { list: RankedList, cause: FallbackCause },
}

impl Recommendation {
    #[must_use]
    pub fn list(&self) -> &RankedList {
        match self {
            Self::ModelGenerated { list } | Self::ScoredFallback { list, .. } => list,
        }
    }

    #[must_use]
    pub fn fallback_cause(&self) -> Option<FallbackCause> {
        match self {
            Self::ModelGenerated { .. } => None,
            Self::ScoredFallback { cause, .. } => Some(*cause),
        }
    }

    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.fallback_cause().is_some()
    }
}

/// プロファイルとプロンプトテンプレートから上位K件の推薦を返す。
///
/// 生成呼び出しは1回のみで、失敗時はリトライせずスコア順にフォールバックする。
pub struct Recommender {
    generator: Arc<dyn TextGenerator>,
    scorer: Arc<Scorer>,
    top_k: usize,
    call_timeout: Duration,
}

impl std::fmt::Debug for Recommender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recommender")
            .field("generator", &self.generator.name())
            .field("top_k", &self.top_k)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl Recommender {
    #[must_use]
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        scorer: Arc<Scorer>,
        top_k: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            generator,
            scorer,
            top_k,
            call_timeout,
        }
    }

    /// 生成器が実際に外部呼び出しを行うかどうか。
    #[must_use]
    pub fn generator_enabled(&self) -> bool {
        self.generator.is_enabled()
    }

    pub async fn recommend(&self, profile: &Profile, template: &str) -> Recommendation {
        let prompt = render(template, profile, self.scorer.catalog(), self.top_k);

        let text = match timeout(self.call_timeout, self.generator.generate(&prompt)).await {
            Ok(Ok(text)) => text,
            Ok(Err(error)) => {
                let cause = FallbackCause::from(&error);
                warn!(
                    profile_id = %profile.id,
                    generator = self.generator.name(),
                    cause = cause.as_str(),
                    error = %error,
                    "generation failed; using scored fallback"
                );
                return self.fallback(profile, cause);
            }
            Err(_) => {
                warn!(
                    profile_id = %profile.id,
                    generator = self.generator.name(),
                    timeout_ms = u64::try_from(self.call_timeout.as_millis()).unwrap_or(u64::MAX),
                    "generation timed out; using scored fallback"
                );
                return self.fallback(profile, FallbackCause::Timeout);
            }
        };

        match extract_identifiers(&text, self.scorer.catalog(), self.top_k) {
            Ok(list) => {
                debug!(
                    profile_id = %profile.id,
                    recommended = list.len(),
                    "model recommendation accepted"
                );
                Recommendation::ModelGenerated { list }
            }
            Err(failure) => {
                let cause = FallbackCause::from(failure);
                warn!(
                    profile_id = %profile.id,
                    cause = cause.as_str(),
                    response_chars = text.chars().count(),
                    "model response had no usable identifiers; using scored fallback"
                );
                self.fallback(profile, cause)
            }
        }
    }

    /// カタログ全件をスコア順に並べた上位K件。
    #[must_use]
    pub fn fallback(&self, profile: &Profile, cause: FallbackCause) -> Recommendation {
        Recommendation::ScoredFallback {
            list: self.scorer.rank(profile, self.top_k),
            cause,
        }
    }
}
