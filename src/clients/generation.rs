//! 生成モデル呼び出しの境界。
//!
//! 推薦器はこのトレイト越しにのみ外部APIへアクセスする。リトライは行わない。

mod client;
mod models;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use client::ChatCompletionClient;
pub use models::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};

/// 生成呼び出しの失敗。
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation is disabled")]
    Disabled,
    #[error("generation request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("generation endpoint returned error status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("generation call timed out after {0:?}")]
    Timeout(Duration),
    #[error("generation response contained no text")]
    EmptyResponse,
}

impl GenerationError {
    /// タイムアウト由来かどうか。
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Request(error) => error.is_timeout(),
            _ => false,
        }
    }
}

/// 生成APIの接続設定。
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout: Duration,
}

/// プロンプトを受け取り自由形式のテキストを返す生成器。
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// ログ用の名前。
    fn name(&self) -> &str;

    /// 外部への生成呼び出しを行うかどうか。
    fn is_enabled(&self) -> bool {
        true
    }
}

/// 生成を無効化した場合の実装。常に失敗し、推薦器はフォールバックへ移る。
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Err(GenerationError::Disabled)
    }

    fn name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
