use std::{env, num::NonZeroUsize, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::{
    clients::generation::GenerationSettings, pipeline::optimizer::OptimizerSettings,
    scoring::ScoringWeights,
};

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    dataset_path: Option<PathBuf>,
    history_dir: Option<PathBuf>,
    top_k: NonZeroUsize,
    f1_target: f64,
    plateau_window: NonZeroUsize,
    time_budget: Duration,
    iteration_limit: NonZeroUsize,
    improvement_epsilon: f64,
    multi_tag_bonus: f32,
    reference_bonus: f32,
    partial_reference_discount: f32,
    interest_bonus: f32,
    llm_base_url: Option<String>,
    llm_api_key: Option<String>,
    llm_model: String,
    llm_temperature: f64,
    llm_max_tokens: u32,
    llm_call_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            source: anyhow::anyhow!(message.into()),
        }
    }
}

impl Config {
    /// 環境変数からチューナーの設定値を読み込み、検証する。
    ///
    /// 生成APIのベースURLが未設定の場合は生成を無効化し、常にスコアリングのフォールバックを使う。
    ///
    /// # Errors
    /// 数値のパースに失敗した場合や、値が許容範囲外の場合は [`ConfigError`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let dataset_path = env::var("TUNER_DATASET_PATH").ok().map(PathBuf::from);
        let history_dir = env::var("TUNER_HISTORY_DIR").ok().map(PathBuf::from);

        // Optimization loop settings
        let top_k = parse_non_zero_usize("TUNER_TOP_K", 10)?;
        let f1_target = parse_unit_interval("TUNER_F1_TARGET", 0.95)?;
        if f1_target <= 0.0 {
            return Err(ConfigError::invalid(
                "TUNER_F1_TARGET",
                "target must be greater than zero",
            ));
        }
        let plateau_window = parse_non_zero_usize("TUNER_PLATEAU_WINDOW", 3)?;
        let time_budget = parse_duration_secs("TUNER_TIME_BUDGET_SECS", 300)?;
        let iteration_limit = parse_non_zero_usize("TUNER_ITERATION_LIMIT", 10)?;
        let improvement_epsilon = parse_non_negative_f64("TUNER_IMPROVEMENT_EPSILON", 1e-6)?;

        // Scoring constants
        let multi_tag_bonus = parse_non_negative_f64("TUNER_MULTI_TAG_BONUS", 0.2)? as f32;
        let reference_bonus = parse_non_negative_f64("TUNER_REFERENCE_BONUS", 2.0)? as f32;
        let partial_reference_discount =
            parse_unit_interval("TUNER_PARTIAL_REFERENCE_DISCOUNT", 0.5)? as f32;
        let interest_bonus = parse_non_negative_f64("TUNER_INTEREST_BONUS", 1.5)? as f32;

        // Generation API settings
        let llm_base_url = env::var("LLM_BASE_URL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let llm_api_key = env::var("LLM_API_KEY").ok();
        let llm_model = env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-3.5-turbo".to_string());
        if llm_base_url.is_some() && llm_model.trim().is_empty() {
            return Err(ConfigError::Missing("LLM_MODEL"));
        }
        let llm_temperature = parse_non_negative_f64("LLM_TEMPERATURE", 0.7)?;
        let llm_max_tokens = parse_u32("LLM_MAX_TOKENS", 150)?;
        let llm_call_timeout = parse_duration_ms("LLM_CALL_TIMEOUT_MS", 30_000)?;
        if llm_call_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "LLM_CALL_TIMEOUT_MS",
                "timeout must be greater than zero",
            ));
        }

        Ok(Self {
            dataset_path,
            history_dir,
            top_k,
            f1_target,
            plateau_window,
            time_budget,
            iteration_limit,
            improvement_epsilon,
            multi_tag_bonus,
            reference_bonus,
            partial_reference_discount,
            interest_bonus,
            llm_base_url,
            llm_api_key,
            llm_model,
            llm_temperature,
            llm_max_tokens,
            llm_call_timeout,
        })
    }

    #[must_use]
    pub fn dataset_path(&self) -> Option<&PathBuf> {
        self.dataset_path.as_ref()
    }

    #[must_use]
    pub fn history_dir(&self) -> Option<&PathBuf> {
        self.history_dir.as_ref()
    }

    #[must_use]
    pub fn top_k(&self) -> NonZeroUsize {
        self.top_k
    }

    #[must_use]
    pub fn f1_target(&self) -> f64 {
        self.f1_target
    }

    #[must_use]
    pub fn plateau_window(&self) -> NonZeroUsize {
        self.plateau_window
    }

    #[must_use]
    pub fn time_budget(&self) -> Duration {
        self.time_budget
    }

    #[must_use]
    pub fn iteration_limit(&self) -> NonZeroUsize {
        self.iteration_limit
    }

    #[must_use]
    pub fn improvement_epsilon(&self) -> f64 {
        self.improvement_epsilon
    }

    #[must_use]
    pub fn llm_base_url(&self) -> Option<&str> {
        self.llm_base_url.as_deref()
    }

    #[must_use]
    pub fn llm_model(&self) -> &str {
        &self.llm_model
    }

    #[must_use]
    pub fn llm_call_timeout(&self) -> Duration {
        self.llm_call_timeout
    }

    /// 最適化ループの設定。
    #[must_use]
    pub fn optimizer_settings(&self) -> OptimizerSettings {
        OptimizerSettings {
            top_k: self.top_k.get(),
            f1_target: self.f1_target,
            plateau_window: self.plateau_window.get(),
            time_budget: self.time_budget,
            iteration_limit: self.iteration_limit.get(),
            improvement_epsilon: self.improvement_epsilon,
            call_timeout: self.llm_call_timeout,
        }
    }

    #[must_use]
    pub fn scoring_weights(&self) -> ScoringWeights {
        ScoringWeights {
            multi_tag_bonus: self.multi_tag_bonus,
            reference_bonus: self.reference_bonus,
            partial_reference_discount: self.partial_reference_discount,
            interest_bonus: self.interest_bonus,
        }
    }

    /// 生成APIの設定。ベースURLが無い場合は `None`（生成無効）。
    #[must_use]
    pub fn generation_settings(&self) -> Option<GenerationSettings> {
        self.llm_base_url.as_ref().map(|base_url| GenerationSettings {
            base_url: base_url.clone(),
            api_key: self.llm_api_key.clone(),
            model: self.llm_model.clone(),
            temperature: self.llm_temperature,
            max_tokens: self.llm_max_tokens,
            timeout: self.llm_call_timeout,
        })
    }
}

fn parse_non_zero_usize(name: &'static str, default: usize) -> Result<NonZeroUsize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let parsed = raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })?;
    NonZeroUsize::new(parsed).ok_or_else(|| ConfigError::invalid(name, "must be greater than zero"))
}

fn parse_duration_secs(name: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    let value = parse_u64(name, default_secs)?;
    Ok(Duration::from_secs(value))
}

fn parse_duration_ms(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    let value = parse_u64(name, default_ms)?;
    Ok(Duration::from_millis(value))
}

fn parse_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u32>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_f64(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let parsed = raw.parse::<f64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })?;
    if parsed.is_finite() {
        Ok(parsed)
    } else {
        Err(ConfigError::invalid(name, format!("value must be finite: {raw}")))
    }
}

fn parse_non_negative_f64(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    let parsed = parse_f64(name, default)?;
    if parsed < 0.0 {
        return Err(ConfigError::invalid(
            name,
            format!("value must not be negative: {parsed}"),
        ));
    }
    Ok(parsed)
}

fn parse_unit_interval(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    let parsed = parse_f64(name, default)?;
    if !(0.0..=1.0).contains(&parsed) {
        return Err(ConfigError::invalid(
            name,
            format!("value must be between 0 and 1: {parsed}"),
        ));
    }
    Ok(parsed)
}
