use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;

use crate::quiz::accessor::DEFAULT_WAIT;
use crate::quiz::model::{
    ChatGptClient, GeminiClient, ModelClient, ModelError, DEFAULT_CHATGPT_MODEL,
    DEFAULT_GEMINI_MODEL,
};
use crate::quiz::session::QUIZ_LENGTH;
use crate::quiz::{CACHE_MIN, CACHE_SIZE};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{key} must be a positive integer, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("unknown QUIZ_PROVIDER {0:?} (expected \"gemini\" or \"chatgpt\")")]
    UnknownProvider(String),

    #[error("QUIZ_CACHE_MIN ({min}) can't exceed QUIZ_CACHE_SIZE ({size})")]
    Watermark { min: usize, size: usize },

    #[error("failed to build model client: {0}")]
    Model(#[from] ModelError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    ChatGpt,
}

impl Provider {
    fn api_key_var(self) -> &'static str {
        match self {
            Provider::Gemini => "GENAI_API_KEY",
            Provider::ChatGpt => "CHATGPT_API_KEY",
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            Provider::Gemini => DEFAULT_GEMINI_MODEL,
            Provider::ChatGpt => DEFAULT_CHATGPT_MODEL,
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub bot_token: String,
    pub provider: Provider,
    pub api_key: String,
    pub model: String,
    pub db_path: String,
    pub cache_size: usize,
    pub cache_min: usize,
    pub wait: Duration,
    pub quiz_length: u32,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("db_path", &self.db_path)
            .field("cache_size", &self.cache_size)
            .field("cache_min", &self.cache_min)
            .field("wait", &self.wait)
            .field("quiz_length", &self.quiz_length)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Read the configuration from the process environment. Call
    /// `dotenv()` first if a `.env` file should be honoured.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bot_token = get("TELOXIDE_TOKEN").ok_or(ConfigError::Missing("TELOXIDE_TOKEN"))?;

        let provider = match get("QUIZ_PROVIDER").as_deref().map(str::trim) {
            None | Some("gemini") => Provider::Gemini,
            Some("chatgpt") => Provider::ChatGpt,
            Some(other) => return Err(ConfigError::UnknownProvider(other.to_string())),
        };

        let key_var = provider.api_key_var();
        let api_key = get(key_var).ok_or(ConfigError::Missing(key_var))?;
        let model = get("QUIZ_MODEL").unwrap_or_else(|| provider.default_model().to_string());
        let db_path = get("QUIZ_DB_PATH").unwrap_or_else(|| "db.sqlite".to_string());

        let cache_size = positive("QUIZ_CACHE_SIZE", get("QUIZ_CACHE_SIZE"), CACHE_SIZE)?;
        let cache_min = positive("QUIZ_CACHE_MIN", get("QUIZ_CACHE_MIN"), CACHE_MIN)?;
        if cache_min > cache_size {
            return Err(ConfigError::Watermark {
                min: cache_min,
                size: cache_size,
            });
        }
        let wait = Duration::from_secs(positive(
            "QUIZ_WAIT_SECS",
            get("QUIZ_WAIT_SECS"),
            DEFAULT_WAIT.as_secs(),
        )?);
        let quiz_length = positive("QUIZ_LENGTH", get("QUIZ_LENGTH"), QUIZ_LENGTH)?;

        Ok(Self {
            bot_token,
            provider,
            api_key,
            model,
            db_path,
            cache_size,
            cache_min,
            wait,
            quiz_length,
        })
    }

    pub fn log_summary(&self) {
        info!(
            "Provider {:?}, model {}, cache {}/{} (watermark/capacity), wait {:?}, {} questions per quiz",
            self.provider, self.model, self.cache_min, self.cache_size, self.wait, self.quiz_length
        );
    }

    pub fn model_client(&self) -> Result<Arc<dyn ModelClient>, ConfigError> {
        let client: Arc<dyn ModelClient> = match self.provider {
            Provider::Gemini => Arc::new(GeminiClient::new(self.api_key.clone(), self.model.clone())?),
            Provider::ChatGpt => Arc::new(ChatGptClient::new(self.api_key.clone(), &self.model)?),
        };
        Ok(client)
    }
}

/// Parse a non-zero `T`. Values that overflow `T` are rejected, not truncated.
fn positive<T>(key: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialEq,
{
    let Some(value) = value else {
        return Ok(default);
    };
    match value.trim().parse::<T>() {
        Ok(n) if n != T::default() => Ok(n),
        _ => Err(ConfigError::InvalidNumber { key, value }),
    }
}

/// What happened when looking for a `.env` file.
#[derive(Debug)]
pub enum EnvFile {
    Loaded(PathBuf),
    Missing,
    Invalid(dotenv::Error),
}

impl EnvFile {
    /// Load `.env` into the process environment. Run this before the logger
    /// is initialised so a `RUST_LOG` from the file takes effect.
    pub fn load() -> Self {
        Self::from_result(dotenv::dotenv())
    }

    pub fn from_result(result: Result<PathBuf, dotenv::Error>) -> Self {
        match result {
            Ok(path) => EnvFile::Loaded(path),
            Err(dotenv::Error::Io(_)) => EnvFile::Missing,
            Err(e) => EnvFile::Invalid(e),
        }
    }

    pub fn log(&self) {
        match self {
            EnvFile::Loaded(path) => debug!("Loaded environment from {}", path.display()),
            EnvFile::Missing => debug!("No .env file found, using the process environment"),
            EnvFile::Invalid(e) => warn!("Ignoring unreadable .env file: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_to_gemini() {
        let config =
            Config::from_lookup(lookup(&[("TELOXIDE_TOKEN", "t"), ("GENAI_API_KEY", "k")])).unwrap();
        assert_eq!(config.provider, Provider::Gemini);
        assert_eq!(config.model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.cache_size, 200);
        assert_eq!(config.cache_min, 100);
        assert_eq!(config.wait, DEFAULT_WAIT);
        assert_eq!(config.quiz_length, 10);
        assert_eq!(config.db_path, "db.sqlite");
    }

    #[test]
    fn bot_token_is_required() {
        let err = Config::from_lookup(lookup(&[("GENAI_API_KEY", "k")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("TELOXIDE_TOKEN")));
    }

    #[test]
    fn api_key_follows_provider() {
        let err = Config::from_lookup(lookup(&[
            ("TELOXIDE_TOKEN", "t"),
            ("QUIZ_PROVIDER", "chatgpt"),
            ("GENAI_API_KEY", "k"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("CHATGPT_API_KEY")));

        let config = Config::from_lookup(lookup(&[
            ("TELOXIDE_TOKEN", "t"),
            ("QUIZ_PROVIDER", "chatgpt"),
            ("CHATGPT_API_KEY", "k"),
        ]))
        .unwrap();
        assert_eq!(config.model, DEFAULT_CHATGPT_MODEL);
    }

    #[test]
    fn rejects_bad_numbers_and_watermark() {
        let err = Config::from_lookup(lookup(&[
            ("TELOXIDE_TOKEN", "t"),
            ("GENAI_API_KEY", "k"),
            ("QUIZ_CACHE_SIZE", "lots"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { key: "QUIZ_CACHE_SIZE", .. }));

        let err = Config::from_lookup(lookup(&[
            ("TELOXIDE_TOKEN", "t"),
            ("GENAI_API_KEY", "k"),
            ("QUIZ_CACHE_SIZE", "10"),
            ("QUIZ_CACHE_MIN", "20"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Watermark { min: 20, size: 10 }));
    }

    #[test]
    fn oversized_numbers_are_rejected_not_truncated() {
        let err = Config::from_lookup(lookup(&[
            ("TELOXIDE_TOKEN", "t"),
            ("GENAI_API_KEY", "k"),
            ("QUIZ_LENGTH", "4294967296"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { key: "QUIZ_LENGTH", .. }));

        let err = Config::from_lookup(lookup(&[
            ("TELOXIDE_TOKEN", "t"),
            ("GENAI_API_KEY", "k"),
            ("QUIZ_CACHE_SIZE", "184467440737095516160"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { key: "QUIZ_CACHE_SIZE", .. }));

        let config = Config::from_lookup(lookup(&[
            ("TELOXIDE_TOKEN", "t"),
            ("GENAI_API_KEY", "k"),
            ("QUIZ_LENGTH", "4294967295"),
        ]))
        .unwrap();
        assert_eq!(config.quiz_length, u32::MAX);
    }

    #[test]
    fn zero_is_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("TELOXIDE_TOKEN", "t"),
            ("GENAI_API_KEY", "k"),
            ("QUIZ_WAIT_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { key: "QUIZ_WAIT_SECS", .. }));
    }

    #[test]
    fn env_file_outcomes() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "no .env");
        assert!(matches!(
            EnvFile::from_result(Err(dotenv::Error::Io(missing))),
            EnvFile::Missing
        ));

        let malformed = dotenv::Error::LineParse("RUST_LOG debug".to_string(), 8);
        assert!(matches!(
            EnvFile::from_result(Err(malformed)),
            EnvFile::Invalid(dotenv::Error::LineParse(..))
        ));

        assert!(matches!(
            EnvFile::from_result(Ok(PathBuf::from(".env"))),
            EnvFile::Loaded(path) if path == PathBuf::from(".env")
        ));
    }

    #[test]
    fn unknown_provider_is_an_error() {
        let err = Config::from_lookup(lookup(&[
            ("TELOXIDE_TOKEN", "t"),
            ("QUIZ_PROVIDER", "llama"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProvider(p) if p == "llama"));
    }

    #[test]
    fn debug_hides_secrets() {
        let config = Config::from_lookup(lookup(&[
            ("TELOXIDE_TOKEN", "bot-secret"),
            ("GENAI_API_KEY", "api-secret"),
        ]))
        .unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("bot-secret"));
        assert!(!printed.contains("api-secret"));
    }

    #[test]
    fn builds_a_client_for_each_provider() {
        let gemini =
            Config::from_lookup(lookup(&[("TELOXIDE_TOKEN", "t"), ("GENAI_API_KEY", "k")])).unwrap();
        assert_eq!(gemini.model_client().unwrap().quota_marker(), "RESOURCE_EXHAUSTED");

        let chatgpt = Config::from_lookup(lookup(&[
            ("TELOXIDE_TOKEN", "t"),
            ("QUIZ_PROVIDER", "chatgpt"),
            ("CHATGPT_API_KEY", "k"),
            ("QUIZ_MODEL", "davinci"),
        ]))
        .unwrap();
        assert!(matches!(
            chatgpt.model_client(),
            Err(ConfigError::Model(ModelError::UnsupportedModel(_)))
        ));
    }
}
