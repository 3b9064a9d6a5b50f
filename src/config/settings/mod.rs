
use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::value::{Dict, Value};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const ENV_FILE_NAME: &str = ".env";

/// Keys that may be overridden from the environment or the `.env` file
pub const ENV_KEYS: &[&str] = &[
    "knowledge_base_path",
    "persist_directory",
    "embedding_api_base",
    "embedding_model",
    "embedding_batch_size",
    "llm_api_base",
    "llm_api_key",
    "llm_model",
    "llm_temperature",
    "chunk_size",
    "chunk_overlap",
    "top_k",
    "score_threshold",
    "host",
    "port",
    "log_dir",
];

/// Keys read verbatim, so that values such as `2024` or `1234567890` stay text
const TEXT_KEYS: &[&str] = &[
    "knowledge_base_path",
    "persist_directory",
    "embedding_api_base",
    "embedding_model",
    "llm_api_base",
    "llm_api_key",
    "llm_model",
    "host",
    "log_dir",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory holding the documents to index
    pub knowledge_base_path: PathBuf,
    /// Directory of the persisted vector index
    pub persist_directory: PathBuf,
    pub embedding_api_base: String,
    pub embedding_model: String,
    pub embedding_batch_size: u32,
    /// OpenAI-compatible endpoint, e.g. https://api.openai.com/v1
    pub llm_api_base: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_temperature: f32,
    /// Chunk size in characters
    pub chunk_size: usize,
    /// Characters repeated between adjacent chunks
    pub chunk_overlap: usize,
    /// Number of chunks retrieved when a request does not override it
    pub top_k: usize,
    /// Minimum cosine similarity of retrieved chunks; `None` disables filtering
    pub score_threshold: Option<f32>,
    pub host: String,
    pub port: u16,
    pub log_dir: PathBuf,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            knowledge_base_path: PathBuf::from("knowledge_docs"),
            persist_directory: PathBuf::from("vector_db"),
            embedding_api_base: "http://localhost:11434".to_string(),
            embedding_model: "paraphrase-multilingual:latest".to_string(),
            embedding_batch_size: 16,
            llm_api_base: None,
            llm_api_key: None,
            llm_model: "gpt-4o-mini".to_string(),
            llm_temperature: 0.2,
            chunk_size: 500,
            chunk_overlap: 80,
            top_k: 8,
            score_threshold: None,
            host: "0.0.0.0".to_string(),
            port: 8000,
            log_dir: PathBuf::from("logs"),
            base_dir: PathBuf::from("."),
        }
    }
}

/// Connection settings for the answer-generating model
#[derive(Debug, Clone, PartialEq)]
pub struct LlmSettings {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid temperature: {0} (must be between 0 and 2)")]
    InvalidTemperature(f32),
    #[error("Invalid chunk size: {0} (must be between 100 and 2000)")]
    InvalidChunkSize(usize),
    #[error("Invalid chunk overlap: {0} (must be between 0 and 500)")]
    InvalidChunkOverlap(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid top_k: {0} (must be between 1 and 20)")]
    InvalidTopK(usize),
    #[error("Invalid score threshold: {0} (must be between 0 and 1)")]
    InvalidScoreThreshold(f32),
    #[error("Failed to read {ENV_FILE_NAME} file: {0}")]
    EnvFile(#[from] dotenvy::Error),
    #[error("Failed to serialize configuration: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Config {
    /// Load configuration from defaults, `config.toml`, `.env` and the environment, in
    /// increasing priority. Relative paths resolve against `base_dir`.
    #[inline]
    pub fn load<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        let figment = Self::figment(base_dir)
            .with_context(|| format!("Failed to read configuration in {}", base_dir.display()))?;
        Self::from_figment(&figment, base_dir)
    }

    /// Build the layered configuration sources for `base_dir`
    #[inline]
    pub fn figment(base_dir: &Path) -> Result<Figment, ConfigError> {
        let env_file = read_env_file(&base_dir.join(ENV_FILE_NAME))?;

        Ok(Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(base_dir.join(CONFIG_FILE_NAME)))
            .merge(Serialized::defaults(env_file))
            .merge(Env::raw().filter(|key| is_parsed_key(key.as_str())))
            .merge(Serialized::defaults(text_environment())))
    }

    #[inline]
    pub fn from_figment(figment: &Figment, base_dir: &Path) -> Result<Self> {
        let mut config: Config = figment
            .extract()
            .context("Failed to parse configuration")?;
        config.base_dir = base_dir.to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_embedding_config()?;
        self.validate_llm_config()?;
        self.validate_retrieval_config()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        Ok(())
    }

    fn validate_embedding_config(&self) -> Result<(), ConfigError> {
        self.embedding_url()?;

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if self.embedding_batch_size == 0 || self.embedding_batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.embedding_batch_size));
        }

        Ok(())
    }

    fn validate_llm_config(&self) -> Result<(), ConfigError> {
        if let Some(api_base) = non_blank(self.llm_api_base.as_deref()) {
            parse_http_url(api_base)?;
        }

        if self.llm_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.llm_model.clone()));
        }

        if !(0.0..=2.0).contains(&self.llm_temperature) {
            return Err(ConfigError::InvalidTemperature(self.llm_temperature));
        }

        Ok(())
    }

    fn validate_retrieval_config(&self) -> Result<(), ConfigError> {
        if !(100..=2000).contains(&self.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size));
        }

        if self.chunk_overlap > 500 {
            return Err(ConfigError::InvalidChunkOverlap(self.chunk_overlap));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                self.chunk_overlap,
                self.chunk_size,
            ));
        }

        if !(1..=20).contains(&self.top_k) {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }

        if let Some(threshold) = self.score_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::InvalidScoreThreshold(threshold));
            }
        }

        Ok(())
    }

    /// Base URL of the embedding server
    #[inline]
    pub fn embedding_url(&self) -> Result<Url, ConfigError> {
        parse_http_url(&self.embedding_api_base)
    }

    /// Settings for the generating model, present only when both endpoint and key are set
    #[inline]
    pub fn llm_settings(&self) -> Option<LlmSettings> {
        let api_base = non_blank(self.llm_api_base.as_deref())?;
        let api_key = non_blank(self.llm_api_key.as_deref())?;

        Some(LlmSettings {
            api_base: api_base.to_string(),
            api_key: api_key.to_string(),
            model: self.llm_model.clone(),
            temperature: self.llm_temperature,
        })
    }

    /// Directory holding the source documents, created if missing
    #[inline]
    pub fn knowledge_path(&self) -> Result<PathBuf, ConfigError> {
        let path = self.resolve(&self.knowledge_base_path);
        fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Get the path for the vector database directory
    #[inline]
    pub fn index_path(&self) -> PathBuf {
        self.resolve(&self.persist_directory)
    }

    #[inline]
    pub fn log_path(&self) -> PathBuf {
        self.resolve(&self.log_dir)
    }

    /// Directory of an optional custom front end
    #[inline]
    pub fn static_path(&self) -> PathBuf {
        self.base_dir.join("static")
    }

    #[inline]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

fn parse_http_url(value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|_| ConfigError::InvalidUrl(value.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(value.to_string()));
    }
    Ok(url)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Read the known keys of a dotenv file without touching the process environment
fn read_env_file(path: &Path) -> Result<Dict, ConfigError> {
    if !path.is_file() {
        return Ok(Dict::new());
    }

    let pairs = dotenvy::from_path_iter(path)?.collect::<Result<Vec<_>, _>>()?;
    Ok(known_values(pairs))
}

fn is_parsed_key(key: &str) -> bool {
    let key = key.to_lowercase();
    ENV_KEYS.contains(&key.as_str()) && !TEXT_KEYS.contains(&key.as_str())
}

/// Text keys set in the process environment. Numeric keys go through figment's `Env`.
fn text_environment() -> Dict {
    known_values(std::env::vars_os().filter_map(|(key, value)| {
        let key = key.into_string().ok()?;
        TEXT_KEYS
            .contains(&key.to_lowercase().as_str())
            .then_some((key, value.into_string().ok()?))
    }))
}

/// Known keys among `pairs`, lower-cased, with text keys kept verbatim
fn known_values<I>(pairs: I) -> Dict
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut values = Dict::new();
    for (key, raw) in pairs {
        let key = key.to_lowercase();
        if !ENV_KEYS.contains(&key.as_str()) {
            continue;
        }
        let value = if TEXT_KEYS.contains(&key.as_str()) {
            Value::from(raw)
        } else {
            match raw.parse::<Value>() {
                Ok(value) => value,
                Err(never) => match never {},
            }
        };
        values.insert(key, value);
    }

    values
}
