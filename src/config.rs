use std::{fs, path::Path};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration: {0}")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("unknown collection: {0}")]
    UnknownCollection(String),
    #[error("unknown locality: {0}")]
    UnknownLocality(String),
    #[error("unable to read config {path}: {reason}")]
    Read { path: String, reason: String },
}

const DEFAULT_KUDAGO_ENDPOINT: &str = "https://kudago.com/public-api/v1.4/events/";
const DEFAULT_AFISHA_BASE: &str = "https://afisha.yandex.ru";
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";
const DEFAULT_ANALYSIS_ENDPOINT: &str = "https://openrouter.ai/api/v1";
const DEFAULT_ANALYSIS_MODEL: &str = "google/gemini-2.0-flash-exp:free";
const DEFAULT_TIMEZONE: &str = "Europe/Moscow";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub collections: Vec<CollectionConfig>,
    pub localities: Vec<LocalityConfig>,
    pub sources: SourcesConfig,
    pub analysis: AnalysisConfig,
    pub dedupe_across_sources: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub key: String,
    pub name: String,
    #[serde(default = "default_max_count")]
    pub max_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalityConfig {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub afisha_slug: Option<String>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub thread_id: Option<i64>,
    #[serde(default)]
    pub venues: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub kudago_endpoint: String,
    pub afisha_base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Budget for a whole adapter run, which may span several requests.
    pub deadline_secs: u64,
    pub afisha_card_limit: usize,
    pub venue_block_limit: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    #[default]
    Auto,
    Remote,
    Local,
    Off,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub mode: AnalysisMode,
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub concurrency: usize,
}

#[derive(Debug, Clone)]
pub struct Locality {
    pub key: String,
    pub name: String,
    pub code: Option<String>,
    pub afisha_slug: String,
    pub timezone: Tz,
    pub thread_id: Option<i64>,
    pub venues: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub telegram_token: Option<String>,
    pub telegram_group_id: Option<i64>,
    pub analysis_api_key: Option<String>,
    pub analysis_endpoint: Option<String>,
    pub analysis_model: Option<String>,
}

fn default_max_count() -> usize {
    10
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            kudago_endpoint: DEFAULT_KUDAGO_ENDPOINT.to_string(),
            afisha_base_url: DEFAULT_AFISHA_BASE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 10,
            deadline_secs: 30,
            afisha_card_limit: 20,
            venue_block_limit: 10,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            mode: AnalysisMode::Auto,
            endpoint: DEFAULT_ANALYSIS_ENDPOINT.to_string(),
            model: DEFAULT_ANALYSIS_MODEL.to_string(),
            temperature: 0.3,
            timeout_secs: 10,
            concurrency: 4,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            collections: vec![CollectionConfig {
                key: "weekly".to_string(),
                name: "Best of the week".to_string(),
                max_count: default_max_count(),
            }],
            localities: vec![
                LocalityConfig {
                    key: "moscow".to_string(),
                    name: "Москва".to_string(),
                    code: Some("msk".to_string()),
                    afisha_slug: Some("moscow".to_string()),
                    timezone: default_timezone(),
                    thread_id: None,
                    venues: vec![
                        "https://www.teatr-mayakovskogo.ru".to_string(),
                        "https://www.bolshoi.ru".to_string(),
                    ],
                },
                LocalityConfig {
                    key: "yaroslavl".to_string(),
                    name: "Ярославль".to_string(),
                    code: Some("yaroslavl".to_string()),
                    afisha_slug: Some("yaroslavl".to_string()),
                    timezone: default_timezone(),
                    thread_id: None,
                    venues: Vec::new(),
                },
                LocalityConfig {
                    key: "tver".to_string(),
                    name: "Тверь".to_string(),
                    code: Some("tver".to_string()),
                    afisha_slug: Some("tver".to_string()),
                    timezone: default_timezone(),
                    thread_id: None,
                    venues: Vec::new(),
                },
            ],
            sources: SourcesConfig::default(),
            analysis: AnalysisConfig::default(),
            dedupe_across_sources: false,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        Self::from_json(&contents).map_err(|err| match err {
            ConfigError::Invalid(reason) => ConfigError::Read {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            serde_json::from_str(contents).map_err(|err| ConfigError::Invalid(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collections.is_empty() {
            return Err(ConfigError::Missing("at least one collection"));
        }
        if self.localities.is_empty() {
            return Err(ConfigError::Missing("at least one locality"));
        }
        if self.analysis.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "analysis.concurrency must be at least 1".to_string(),
            ));
        }
        for locality in &self.localities {
            parse_timezone(locality)?;
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, credentials: &Credentials) {
        if let Some(endpoint) = &credentials.analysis_endpoint {
            self.analysis.endpoint = endpoint.clone();
        }
        if let Some(model) = &credentials.analysis_model {
            self.analysis.model = model.clone();
        }
    }

    pub fn collection(&self, key: Option<&str>) -> Result<&CollectionConfig, ConfigError> {
        match key {
            None => self
                .collections
                .first()
                .ok_or(ConfigError::Missing("at least one collection")),
            Some(key) => self
                .collections
                .iter()
                .find(|collection| collection.key.eq_ignore_ascii_case(key))
                .ok_or_else(|| ConfigError::UnknownCollection(key.to_string())),
        }
    }

    pub fn locality(&self, key: Option<&str>) -> Result<Locality, ConfigError> {
        let entry = match key {
            None => self
                .localities
                .first()
                .ok_or(ConfigError::Missing("at least one locality"))?,
            Some(key) => {
                let wanted = key.trim().to_lowercase();
                self.localities
                    .iter()
                    .find(|locality| {
                        locality.key.to_lowercase() == wanted
                            || locality.name.to_lowercase() == wanted
                    })
                    .ok_or_else(|| ConfigError::UnknownLocality(key.to_string()))?
            }
        };
        Ok(Locality {
            key: entry.key.clone(),
            name: entry.name.clone(),
            code: entry.code.clone(),
            afisha_slug: entry
                .afisha_slug
                .clone()
                .unwrap_or_else(|| entry.key.to_lowercase()),
            timezone: parse_timezone(entry)?,
            thread_id: entry.thread_id,
            venues: entry.venues.clone(),
        })
    }
}

fn parse_timezone(locality: &LocalityConfig) -> Result<Tz, ConfigError> {
    locality.timezone.parse::<Tz>().map_err(|_| {
        ConfigError::Invalid(format!(
            "unknown time zone {} for locality {}",
            locality.timezone, locality.key
        ))
    })
}

impl Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        let telegram_group_id = match non_empty_var("TELEGRAM_GROUP_ID") {
            Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
                ConfigError::Invalid(format!("TELEGRAM_GROUP_ID is not a chat id: {raw}"))
            })?),
            None => None,
        };
        Ok(Self {
            telegram_token: non_empty_var("TELEGRAM_BOT_TOKEN"),
            telegram_group_id,
            analysis_api_key: non_empty_var("OPENROUTER_API_KEY"),
            analysis_endpoint: non_empty_var("LLM_ENDPOINT"),
            analysis_model: non_empty_var("LLM_MODEL"),
        })
    }

    pub fn require_telegram(&self) -> Result<(&str, i64), ConfigError> {
        let token = self
            .telegram_token
            .as_deref()
            .ok_or(ConfigError::Missing("TELEGRAM_BOT_TOKEN"))?;
        let group_id = self
            .telegram_group_id
            .ok_or(ConfigError::Missing("TELEGRAM_GROUP_ID"))?;
        Ok((token, group_id))
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
