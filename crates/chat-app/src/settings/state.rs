use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use snafu::{ResultExt, Snafu};
use tutor_llm::{
    BackendConfig, DEFAULT_BASE_URL, DEFAULT_CHAT_PATH, DEFAULT_PARSED_SOURCES_PATH,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_SOURCES_PATH,
};

use crate::prompt::AgeGroup;

pub const SETTINGS_DIRECTORY_NAME: &str = "tutor";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "TUTOR_";

pub const DEFAULT_VIEWPORT_ROWS: usize = 20;
pub const DEFAULT_VIEWPORT_COLUMNS: usize = 80;
const VIEWPORT_ROWS_RANGE: (usize, usize) = (5, 200);
const VIEWPORT_COLUMNS_RANGE: (usize, usize) = (20, 400);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_sources_path")]
    pub sources_path: String,
    #[serde(default = "default_parsed_sources_path")]
    pub parsed_sources_path: String,
    #[serde(default = "default_chat_path")]
    pub chat_path: String,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            sources_path: default_sources_path(),
            parsed_sources_path: default_parsed_sources_path(),
            chat_path: default_chat_path(),
        }
    }
}

impl EndpointSettings {
    fn normalized(self) -> Self {
        Self {
            base_url: non_blank_or(self.base_url, default_base_url),
            sources_path: non_blank_or(self.sources_path, default_sources_path),
            parsed_sources_path: non_blank_or(
                self.parsed_sources_path,
                default_parsed_sources_path,
            ),
            chat_path: non_blank_or(self.chat_path, default_chat_path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub endpoints: EndpointSettings,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(
        default,
        serialize_with = "serialize_age_group",
        deserialize_with = "deserialize_age_group"
    )]
    pub age_group: AgeGroup,
    #[serde(default = "default_viewport_rows")]
    pub viewport_rows: usize,
    #[serde(default = "default_viewport_columns")]
    pub viewport_columns: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoints: EndpointSettings::default(),
            request_timeout_secs: default_request_timeout_secs(),
            age_group: AgeGroup::default(),
            viewport_rows: default_viewport_rows(),
            viewport_columns: default_viewport_columns(),
        }
    }
}

impl Settings {
    pub fn normalized(mut self) -> Self {
        self.endpoints = self.endpoints.normalized();
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = default_request_timeout_secs();
        }
        self.viewport_rows = self
            .viewport_rows
            .clamp(VIEWPORT_ROWS_RANGE.0, VIEWPORT_ROWS_RANGE.1);
        self.viewport_columns = self
            .viewport_columns
            .clamp(VIEWPORT_COLUMNS_RANGE.0, VIEWPORT_COLUMNS_RANGE.1);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn to_backend_config(&self) -> BackendConfig {
        BackendConfig::new(&self.endpoints.base_url)
            .with_paths(
                &self.endpoints.sources_path,
                &self.endpoints.parsed_sources_path,
                &self.endpoints.chat_path,
            )
            .with_request_timeout(self.request_timeout())
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<Settings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".tutor"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.settings.load_full()
    }

    /// Normalizes, persists, then publishes the new settings.
    pub fn update(&self, settings: Settings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    fn load_from_disk(path: &Path) -> Settings {
        if !path.exists() {
            tracing::info!(path = ?path, "settings file not found, using defaults and environment");
        }

        let figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        match extract_settings(figment) {
            Ok(settings) => settings,
            Err(error) => {
                tracing::warn!(path = ?path, error = %error, "failed to parse settings, using defaults");
                Settings::default()
            }
        }
    }

    fn persist(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!(path = ?self.config_path, "saved settings");
        Ok(())
    }
}

/// Extracts normalized settings from an assembled figment.
pub fn extract_settings(figment: Figment) -> Result<Settings, figment::Error> {
    figment.extract::<Settings>().map(Settings::normalized)
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn non_blank_or(value: String, fallback: fn() -> String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_sources_path() -> String {
    DEFAULT_SOURCES_PATH.to_string()
}

fn default_parsed_sources_path() -> String {
    DEFAULT_PARSED_SOURCES_PATH.to_string()
}

fn default_chat_path() -> String {
    DEFAULT_CHAT_PATH.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_viewport_rows() -> usize {
    DEFAULT_VIEWPORT_ROWS
}

fn default_viewport_columns() -> usize {
    DEFAULT_VIEWPORT_COLUMNS
}

fn serialize_age_group<S>(value: &AgeGroup, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(value.label())
}

fn deserialize_age_group<'de, D>(deserializer: D) -> Result<AgeGroup, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    Ok(value.parse().unwrap_or_else(|error| {
        tracing::warn!(error = %error, "falling back to default age group");
        AgeGroup::default()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_json(json: &str) -> Settings {
        let figment =
            Figment::from(Serialized::defaults(Settings::default())).merge(Json::string(json));
        extract_settings(figment).unwrap()
    }

    #[test]
    fn empty_file_yields_defaults() {
        let settings = from_json("{}");

        assert_eq!(settings, Settings::default());
        assert_eq!(
            settings.to_backend_config().chat_url(),
            "http://localhost:3000/api/getChat"
        );
    }

    #[test]
    fn file_values_override_defaults_and_are_normalized() {
        let settings = from_json(
            r#"{
                "endpoints": { "base_url": " https://tutor.test/api/ ", "chat_path": "  " },
                "request_timeout_secs": 0,
                "age_group": "high-school",
                "viewport_rows": 1,
                "viewport_columns": 10000
            }"#,
        );

        assert_eq!(settings.endpoints.base_url, "https://tutor.test/api/");
        assert_eq!(settings.endpoints.chat_path, DEFAULT_CHAT_PATH);
        assert_eq!(settings.request_timeout(), DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(settings.age_group, AgeGroup::HighSchool);
        assert_eq!(settings.viewport_rows, VIEWPORT_ROWS_RANGE.0);
        assert_eq!(settings.viewport_columns, VIEWPORT_COLUMNS_RANGE.1);

        let config = settings.to_backend_config();
        assert_eq!(config.sources_url(), "https://tutor.test/api/getSources");
    }

    #[test]
    fn unknown_age_group_falls_back() {
        let settings = from_json(r#"{ "age_group": "kindergarten" }"#);

        assert_eq!(settings.age_group, AgeGroup::MiddleSchool);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join(format!("tutor-settings-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::new(path);

        assert_eq!(store.settings().endpoints, EndpointSettings::default());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = std::env::temp_dir().join(format!("tutor-settings-update-{}", std::process::id()));
        let path = dir.join(SETTINGS_FILE_NAME);
        let store = SettingsStore::new(path.clone());

        let mut next = (*store.settings()).clone();
        next.age_group = AgeGroup::College;
        store.update(next).unwrap();

        assert_eq!(store.settings().age_group, AgeGroup::College);
        let reloaded = SettingsStore::new(path);
        assert_eq!(reloaded.settings().age_group, AgeGroup::College);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
