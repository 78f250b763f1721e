use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use kindred_sync::config::{DEFAULT_LANGUAGE, DEFAULT_VOICE};
use kindred_sync::{ConversationId, EngineConfig, IdError, UserId};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use url::Url;

pub const DEFAULT_SOCKET_URL: &str = "ws://127.0.0.1:8080/socket";
pub const DEFAULT_MEDIA_URL: &str = "http://127.0.0.1:8080/api/";
pub const DEFAULT_USER_ID: &str = "local-user";
pub const DEFAULT_CONVERSATION_ID: &str = "default";
pub const SETTINGS_DIRECTORY_NAME: &str = "kindred";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "KINDRED_";

const DEFAULT_DELIVERY_PROMOTION_MS: u64 = 750;
const DEFAULT_QUIET_WINDOW_MS: u64 = 2_500;
const DEFAULT_REVEAL_BASE_MS: u64 = 800;
const DEFAULT_REVEAL_STEP_MS: u64 = 400;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_socket_url")]
    pub socket_url: String,
    #[serde(default = "default_media_url")]
    pub media_url: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_conversation_id")]
    pub conversation_id: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_delivery_promotion_ms")]
    pub delivery_promotion_ms: u64,
    #[serde(default = "default_quiet_window_ms")]
    pub quiet_window_ms: u64,
    #[serde(default = "default_reveal_base_ms")]
    pub reveal_base_ms: u64,
    #[serde(default = "default_reveal_step_ms")]
    pub reveal_step_ms: u64,
    #[serde(default)]
    pub tts_timeout_ms: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            socket_url: default_socket_url(),
            media_url: default_media_url(),
            user_id: default_user_id(),
            conversation_id: default_conversation_id(),
            language: default_language(),
            voice: default_voice(),
            delivery_promotion_ms: DEFAULT_DELIVERY_PROMOTION_MS,
            quiet_window_ms: DEFAULT_QUIET_WINDOW_MS,
            reveal_base_ms: DEFAULT_REVEAL_BASE_MS,
            reveal_step_ms: DEFAULT_REVEAL_STEP_MS,
            tts_timeout_ms: None,
        }
    }
}

impl Settings {
    pub fn normalized(mut self) -> Self {
        self.socket_url = trimmed_or(self.socket_url, default_socket_url);
        self.media_url = trimmed_or(self.media_url, default_media_url);
        self.user_id = trimmed_or(self.user_id, default_user_id);
        self.conversation_id = trimmed_or(self.conversation_id, default_conversation_id);
        self.language = trimmed_or(self.language, default_language);
        self.voice = trimmed_or(self.voice, default_voice);

        // Zero windows would flush every message on its own.
        if self.delivery_promotion_ms == 0 {
            self.delivery_promotion_ms = DEFAULT_DELIVERY_PROMOTION_MS;
        }
        if self.quiet_window_ms == 0 {
            self.quiet_window_ms = DEFAULT_QUIET_WINDOW_MS;
        }
        self.tts_timeout_ms = self.tts_timeout_ms.filter(|timeout| *timeout > 0);

        self
    }

    pub fn to_engine_config(&self) -> SettingsResult<EngineConfig> {
        let user_id = UserId::parse(&self.user_id).context(InvalidIdSnafu {
            stage: "parse-user-id",
            key: "user_id",
        })?;

        let mut config = EngineConfig::new(user_id)
            .with_language(self.language.clone())
            .with_voice(self.voice.clone());
        config.delivery_promotion = Duration::from_millis(self.delivery_promotion_ms);
        config.quiet_window = Duration::from_millis(self.quiet_window_ms);
        config.reveal_base = Duration::from_millis(self.reveal_base_ms);
        config.reveal_step = Duration::from_millis(self.reveal_step_ms);
        if let Some(timeout) = self.tts_timeout_ms {
            config = config.with_tts_timeout(Duration::from_millis(timeout));
        }
        Ok(config)
    }

    pub fn conversation(&self) -> SettingsResult<ConversationId> {
        ConversationId::parse(&self.conversation_id).context(InvalidIdSnafu {
            stage: "parse-conversation-id",
            key: "conversation_id",
        })
    }

    pub fn socket_endpoint(&self) -> SettingsResult<Url> {
        Url::parse(&self.socket_url).context(InvalidUrlSnafu {
            stage: "parse-socket-url",
            key: "socket_url",
            value: self.socket_url.clone(),
        })
    }

    pub fn media_endpoint(&self) -> SettingsResult<Url> {
        Url::parse(&self.media_url).context(InvalidUrlSnafu {
            stage: "parse-media-url",
            key: "media_url",
            value: self.media_url.clone(),
        })
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
            .unwrap_or_else(|| PathBuf::from(".kindred"))
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

    pub fn settings(&self) -> Arc<Settings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: Settings) -> SettingsResult<()> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    /// Defaults, then the settings file when present, then `KINDRED_*` variables.
    fn load_from_disk(path: &Path) -> Settings {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if path.exists() {
            figment = figment.merge(Json::file(path));
        } else {
            tracing::info!(path = %path.display(), "settings file not found, using defaults");
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX));

        match figment.extract::<Settings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %error,
                    "failed to parse settings, using defaults"
                );
                Settings::default()
            }
        }
    }

    fn persist(&self, settings: &Settings) -> SettingsResult<()> {
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

        tracing::info!(path = %self.config_path.display(), "saved settings");
        Ok(())
    }
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
    #[snafu(display("setting `{key}` holds an invalid id on `{stage}`: {source}"))]
    InvalidId {
        stage: &'static str,
        key: &'static str,
        source: IdError,
    },
    #[snafu(display("setting `{key}` = '{value}' is not a valid url on `{stage}`: {source}"))]
    InvalidUrl {
        stage: &'static str,
        key: &'static str,
        value: String,
        source: url::ParseError,
    },
}

pub type SettingsResult<T> = Result<T, SettingsError>;

fn trimmed_or(value: String, default: fn() -> String) -> String {
    let value = value.trim();
    if value.is_empty() {
        default()
    } else {
        value.to_string()
    }
}

fn default_socket_url() -> String {
    DEFAULT_SOCKET_URL.to_string()
}

fn default_media_url() -> String {
    DEFAULT_MEDIA_URL.to_string()
}

fn default_user_id() -> String {
    DEFAULT_USER_ID.to_string()
}

fn default_conversation_id() -> String {
    DEFAULT_CONVERSATION_ID.to_string()
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_voice() -> String {
    DEFAULT_VOICE.to_string()
}

fn default_delivery_promotion_ms() -> u64 {
    DEFAULT_DELIVERY_PROMOTION_MS
}

fn default_quiet_window_ms() -> u64 {
    DEFAULT_QUIET_WINDOW_MS
}

fn default_reveal_base_ms() -> u64 {
    DEFAULT_REVEAL_BASE_MS
}

fn default_reveal_step_ms() -> u64 {
    DEFAULT_REVEAL_STEP_MS
}
