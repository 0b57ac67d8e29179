//! Layered configuration.
//!
//! Values are resolved in order: built-in defaults, the JSON config file
//! (`~/.config/ttt/config.json` unless `--config` names another), the
//! environment, then command-line flags. The result is validated once.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use completion_provider::{EngineParams, ParamError};
use conversation_tree::{chat_file_path, PersistenceError, RoleMarkers};
use prompt_assembler::{OverflowPolicy, TemplateConfig, TokenCeilings};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const DEFAULT_CHAT_NAME: &str = "default";
pub const DEFAULT_PROVIDER_ID: &str = "openai";
pub const DEFAULT_TIMEOUT_SEC: u64 = 60;
pub const DEFAULT_LOG_FILTER: &str = "info";
pub const DEFAULT_STATE_DIR: &str = "/tmp/ttt";

pub const CHAT_DIR_ENV_VAR: &str = "TTT_CHAT_DIR";
pub const CHAT_NAME_ENV_VAR: &str = "TTT_CHAT_NAME";
pub const PROVIDER_ENV_VAR: &str = "TTT_PROVIDER";
pub const LOG_DIR_ENV_VAR: &str = "TTT_LOG_DIR";
pub const LOG_FILTER_ENV_VAR: &str = "TTT_LOG";
pub const API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV_VAR: &str = "OPENAI_BASE_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("invalid engine parameters: {0}")]
    Params(#[from] ParamError),

    #[error("invalid value '{value}' for {key}: expected {expected}")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error(transparent)]
    ChatName(PersistenceError),

    #[error("no config file location; pass --config or set HOME")]
    NoConfigPath,
}

/// On-disk shape of `config.json`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_sec: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_params: Option<EngineParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markers: Option<RoleMarkers>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overflow: Option<OverflowPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_tokens: Option<TokenCeilings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_context: Option<bool>,
}

/// Values taken from the process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub home: Option<PathBuf>,
    pub chat_dir: Option<PathBuf>,
    pub chat_name: Option<String>,
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub log_filter: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            home: env_string_opt("HOME").map(PathBuf::from),
            chat_dir: env_string_opt(CHAT_DIR_ENV_VAR).map(PathBuf::from),
            chat_name: env_string_opt(CHAT_NAME_ENV_VAR),
            provider: env_string_opt(PROVIDER_ENV_VAR),
            api_key: env_string_opt(API_KEY_ENV_VAR),
            base_url: env_string_opt(BASE_URL_ENV_VAR),
            log_dir: env_string_opt(LOG_DIR_ENV_VAR).map(PathBuf::from),
            log_filter: env_string_opt(LOG_FILTER_ENV_VAR),
        }
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

/// Values taken from command-line flags; `None`/`false` means "not given".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
    pub chat_name: Option<String>,
    pub chat_dir: Option<PathBuf>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub n: Option<u32>,
    pub stream: bool,
    pub overflow: Option<OverflowPolicy>,
    pub no_file: bool,
    pub include_context: bool,
}

/// Fully resolved settings handed to the session.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub chat_dir: PathBuf,
    pub chat_name: String,
    /// `false` keeps the conversation in memory only.
    pub persist: bool,
    pub provider: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub organization: Option<String>,
    pub timeout_sec: u64,
    pub max_retries: Option<u32>,
    pub backup_dir: Option<PathBuf>,
    pub log_dir: PathBuf,
    pub log_filter: String,
    pub params: EngineParams,
    pub markers: RoleMarkers,
    pub template: TemplateConfig,
    pub system_prompt: Option<String>,
    pub overflow: OverflowPolicy,
    pub token_ceilings: TokenCeilings,
    pub include_context: bool,
    /// File that `params save` writes to.
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults(None)
    }
}

impl Config {
    /// Built-in defaults; chats live under `~/.config/ttt/chats` when `home` is known.
    pub fn defaults(home: Option<&Path>) -> Self {
        let state_dir = PathBuf::from(DEFAULT_STATE_DIR);
        let chat_dir = match home {
            Some(home) => config_dir(home).join("chats"),
            None => state_dir.join("chats"),
        };
        Self {
            chat_dir,
            chat_name: DEFAULT_CHAT_NAME.to_string(),
            persist: true,
            provider: DEFAULT_PROVIDER_ID.to_string(),
            api_key: None,
            base_url: None,
            organization: None,
            timeout_sec: DEFAULT_TIMEOUT_SEC,
            max_retries: None,
            backup_dir: Some(state_dir.clone()),
            log_dir: state_dir.join("logs"),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            params: EngineParams::default(),
            markers: RoleMarkers::default(),
            template: TemplateConfig::default(),
            system_prompt: None,
            overflow: OverflowPolicy::default(),
            token_ceilings: TokenCeilings::default(),
            include_context: false,
            config_path: home.map(|home| config_dir(home).join(CONFIG_FILE_NAME)),
        }
    }

    /// Resolves every layer and validates the result.
    ///
    /// An explicit `config_path` must exist; the default location may be absent.
    pub fn load(
        config_path: Option<&Path>,
        env: &EnvOverrides,
        cli: &CliOverrides,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::defaults(env.home.as_deref());
        if let Some(path) = config_path {
            config.config_path = Some(path.to_path_buf());
        }

        if let Some(path) = config.config_path.clone() {
            match read_config_file(&path) {
                Ok(Some(file)) => config.apply_file(file),
                Ok(None) if config_path.is_none() => {}
                Ok(None) => {
                    return Err(ConfigError::Read {
                        path,
                        source: io::Error::from(io::ErrorKind::NotFound),
                    })
                }
                Err(error) => return Err(error),
            }
        }

        config.apply_env(env);
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        let ConfigFile {
            chat_dir,
            chat_name,
            provider,
            api_key,
            base_url,
            organization,
            timeout_sec,
            max_retries,
            backup_dir,
            log_dir,
            engine_params,
            markers,
            template,
            system_prompt,
            overflow,
            model_tokens,
            include_context,
        } = file;

        set_if_some(&mut self.chat_dir, chat_dir);
        set_if_some(&mut self.chat_name, chat_name);
        set_if_some(&mut self.provider, provider);
        set_if_some(&mut self.timeout_sec, timeout_sec);
        set_if_some(&mut self.log_dir, log_dir);
        set_if_some(&mut self.params, engine_params);
        set_if_some(&mut self.markers, markers);
        set_if_some(&mut self.template, template);
        set_if_some(&mut self.overflow, overflow);
        set_if_some(&mut self.token_ceilings, model_tokens);
        set_if_some(&mut self.include_context, include_context);
        self.api_key = api_key.or(self.api_key.take());
        self.base_url = base_url.or(self.base_url.take());
        self.organization = organization.or(self.organization.take());
        self.max_retries = max_retries.or(self.max_retries);
        self.backup_dir = backup_dir.or(self.backup_dir.take());
        self.system_prompt = system_prompt.or(self.system_prompt.take());
    }

    fn apply_env(&mut self, env: &EnvOverrides) {
        set_if_some(&mut self.chat_dir, env.chat_dir.clone());
        set_if_some(&mut self.chat_name, env.chat_name.clone());
        set_if_some(&mut self.provider, env.provider.clone());
        set_if_some(&mut self.log_dir, env.log_dir.clone());
        set_if_some(&mut self.log_filter, env.log_filter.clone());
        if env.api_key.is_some() {
            self.api_key = env.api_key.clone();
        }
        if env.base_url.is_some() {
            self.base_url = env.base_url.clone();
        }
    }

    fn apply_cli(&mut self, cli: &CliOverrides) {
        set_if_some(&mut self.chat_name, cli.chat_name.clone());
        set_if_some(&mut self.chat_dir, cli.chat_dir.clone());
        set_if_some(&mut self.provider, cli.provider.clone());
        set_if_some(&mut self.params.model, cli.model.clone());
        set_if_some(&mut self.params.max_tokens, cli.max_tokens);
        set_if_some(&mut self.params.temperature, cli.temperature);
        set_if_some(&mut self.params.n, cli.n);
        set_if_some(&mut self.overflow, cli.overflow);
        if cli.stream {
            self.params.stream = true;
        }
        if cli.no_file {
            self.persist = false;
        }
        if cli.include_context {
            self.include_context = true;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.params.validate()?;
        if self.timeout_sec == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timeout_sec",
                value: self.timeout_sec.to_string(),
                expected: "a positive number of seconds",
            });
        }
        if self.provider.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "provider",
                value: self.provider.clone(),
                expected: "a provider id",
            });
        }
        self.chat_path()?;
        Ok(())
    }

    /// `<chat_dir>/<chat_name>.json`.
    pub fn chat_path(&self) -> Result<PathBuf, ConfigError> {
        chat_file_path(&self.chat_dir, &self.chat_name).map_err(ConfigError::ChatName)
    }

    /// Writes the current engine parameters into the config file, keeping its other keys.
    pub fn save_params(&self) -> Result<PathBuf, ConfigError> {
        let path = self.config_path.clone().ok_or(ConfigError::NoConfigPath)?;
        let mut file = read_config_file(&path)?.unwrap_or_default();
        file.engine_params = Some(self.params.clone());

        let mut body = serde_json::to_string_pretty(&file).map_err(ConfigError::Serialize)?;
        body.push('\n');
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| ConfigError::Write {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        fs::write(&path, body).map_err(|source| ConfigError::Write {
            path: path.clone(),
            source,
        })?;
        tracing::info!(path = %path.display(), "saved engine parameters");
        Ok(path)
    }
}

fn config_dir(home: &Path) -> PathBuf {
    home.join(".config").join("ttt")
}

fn set_if_some<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn read_config_file(path: &Path) -> Result<Option<ConfigFile>, ConfigError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned")
    }

    fn set_env_guard(key: &'static str, value: Option<&str>) -> EnvGuard {
        let previous = env::var(key).ok();
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
        EnvGuard { key, previous }
    }

    #[test]
    fn env_overrides_read_known_variables() {
        let _lock = env_lock();
        let _g1 = set_env_guard(CHAT_DIR_ENV_VAR, Some("/tmp/chats"));
        let _g2 = set_env_guard(CHAT_NAME_ENV_VAR, Some("work"));
        let _g3 = set_env_guard(PROVIDER_ENV_VAR, Some("mock"));
        let _g4 = set_env_guard(API_KEY_ENV_VAR, Some("sk-test"));
        let _g5 = set_env_guard(BASE_URL_ENV_VAR, None);
        let _g6 = set_env_guard(LOG_FILTER_ENV_VAR, Some("debug"));

        let env = EnvOverrides::from_env();
        assert_eq!(env.chat_dir, Some(PathBuf::from("/tmp/chats")));
        assert_eq!(env.chat_name.as_deref(), Some("work"));
        assert_eq!(env.provider.as_deref(), Some("mock"));
        assert_eq!(env.api_key.as_deref(), Some("sk-test"));
        assert!(env.base_url.is_none());
        assert_eq!(env.log_filter.as_deref(), Some("debug"));
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let _lock = env_lock();
        let _g1 = set_env_guard(API_KEY_ENV_VAR, Some("   "));
        let _g2 = set_env_guard(CHAT_NAME_ENV_VAR, Some(""));

        let env = EnvOverrides::from_env();
        assert!(env.api_key.is_none());
        assert!(env.chat_name.is_none());
    }

    #[test]
    fn defaults_use_home_config_dir() {
        let config = Config::defaults(Some(Path::new("/home/me")));
        assert_eq!(config.chat_dir, PathBuf::from("/home/me/.config/ttt/chats"));
        assert_eq!(
            config.config_path,
            Some(PathBuf::from("/home/me/.config/ttt/config.json"))
        );
        assert_eq!(config.log_dir, PathBuf::from("/tmp/ttt/logs"));
        assert_eq!(config.overflow, OverflowPolicy::Fail);
        assert!(config.persist);

        let homeless = Config::default();
        assert_eq!(homeless.chat_dir, PathBuf::from("/tmp/ttt/chats"));
        assert!(homeless.config_path.is_none());
    }

    #[test]
    fn set_if_some_keeps_existing_on_none() {
        let mut value = 3;
        set_if_some(&mut value, None);
        assert_eq!(value, 3);
        set_if_some(&mut value, Some(5));
        assert_eq!(value, 5);
    }
}
