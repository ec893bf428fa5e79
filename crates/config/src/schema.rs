use figment::{
    Figment,
    providers::{Env, Format as _, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variables honoured for compatibility with existing credential directories.
const LEGACY_ENV: &[&str] = &[
    "GITHUB_COPILOT_TOKEN_DIR",
    "GITHUB_COPILOT_ACCESS_TOKEN_FILE",
    "GITHUB_COPILOT_API_KEY_FILE",
];

fn default_port() -> u16 {
    8019
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_true() -> bool {
    true
}

/// Where the access token and API key are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Credential directory; a leading `~` is expanded against `$HOME`.
    pub dir: String,
    pub access_token_file: String,
    pub api_key_file: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            dir: "~/.config/copilink/github_copilot".to_string(),
            access_token_file: "access-token".to_string(),
            api_key_file: "api-key.json".to_string(),
        }
    }
}

/// Upstream endpoint and the client identity headers it requires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Chat API base used until the refresh endpoint advertises another.
    pub api_base: String,
    pub editor_version: String,
    pub editor_plugin_version: String,
    pub user_agent: String,
    pub integration_id: String,
    /// Inject an inert tool when history contains tool use but no tools are sent.
    #[serde(default = "default_true")]
    pub placeholder_tool: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.githubcopilot.com".to_string(),
            editor_version: "vscode/1.107.0".to_string(),
            editor_plugin_version: "copilot-chat/0.35.0".to_string(),
            user_agent: "GitHubCopilotChat/0.35.0".to_string(),
            integration_id: "vscode-chat".to_string(),
            placeholder_tool: true,
        }
    }
}

/// Device-flow and refresh retry bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub poll_interval_secs: u64,
    pub poll_max_attempts: u32,
    /// Full device-flow attempts before giving up.
    pub login_attempts: u32,
    /// API-key refresh attempts before giving up.
    pub refresh_attempts: u32,
    /// Open the verification URL in a browser when a login starts.
    #[serde(default)]
    pub open_browser: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            poll_max_attempts: 12,
            login_attempts: 3,
            refresh_attempts: 3,
            open_browser: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration; `RUST_LOG` takes precedence over `level`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Listen port (defaults to 8019).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listen address (defaults to `127.0.0.1`).
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            credentials: CredentialsConfig::default(),
            upstream: UpstreamConfig::default(),
            auth: AuthConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// The layered figment: defaults, optional YAML file, `COPILINK_*`
    /// variables (`__` separates nesting), then the legacy credential
    /// path variables.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment
            .merge(Env::prefixed("COPILINK_").split("__"))
            .merge(Env::raw().only(LEGACY_ENV).map(|key| {
                match key.as_str().to_ascii_uppercase().as_str() {
                    "GITHUB_COPILOT_TOKEN_DIR" => "credentials.dir".into(),
                    "GITHUB_COPILOT_ACCESS_TOKEN_FILE" => "credentials.access_token_file".into(),
                    _ => "credentials.api_key_file".into(),
                }
            }))
    }

    /// Loads configuration from an optional file plus the environment.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the file cannot be parsed or a value
    /// has the wrong type.
    #[allow(clippy::result_large_err)]
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }

    /// Parses configuration from a YAML string, merged with defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the YAML is invalid or extraction fails.
    #[allow(clippy::result_large_err)]
    pub fn from_yaml(yaml: &str) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::string(yaml))
            .extract()
    }

    /// Credential directory with `~` expanded.
    #[must_use]
    pub fn credentials_dir(&self) -> PathBuf {
        expand_home(&self.credentials.dir)
    }
}

fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(path),
    };
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(rest)
}
