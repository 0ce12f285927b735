//! Configuration management for serpwatch using the prefer crate.
//!
//! A config file (discovered by prefer or given with `--config`) provides the
//! baseline; environment variables override it; the result is resolved into
//! [`Settings`] and validated once at startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::crawler::AdApiCredentials;
use crate::dispatch::TaskPolicy;
use crate::http_client::{IdentityMode, RetryPolicy};
use crate::identity::DEFAULT_BAD_TTL;
use crate::report::ReportTemplate;
use crate::scheduler::DEFAULT_SCHEDULE;

const DEFAULT_DATABASE_URL: &str = "sqlite:serpwatch.db";
const DEFAULT_OUTBOX_DIR: &str = "outbox";
const DEFAULT_BIND: &str = "0.0.0.0:8000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Mail delivery settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MailConfig {
    /// HTTP endpoint of the mail relay.
    #[serde(default)]
    pub relay_url: Option<String>,
    /// Directory reports are written to when no relay is configured.
    #[serde(default)]
    pub outbox_dir: Option<String>,
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database_url: Option<String>,
    /// Coordination store URL (`redis://...`); absent means in-process.
    #[serde(default, alias = "redis_url")]
    pub coordination_url: Option<String>,
    #[serde(default)]
    pub server_id: Option<usize>,
    #[serde(default)]
    pub total_servers: Option<usize>,
    /// File with one egress identity per line.
    #[serde(default)]
    pub identity_file: Option<String>,
    /// Inline identities, used in addition to `identity_file`.
    #[serde(default)]
    pub identities: Vec<String>,
    #[serde(default)]
    pub identity_mode: Option<IdentityMode>,
    /// Seconds a failing identity stays blacklisted.
    #[serde(default)]
    pub bad_identity_ttl: Option<u64>,
    #[serde(default)]
    pub workers: Option<usize>,
    /// Per-request timeout in seconds.
    #[serde(default)]
    pub request_timeout: Option<u64>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    #[serde(default)]
    pub task: Option<TaskPolicy>,
    #[serde(default)]
    pub report: Option<ReportTemplate>,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub volume: Option<AdApiCredentials>,
    /// Cron expression (UTC, with seconds) for the daily run.
    #[serde(default)]
    pub schedule: Option<String>,
    /// Offset of the job day from UTC, in hours.
    #[serde(default)]
    pub utc_offset_hours: Option<i32>,
    #[serde(default)]
    pub bind: Option<String>,
    /// Path to the config file this was loaded from (not deserialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer for discovery.
    /// Falls back to defaults when no `serpwatch` config file is found.
    pub async fn load() -> Result<Self, ConfigError> {
        match prefer::load("serpwatch").await {
            Ok(found) => match found.source_path() {
                Some(path) => Self::load_from_path(path).await,
                None => Ok(Self::default()),
            },
            Err(e) => {
                tracing::debug!("No config file discovered: {}", e);
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file path.
    /// The format follows the extension: TOML, YAML, otherwise JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let mut config = Self::parse(path, &contents)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parsed = match ext {
            "toml" => toml::from_str(contents).map_err(|e| e.to_string()),
            "yaml" | "yml" => serde_yaml::from_str(contents).map_err(|e| e.to_string()),
            _ => serde_json::from_str(contents).map_err(|e| e.to_string()),
        };
        parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Directory relative paths in the file are resolved against.
    pub fn base_dir(&self) -> PathBuf {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir().join(path)
        }
    }
}

/// Where finished reports go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailTarget {
    Relay(String),
    Outbox(PathBuf),
}

/// Resolved application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub coordination_url: Option<String>,
    pub server_id: usize,
    pub total_servers: usize,
    pub identity_file: Option<PathBuf>,
    pub identities: Vec<String>,
    pub identity_mode: IdentityMode,
    pub bad_identity_ttl: Duration,
    pub workers: usize,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub task: TaskPolicy,
    pub report: ReportTemplate,
    pub mail: MailTarget,
    pub volume: Option<AdApiCredentials>,
    pub schedule: String,
    pub utc_offset: FixedOffset,
    pub bind: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            coordination_url: None,
            server_id: 0,
            total_servers: 1,
            identity_file: None,
            identities: Vec::new(),
            identity_mode: IdentityMode::default(),
            bad_identity_ttl: DEFAULT_BAD_TTL,
            workers: 8,
            request_timeout: Duration::from_secs(15),
            retry: RetryPolicy::default(),
            task: TaskPolicy::default(),
            report: ReportTemplate::default(),
            mail: MailTarget::Outbox(PathBuf::from(DEFAULT_OUTBOX_DIR)),
            volume: None,
            schedule: DEFAULT_SCHEDULE.to_string(),
            utc_offset: kst(),
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

fn kst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).unwrap_or_else(|| Utc.fix())
}

impl Settings {
    /// Apply a config file on top of the defaults.
    pub fn apply_config(&mut self, config: &Config) -> Result<(), ConfigError> {
        if let Some(ref url) = config.database_url {
            self.database_url = url.clone();
        }
        if config.coordination_url.is_some() {
            self.coordination_url = config.coordination_url.clone();
        }
        if let Some(id) = config.server_id {
            self.server_id = id;
        }
        if let Some(total) = config.total_servers {
            self.total_servers = total;
        }
        if let Some(ref file) = config.identity_file {
            self.identity_file = Some(config.resolve_path(file));
        }
        self.identities.extend(config.identities.iter().cloned());
        if let Some(mode) = config.identity_mode {
            self.identity_mode = mode;
        }
        if let Some(ttl) = config.bad_identity_ttl {
            self.bad_identity_ttl = Duration::from_secs(ttl);
        }
        if let Some(workers) = config.workers {
            self.workers = workers;
        }
        if let Some(timeout) = config.request_timeout {
            self.request_timeout = Duration::from_secs(timeout);
        }
        if let Some(ref retry) = config.retry {
            self.retry = retry.clone();
        }
        if let Some(ref task) = config.task {
            self.task = task.clone();
        }
        if let Some(ref report) = config.report {
            self.report = report.clone();
        }
        if let Some(ref url) = config.mail.relay_url {
            self.mail = MailTarget::Relay(url.clone());
        } else if let Some(ref dir) = config.mail.outbox_dir {
            self.mail = MailTarget::Outbox(config.resolve_path(dir));
        }
        if config.volume.is_some() {
            self.volume = config.volume.clone();
        }
        if let Some(ref schedule) = config.schedule {
            self.schedule = schedule.clone();
        }
        if let Some(hours) = config.utc_offset_hours {
            self.utc_offset = offset_from_hours(hours)?;
        }
        if let Some(ref bind) = config.bind {
            self.bind = bind.clone();
        }
        Ok(())
    }

    /// Apply environment overrides. `lookup` is `std::env::var` in production.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(url) = var("DATABASE_URL") {
            tracing::debug!("Using DATABASE_URL from environment");
            self.database_url = url;
        }
        if let Some(url) = var("REDIS_URL") {
            self.coordination_url = Some(url);
        }
        if let Some(id) = var("SERVER_ID") {
            self.server_id = parse_number("SERVER_ID", &id)?;
        }
        if let Some(total) = var("TOTAL_SERVERS") {
            self.total_servers = parse_number("TOTAL_SERVERS", &total)?;
        }
        if let Some(file) = var("SERPWATCH_IDENTITY_FILE") {
            self.identity_file = Some(PathBuf::from(file));
        }

        let ad = (var("AD_API_KEY"), var("AD_SECRET_KEY"), var("AD_CUSTOMER_ID"));
        if let (Some(api_key), Some(secret_key), Some(customer_id)) = ad {
            self.volume = Some(AdApiCredentials {
                api_key,
                secret_key,
                customer_id,
            });
        }

        if let Some(list) = var("REPORT_RECIPIENTS") {
            self.report.recipients = list
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(url) = var("MAIL_RELAY_URL") {
            self.mail = MailTarget::Relay(url);
        } else if let Some(dir) = var("MAIL_OUTBOX_DIR") {
            self.mail = MailTarget::Outbox(PathBuf::from(dir));
        }
        Ok(())
    }

    /// Reject settings no fleet member can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_servers == 0 {
            return Err(ConfigError::Invalid {
                key: "total_servers",
                message: "must be at least 1".to_string(),
            });
        }
        if self.server_id >= self.total_servers {
            return Err(ConfigError::Invalid {
                key: "server_id",
                message: format!(
                    "{} is out of range for {} servers",
                    self.server_id, self.total_servers
                ),
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                key: "workers",
                message: "must be at least 1".to_string(),
            });
        }
        if self.report.recipients.is_empty() {
            return Err(ConfigError::Invalid {
                key: "report.recipients",
                message: "at least one recipient is required".to_string(),
            });
        }
        if let MailTarget::Relay(ref relay) = self.mail {
            let parsed = url::Url::parse(relay).map_err(|e| ConfigError::Invalid {
                key: "mail.relay_url",
                message: format!("'{}': {}", relay, e),
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::Invalid {
                    key: "mail.relay_url",
                    message: format!("unsupported scheme '{}'", parsed.scheme()),
                });
            }
        }
        Ok(())
    }
}

fn offset_from_hours(hours: i32) -> Result<FixedOffset, ConfigError> {
    hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| ConfigError::Invalid {
            key: "utc_offset_hours",
            message: format!("{} is not a valid offset", hours),
        })
}

fn parse_number(key: &'static str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        message: format!("'{}' is not a non-negative integer", value),
    })
}

/// Load, merge and validate settings.
pub async fn load_settings(config_path: Option<&Path>) -> Result<Settings, ConfigError> {
    let config = match config_path {
        Some(path) => Config::load_from_path(path).await?,
        None => Config::load().await?,
    };
    if let Some(ref path) = config.source_path {
        tracing::debug!("Loaded config from {}", path.display());
    }

    let mut settings = Settings::default();
    settings.apply_config(&config)?;
    settings.apply_env(|key| std::env::var(key).ok())?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn addressed() -> Settings {
        let mut settings = Settings::default();
        settings.report.recipients = vec!["ops@example.com".to_string()];
        settings
    }

    #[test]
    fn test_defaults_need_only_recipients() {
        let settings = Settings::default();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid {
                key: "report.recipients",
                ..
            })
        ));
        assert!(addressed().validate().is_ok());
        assert_eq!(settings.utc_offset.local_minus_utc(), 9 * 3600);
        assert_eq!(settings.request_timeout, Duration::from_secs(15));
        assert_eq!(settings.retry.max_attempts, 20);
        assert_eq!(settings.task.max_retries, 10);
    }

    #[test]
    fn test_parse_by_extension() {
        let toml = Config::parse(
            Path::new("serpwatch.toml"),
            "server_id = 1\ntotal_servers = 3\n[mail]\nrelay_url = \"http://relay\"\n",
        )
        .unwrap();
        assert_eq!(toml.server_id, Some(1));
        assert_eq!(toml.mail.relay_url.as_deref(), Some("http://relay"));

        let yaml = Config::parse(
            Path::new("serpwatch.yaml"),
            "workers: 4\nretry:\n  max_attempts: 5\n",
        )
        .unwrap();
        assert_eq!(yaml.workers, Some(4));
        assert_eq!(yaml.retry.unwrap().max_attempts, 5);

        let json = Config::parse(Path::new("serpwatch.json"), r#"{"redis_url": "redis://x"}"#).unwrap();
        assert_eq!(json.coordination_url.as_deref(), Some("redis://x"));

        assert!(matches!(
            Config::parse(Path::new("bad.json"), "{"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_env_overrides_config() {
        let config = Config {
            server_id: Some(0),
            total_servers: Some(2),
            ..Default::default()
        };
        let mut settings = Settings::default();
        settings.apply_config(&config).unwrap();
        settings
            .apply_env(env(&[
                ("SERVER_ID", "2"),
                ("TOTAL_SERVERS", "3"),
                ("MAIL_RELAY_URL", "http://relay/send"),
                ("AD_API_KEY", "k"),
                ("AD_SECRET_KEY", "s"),
                ("AD_CUSTOMER_ID", "c"),
            ]))
            .unwrap();

        assert_eq!(settings.server_id, 2);
        assert_eq!(settings.total_servers, 3);
        assert_eq!(settings.mail, MailTarget::Relay("http://relay/send".to_string()));
        assert_eq!(settings.volume.unwrap().customer_id, "c");
    }

    #[test]
    fn test_partial_ad_credentials_ignored() {
        let mut settings = Settings::default();
        settings.apply_env(env(&[("AD_API_KEY", "k")])).unwrap();
        assert!(settings.volume.is_none());
    }

    #[test]
    fn test_bad_env_number_rejected() {
        let mut settings = Settings::default();
        let err = settings.apply_env(env(&[("SERVER_ID", "one")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SERVER_ID", .. }));
    }

    #[test]
    fn test_recipients_from_env() {
        let mut settings = Settings::default();
        settings
            .apply_env(env(&[("REPORT_RECIPIENTS", " a@example.com, ,b@example.com ")]))
            .unwrap();
        assert_eq!(
            settings.report.recipients,
            vec!["a@example.com".to_string(), "b@example.com".to_string()]
        );
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut settings = Settings {
            server_id: 3,
            total_servers: 3,
            ..addressed()
        };
        assert!(settings.validate().is_err());

        settings.server_id = 0;
        settings.total_servers = 0;
        assert!(settings.validate().is_err());

        settings.total_servers = 1;
        settings.workers = 0;
        assert!(settings.validate().is_err());

        settings.workers = 4;
        settings.mail = MailTarget::Relay("smtp.example.com:25".to_string());
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid {
                key: "mail.relay_url",
                ..
            })
        ));

        settings.mail = MailTarget::Relay("https://relay.example.com/send".to_string());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_relative_paths_resolve_against_config_dir() {
        let config = Config {
            identity_file: Some("ips.txt".to_string()),
            mail: MailConfig {
                relay_url: None,
                outbox_dir: Some("/var/outbox".to_string()),
            },
            utc_offset_hours: Some(0),
            source_path: Some(PathBuf::from("/etc/serpwatch/serpwatch.toml")),
            ..Default::default()
        };
        let mut settings = Settings::default();
        settings.apply_config(&config).unwrap();
        assert_eq!(
            settings.identity_file,
            Some(PathBuf::from("/etc/serpwatch/ips.txt"))
        );
        assert_eq!(settings.mail, MailTarget::Outbox(PathBuf::from("/var/outbox")));
        assert_eq!(settings.utc_offset.local_minus_utc(), 0);
    }
}
