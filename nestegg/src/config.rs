use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

use crate::ledger::{AccountDefaults, LedgerSettings};
use crate::rate_limit::{RateLimitRule, RateLimitSettings};

/// Longest session lifetime accepted; longer values are clamped to it.
pub const MAX_SESSION_TTL_HOURS: u64 = 24 * 365;

#[derive(Debug, Parser)]
#[command(
    name = "nestegg",
    version,
    about = "Session-gated 401(k) contribution simulator and notes service"
)]
pub struct Cli {
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,

    #[arg(long, short = 'u', value_name = "FILE")]
    pub users_file: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    pub security_log: Option<PathBuf>,

    #[arg(long, value_name = "HOURS")]
    pub session_ttl_hours: Option<u64>,

    #[arg(long)]
    pub one_time_reset: bool,

    /// Artificial delay held while an account is locked, e.g. `1s` or `250ms`.
    #[arg(long, value_name = "DURATION")]
    pub simulated_latency: Option<String>,

    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Token-bucket settings for the router-wide limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalLimit {
    pub replenish_every_ms: u64,
    pub burst: u32,
}

impl Default for GlobalLimit {
    fn default() -> Self {
        Self {
            replenish_every_ms: 50,
            burst: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub users_file: PathBuf,
    pub security_log: Option<PathBuf>,
    pub session_ttl_hours: u64,
    pub secure_cookies: bool,
    pub ledger: LedgerSettings,
    pub rate_limits: RateLimitSettings,
    pub global_limit: GlobalLimit,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config in {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid boolean value for env var {key}: {value}")]
    InvalidEnvBool { key: String, value: String },
    #[error("invalid duration for {key}: {value}")]
    InvalidDuration {
        key: String,
        value: String,
        source: humantime::DurationError,
    },
    #[error("{key} must be a finite, non-negative amount")]
    InvalidAmount { key: String },
    #[error("no users file configured; pass --users-file or set users_file in the config")]
    MissingUsersFile,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    bind: Option<SocketAddr>,
    users_file: Option<PathBuf>,
    security_log: Option<PathBuf>,
    session_ttl_hours: Option<u64>,
    secure_cookies: Option<bool>,
    starting_funds: Option<f64>,
    starting_balance: Option<f64>,
    one_time_reset: Option<bool>,
    simulated_latency: Option<String>,
    #[serde(default)]
    rate_limits: FileRateLimits,
    global_replenish_ms: Option<u64>,
    global_burst: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct FileRateLimits {
    contribute: Option<FileRule>,
    withdraw: Option<FileRule>,
    reset: Option<FileRule>,
    create_note: Option<FileRule>,
}

#[derive(Debug, Default, Deserialize)]
struct FileRule {
    max_requests: Option<u32>,
    window: Option<String>,
}

impl AppConfig {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let from_file = read_file_config(cli.config.as_deref())?;
        let env_secure_cookies = read_env_bool("NESTEGG_SECURE_COOKIES")?;

        let bind = cli
            .bind
            .or(from_file.bind)
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8400)));
        let users_file = cli
            .users_file
            .or(from_file.users_file)
            .ok_or(ConfigError::MissingUsersFile)?;
        let security_log = cli.security_log.or(from_file.security_log);
        let session_ttl_hours = cli
            .session_ttl_hours
            .or(from_file.session_ttl_hours)
            .unwrap_or(24)
            .clamp(1, MAX_SESSION_TTL_HOURS);
        let secure_cookies = env_secure_cookies
            .or(from_file.secure_cookies)
            .unwrap_or(true);

        let defaults = AccountDefaults::default();
        let defaults = AccountDefaults {
            funds: parse_amount("starting_funds", from_file.starting_funds, defaults.funds)?,
            retirement_balance: parse_amount(
                "starting_balance",
                from_file.starting_balance,
                defaults.retirement_balance,
            )?,
        };
        let simulated_latency = match cli.simulated_latency.or(from_file.simulated_latency) {
            Some(raw) => parse_duration("simulated_latency", &raw)?,
            None => LedgerSettings::default().simulated_latency,
        };
        let ledger = LedgerSettings {
            defaults,
            one_time_reset: cli.one_time_reset || from_file.one_time_reset.unwrap_or(false),
            simulated_latency,
        };

        let base = RateLimitSettings::default();
        let limits = from_file.rate_limits;
        let rate_limits = RateLimitSettings {
            contribute: merge_rule("contribute", limits.contribute, base.contribute)?,
            withdraw: merge_rule("withdraw", limits.withdraw, base.withdraw)?,
            reset: merge_rule("reset", limits.reset, base.reset)?,
            create_note: merge_rule("create_note", limits.create_note, base.create_note)?,
        };

        let global_default = GlobalLimit::default();
        let global_limit = GlobalLimit {
            replenish_every_ms: from_file
                .global_replenish_ms
                .unwrap_or(global_default.replenish_every_ms)
                .max(1),
            burst: from_file
                .global_burst
                .unwrap_or(global_default.burst)
                .max(1),
        };

        Ok(Self {
            bind,
            users_file,
            security_log,
            session_ttl_hours,
            secure_cookies,
            ledger,
            rate_limits,
            global_limit,
        })
    }
}

fn read_file_config(path: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };

    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn merge_rule(
    endpoint: &str,
    file: Option<FileRule>,
    base: RateLimitRule,
) -> Result<RateLimitRule, ConfigError> {
    let Some(file) = file else {
        return Ok(base);
    };
    let window = match file.window {
        Some(raw) => parse_duration(&format!("rate_limits.{endpoint}.window"), &raw)?,
        None => base.window,
    };
    Ok(RateLimitRule {
        max_requests: file.max_requests.unwrap_or(base.max_requests).max(1),
        window,
    })
}

fn parse_duration(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw.trim()).map_err(|source| ConfigError::InvalidDuration {
        key: String::from(key),
        value: String::from(raw),
        source,
    })
}

fn parse_amount(key: &str, value: Option<f64>, default: f64) -> Result<f64, ConfigError> {
    match value {
        None => Ok(default),
        Some(amount) if amount.is_finite() && amount >= 0.0 => Ok(amount),
        Some(_) => Err(ConfigError::InvalidAmount {
            key: String::from(key),
        }),
    }
}

fn read_env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => parse_bool_value(key, &value).map(Some),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidEnvBool {
            key: String::from(key),
            value: String::from("<non-unicode>"),
        }),
    }
}

fn parse_bool_value(key: &str, raw: &str) -> Result<bool, ConfigError> {
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvBool {
            key: String::from(key),
            value: String::from(raw),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;
    use clap::Parser;
    use tempfile::tempdir;

    use super::{parse_bool_value, AppConfig, Cli, ConfigError, MAX_SESSION_TTL_HOURS};

    #[test]
    fn parse_bool_value_accepts_common_values() {
        assert_eq!(parse_bool_value("K", "true").ok(), Some(true));
        assert_eq!(parse_bool_value("K", " on ").ok(), Some(true));
        assert_eq!(parse_bool_value("K", "NO").ok(), Some(false));
        assert_eq!(parse_bool_value("K", "0").ok(), Some(false));
        assert!(parse_bool_value("K", "maybe").is_err());
    }

    #[test]
    fn cli_without_users_file_is_rejected() {
        let cli = Cli::parse_from(["nestegg"]);
        assert!(matches!(
            AppConfig::from_cli(cli),
            Err(ConfigError::MissingUsersFile)
        ));
    }

    #[test]
    fn defaults_follow_the_simulator_rules() -> Result<()> {
        let cli = Cli::parse_from(["nestegg", "--users-file", "users.toml"]);
        let config = AppConfig::from_cli(cli)?;

        assert_eq!(config.ledger.defaults.funds, 10_000.0);
        assert_eq!(config.ledger.defaults.retirement_balance, 0.0);
        assert_eq!(config.ledger.simulated_latency, Duration::from_secs(1));
        assert!(!config.ledger.one_time_reset);
        assert_eq!(config.rate_limits.contribute.max_requests, 5);
        assert_eq!(config.rate_limits.reset.max_requests, 2);
        assert_eq!(config.rate_limits.reset.window, Duration::from_secs(60));
        assert_eq!(config.session_ttl_hours, 24);
        Ok(())
    }

    #[test]
    fn session_ttl_is_clamped_to_a_year() -> Result<()> {
        let cli = Cli::parse_from([
            "nestegg",
            "--users-file",
            "users.toml",
            "--session-ttl-hours",
            "18446744073709551615",
        ]);
        let config = AppConfig::from_cli(cli)?;
        assert_eq!(config.session_ttl_hours, MAX_SESSION_TTL_HOURS);
        Ok(())
    }

    #[test]
    fn file_values_apply_and_cli_overrides_them() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nestegg.toml");
        std::fs::write(
            &path,
            r#"
users_file = "from-file.toml"
starting_funds = 5000
simulated_latency = "250ms"
one_time_reset = true

[rate_limits.reset]
max_requests = 1
window = "10m"
"#,
        )?;

        let cli = Cli::parse_from([
            "nestegg",
            "--config",
            path.to_str().unwrap_or_default(),
            "--users-file",
            "from-cli.toml",
            "--simulated-latency",
            "0s",
        ]);
        let config = AppConfig::from_cli(cli)?;

        assert_eq!(config.users_file.to_str(), Some("from-cli.toml"));
        assert_eq!(config.ledger.defaults.funds, 5_000.0);
        assert_eq!(config.ledger.simulated_latency, Duration::ZERO);
        assert!(config.ledger.one_time_reset);
        assert_eq!(config.rate_limits.reset.max_requests, 1);
        assert_eq!(config.rate_limits.reset.window, Duration::from_secs(600));
        assert_eq!(config.rate_limits.contribute.max_requests, 5);
        Ok(())
    }

    #[test]
    fn invalid_duration_is_reported() {
        let cli = Cli::parse_from([
            "nestegg",
            "--users-file",
            "users.toml",
            "--simulated-latency",
            "soon",
        ]);
        assert!(matches!(
            AppConfig::from_cli(cli),
            Err(ConfigError::InvalidDuration { .. })
        ));
    }
}
