use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConnectorError;
use crate::logging::LogLevel;

pub const DEFAULT_API_VERSION: &str = "v4";
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Which credential source the process will use, decided once from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialMode {
    ServiceAccount,
    OAuth,
    None,
}

impl CredentialMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialMode::ServiceAccount => "service_account",
            CredentialMode::OAuth => "oauth",
            CredentialMode::None => "none",
        }
    }
}

/// Deployment flavour. `Minimal` keeps a single listing tool and resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolProfile {
    #[default]
    Full,
    Minimal,
}

impl FromStr for ToolProfile {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(ToolProfile::Full),
            "minimal" => Ok(ToolProfile::Minimal),
            other => Err(ConnectorError::Configuration(format!(
                "DV360_TOOL_PROFILE must be 'full' or 'minimal', got '{}'",
                other
            ))),
        }
    }
}

/// Backoff schedule for report readiness polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl PollPolicy {
    /// Delay before poll number `attempt` (zero based), doubling and capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            initial_delay: Duration::from_millis(2_000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub credentials_path: Option<PathBuf>,
    pub oauth_client_id: Option<String>,
    pub oauth_client_secret: Option<String>,
    pub oauth_refresh_token: Option<String>,
    pub api_version: String,
    pub partner_id: Option<String>,
    pub tool_profile: ToolProfile,
    pub log_level: LogLevel,
    pub max_retries: u32,
    pub timeout_seconds: u64,
    pub report_poll: PollPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials_path: None,
            oauth_client_id: None,
            oauth_client_secret: None,
            oauth_refresh_token: None,
            api_version: DEFAULT_API_VERSION.to_string(),
            partner_id: None,
            tool_profile: ToolProfile::Full,
            log_level: LogLevel::Info,
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            report_poll: PollPolicy::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConnectorError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a snapshot from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConnectorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();
        let poll_defaults = PollPolicy::default();

        let report_poll = PollPolicy {
            max_attempts: parse_or(
                get("REPORT_POLL_MAX_ATTEMPTS"),
                "REPORT_POLL_MAX_ATTEMPTS",
                poll_defaults.max_attempts,
            )?,
            initial_delay: Duration::from_millis(parse_or(
                get("REPORT_POLL_INITIAL_DELAY_MS"),
                "REPORT_POLL_INITIAL_DELAY_MS",
                poll_defaults.initial_delay.as_millis() as u64,
            )?),
            max_delay: Duration::from_millis(parse_or(
                get("REPORT_POLL_MAX_DELAY_MS"),
                "REPORT_POLL_MAX_DELAY_MS",
                poll_defaults.max_delay.as_millis() as u64,
            )?),
        };

        Ok(Self {
            credentials_path: get("GOOGLE_APPLICATION_CREDENTIALS").map(PathBuf::from),
            oauth_client_id: get("OAUTH_CLIENT_ID"),
            oauth_client_secret: get("OAUTH_CLIENT_SECRET"),
            oauth_refresh_token: get("OAUTH_REFRESH_TOKEN"),
            api_version: get("DV360_API_VERSION").unwrap_or(defaults.api_version),
            partner_id: get("DV360_PARTNER_ID"),
            tool_profile: match get("DV360_TOOL_PROFILE") {
                Some(raw) => raw.parse()?,
                None => ToolProfile::Full,
            },
            log_level: match get("LOG_LEVEL") {
                Some(raw) => raw.parse()?,
                None => defaults.log_level,
            },
            max_retries: parse_or(get("MAX_RETRIES"), "MAX_RETRIES", defaults.max_retries)?,
            timeout_seconds: parse_or(
                get("TIMEOUT_SECONDS"),
                "TIMEOUT_SECONDS",
                defaults.timeout_seconds,
            )?,
            report_poll,
        })
    }

    /// Service account wins when a key path is set; OAuth needs a client id.
    pub fn credential_mode(&self) -> CredentialMode {
        if self.credentials_path.is_some() {
            CredentialMode::ServiceAccount
        } else if self.oauth_client_id.is_some() {
            CredentialMode::OAuth
        } else {
            CredentialMode::None
        }
    }

    pub fn validate(&self) -> bool {
        match self.credential_mode() {
            CredentialMode::ServiceAccount => self
                .credentials_path
                .as_ref()
                .map(|p| p.exists())
                .unwrap_or(false),
            CredentialMode::OAuth => {
                self.oauth_client_id.is_some()
                    && self.oauth_client_secret.is_some()
                    && self.oauth_refresh_token.is_some()
            }
            CredentialMode::None => false,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T, ConnectorError> {
    match raw {
        Some(value) => value.parse().map_err(|_| {
            ConnectorError::Configuration(format!("{} must be a number, got '{}'", key, value))
        }),
        None => Ok(default),
    }
}
