//! Environment-backed orchestrator configuration.

use std::{env, time::Duration};

use thiserror::Error;

use crate::version::AppVersion;

const DEFAULT_APP_VERSION: AppVersion = AppVersion::new(1, 0, 0);
const DEFAULT_REFRESH_TASK_ID: &str = "io.session.lifecycle.refresh";
const DEFAULT_REFRESH_EARLIEST_BEGIN_SECS: u64 = 30;
const DEFAULT_REFRESH_MAX_SYNC_UPDATES: usize = 10;
const DEFAULT_REFRESH_TIME_BUDGET_SECS: u64 = 10;
const DEFAULT_CACHE_CLEAR_SETTLE_MS: u64 = 2_000;
const DEFAULT_APP_LOCK_DISABLE_DELAY_MS: u64 = 500;
const DEFAULT_COMMAND_BUFFER: usize = 128;
const DEFAULT_EVENT_BUFFER: usize = 512;

/// Tuning shared by the orchestrator and its background scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Version of the running application, compared against the last launched one.
    pub app_version: AppVersion,
    /// Identifier the periodic refresh task is registered under.
    pub refresh_task_id: String,
    /// Minimum delay before the platform may run the next periodic refresh.
    pub refresh_earliest_begin: Duration,
    /// Sync updates collected before a periodic refresh finishes early.
    pub refresh_max_sync_updates: usize,
    /// Wall-clock budget of one periodic refresh.
    pub refresh_time_budget: Duration,
    /// Grace period between dropping the session and purging its caches.
    pub cache_clear_settle: Duration,
    /// Delay between showing authentication and disabling the app lock.
    pub app_lock_disable_delay: Duration,
    /// Capacity of the orchestrator command queue.
    pub command_buffer: usize,
    /// Capacity of the lifecycle event broadcast.
    pub event_buffer: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            app_version: DEFAULT_APP_VERSION,
            refresh_task_id: DEFAULT_REFRESH_TASK_ID.to_owned(),
            refresh_earliest_begin: Duration::from_secs(DEFAULT_REFRESH_EARLIEST_BEGIN_SECS),
            refresh_max_sync_updates: DEFAULT_REFRESH_MAX_SYNC_UPDATES,
            refresh_time_budget: Duration::from_secs(DEFAULT_REFRESH_TIME_BUDGET_SECS),
            cache_clear_settle: Duration::from_millis(DEFAULT_CACHE_CLEAR_SETTLE_MS),
            app_lock_disable_delay: Duration::from_millis(DEFAULT_APP_LOCK_DISABLE_DELAY_MS),
            command_buffer: DEFAULT_COMMAND_BUFFER,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl OrchestratorConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let app_version = match optional_trimmed_env("SESSION_APP_VERSION", &mut lookup) {
            Some(raw) => raw.parse::<AppVersion>().map_err(|err| ConfigError::InvalidValue {
                key: "SESSION_APP_VERSION",
                value: raw.clone(),
                reason: format!("{err}"),
            })?,
            None => defaults.app_version,
        };
        let refresh_task_id = optional_trimmed_env("SESSION_REFRESH_TASK_ID", &mut lookup)
            .unwrap_or(defaults.refresh_task_id);

        let refresh_earliest_begin = Duration::from_secs(parse_u64_with_default(
            "SESSION_REFRESH_EARLIEST_BEGIN_SECS",
            DEFAULT_REFRESH_EARLIEST_BEGIN_SECS,
            &mut lookup,
        )?);
        let refresh_max_sync_updates = parse_usize_with_default(
            "SESSION_REFRESH_MAX_SYNC_UPDATES",
            DEFAULT_REFRESH_MAX_SYNC_UPDATES,
            &mut lookup,
        )?;
        let refresh_time_budget = Duration::from_secs(parse_u64_with_default(
            "SESSION_REFRESH_TIME_BUDGET_SECS",
            DEFAULT_REFRESH_TIME_BUDGET_SECS,
            &mut lookup,
        )?);
        let cache_clear_settle = Duration::from_millis(parse_u64_with_default(
            "SESSION_CACHE_CLEAR_SETTLE_MS",
            DEFAULT_CACHE_CLEAR_SETTLE_MS,
            &mut lookup,
        )?);
        let app_lock_disable_delay = Duration::from_millis(parse_u64_with_default(
            "SESSION_APP_LOCK_DISABLE_DELAY_MS",
            DEFAULT_APP_LOCK_DISABLE_DELAY_MS,
            &mut lookup,
        )?);
        let command_buffer = parse_usize_with_default(
            "SESSION_COMMAND_BUFFER",
            DEFAULT_COMMAND_BUFFER,
            &mut lookup,
        )?;
        let event_buffer =
            parse_usize_with_default("SESSION_EVENT_BUFFER", DEFAULT_EVENT_BUFFER, &mut lookup)?;

        if refresh_max_sync_updates == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SESSION_REFRESH_MAX_SYNC_UPDATES",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        if refresh_time_budget.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "SESSION_REFRESH_TIME_BUDGET_SECS",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        Ok(Self {
            app_version,
            refresh_task_id,
            refresh_earliest_begin,
            refresh_max_sync_updates,
            refresh_time_budget,
            cache_clear_settle,
            app_lock_disable_delay,
            command_buffer,
            event_buffer,
        })
    }
}

/// Errors produced while parsing orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    #[error("invalid {key}='{value}': {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_u64_with_default<F>(
    key: &'static str,
    default: u64,
    lookup: &mut F,
) -> Result<u64, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(default);
    };
    value.parse::<u64>().map_err(|err| ConfigError::InvalidValue {
        key,
        value: value.clone(),
        reason: format!("{err}"),
    })
}

fn parse_usize_with_default<F>(
    key: &'static str,
    default: usize,
    lookup: &mut F,
) -> Result<usize, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(default);
    };
    value.parse::<usize>().map_err(|err| ConfigError::InvalidValue {
        key,
        value: value.clone(),
        reason: format!("{err}"),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(map: HashMap<&'static str, &'static str>) -> impl FnMut(&str) -> Option<String> {
        move |key| map.get(key).map(|value| (*value).to_owned())
    }

    #[test]
    fn uses_defaults_when_env_is_empty() {
        let cfg = OrchestratorConfig::from_lookup(|_| None).expect("defaults should parse");
        assert_eq!(cfg, OrchestratorConfig::default());
        assert_eq!(cfg.app_version, AppVersion::new(1, 0, 0));
        assert_eq!(cfg.refresh_task_id, "io.session.lifecycle.refresh");
        assert_eq!(cfg.refresh_max_sync_updates, 10);
        assert_eq!(cfg.cache_clear_settle, Duration::from_secs(2));
    }

    #[test]
    fn parses_overrides() {
        let cfg = OrchestratorConfig::from_lookup(lookup_from(HashMap::from([
            ("SESSION_APP_VERSION", "1.7.2"),
            ("SESSION_REFRESH_TASK_ID", "  org.example.refresh "),
            ("SESSION_REFRESH_MAX_SYNC_UPDATES", "3"),
            ("SESSION_CACHE_CLEAR_SETTLE_MS", "0"),
            ("SESSION_EVENT_BUFFER", "64"),
        ])))
        .expect("overrides should parse");

        assert_eq!(cfg.app_version, AppVersion::new(1, 7, 2));
        assert_eq!(cfg.refresh_task_id, "org.example.refresh");
        assert_eq!(cfg.refresh_max_sync_updates, 3);
        assert_eq!(cfg.cache_clear_settle, Duration::ZERO);
        assert_eq!(cfg.event_buffer, 64);
    }

    #[test]
    fn rejects_invalid_numbers() {
        let err = OrchestratorConfig::from_lookup(lookup_from(HashMap::from([(
            "SESSION_REFRESH_TIME_BUDGET_SECS",
            "soon",
        )])))
        .expect_err("non numeric budget must fail");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "SESSION_REFRESH_TIME_BUDGET_SECS",
                ..
            }
        ));
    }

    #[test]
    fn rejects_zero_update_count() {
        let err = OrchestratorConfig::from_lookup(lookup_from(HashMap::from([(
            "SESSION_REFRESH_MAX_SYNC_UPDATES",
            "0",
        )])))
        .expect_err("zero updates must fail");
        assert!(err.to_string().contains("must be at least 1"));
    }

    #[test]
    fn rejects_invalid_version() {
        let err = OrchestratorConfig::from_lookup(lookup_from(HashMap::from([(
            "SESSION_APP_VERSION",
            "one",
        )])))
        .expect_err("bad version must fail");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "SESSION_APP_VERSION",
                ..
            }
        ));
    }
}
