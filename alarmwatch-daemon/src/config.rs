//! Environment configuration.
//!
//! All configuration is read from the environment at startup. Anything
//! missing or unparseable is a fatal error before any task starts.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_LINGER_TIME: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    Missing(&'static str),
    #[error("{name} is not a valid duration: {source}")]
    InvalidDuration {
        name: &'static str,
        source: humantime::DurationError,
    },
    #[error("{name} is not a valid socket address: {source}")]
    InvalidAddr {
        name: &'static str,
        source: std::net::AddrParseError,
    },
}

/// Daemon settings, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Name of the inbound alarm subscription.
    pub subscription_name: String,

    /// Project owning the subscription. Optional; when present the
    /// subscription resource name is matched in full.
    pub project_id: Option<String>,

    /// How long the switch stays on after the most recent alarm.
    pub linger_time: Duration,

    /// Command to run when the switch should turn on.
    pub switch_on_cmd: String,

    /// Command to run when the switch should turn off.
    pub switch_off_cmd: String,

    /// Wall-clock bound on a single switch command.
    pub command_timeout: Duration,

    /// Where the last accepted alarm time is persisted. Absent disables
    /// persistence.
    pub last_alarm_file: Option<PathBuf>,

    /// Bind address of the push-delivery endpoint.
    pub listen_addr: SocketAddr,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let duration = |name: &'static str, default: Duration| match lookup(name) {
            Some(raw) => humantime::parse_duration(&raw)
                .map_err(|source| ConfigError::InvalidDuration { name, source }),
            None => Ok(default),
        };

        let listen_addr = lookup("LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());

        Ok(Self {
            subscription_name: required("SUBSCRIPTION_NAME")?,
            project_id: lookup("PROJECT_ID").filter(|v| !v.is_empty()),
            linger_time: duration("LINGER_TIME", DEFAULT_LINGER_TIME)?,
            switch_on_cmd: required("SWITCH_ON_CMD")?,
            switch_off_cmd: required("SWITCH_OFF_CMD")?,
            command_timeout: duration("COMMAND_TIMEOUT", DEFAULT_COMMAND_TIMEOUT)?,
            last_alarm_file: lookup("LAST_ALARM_FILE")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            listen_addr: listen_addr
                .parse()
                .map_err(|source| ConfigError::InvalidAddr {
                    name: "LISTEN_ADDR",
                    source,
                })?,
        })
    }

    /// Fully qualified subscription resource name, when the project is
    /// known.
    pub fn subscription_path(&self) -> Option<String> {
        self.project_id
            .as_ref()
            .map(|p| format!("projects/{p}/subscriptions/{}", self.subscription_name))
    }

    /// Whether a delivery's subscription resource name refers to the
    /// configured subscription.
    pub fn matches_subscription(&self, resource: &str) -> bool {
        match self.subscription_path() {
            Some(full) => resource == full,
            None => {
                resource == self.subscription_name
                    || resource.ends_with(&format!("/subscriptions/{}", self.subscription_name))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use test_case::test_case;

    use super::*;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("SUBSCRIPTION_NAME", "alarms"),
            ("SWITCH_ON_CMD", "/usr/local/bin/switch-on"),
            ("SWITCH_OFF_CMD", "/usr/local/bin/switch-off"),
        ])
    }

    fn settings_from(env: &HashMap<&'static str, &'static str>) -> Result<Settings, ConfigError> {
        Settings::from_lookup(&|key| env.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn applies_defaults() {
        let settings = settings_from(&base_env()).unwrap();
        assert_eq!(settings.linger_time, DEFAULT_LINGER_TIME);
        assert_eq!(settings.command_timeout, DEFAULT_COMMAND_TIMEOUT);
        assert_eq!(settings.listen_addr, DEFAULT_LISTEN_ADDR.parse().unwrap());
        assert_eq!(settings.last_alarm_file, None);
        assert_eq!(settings.project_id, None);
    }

    #[test]
    fn parses_durations() {
        let mut env = base_env();
        env.insert("LINGER_TIME", "5m");
        env.insert("COMMAND_TIMEOUT", "2s");
        let settings = settings_from(&env).unwrap();
        assert_eq!(settings.linger_time, Duration::from_secs(300));
        assert_eq!(settings.command_timeout, Duration::from_secs(2));
    }

    #[test_case("SUBSCRIPTION_NAME")]
    #[test_case("SWITCH_ON_CMD")]
    #[test_case("SWITCH_OFF_CMD")]
    fn requires_variable(name: &'static str) {
        let mut env = base_env();
        env.remove(name);
        assert!(matches!(
            settings_from(&env),
            Err(ConfigError::Missing(missing)) if missing == name
        ));
    }

    #[test]
    fn rejects_invalid_duration() {
        let mut env = base_env();
        env.insert("LINGER_TIME", "soon");
        assert!(matches!(
            settings_from(&env),
            Err(ConfigError::InvalidDuration { name: "LINGER_TIME", .. })
        ));
    }

    #[test]
    fn rejects_invalid_listen_addr() {
        let mut env = base_env();
        env.insert("LISTEN_ADDR", "not-an-addr");
        assert!(matches!(
            settings_from(&env),
            Err(ConfigError::InvalidAddr { name: "LISTEN_ADDR", .. })
        ));
    }

    #[test]
    fn matches_full_resource_name_when_project_set() {
        let mut env = base_env();
        env.insert("PROJECT_ID", "monitor-prod");
        let settings = settings_from(&env).unwrap();
        assert!(settings.matches_subscription("projects/monitor-prod/subscriptions/alarms"));
        assert!(!settings.matches_subscription("projects/other/subscriptions/alarms"));
    }

    #[test]
    fn matches_by_suffix_without_project() {
        let settings = settings_from(&base_env()).unwrap();
        assert!(settings.matches_subscription("alarms"));
        assert!(settings.matches_subscription("projects/any/subscriptions/alarms"));
        assert!(!settings.matches_subscription("projects/any/subscriptions/other"));
    }
}
