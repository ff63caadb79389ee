use crate::error::{ConnectorError, Result};
use crate::transport::TransportFactory;
use crate::types::{ConnectionStatus, HandlerFault};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const ENV_URL: &str = "SSE_URL";
const ENV_MAX_ATTEMPTS: &str = "SSE_RECONNECT_MAX_ATTEMPTS";
const ENV_DELAY_MS: &str = "SSE_RECONNECT_DELAY_MS";
const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;

pub type StatusObserver = Arc<dyn Fn(ConnectionStatus) + Send + Sync + 'static>;
pub type FaultObserver = Arc<dyn Fn(HandlerFault) + Send + Sync + 'static>;

/// Bounded, fixed-delay reconnection after transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Reconnections allowed between two successful opens. Must be positive.
    pub max_attempts: u32,
    #[serde(rename = "delay_ms", with = "duration_ms")]
    pub delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ConnectorError::InvalidConfig(
                "reconnect max_attempts must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Serializable client settings, loadable from JSON or the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect: Option<ReconnectPolicy>,
}

impl ClientConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        if let Some(policy) = &config.reconnect {
            policy.validate()?;
        }
        Ok(config)
    }

    /// Reads `SSE_URL`, and optionally `SSE_RECONNECT_MAX_ATTEMPTS` /
    /// `SSE_RECONNECT_DELAY_MS`. Reconnection is enabled only when the
    /// attempt count is set.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var(ENV_URL).map_err(|e| ConnectorError::EnvVarError {
            name: ENV_URL.to_string(),
            reason: e.to_string(),
        })?;

        let reconnect = match optional_env_u64(ENV_MAX_ATTEMPTS)? {
            Some(max_attempts) => {
                let max_attempts =
                    u32::try_from(max_attempts).map_err(|_| ConnectorError::EnvVarError {
                        name: ENV_MAX_ATTEMPTS.to_string(),
                        reason: "is out of range".to_string(),
                    })?;
                let delay_ms =
                    optional_env_u64(ENV_DELAY_MS)?.unwrap_or(DEFAULT_RECONNECT_DELAY_MS);
                let policy = ReconnectPolicy::new(max_attempts, Duration::from_millis(delay_ms));
                policy.validate()?;
                Some(policy)
            }
            None => None,
        };

        Ok(Self { url, reconnect })
    }

    /// Options carrying this config's reconnect policy.
    pub fn options(&self) -> ClientOptions {
        let options = ClientOptions::new();
        match self.reconnect {
            Some(policy) => options.reconnect(policy),
            None => options,
        }
    }
}

fn optional_env_u64(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConnectorError::EnvVarError {
                name: name.to_string(),
                reason: format!("is not a valid integer: {}", e),
            }),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConnectorError::EnvVarError {
            name: name.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Construction options for a [`Client`](crate::eventsource::Client).
#[derive(Clone, Default)]
pub struct ClientOptions {
    pub(crate) status_observer: Option<StatusObserver>,
    pub(crate) fault_observer: Option<FaultObserver>,
    pub(crate) reconnect: Option<ReconnectPolicy>,
    pub(crate) transport: Option<Arc<dyn TransportFactory>>,
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called synchronously with every status transition, in order.
    pub fn status_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        self.status_observer = Some(Arc::new(observer));
        self
    }

    /// Receives panics caught in user callbacks.
    pub fn fault_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(HandlerFault) + Send + Sync + 'static,
    {
        self.fault_observer = Some(Arc::new(observer));
        self
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = Some(policy);
        self
    }

    /// Overrides the default HTTP transport.
    pub fn transport(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transport = Some(factory);
        self
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("status_observer", &self.status_observer.is_some())
            .field("fault_observer", &self.fault_observer.is_some())
            .field("reconnect", &self.reconnect)
            .field("transport", &self.transport.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_rejects_zero_attempts() {
        let result = ReconnectPolicy::new(0, Duration::from_millis(10)).validate();
        assert!(matches!(result, Err(ConnectorError::InvalidConfig(_))));
        assert!(ReconnectPolicy::new(1, Duration::ZERO).validate().is_ok());
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "url": "http://localhost:8080/events",
            "reconnect": {"max_attempts": 3, "delay_ms": 50}
        }"#;
        let config = ClientConfig::from_json(json).expect("valid config");
        assert_eq!(config.url, "http://localhost:8080/events");
        assert_eq!(
            config.reconnect,
            Some(ReconnectPolicy::new(3, Duration::from_millis(50)))
        );
        assert!(config.options().reconnect.is_some());
    }

    #[test]
    fn test_config_from_json_without_reconnect() {
        let config = ClientConfig::from_json(r#"{"url": "http://localhost/events"}"#).unwrap();
        assert!(config.reconnect.is_none());
        assert!(config.options().reconnect.is_none());
    }

    #[test]
    fn test_config_from_json_rejects_invalid_policy() {
        let json = r#"{
            "url": "http://localhost/events",
            "reconnect": {"max_attempts": 0, "delay_ms": 5}
        }"#;
        let result = ClientConfig::from_json(json);
        assert!(matches!(result, Err(ConnectorError::InvalidConfig(_))));

        let result = ClientConfig::from_json("not json");
        assert!(matches!(result, Err(ConnectorError::SerdeError(_))));
    }

    #[test]
    fn test_policy_serializes_delay_as_millis() {
        let value =
            serde_json::to_value(ReconnectPolicy::new(2, Duration::from_millis(1500))).unwrap();
        assert_eq!(value["delay_ms"], 1500);
        assert_eq!(value["max_attempts"], 2);
    }

    #[test]
    fn test_options_debug_hides_callbacks() {
        let options = ClientOptions::new()
            .status_observer(|_| {})
            .reconnect(ReconnectPolicy::new(3, Duration::from_millis(50)));
        let debug = format!("{:?}", options);
        assert!(debug.contains("status_observer: true"));
        assert!(debug.contains("fault_observer: false"));
    }
}
