//! Relay configuration: exchange name, consumer tuning and queue topology.
//!
//! Values come from defaults, a JSON file, or `EVENTRELAY_*` environment
//! variables. The default topology is the classic two-queue setup:
//! `orders` receives `order.*` and `payments` receives `payment.*`.

use std::num::ParseIntError;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use eventrelay_events::{Broker, BrokerError, ExchangeKind, QueueOptions};

use crate::consumer::{ConsumerConfig, RedeliveryPolicy};

pub const ENV_EXCHANGE: &str = "EVENTRELAY_EXCHANGE";
pub const ENV_POLL_INTERVAL_MS: &str = "EVENTRELAY_POLL_INTERVAL_MS";
pub const ENV_MAX_REDELIVERIES: &str = "EVENTRELAY_MAX_REDELIVERIES";

const UNBOUNDED: &str = "unbounded";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {var}: {reason}")]
    InvalidVar {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub exchange: String,
    pub consumer: ConsumerSettings,
    pub topology: Vec<QueueSpec>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            exchange: "events".to_string(),
            consumer: ConsumerSettings::default(),
            topology: vec![
                QueueSpec::new("orders").with_pattern("order.*"),
                QueueSpec::new("payments").with_pattern("payment.*"),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerSettings {
    pub poll_interval_ms: u64,
    /// `null` or `"unbounded"` redelivers forever.
    #[serde(with = "redelivery_limit")]
    pub max_redeliveries: Option<u32>,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            max_redeliveries: RedeliveryPolicy::default().max_redeliveries,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSpec {
    pub name: String,
    #[serde(default = "default_durable")]
    pub durable: bool,
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Queue receiving messages that exhaust their redeliveries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead_letter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

fn default_durable() -> bool {
    true
}

impl QueueSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            patterns: Vec::new(),
            dead_letter: None,
            max_length: None,
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    pub fn with_dead_letter(mut self, queue: impl Into<String>) -> Self {
        self.dead_letter = Some(queue.into());
        self
    }

    pub fn options(&self) -> QueueOptions {
        QueueOptions {
            durable: self.durable,
            max_length: self.max_length,
        }
    }
}

impl RelayConfig {
    /// Defaults overridden by `EVENTRELAY_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`RelayConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(exchange) = lookup(ENV_EXCHANGE) {
            let exchange = exchange.trim();
            if exchange.is_empty() {
                return Err(invalid(ENV_EXCHANGE, exchange, "must not be empty"));
            }
            config.exchange = exchange.to_string();
        }

        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            let millis: u64 = raw
                .trim()
                .parse()
                .map_err(|e: ParseIntError| invalid(ENV_POLL_INTERVAL_MS, &raw, e))?;
            if millis == 0 {
                return Err(invalid(ENV_POLL_INTERVAL_MS, &raw, "must be at least 1"));
            }
            config.consumer.poll_interval_ms = millis;
        }

        if let Some(raw) = lookup(ENV_MAX_REDELIVERIES) {
            let value = raw.trim();
            config.consumer.max_redeliveries = if value.eq_ignore_ascii_case(UNBOUNDED) {
                None
            } else {
                Some(
                    value
                        .parse()
                        .map_err(|e: ParseIntError| invalid(ENV_MAX_REDELIVERIES, &raw, e))?,
                )
            };
        }

        Ok(config)
    }

    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("failed to parse relay configuration")
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read relay configuration at {:?}", path))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid relay configuration in {:?}", path))
    }

    pub fn redelivery(&self) -> RedeliveryPolicy {
        RedeliveryPolicy {
            max_redeliveries: self.consumer.max_redeliveries,
        }
    }

    /// Never shorter than [`ConsumerConfig::MIN_POLL_INTERVAL`], even when a
    /// JSON file asks for `0`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.consumer.poll_interval_ms)
            .max(ConsumerConfig::MIN_POLL_INTERVAL)
    }

    /// Consumer settings for a consumer called `name`.
    pub fn consumer_config(&self, name: impl Into<String>) -> ConsumerConfig {
        ConsumerConfig::new(name)
            .with_poll_interval(self.poll_interval())
            .with_redelivery(self.redelivery())
    }

    /// Declare the exchange, queues, dead-letter queues and bindings on
    /// `broker`. Safe to call repeatedly with the same configuration.
    pub fn apply(&self, broker: &Broker) -> Result<(), BrokerError> {
        broker.declare_exchange(&self.exchange, ExchangeKind::Topic);

        for spec in &self.topology {
            broker.declare_queue(&spec.name, spec.options())?;
            if let Some(dead_letter) = &spec.dead_letter {
                broker.declare_dead_letter(&spec.name, dead_letter)?;
            }
            for pattern in &spec.patterns {
                broker.bind_queue(&spec.name, &self.exchange, pattern)?;
            }
        }

        info!(
            exchange = %self.exchange,
            queues = self.topology.len(),
            "topology declared"
        );
        Ok(())
    }
}

fn invalid(var: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidVar {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// `Option<u32>` where `None` is spelled `"unbounded"` (or `null`).
mod redelivery_limit {
    use serde::{Deserialize, Deserializer, Serializer, de};

    use super::UNBOUNDED;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Count(u32),
        Literal(String),
    }

    pub fn serialize<S: Serializer>(value: &Option<u32>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(n) => serializer.serialize_u32(*n),
            None => serializer.serialize_str(UNBOUNDED),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u32>, D::Error> {
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Count(n)) => Ok(Some(n)),
            Some(Raw::Literal(s)) if s.eq_ignore_ascii_case(UNBOUNDED) => Ok(None),
            Some(Raw::Literal(s)) => Err(de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a redelivery count or \"unbounded\"",
            )),
        }
    }
}
