//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channels::EmailConfig;
use crate::error::ConfigError;
use crate::models::ModelConfig;
use crate::routing::RoutingTable;

/// Default subject marker a message needs to be processed.
pub const DEFAULT_SUBJECT_MARKER: &str = "test";

/// Largest accepted cycle budget (one day).
pub const MAX_CYCLE_BUDGET_SECS: u64 = 86_400;

/// Settings one poll cycle runs with.
///
/// Snapshotted at cycle start; edits made while a cycle runs apply to the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Service mailbox address: sender of replies/forwards and default forward target.
    pub service_address: String,
    /// Case-insensitive substring a subject must contain.
    pub subject_marker: String,
    pub routing: RoutingTable,
    /// Time after which no new message is started in a cycle.
    #[serde(with = "duration_secs")]
    pub budget: Duration,
}

impl CycleConfig {
    pub fn new(service_address: impl Into<String>) -> Self {
        Self {
            service_address: service_address.into(),
            subject_marker: DEFAULT_SUBJECT_MARKER.to_string(),
            routing: RoutingTable::new(),
            budget: Duration::from_secs(300),
        }
    }

    pub fn with_routing(mut self, routing: RoutingTable) -> Self {
        self.routing = routing;
        self
    }

    pub fn with_subject_marker(mut self, marker: impl Into<String>) -> Self {
        self.subject_marker = marker.into();
        self
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Build from `ROUTER_SUBJECT_MARKER`, `ROUTER_CYCLE_BUDGET_SECS` and the
    /// `ROUTE_*` variables.
    pub fn from_env(service_address: impl Into<String>) -> Result<Self, ConfigError> {
        let mut config = Self::new(service_address).with_routing(RoutingTable::from_env());
        if let Ok(marker) = std::env::var("ROUTER_SUBJECT_MARKER") {
            config.subject_marker = marker;
        }
        if let Ok(raw) = std::env::var("ROUTER_CYCLE_BUDGET_SECS") {
            config.budget = parse_budget(&raw)?;
        }
        Ok(config)
    }
}

/// Parse a cycle budget in whole seconds, capped at `MAX_CYCLE_BUDGET_SECS`.
pub fn parse_budget(raw: &str) -> Result<Duration, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidValue {
        key: "ROUTER_CYCLE_BUDGET_SECS".into(),
        message,
    };
    let secs: u64 = raw
        .trim()
        .parse()
        .map_err(|e| invalid(format!("{raw}: {e}")))?;
    if secs > MAX_CYCLE_BUDGET_SECS {
        return Err(invalid(format!(
            "{secs}s exceeds the {MAX_CYCLE_BUDGET_SECS}s limit"
        )));
    }
    Ok(Duration::from_secs(secs))
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Everything the binary needs.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `None` when no mailbox is configured; only the HTTP surface runs.
    pub email: Option<EmailConfig>,
    pub models: ModelConfig,
    pub cycle: CycleConfig,
    pub http_port: u16,
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let email = EmailConfig::from_env()?;
        let service_address = email
            .as_ref()
            .map(|e| e.from_address.clone())
            .unwrap_or_default();

        let http_port = match std::env::var("ROUTER_HTTP_PORT") {
            Ok(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: "ROUTER_HTTP_PORT".into(),
                message: format!("{raw}: {e}"),
            })?,
            Err(_) => 8000,
        };

        Ok(Self {
            email,
            models: ModelConfig::from_env(),
            cycle: CycleConfig::from_env(service_address)?,
            http_port,
            log_dir: std::env::var("ROUTER_LOG_DIR").ok().map(PathBuf::from),
        })
    }
}
