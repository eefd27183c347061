//! ---
//! bco_section: "01-core-functionality"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Shared primitives and utilities for the continuity engine."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::{ConsoleTarget, LogFormat};

fn default_staleness_threshold() -> Duration {
    Duration::from_secs(15)
}

fn default_freshness_sla() -> Duration {
    Duration::from_secs(30)
}

fn default_simulation_epoch() -> DateTime<Utc> {
    // 2024-01-01T00:00:00Z
    DateTime::<Utc>::from_timestamp(1_704_067_200, 0).unwrap_or_default()
}

fn default_simulation_latency() -> Duration {
    Duration::from_millis(5)
}

fn default_simulation_seed() -> u64 {
    0xB_C0_u64
}

fn default_logging_directory() -> Option<PathBuf> {
    Some(PathBuf::from("target/logs"))
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_listen() -> SocketAddr {
    "0.0.0.0:8088".parse().expect("valid default api address")
}

fn default_audit_log() -> PathBuf {
    PathBuf::from("target/audit/failover.ndjson")
}

fn default_signing_key_env() -> String {
    "R_BCO_AUDIT_KEY".to_owned()
}

/// Primary configuration object for the continuity engine and its wrappers.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub verifier: VerifierConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Metadata describing where an [`EngineConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedEngineConfig {
    pub config: EngineConfig,
    pub source: Option<PathBuf>,
}

impl EngineConfig {
    pub const ENV_CONFIG_PATH: &'static str = "R_BCO_CONFIG";

    /// Load configuration from the first existing candidate, respecting `R_BCO_CONFIG`.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Like [`EngineConfig::load`] but falls back to defaults when no file exists.
    /// The environment override is still mandatory when set.
    pub fn load_or_default<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedEngineConfig> {
        match Self::load_with_source(candidates) {
            Ok(loaded) => Ok(loaded),
            Err(_) if !Self::env_override_present() && !candidates_exist(candidates) => {
                debug!("no engine configuration found; using defaults");
                Ok(LoadedEngineConfig {
                    config: Self::default(),
                    source: None,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedEngineConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedEngineConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedEngineConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn env_override_present() -> bool {
        std::env::var(Self::ENV_CONFIG_PATH)
            .map(|value| !value.trim().is_empty())
            .unwrap_or(false)
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading engine configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<EngineConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.monitor.staleness_threshold.is_zero() {
            return Err(anyhow!("monitor.staleness_threshold_ms must be positive"));
        }
        if self.verifier.freshness_sla.is_zero() {
            return Err(anyhow!("verifier.freshness_sla_ms must be positive"));
        }
        self.api.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for EngineConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: EngineConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

fn candidates_exist<P: AsRef<Path>>(candidates: &[P]) -> bool {
    candidates.iter().any(|candidate| candidate.as_ref().exists())
}

/// Heartbeat monitor settings.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Age after which a node's last heartbeat no longer counts as healthy.
    #[serde(
        rename = "staleness_threshold_ms",
        default = "default_staleness_threshold"
    )]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub staleness_threshold: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            staleness_threshold: default_staleness_threshold(),
        }
    }
}

/// Post-failover verification settings.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Maximum tolerated age of the new primary's latest heartbeat.
    #[serde(rename = "freshness_sla_ms", default = "default_freshness_sla")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub freshness_sla: Duration,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            freshness_sla: default_freshness_sla(),
        }
    }
}

/// What-if simulation settings.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Virtual start time for simulated runs.
    #[serde(default = "default_simulation_epoch")]
    pub epoch: DateTime<Utc>,
    /// Latency stamped on injected heartbeats.
    #[serde(rename = "heartbeat_latency_ms", default = "default_simulation_latency")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub heartbeat_latency: Duration,
    /// Seed used when a caller does not provide one.
    #[serde(default = "default_simulation_seed")]
    pub default_seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            epoch: default_simulation_epoch(),
            heartbeat_latency: default_simulation_latency(),
            default_seed: default_simulation_seed(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for rolling JSON log files; `None` disables file output.
    #[serde(default = "default_logging_directory")]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub console: ConsoleTarget,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            console: ConsoleTarget::default(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

/// Caller roles recognised by the HTTP layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ApiRole {
    Admin,
    Service,
    Viewer,
}

impl ApiRole {
    /// Only admin and service callers may drive the engine.
    pub fn may_operate(&self) -> bool {
        matches!(self, ApiRole::Admin | ApiRole::Service)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiRole::Admin => "admin",
            ApiRole::Service => "service",
            ApiRole::Viewer => "viewer",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
    /// API key to role assignments.
    #[serde(default)]
    pub keys: IndexMap<String, ApiRole>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            listen: default_api_listen(),
            keys: IndexMap::new(),
        }
    }
}

impl ApiConfig {
    pub fn validate(&self) -> Result<()> {
        if self.keys.keys().any(|key| key.trim().is_empty()) {
            return Err(anyhow!("api.keys must not contain empty keys"));
        }
        Ok(())
    }

    pub fn role_for(&self, key: &str) -> Option<ApiRole> {
        self.keys.get(key).copied()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Append-only audit trail written by `execute`.
    #[serde(default = "default_audit_log")]
    pub log_path: PathBuf,
    /// Environment variable holding the HMAC signing key, if any.
    #[serde(default = "default_signing_key_env")]
    pub signing_key_env: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_path: default_audit_log(),
            signing_key_env: default_signing_key_env(),
        }
    }
}

impl AuditConfig {
    /// Resolve the signing key from the configured environment variable.
    pub fn signing_key(&self) -> Option<Vec<u8>> {
        std::env::var(&self.signing_key_env)
            .ok()
            .filter(|value| !value.is_empty())
            .map(String::into_bytes)
    }
}
