//! Adapter configuration
//!
//! All durations are plain millisecond integers so the struct maps one-to-one
//! onto a TOML table:
//!
//! ```toml
//! user_id = "npacgw"
//! invoke_id_prefix = "NPAC-"
//! retry_interval_ms = 60000
//! resend_timeout_ms = 120000
//! recovery_interval_ms = 3600000
//! time_range_regions = [5, 6]
//!
//! [region_retry_interval_ms]
//! 7 = 300000
//! ```

use infra_common::ErrorExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::errors::{NpacError, NpacResult};
use crate::types::{RecoveryStyle, Region, MIN_RECOVERY_INTERVAL};

/// Configuration for [`NpacAdapter`](crate::adapter::NpacAdapter)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdapterConfig {
    /// User id sent with new-session requests
    pub user_id: String,

    /// Prefix for generated invoke ids
    pub invoke_id_prefix: String,

    /// Default backoff before a retry fires
    pub retry_interval_ms: u64,

    /// Per-region backoff overrides, keyed by region id (TOML keys are strings)
    pub region_retry_interval_ms: BTreeMap<String, u64>,

    /// How long a pending request waits for its reply
    pub resend_timeout_ms: u64,

    /// Initial recovery window length per request
    pub recovery_interval_ms: u64,

    /// Subtracted from the stored last notification time before recovering
    pub recovery_padding_ms: u64,

    /// Regions that use time-range recovery instead of sequence recovery
    pub time_range_regions: Vec<u8>,

    /// Maximum number of handler callbacks running at once
    pub max_concurrent_tasks: usize,

    /// How long shutdown waits for in-flight work
    pub shutdown_timeout_ms: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            user_id: "npacgw".to_string(),
            invoke_id_prefix: "NPAC-".to_string(),
            retry_interval_ms: 60_000,
            region_retry_interval_ms: BTreeMap::new(),
            resend_timeout_ms: 120_000,
            recovery_interval_ms: 3_600_000,
            recovery_padding_ms: 0,
            time_range_regions: Vec::new(),
            max_concurrent_tasks: 64,
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl AdapterConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(input: &str) -> NpacResult<Self> {
        let config: AdapterConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> NpacResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context("config", format!("read {}", path.display()))?;
        Self::from_toml_str(&contents)
    }

    /// Check the values the recovery walk depends on
    pub fn validate(&self) -> NpacResult<()> {
        if self.recovery_interval() < MIN_RECOVERY_INTERVAL {
            return Err(NpacError::Config(format!(
                "recovery_interval_ms must be at least {} (got {})",
                MIN_RECOVERY_INTERVAL.as_millis(),
                self.recovery_interval_ms
            )));
        }
        if self.resend_timeout_ms == 0 {
            return Err(NpacError::Config("resend_timeout_ms must be non-zero".to_string()));
        }
        if self.retry_interval_ms == 0 {
            return Err(NpacError::Config("retry_interval_ms must be non-zero".to_string()));
        }
        for id in &self.time_range_regions {
            Region::new(*id)?;
        }
        for key in self.region_retry_interval_ms.keys() {
            let id: u8 = key.parse().map_err(|_| {
                NpacError::Config(format!("region_retry_interval_ms key '{}' is not a region id", key))
            })?;
            Region::new(id)?;
        }
        Ok(())
    }

    pub fn resend_timeout(&self) -> Duration {
        Duration::from_millis(self.resend_timeout_ms)
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_millis(self.recovery_interval_ms)
    }

    pub fn recovery_padding(&self) -> Duration {
        Duration::from_millis(self.recovery_padding_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Backoff for retries in `region`, falling back to the default interval
    pub fn retry_interval(&self, region: Region) -> Duration {
        let ms = self
            .region_retry_interval_ms
            .get(&region.id().to_string())
            .copied()
            .unwrap_or(self.retry_interval_ms);
        Duration::from_millis(ms)
    }

    pub fn recovery_style(&self, region: Region) -> RecoveryStyle {
        if self.time_range_regions.contains(&region.id()) {
            RecoveryStyle::TimeRange
        } else {
            RecoveryStyle::Sequence
        }
    }
}
