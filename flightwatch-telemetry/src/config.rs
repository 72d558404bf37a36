//! Layered settings: built-in defaults, an optional TOML file, then
//! `FLIGHTWATCH_*` environment variables (`__` separates sections, e.g.
//! `FLIGHTWATCH_SINK__PORT=2004`).

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use config::{Config, Environment, File};
use flightwatch_core::network::{DEFAULT_CHANNEL_CAPACITY, MetricsSinkConfig};
use serde::{Deserialize, Serialize};

use crate::reference::ReferenceData;

/// Environment variable prefix of [`Settings::load`].
pub const ENV_PREFIX: &str = "FLIGHTWATCH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub window_length_ms: u64,
    pub window_slide_ms: u64,
    /// How far the watermark lags the greatest event time seen.
    pub max_out_of_orderness_ms: i64,
    /// How long a window stays open past its end.
    pub allowed_lateness_ms: i64,
    pub altitude_ceiling_ft: i64,
    /// Number of classification workers.
    pub parallelism: usize,
    pub channel_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            window_length_ms: 60_000,
            window_slide_ms: 30_000,
            max_out_of_orderness_ms: 15_000,
            allowed_lateness_ms: 0,
            altitude_ceiling_ft: 3_000,
            parallelism: 2,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl PipelineSettings {
    pub fn window_length(&self) -> Duration {
        Duration::from_millis(self.window_length_ms)
    }

    pub fn window_slide(&self) -> Duration {
        Duration::from_millis(self.window_slide_ms)
    }

    pub fn max_out_of_orderness(&self) -> Duration {
        Duration::from_millis(self.max_out_of_orderness_ms.max(0) as u64)
    }

    pub fn allowed_lateness(&self) -> Duration {
        Duration::from_millis(self.allowed_lateness_ms.max(0) as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    pub host: String,
    pub port: u16,
    pub queue_capacity: usize,
    pub retry_buffer: usize,
    pub reconnect_initial_backoff_ms: u64,
    pub reconnect_max_backoff_ms: u64,
    pub shutdown_attempts: u32,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 2004,
            queue_capacity: 1024,
            retry_buffer: 10_000,
            reconnect_initial_backoff_ms: 100,
            reconnect_max_backoff_ms: 10_000,
            shutdown_attempts: 3,
        }
    }
}

impl SinkSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn to_sink_config(&self) -> MetricsSinkConfig {
        MetricsSinkConfig {
            address: self.address(),
            queue_capacity: self.queue_capacity,
            retry_buffer_capacity: self.retry_buffer,
            initial_backoff: Duration::from_millis(self.reconnect_initial_backoff_ms),
            max_backoff: Duration::from_millis(self.reconnect_max_backoff_ms),
            shutdown_attempts: self.shutdown_attempts,
            ..MetricsSinkConfig::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pipeline: PipelineSettings,
    pub sink: SinkSettings,
    pub reference: ReferenceData,
}

impl Settings {
    /// Load settings from defaults, `path` (if any) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env_prefix(path, ENV_PREFIX)
    }

    /// Like [`load`](Self::load) with a custom environment prefix.
    pub fn load_with_env_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let defaults = Config::try_from(&Settings::default())
            .context("failed to serialize default settings")?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .with_context(|| match path {
                Some(path) => format!("failed to load settings from {}", path.display()),
                None => "failed to load settings".to_string(),
            })?
            .try_deserialize()
            .context("invalid settings")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        if p.window_length_ms == 0 || p.window_slide_ms == 0 {
            bail!("pipeline.window_length_ms and pipeline.window_slide_ms must be positive");
        }
        if p.window_slide_ms > p.window_length_ms {
            bail!(
                "pipeline.window_slide_ms ({}) must not exceed pipeline.window_length_ms ({})",
                p.window_slide_ms,
                p.window_length_ms
            );
        }
        if p.max_out_of_orderness_ms < 0 || p.allowed_lateness_ms < 0 {
            bail!("pipeline lateness values must not be negative");
        }
        if p.parallelism == 0 {
            bail!("pipeline.parallelism must be at least 1");
        }
        if p.channel_capacity == 0 {
            bail!("pipeline.channel_capacity must be positive");
        }

        let s = &self.sink;
        if s.host.trim().is_empty() {
            bail!("sink.host must not be empty");
        }
        if s.queue_capacity == 0 || s.retry_buffer == 0 {
            bail!("sink.queue_capacity and sink.retry_buffer must be positive");
        }
        if s.reconnect_initial_backoff_ms == 0
            || s.reconnect_initial_backoff_ms > s.reconnect_max_backoff_ms
        {
            bail!(
                "sink reconnect backoff must satisfy 0 < initial ({}) <= max ({})",
                s.reconnect_initial_backoff_ms,
                s.reconnect_max_backoff_ms
            );
        }

        for airport in &self.reference.airports {
            if airport.radius_miles.is_nan() || airport.radius_miles <= 0.0 {
                bail!("airport {} must have a positive radius", airport.name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
