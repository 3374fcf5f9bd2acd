use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::detect::fallback::{DEFAULT_PROBABILITY, DEFAULT_TICK};
use crate::detect::link::DEFAULT_OUTBOUND_CAPACITY;
use crate::ingest::synthetic::DEFAULT_STREAM_CONNECT_DELAY;

const DEFAULT_DB_PATH: &str = "live_detect.db";
const DEFAULT_INFERENCE_ENDPOINT: &str = "ws://localhost:8080/detect";

#[derive(Debug, Deserialize, Default)]
struct PanelConfigFile {
    db_path: Option<String>,
    inference: Option<InferenceConfigFile>,
    simulation: Option<SimulationConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct InferenceConfigFile {
    endpoint: Option<String>,
    outbound_capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct SimulationConfigFile {
    fallback_enabled: Option<bool>,
    fallback_tick_ms: Option<u64>,
    fallback_probability: Option<f64>,
    stream_connect_delay_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct PanelConfig {
    pub db_path: String,
    pub inference: InferenceSettings,
    pub simulation: SimulationSettings,
}

#[derive(Debug, Clone)]
pub struct InferenceSettings {
    /// WebSocket endpoint. `None` means run on the fallback generator only.
    pub endpoint: Option<String>,
    pub outbound_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct SimulationSettings {
    pub fallback_enabled: bool,
    pub fallback_tick: Duration,
    pub fallback_probability: f64,
    pub stream_connect_delay: Duration,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            inference: InferenceSettings {
                endpoint: Some(DEFAULT_INFERENCE_ENDPOINT.to_string()),
                outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            },
            simulation: SimulationSettings {
                fallback_enabled: true,
                fallback_tick: DEFAULT_TICK,
                fallback_probability: DEFAULT_PROBABILITY,
                stream_connect_delay: DEFAULT_STREAM_CONNECT_DELAY,
            },
        }
    }
}

impl PanelConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LIVE_DETECT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PanelConfigFile) -> Self {
        let defaults = Self::default();
        let inference = file.inference.unwrap_or_default();
        let simulation = file.simulation.unwrap_or_default();
        Self {
            db_path: file.db_path.unwrap_or(defaults.db_path),
            inference: InferenceSettings {
                endpoint: match inference.endpoint {
                    Some(endpoint) => parse_endpoint(&endpoint),
                    None => defaults.inference.endpoint,
                },
                outbound_capacity: inference
                    .outbound_capacity
                    .unwrap_or(defaults.inference.outbound_capacity),
            },
            simulation: SimulationSettings {
                fallback_enabled: simulation
                    .fallback_enabled
                    .unwrap_or(defaults.simulation.fallback_enabled),
                fallback_tick: simulation
                    .fallback_tick_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.simulation.fallback_tick),
                fallback_probability: simulation
                    .fallback_probability
                    .unwrap_or(defaults.simulation.fallback_probability),
                stream_connect_delay: simulation
                    .stream_connect_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.simulation.stream_connect_delay),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("LIVE_DETECT_DB") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(endpoint) = std::env::var("LIVE_DETECT_WS") {
            if !endpoint.trim().is_empty() {
                self.inference.endpoint = parse_endpoint(&endpoint);
            }
        }
        if let Ok(flag) = std::env::var("LIVE_DETECT_FALLBACK") {
            self.simulation.fallback_enabled = match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => true,
                "0" | "false" | "off" | "no" => false,
                other => return Err(anyhow!("LIVE_DETECT_FALLBACK must be a boolean, got '{}'", other)),
            };
        }
        if let Ok(delay) = std::env::var("LIVE_DETECT_STREAM_DELAY_MS") {
            let millis: u64 = delay.trim().parse().map_err(|_| {
                anyhow!("LIVE_DETECT_STREAM_DELAY_MS must be an integer number of milliseconds")
            })?;
            self.simulation.stream_connect_delay = Duration::from_millis(millis);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if let Some(endpoint) = &self.inference.endpoint {
            let url = url::Url::parse(endpoint)
                .map_err(|e| anyhow!("invalid inference endpoint {}: {}", endpoint, e))?;
            if !matches!(url.scheme(), "ws" | "wss") {
                return Err(anyhow!(
                    "inference endpoint must use ws:// or wss://, got {}",
                    endpoint
                ));
            }
        }
        if self.inference.outbound_capacity == 0 {
            return Err(anyhow!("inference outbound_capacity must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.simulation.fallback_probability) {
            return Err(anyhow!("fallback_probability must be within 0..=1"));
        }
        if self.simulation.fallback_tick.is_zero() {
            return Err(anyhow!("fallback_tick_ms must be greater than zero"));
        }
        Ok(())
    }
}

/// `off`/`none` disable the link.
fn parse_endpoint(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "" | "off" | "none" => None,
        _ => Some(trimmed.to_string()),
    }
}

fn read_config_file(path: &Path) -> Result<PanelConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
