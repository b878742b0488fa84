use anyhow::{Context, Result};
use chrono::TimeDelta;
use serde::Deserialize;
use std::{fs, net::SocketAddr, path::Path, time::Duration};
use validator::Validate;

const DEFAULT_CONFIG_PATH: &str = "config/fishcast.json";

/// Upper bound for `rate_limit.window_secs` (one year).
pub const MAX_WINDOW_SECS: u64 = 31_536_000;
/// Upper bound for `day_to_horizon_days` (ten years).
pub const MAX_HORIZON_DAYS: i64 = 3650;

#[derive(Deserialize, Debug, Clone, PartialEq, Validate)]
#[serde(default)]
pub struct RateLimitConfig {
    #[validate(range(min = 1))]
    pub max_requests: u32,
    #[validate(range(min = 1, max = 31536000))]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_secs: 3600,
        }
    }
}

impl RateLimitConfig {
    /// Window length, capped at `MAX_WINDOW_SECS` so record arithmetic stays in range.
    pub fn window(&self) -> TimeDelta {
        TimeDelta::seconds(self.window_secs.min(MAX_WINDOW_SECS) as i64)
    }
}

/// Tuning for the placeholder model used when no trained model is configured.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PlaceholderConfig {
    pub fallback_daily_gain: f64,
    pub series_base: f64,
    pub series_trend: f64,
    pub series_volatility: f64,
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        Self {
            fallback_daily_gain: 0.02,
            series_base: 100.0,
            series_trend: 0.5,
            series_volatility: 5.0,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Validate)]
#[serde(default)]
pub struct ServiceConfig {
    #[validate(length(min = 1))]
    pub bind_addr: String,
    pub port: u16,
    #[validate(range(min = 1))]
    pub window_size: usize,
    #[validate(range(min = 1))]
    pub batch_limit: usize,
    #[validate(range(min = 0, max = 3650))]
    pub day_to_horizon_days: i64,
    #[validate(range(min = 1))]
    pub model_timeout_ms: u64,
    pub model_path: Option<String>,
    pub meta_path: Option<String>,
    pub log_features: bool,
    #[validate(nested)]
    pub rate_limit: RateLimitConfig,
    pub placeholder: PlaceholderConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 5000,
            window_size: 7,
            batch_limit: 10,
            day_to_horizon_days: 0,
            model_timeout_ms: 5000,
            model_path: None,
            meta_path: None,
            log_features: false,
            rate_limit: RateLimitConfig::default(),
            placeholder: PlaceholderConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Reads `CONFIG_PATH` (or the default path when present), then applies env overrides.
    pub fn from_env() -> Result<Self> {
        let mut cfg = match std::env::var("CONFIG_PATH") {
            Ok(path) => Self::load(&path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH)?,
            Err(_) => Self::default(),
        };
        cfg.apply_env(|key| std::env::var(key).ok());
        cfg.validate().context("configuration validation failed")?;
        Ok(cfg)
    }

    pub fn load(path: &str) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path))?;
        serde_json::from_str(&data).with_context(|| format!("invalid config JSON in {}", path))
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(port) = var("PORT").and_then(|s| s.parse().ok()) {
            self.port = port;
        }
        if let Some(addr) = var("BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(path) = var("MODEL_PATH") {
            self.model_path = Some(path);
        }
        if let Some(path) = var("META_PATH") {
            self.meta_path = Some(path);
        }
        if var("LOG_PRED").as_deref() == Some("1") {
            self.log_features = true;
        }
        if let Some(n) = var("RATE_LIMIT_MAX_REQUESTS").and_then(|s| s.parse().ok()) {
            self.rate_limit.max_requests = n;
        }
        if let Some(secs) = var("RATE_LIMIT_WINDOW_SECS").and_then(|s| s.parse().ok()) {
            self.rate_limit.window_secs = secs;
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_addr, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.bind_addr, self.port))
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_millis(self.model_timeout_ms)
    }
}
