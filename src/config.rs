use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// UDP监听地址，缺省0.0.0.0:8053，避免1024以下端口权限问题。
    #[serde(default = "default_bind_udp")]
    pub bind_udp: String,
    /// 上游DNS（唯一）。
    #[serde(default = "default_upstream")]
    pub upstream: String,
    /// 上游超时（毫秒），0 表示不设超时。
    #[serde(default)]
    pub upstream_timeout_ms: u64,
    /// 过期条目清理周期（秒），0 表示仅在查询时惰性清理。
    #[serde(default)]
    pub cache_sweep_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_udp: default_bind_udp(),
            upstream: default_upstream(),
            upstream_timeout_ms: 0,
            cache_sweep_secs: 0,
        }
    }
}

impl Settings {
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind_udp
            .parse()
            .with_context(|| format!("parse bind addr: {}", self.bind_udp))
    }

    pub fn upstream_addr(&self) -> Result<SocketAddr> {
        self.upstream
            .parse()
            .with_context(|| format!("parse upstream addr: {}", self.upstream))
    }

    pub fn upstream_timeout(&self) -> Option<Duration> {
        (self.upstream_timeout_ms > 0).then(|| Duration::from_millis(self.upstream_timeout_ms))
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.cache_sweep_secs > 0).then(|| Duration::from_secs(self.cache_sweep_secs))
    }
}

/// Read settings from a JSON file, or fall back to defaults without one.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read config file: {}", path.display()))?;
    let cfg: Settings = serde_json::from_str(&raw)
        .with_context(|| format!("parse config file: {}", path.display()))?;

    // 轻量校验：地址提前解析，启动即失败。
    cfg.bind_addr()?;
    cfg.upstream_addr()?;

    info!(target = "config", path = %path.display(), "config loaded");

    Ok(cfg)
}

fn default_bind_udp() -> String {
    "0.0.0.0:8053".to_string()
}

fn default_upstream() -> String {
    "8.8.8.8:53".to_string()
}
