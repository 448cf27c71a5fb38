// src/config/engine.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "FORUM_RECON_CONFIG";
pub const ENV_BIND: &str = "FORUM_RECON_BIND";
pub const ENV_PROXY: &str = "FORUM_RECON_PROXY";
pub const ENV_DATA: &str = "FORUM_RECON_DATA";
pub const DEFAULT_CONFIG_PATH: &str = "config/forum_recon.toml";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONCURRENCY: usize = 10;

fn default_bind_addr() -> String {
    "127.0.0.1:8088".to_string()
}
fn default_data_path() -> Option<PathBuf> {
    Some(PathBuf::from("state/records.json"))
}
fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}
fn default_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    2_000
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; rv:128.0) Gecko/20100101 Firefox/128.0".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// JSON file backing the record store; `None` keeps records in memory.
    #[serde(default = "default_data_path", deserialize_with = "empty_path_is_none")]
    pub data_path: Option<PathBuf>,
    #[serde(default)]
    pub scan: ScanSettings,
    #[serde(default)]
    pub extract: ExtractSettings,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub classifier: ClassifierSettings,
    #[serde(default)]
    pub schedule: ScheduleSettings,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ScanSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound on concurrently running scans in a batch.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ExtractSettings {
    /// Bound on each network call of an extraction pass.
    #[serde(default = "default_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    /// e.g. `socks5h://127.0.0.1:9050` for Tor.
    #[serde(default)]
    pub proxy: Option<String>,
    /// Attempts per request (transport errors and 5xx only).
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub require_tor: bool,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassifierSettings {
    #[serde(default)]
    pub keywords_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ScheduleSettings {
    /// Periodic `scan_all` interval; 0 disables the scheduler.
    #[serde(default)]
    pub interval_secs: u64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: DEFAULT_TIMEOUT_SECS,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            proxy: None,
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
            require_tor: false,
            accept_invalid_certs: false,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            data_path: default_data_path(),
            scan: ScanSettings::default(),
            extract: ExtractSettings::default(),
            http: HttpSettings::default(),
            classifier: ClassifierSettings::default(),
            schedule: ScheduleSettings::default(),
        }
    }
}

impl ScanSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ExtractSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl EngineConfig {
    /// Load from an explicit path. Supports TOML or JSON.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = parse_config(&content, ext.as_str())
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg.sanitized())
    }

    /// Load using env var + fallbacks, then apply env overrides:
    /// 1) $FORUM_RECON_CONFIG
    /// 2) config/forum_recon.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        let cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                Self::load_from(&default_path)?
            } else {
                Self::default()
            }
        };
        Ok(cfg.with_env_overrides())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(bind) = std::env::var(ENV_BIND) {
            if !bind.trim().is_empty() {
                self.bind_addr = bind.trim().to_string();
            }
        }
        if let Ok(proxy) = std::env::var(ENV_PROXY) {
            self.http.proxy = Some(proxy.trim().to_string()).filter(|p| !p.is_empty());
        }
        if let Ok(data) = std::env::var(ENV_DATA) {
            self.data_path = Some(PathBuf::from(data.trim())).filter(|p| !p.as_os_str().is_empty());
        }
        self
    }

    /// Replace values that would stall the engine with defaults.
    fn sanitized(mut self) -> Self {
        if self.scan.timeout_secs == 0 {
            self.scan.timeout_secs = DEFAULT_TIMEOUT_SECS;
        }
        if self.extract.fetch_timeout_secs == 0 {
            self.extract.fetch_timeout_secs = DEFAULT_TIMEOUT_SECS;
        }
        self.scan.concurrency = self.scan.concurrency.max(1);
        self.extract.concurrency = self.extract.concurrency.max(1);
        self.http.retries = self.http.retries.max(1);
        self
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<EngineConfig> {
    if hint_ext == "json" {
        return serde_json::from_str(s).context("invalid JSON config");
    }
    match toml::from_str(s) {
        Ok(cfg) => Ok(cfg),
        Err(toml_err) => serde_json::from_str(s)
            .map_err(|_| anyhow!("unsupported config format: {toml_err}")),
    }
}

fn empty_path_is_none<'de, D>(de: D) -> std::result::Result<Option<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(de)?;
    Ok(raw
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from))
}
