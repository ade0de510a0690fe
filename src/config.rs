use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::trace;

use crate::storage::DEFAULT_KEY_PREFIX;

const LIBRATO_EMAIL: &str = "LIBRATO_EMAIL";
const LIBRATO_TOKEN: &str = "LIBRATO_TOKEN";
const LIBRATO_SOURCE: &str = "LIBRATO_SOURCE";

/// Storage backend configuration
#[derive(Debug, Clone, PartialEq, Default, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory store (no persistence)
    #[default]
    Memory,

    /// SQLite database
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./canaryd.db")
}

/// Credentials for the Librato metrics exporter
#[derive(Debug, Clone, PartialEq)]
pub struct LibratoConfig {
    pub email: String,
    pub token: String,
    pub source: String,
}

impl LibratoConfig {
    /// Read `LIBRATO_EMAIL`, `LIBRATO_TOKEN` and `LIBRATO_SOURCE`
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from a variable lookup. All three values must be non-empty.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

        Some(Self {
            email: get(LIBRATO_EMAIL)?,
            token: get(LIBRATO_TOKEN)?,
            source: get(LIBRATO_SOURCE)?,
        })
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind: IpAddr,

    /// Port the HTTP server binds to
    pub port: u16,

    /// Seconds of measurements to keep per check
    pub retention_secs: i64,

    /// Namespace prefix of per-check store keys
    pub key_prefix: String,

    /// Upstream sensors streaming measurements over HTTP
    pub sensord_urls: Vec<String>,

    /// Datagram listener address (disabled when unset)
    pub udp_bind: Option<SocketAddr>,

    pub storage: StorageConfig,

    /// Capacity of the recorder's measurement queue
    pub recorder_queue: usize,

    /// Capacity of the hub's request queue
    pub hub_queue: usize,

    /// Messages buffered per stream subscriber before it counts as failed
    pub subscriber_buffer: usize,

    /// Fixed delay before a failed transport is retried
    pub ingest_retry_ms: u64,

    /// Interval between metric exports
    pub metrics_interval_secs: u64,

    #[serde(skip)]
    pub librato: Option<LibratoConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5000,
            retention_secs: 60,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            sensord_urls: Vec::new(),
            udp_bind: None,
            storage: StorageConfig::default(),
            recorder_queue: 1024,
            hub_queue: 1024,
            subscriber_buffer: 64,
            ingest_retry_ms: 1000,
            metrics_interval_secs: 10,
            librato: None,
        }
    }
}

impl Config {
    /// Resolve the effective configuration: file, then flags, then environment
    pub fn load(args: &Args) -> anyhow::Result<Self> {
        let mut config = match &args.config {
            Some(path) => read_config_file(path)?,
            None => Config::default(),
        };

        config.apply(args);
        config.librato = LibratoConfig::from_env();
        config.validate()?;

        trace!("effective config: {config:?}");
        Ok(config)
    }

    /// Override fields with the flags that were given
    pub fn apply(&mut self, args: &Args) {
        if let Some(bind) = args.bind {
            self.bind = bind;
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(retention) = args.retention {
            self.retention_secs = retention;
        }
        if let Some(prefix) = &args.key_prefix {
            self.key_prefix = prefix.clone();
        }
        if !args.sensord_urls.is_empty() {
            self.sensord_urls = args.sensord_urls.clone();
        }
        if let Some(udp_bind) = args.udp_bind {
            self.udp_bind = Some(udp_bind);
        }

        match (args.storage, &args.sqlite_path) {
            (Some(StorageKind::Memory), _) => self.storage = StorageConfig::Memory,
            (_, Some(path)) => {
                self.storage = StorageConfig::Sqlite { path: path.clone() };
            }
            (Some(StorageKind::Sqlite), None) => {
                if !matches!(self.storage, StorageConfig::Sqlite { .. }) {
                    self.storage = StorageConfig::Sqlite {
                        path: default_sqlite_path(),
                    };
                }
            }
            (None, None) => {}
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.retention_secs <= 0 {
            anyhow::bail!("retention must be positive, got {}", self.retention_secs);
        }
        if self.key_prefix.is_empty() {
            anyhow::bail!("key prefix must not be empty");
        }
        if self.recorder_queue == 0 || self.hub_queue == 0 || self.subscriber_buffer == 0 {
            anyhow::bail!("queue capacities must be at least 1");
        }
        Ok(())
    }

    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn ingest_retry(&self) -> Duration {
        Duration::from_millis(self.ingest_retry_ms)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    Memory,
    Sqlite,
}

/// Command line flags. Every flag overrides the matching config file field.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "canaryd", version, about)]
pub struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Port the HTTP server should bind to
    #[arg(long)]
    pub port: Option<u16>,

    /// Address the HTTP server should bind to
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Seconds of each check's measurements to keep
    #[arg(long)]
    pub retention: Option<i64>,

    /// Sensor URLs to stream measurements from (comma separated, repeatable)
    #[arg(long = "sensord-url", value_delimiter = ',')]
    pub sensord_urls: Vec<String>,

    /// Address for the datagram listener
    #[arg(long)]
    pub udp_bind: Option<SocketAddr>,

    /// Storage backend
    #[arg(long, value_enum)]
    pub storage: Option<StorageKind>,

    /// SQLite database path (implies `--storage sqlite`)
    #[arg(long)]
    pub sqlite_path: Option<PathBuf>,

    /// Namespace prefix for store keys
    #[arg(long)]
    pub key_prefix: Option<String>,

    /// Log verbosity (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

pub fn read_config_file(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
