use std::path::PathBuf;
use std::str::FromStr;

use crate::limits::DEFAULT_COMPACT_THRESHOLD;

/// Server settings, read from `BOOTHGRID_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    pub compact_threshold: u64,
    /// Prometheus exporter port; disabled when unset.
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5480,
            bind: "0.0.0.0".into(),
            data_dir: PathBuf::from("./data"),
            max_connections: 256,
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            metrics_port: None,
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            port: parsed(&lookup, "BOOTHGRID_PORT").unwrap_or(defaults.port),
            bind: lookup("BOOTHGRID_BIND").unwrap_or(defaults.bind),
            data_dir: lookup("BOOTHGRID_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            max_connections: parsed(&lookup, "BOOTHGRID_MAX_CONNECTIONS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_connections),
            compact_threshold: parsed(&lookup, "BOOTHGRID_COMPACT_THRESHOLD")
                .filter(|n: &u64| *n > 0)
                .unwrap_or(defaults.compact_threshold),
            metrics_port: parsed(&lookup, "BOOTHGRID_METRICS_PORT"),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("layouts.wal")
    }
}
