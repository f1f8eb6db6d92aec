//! Exporter configuration model.
//!
//! The configuration is assembled from an optional YAML file and then
//! overridden field by field from command-line flags. Durations use the
//! compact `1h30m` / `10s` / `500ms` notation; a bare integer is seconds.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{Result, TcpscopeError};

/// Root configuration for the exporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExporterConfig {
    /// Sleep between sampling cycles.
    #[serde(with = "duration_str")]
    pub sample_interval: Duration,
    /// Whether packet-count gauges are published.
    pub collect_packets: bool,
    /// Source addresses whose connections are never published.
    pub ignore_src_ips: Vec<IpAddr>,
    /// Kubeconfig path; `None` uses in-cluster or default discovery.
    pub kubeconfig: Option<PathBuf>,
    /// Namespaces whose pods are indexed.
    pub namespaces: Vec<String>,
    /// Sleep between pod table refreshes.
    #[serde(with = "duration_str")]
    pub pod_refresh_interval: Duration,
    /// Address the metrics endpoint binds to.
    pub listen_addr: IpAddr,
    /// Port the metrics endpoint binds to.
    pub metrics_port: u16,
    /// HTTP path serving the exposition text.
    pub metrics_path: String,
    /// File holding the previous connection-tracking report.
    pub snapshot_file: PathBuf,
    /// Program queried for the connection-tracking report.
    pub conntrack_program: PathBuf,
    /// Deadline for one report query.
    #[serde(with = "duration_str")]
    pub command_timeout: Duration,
    /// Deadline for one pod list call.
    #[serde(with = "duration_str")]
    pub api_timeout: Duration,
    /// Idle time after which a series is evicted.
    #[serde(with = "duration_str")]
    pub metric_ttl: Duration,
    /// Time between eviction sweeps.
    #[serde(with = "duration_str")]
    pub sweep_interval: Duration,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(constants::DEFAULT_SAMPLE_INTERVAL_SECS),
            collect_packets: false,
            ignore_src_ips: Vec::new(),
            kubeconfig: None,
            namespaces: vec![constants::DEFAULT_NAMESPACE.to_owned()],
            pod_refresh_interval: Duration::from_secs(constants::DEFAULT_POD_REFRESH_SECS),
            listen_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            metrics_port: constants::DEFAULT_METRICS_PORT,
            metrics_path: constants::DEFAULT_METRICS_PATH.to_owned(),
            snapshot_file: PathBuf::from(constants::DEFAULT_SNAPSHOT_FILE),
            conntrack_program: PathBuf::from(constants::DEFAULT_CONNTRACK_PROGRAM),
            command_timeout: Duration::from_secs(constants::DEFAULT_COMMAND_TIMEOUT_SECS),
            api_timeout: Duration::from_secs(constants::DEFAULT_API_TIMEOUT_SECS),
            metric_ttl: Duration::from_secs(constants::DEFAULT_METRIC_TTL_SECS),
            sweep_interval: Duration::from_secs(constants::DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl ExporterConfig {
    /// Loads a configuration from a YAML file. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid YAML
    /// for this model.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TcpscopeError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_yaml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "configuration file loaded");
        Ok(config)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns a [`TcpscopeError::Config`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("sample_interval", self.sample_interval),
            ("pod_refresh_interval", self.pod_refresh_interval),
            ("command_timeout", self.command_timeout),
            ("api_timeout", self.api_timeout),
            ("metric_ttl", self.metric_ttl),
            ("sweep_interval", self.sweep_interval),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, d)| d.is_zero()) {
            return Err(config_error(format!("{name} must be greater than zero")));
        }
        if self.namespaces.is_empty() || self.namespaces.iter().any(String::is_empty) {
            return Err(config_error("at least one non-empty namespace is required".into()));
        }
        if !self.metrics_path.starts_with('/') {
            return Err(config_error(format!(
                "metrics path must start with '/': {}",
                self.metrics_path
            )));
        }
        if self.metrics_path == constants::HEALTH_PATH {
            return Err(config_error(format!(
                "metrics path collides with {}",
                constants::HEALTH_PATH
            )));
        }
        if self.sweep_interval > self.metric_ttl {
            return Err(config_error(format!(
                "sweep_interval ({}) must not exceed metric_ttl ({})",
                format_duration(self.sweep_interval),
                format_duration(self.metric_ttl)
            )));
        }
        Ok(())
    }

    /// Returns the socket address of the metrics endpoint.
    #[must_use]
    pub const fn metrics_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_addr, self.metrics_port)
    }
}

fn config_error(message: String) -> TcpscopeError {
    TcpscopeError::Config { message }
}

/// Splits a comma-separated flag value, trimming entries and dropping
/// empty ones.
#[must_use]
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Parses a comma-separated list of IP addresses.
///
/// # Errors
///
/// Returns an error naming the first entry that is not an IP address.
pub fn parse_ip_list(s: &str) -> Result<Vec<IpAddr>> {
    split_list(s)
        .into_iter()
        .map(|item| {
            item.parse::<IpAddr>().map_err(|_| TcpscopeError::Parse {
                what: "IP address",
                input: item,
            })
        })
        .collect()
}

/// Parses durations like `30m`, `1h30m`, `10s`, `250ms`, or bare seconds.
///
/// # Errors
///
/// Returns an error for empty input, unknown units, or overflow.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let invalid = || TcpscopeError::Parse {
        what: "duration",
        input: s.to_owned(),
    };
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }
    if let Ok(secs) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = trimmed;
    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits_end == 0 {
            return Err(invalid());
        }
        let value: u64 = rest[..digits_end].parse().map_err(|_| invalid())?;
        rest = &rest[digits_end..];

        let unit_end = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let part = match &rest[..unit_end] {
            "ms" => Some(Duration::from_millis(value)),
            "s" => Some(Duration::from_secs(value)),
            "m" => value.checked_mul(60).map(Duration::from_secs),
            "h" => value.checked_mul(3600).map(Duration::from_secs),
            _ => None,
        }
        .ok_or_else(invalid)?;
        total = total.checked_add(part).ok_or_else(invalid)?;
        rest = &rest[unit_end..];
    }
    Ok(total)
}

/// Formats a duration in the notation accepted by [`parse_duration`].
#[must_use]
pub fn format_duration(d: Duration) -> String {
    if d.subsec_millis() != 0 || d.as_secs() == 0 {
        return format!("{}ms", d.as_millis());
    }
    let secs = d.as_secs();
    if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => super::parse_duration(&text).map_err(serde::de::Error::custom),
        }
    }
}
