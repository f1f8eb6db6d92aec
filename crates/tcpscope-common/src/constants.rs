//! System-wide constants and defaults.

/// Default snapshot file, relative to the working directory.
pub const DEFAULT_SNAPSHOT_FILE: &str = "conntrack.txt";

/// Default connection-tracking program.
pub const DEFAULT_CONNTRACK_PROGRAM: &str = "conntrack";

/// Arguments selecting established TCP connections from `conntrack`.
pub const CONNTRACK_ARGS: [&str; 5] = ["-p", "tcp", "--state", "ESTABLISHED", "-L"];

/// State keyword that precedes the address groups in a report line.
pub const ESTABLISHED_KEYWORD: &str = "ESTABLISHED";

/// Byte counts must be strictly greater than this to be published.
pub const PUBLISH_THRESHOLD_BYTES: u64 = 1024;

/// Default seconds between sampling cycles.
pub const DEFAULT_SAMPLE_INTERVAL_SECS: u64 = 10;

/// Default seconds a series may stay idle before eviction.
pub const DEFAULT_METRIC_TTL_SECS: u64 = 15;

/// Default seconds between eviction sweeps.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 15;

/// Default seconds between pod table refreshes.
pub const DEFAULT_POD_REFRESH_SECS: u64 = 30 * 60;

/// Default deadline for one `conntrack` invocation.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 10;

/// Default deadline for one pod list call.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

/// Default namespace queried for pods.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Default port for the metrics endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 9149;

/// Default path for the metrics endpoint.
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

/// Health probe path served next to the metrics endpoint.
pub const HEALTH_PATH: &str = "/healthz";

/// Gauge for bytes sent in the original direction.
pub const METRIC_SEND_BYTES: &str = "tcp_send_bytes_total";

/// Gauge for bytes sent in the reply direction.
pub const METRIC_RESP_BYTES: &str = "tcp_resp_bytes_total";

/// Gauge for packets sent in the original direction.
pub const METRIC_SEND_PACKETS: &str = "tcp_send_packets_total";

/// Gauge for packets sent in the reply direction.
pub const METRIC_RESP_PACKETS: &str = "tcp_resp_packets_total";

/// Label names carried by every series, in registration order.
pub const LABEL_NAMES: [&str; 6] = [
    "src_ip", "src_pod", "src_port", "dst_ip", "dst_pod", "dst_port",
];
