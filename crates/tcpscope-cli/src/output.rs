//! Formatted output helpers for CLI commands.
//!
//! Table formatting for connection listings and human-readable byte
//! counts.

use std::fmt::Write as _;

use tcpscope_common::types::ConnectionObservation;

/// Formats a byte count into a human-readable string (e.g., "128 MiB").
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Renders connections as an aligned table, one row per connection.
#[must_use]
pub fn connection_table(connections: &[ConnectionObservation]) -> String {
    let mut out = format!(
        "{:<45} {:<45} {:>10} {:>10} {:>12}\n",
        "SOURCE", "DESTINATION", "SENT", "RECEIVED", "PACKETS"
    );
    for c in connections {
        let identity = c.identity();
        let _ = writeln!(
            out,
            "{:<45} {:<45} {:>10} {:>10} {:>12}",
            endpoint(identity.src_ip, identity.src_port),
            endpoint(identity.dst_ip, identity.dst_port),
            format_bytes(c.send_bytes),
            format_bytes(c.resp_bytes),
            format!("{}/{}", c.send_packets, c.resp_packets),
        );
    }
    out
}

fn endpoint(ip: std::net::IpAddr, port: u16) -> String {
    std::net::SocketAddr::new(ip, port).to_string()
}
