//! Mapping of persisted connections to label sets and gauge values.

use tcpscope_common::constants::PUBLISH_THRESHOLD_BYTES;
use tcpscope_common::types::{ConnectionObservation, LabelKey};

use crate::pods::PodIndex;

/// Gauge values to set for one label set. `None` leaves the series alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    /// Series identity.
    pub key: LabelKey,
    /// Original-direction bytes, when above the threshold.
    pub send_bytes: Option<u64>,
    /// Reply-direction bytes, when above the threshold.
    pub resp_bytes: Option<u64>,
    /// Original-direction packets, when packet collection is on.
    pub send_packets: Option<u64>,
    /// Reply-direction packets, when packet collection is on.
    pub resp_packets: Option<u64>,
}

impl Publication {
    /// Returns `true` if at least one gauge will be set.
    #[must_use]
    pub const fn sets_any_gauge(&self) -> bool {
        self.send_bytes.is_some()
            || self.resp_bytes.is_some()
            || self.send_packets.is_some()
            || self.resp_packets.is_some()
    }
}

/// Joins an observation with the pod table.
#[must_use]
pub fn label_key(obs: &ConnectionObservation, pods: &PodIndex) -> LabelKey {
    LabelKey {
        src_ip: obs.src_ip,
        src_pod: pods.resolve(&obs.src_ip).to_owned(),
        dst_ip: obs.dst_ip,
        dst_pod: pods.resolve(&obs.dst_ip).to_owned(),
        src_port: obs.src_port,
        dst_port: obs.dst_port,
    }
}

const fn above_threshold(bytes: u64) -> Option<u64> {
    if bytes > PUBLISH_THRESHOLD_BYTES {
        Some(bytes)
    } else {
        None
    }
}

/// Builds the publication for a persisted connection.
///
/// Byte gauges are set only above [`PUBLISH_THRESHOLD_BYTES`]. Packet
/// gauges follow the byte gauges: they are set whenever packet collection
/// is on and at least one byte gauge is set.
#[must_use]
pub fn build_publication(
    obs: &ConnectionObservation,
    pods: &PodIndex,
    collect_packets: bool,
) -> Publication {
    let send_bytes = above_threshold(obs.send_bytes);
    let resp_bytes = above_threshold(obs.resp_bytes);
    let with_packets = collect_packets && (send_bytes.is_some() || resp_bytes.is_some());

    Publication {
        key: label_key(obs, pods),
        send_bytes,
        resp_bytes,
        send_packets: with_packets.then_some(obs.send_packets),
        resp_packets: with_packets.then_some(obs.resp_packets),
    }
}
