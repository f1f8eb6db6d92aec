//! Labelled gauge collection exposed to scrapes.
//!
//! Gauges live in a private `prometheus` registry. Writes go through
//! [`crate::state::SharedState`], which serialises them with the freshness
//! table; scrapes gather the registry directly.

use std::collections::{HashMap, HashSet};

use prometheus::proto::MetricFamily;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tcpscope_common::constants::{
    LABEL_NAMES, METRIC_RESP_BYTES, METRIC_RESP_PACKETS, METRIC_SEND_BYTES, METRIC_SEND_PACKETS,
};
use tcpscope_common::error::{Result, TcpscopeError};
use tcpscope_common::types::LabelKey;

use crate::labels::Publication;

/// One of the published series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Series {
    /// Bytes in the original direction.
    SendBytes,
    /// Bytes in the reply direction.
    RespBytes,
    /// Packets in the original direction.
    SendPackets,
    /// Packets in the reply direction.
    RespPackets,
}

impl Series {
    /// Metric name of this series.
    #[must_use]
    pub const fn metric_name(self) -> &'static str {
        match self {
            Self::SendBytes => METRIC_SEND_BYTES,
            Self::RespBytes => METRIC_RESP_BYTES,
            Self::SendPackets => METRIC_SEND_PACKETS,
            Self::RespPackets => METRIC_RESP_PACKETS,
        }
    }
}

/// The gauge vectors for every series, registered in one registry.
#[derive(Clone)]
pub struct GaugeCollection {
    registry: Registry,
    send_bytes: GaugeVec,
    resp_bytes: GaugeVec,
    packets: Option<(GaugeVec, GaugeVec)>,
}

impl std::fmt::Debug for GaugeCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaugeCollection")
            .field("collect_packets", &self.collects_packets())
            .finish_non_exhaustive()
    }
}

fn metrics_error(e: &prometheus::Error) -> TcpscopeError {
    TcpscopeError::Metrics {
        message: e.to_string(),
    }
}

fn register_gauge(registry: &Registry, name: &str, help: &str) -> Result<GaugeVec> {
    let gauge = GaugeVec::new(Opts::new(name, help), &LABEL_NAMES).map_err(|e| metrics_error(&e))?;
    registry
        .register(Box::new(gauge.clone()))
        .map_err(|e| metrics_error(&e))?;
    Ok(gauge)
}

impl GaugeCollection {
    /// Creates and registers the byte gauges, plus the packet gauges when
    /// `collect_packets` is set. On Linux the registry also carries the
    /// standard `process_*` metrics of the exporter itself.
    ///
    /// # Errors
    ///
    /// Returns an error if a gauge cannot be created or registered.
    pub fn new(collect_packets: bool) -> Result<Self> {
        let registry = Registry::new();
        #[cfg(target_os = "linux")]
        registry
            .register(Box::new(prometheus::process_collector::ProcessCollector::for_self()))
            .map_err(|e| metrics_error(&e))?;
        let send_bytes =
            register_gauge(&registry, METRIC_SEND_BYTES, "Total number of sent TCP bytes")?;
        let resp_bytes =
            register_gauge(&registry, METRIC_RESP_BYTES, "Total number of response TCP bytes")?;
        let packets = if collect_packets {
            Some((
                register_gauge(&registry, METRIC_SEND_PACKETS, "Total packets sent")?,
                register_gauge(&registry, METRIC_RESP_PACKETS, "Total packets responded")?,
            ))
        } else {
            None
        };

        Ok(Self {
            registry,
            send_bytes,
            resp_bytes,
            packets,
        })
    }

    /// Returns `true` if packet gauges are registered.
    #[must_use]
    pub const fn collects_packets(&self) -> bool {
        self.packets.is_some()
    }

    fn vec_for(&self, series: Series) -> Option<&GaugeVec> {
        match series {
            Series::SendBytes => Some(&self.send_bytes),
            Series::RespBytes => Some(&self.resp_bytes),
            Series::SendPackets => self.packets.as_ref().map(|(send, _)| send),
            Series::RespPackets => self.packets.as_ref().map(|(_, resp)| resp),
        }
    }

    /// Sets one series for `key`. Packet series are ignored when packet
    /// collection is off.
    #[allow(clippy::cast_precision_loss)]
    pub fn set(&self, series: Series, key: &LabelKey, value: u64) {
        if let Some(vec) = self.vec_for(series) {
            let values = key.label_values();
            let refs = values.each_ref().map(String::as_str);
            vec.with_label_values(&refs).set(value as f64);
        }
    }

    /// Sets every series present in `publication`. Returns the number of
    /// series written.
    pub fn apply(&self, publication: &Publication) -> usize {
        let updates = [
            (Series::SendBytes, publication.send_bytes),
            (Series::RespBytes, publication.resp_bytes),
            (Series::SendPackets, publication.send_packets),
            (Series::RespPackets, publication.resp_packets),
        ];
        let mut written = 0;
        for (series, value) in updates {
            if let Some(value) = value {
                self.set(series, &publication.key, value);
                written += 1;
            }
        }
        written
    }

    /// Deletes every series labelled with `key`. Returns how many existed.
    pub fn remove(&self, key: &LabelKey) -> usize {
        let values = key.label_values();
        let refs = values.each_ref().map(String::as_str);
        let mut vecs = vec![&self.send_bytes, &self.resp_bytes];
        if let Some((send, resp)) = &self.packets {
            vecs.push(send);
            vecs.push(resp);
        }
        vecs.into_iter()
            .filter(|vec| vec.remove_label_values(&refs).is_ok())
            .count()
    }

    /// Gathers the current metric families.
    #[must_use]
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Renders the collection in the text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.gather(), &mut buffer)
            .map_err(|e| metrics_error(&e))?;
        String::from_utf8(buffer).map_err(|e| TcpscopeError::Metrics {
            message: e.to_string(),
        })
    }

    /// Label sets that currently have at least one series.
    #[must_use]
    pub fn live_keys(&self) -> HashSet<LabelKey> {
        self.gather()
            .iter()
            .flat_map(|family| family.get_metric().iter())
            .filter_map(|metric| key_from_labels(metric.get_label()))
            .collect()
    }

    /// Current value of one series, if it exists.
    #[must_use]
    pub fn value(&self, series: Series, key: &LabelKey) -> Option<f64> {
        self.gather()
            .iter()
            .filter(|family| family.get_name() == series.metric_name())
            .flat_map(|family| family.get_metric().iter())
            .find(|metric| key_from_labels(metric.get_label()).as_ref() == Some(key))
            .map(|metric| metric.get_gauge().get_value())
    }
}

fn key_from_labels(labels: &[prometheus::proto::LabelPair]) -> Option<LabelKey> {
    let by_name: HashMap<&str, &str> = labels
        .iter()
        .map(|pair| (pair.get_name(), pair.get_value()))
        .collect();
    Some(LabelKey {
        src_ip: by_name.get("src_ip")?.parse().ok()?,
        src_pod: (*by_name.get("src_pod")?).to_owned(),
        dst_ip: by_name.get("dst_ip")?.parse().ok()?,
        dst_pod: (*by_name.get("dst_pod")?).to_owned(),
        src_port: by_name.get("src_port")?.parse().ok()?,
        dst_port: by_name.get("dst_port")?.parse().ok()?,
    })
}
