//! `tcpscope serve`: run the exporter.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tcpscope_collector::conntrack::ConntrackCommand;
use tcpscope_collector::differ::IgnoreList;
use tcpscope_collector::exposition;
use tcpscope_collector::sampler::Sampler;
use tcpscope_collector::snapshot::SnapshotStore;
use tcpscope_collector::state::SharedState;
use tcpscope_collector::sweeper::Sweeper;
use tcpscope_common::config::{self, ExporterConfig};
use tcpscope_kube::client;
use tcpscope_kube::lister::KubePodLister;
use tcpscope_kube::resolver::PodResolver;
use tokio_util::sync::CancellationToken;

use super::{base_config, duration_arg};

/// Arguments for the `serve` command. Unset flags keep the configuration
/// file value, or the built-in default.
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Time between sampling cycles.
    #[arg(long, env = "TCPSCOPE_SAMPLE_INTERVAL", value_parser = duration_arg)]
    pub sample_interval: Option<Duration>,

    /// Also publish packet-count gauges.
    #[arg(long, env = "TCPSCOPE_COLLECT_PACKETS")]
    pub collect_packets: bool,

    /// Comma-separated source IPs whose connections are not published.
    #[arg(long, env = "TCPSCOPE_IGNORE_SRC_IPS")]
    pub ignore_src_ips: Option<String>,

    /// Kubeconfig path; in-cluster configuration is used when unset.
    #[arg(long, env = "TCPSCOPE_KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Comma-separated namespaces whose pods are resolved.
    #[arg(long, env = "TCPSCOPE_NAMESPACES")]
    pub namespaces: Option<String>,

    /// Time between pod table refreshes.
    #[arg(long, env = "TCPSCOPE_POD_REFRESH_INTERVAL", value_parser = duration_arg)]
    pub pod_refresh_interval: Option<Duration>,

    /// Address the metrics endpoint binds to.
    #[arg(long, env = "TCPSCOPE_LISTEN_ADDR")]
    pub listen_addr: Option<IpAddr>,

    /// Port the metrics endpoint binds to.
    #[arg(long, env = "TCPSCOPE_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// HTTP path of the metrics endpoint.
    #[arg(long, env = "TCPSCOPE_METRICS_PATH")]
    pub metrics_path: Option<String>,

    /// File holding the previous conntrack report.
    #[arg(long, env = "TCPSCOPE_SNAPSHOT_FILE")]
    pub snapshot_file: Option<PathBuf>,

    /// Conntrack program to invoke.
    #[arg(long, env = "TCPSCOPE_CONNTRACK_PROGRAM")]
    pub conntrack_program: Option<PathBuf>,

    /// Deadline for one conntrack invocation.
    #[arg(long, env = "TCPSCOPE_COMMAND_TIMEOUT", value_parser = duration_arg)]
    pub command_timeout: Option<Duration>,

    /// Deadline for one pod list call.
    #[arg(long, env = "TCPSCOPE_API_TIMEOUT", value_parser = duration_arg)]
    pub api_timeout: Option<Duration>,

    /// Idle time after which a series is removed.
    #[arg(long, env = "TCPSCOPE_METRIC_TTL", value_parser = duration_arg)]
    pub metric_ttl: Option<Duration>,

    /// Time between eviction sweeps.
    #[arg(long, env = "TCPSCOPE_SWEEP_INTERVAL", value_parser = duration_arg)]
    pub sweep_interval: Option<Duration>,
}

impl ServeArgs {
    /// Overlays the flags that were given onto `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the ignore list holds an invalid address.
    pub fn apply(self, config: &mut ExporterConfig) -> anyhow::Result<()> {
        if let Some(v) = self.sample_interval {
            config.sample_interval = v;
        }
        if self.collect_packets {
            config.collect_packets = true;
        }
        if let Some(v) = self.ignore_src_ips {
            config.ignore_src_ips = config::parse_ip_list(&v).map_err(|e| anyhow::anyhow!("{e}"))?;
        }
        if let Some(v) = self.kubeconfig {
            config.kubeconfig = Some(v);
        }
        if let Some(v) = self.namespaces {
            config.namespaces = config::split_list(&v);
        }
        if let Some(v) = self.pod_refresh_interval {
            config.pod_refresh_interval = v;
        }
        if let Some(v) = self.listen_addr {
            config.listen_addr = v;
        }
        if let Some(v) = self.metrics_port {
            config.metrics_port = v;
        }
        if let Some(v) = self.metrics_path {
            config.metrics_path = v;
        }
        if let Some(v) = self.snapshot_file {
            config.snapshot_file = v;
        }
        if let Some(v) = self.conntrack_program {
            config.conntrack_program = v;
        }
        if let Some(v) = self.command_timeout {
            config.command_timeout = v;
        }
        if let Some(v) = self.api_timeout {
            config.api_timeout = v;
        }
        if let Some(v) = self.metric_ttl {
            config.metric_ttl = v;
        }
        if let Some(v) = self.sweep_interval {
            config.sweep_interval = v;
        }
        Ok(())
    }
}

/// Executes the `serve` command.
///
/// Resolves the configuration, then runs the sampler, sweeper, pod
/// resolver and metrics server until Ctrl+C.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the baseline cannot
/// be written, the Kubernetes client cannot be built, or the metrics
/// endpoint cannot be bound.
pub fn execute(args: ServeArgs, config_file: Option<&Path>) -> anyhow::Result<()> {
    let mut config = base_config(config_file)?;
    args.apply(&mut config)?;
    config.validate().map_err(|e| anyhow::anyhow!("{e}"))?;

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(run(config))
}

async fn run(config: ExporterConfig) -> anyhow::Result<()> {
    let command = ConntrackCommand::new(&config.conntrack_program, config.command_timeout);
    match command.locate() {
        Ok(path) => tracing::info!(program = %path.display(), "conntrack program found"),
        Err(e) => tracing::warn!(
            error = %e,
            "conntrack program not found on PATH, cycles will fail until it is installed"
        ),
    }

    let state = Arc::new(SharedState::new(config.collect_packets)?);
    let sampler = Sampler::new(
        Box::new(command),
        SnapshotStore::new(&config.snapshot_file),
        Arc::clone(&state),
        IgnoreList::new(config.ignore_src_ips.iter().copied()),
        config.sample_interval,
    );
    sampler.ensure_baseline().await?;

    let kube = client::connect(config.kubeconfig.as_deref()).await?;
    let resolver = PodResolver::new(
        Box::new(KubePodLister::new(kube, config.api_timeout)),
        config.namespaces.clone(),
        Arc::clone(&state),
        config.pod_refresh_interval,
    );
    let sweeper = Sweeper::new(Arc::clone(&state), config.metric_ttl, config.sweep_interval);
    let listener = exposition::bind(config.metrics_addr()).await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    ctrlc::set_handler(move || {
        tracing::info!("shutdown requested");
        on_signal.cancel();
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;

    let workers = [
        tokio::spawn(sampler.run(cancel.clone())),
        tokio::spawn(sweeper.run(cancel.clone())),
        tokio::spawn(resolver.run(cancel.clone())),
    ];
    let server = {
        let state = Arc::clone(&state);
        let cancel = cancel.clone();
        let path = config.metrics_path.clone();
        tokio::spawn(async move { exposition::serve(listener, state, &path, cancel).await })
    };

    let served = server.await;
    cancel.cancel();
    for worker in workers {
        worker.await?;
    }
    served??;
    tracing::info!("exporter stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::commands::{Cli, Command};

    fn serve_args(argv: &[&str]) -> ServeArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        let Command::Serve(args) = cli.command else {
            unreachable!("argv names the serve command");
        };
        args
    }

    #[test]
    fn no_flags_keep_defaults() {
        let mut config = ExporterConfig::default();
        serve_args(&["tcpscope", "serve"]).apply(&mut config).unwrap();
        assert_eq!(config, ExporterConfig::default());
    }

    #[test]
    fn flags_override_fields() {
        let mut config = ExporterConfig::default();
        serve_args(&[
            "tcpscope",
            "serve",
            "--sample-interval",
            "5s",
            "--namespaces",
            "default, kube-system",
            "--ignore-src-ips",
            "10.0.0.9,fd00::1",
            "--collect-packets",
            "--metrics-port",
            "9200",
        ])
        .apply(&mut config)
        .unwrap();

        assert_eq!(config.sample_interval, Duration::from_secs(5));
        assert_eq!(config.namespaces, vec!["default", "kube-system"]);
        assert_eq!(config.ignore_src_ips.len(), 2);
        assert!(config.collect_packets);
        assert_eq!(config.metrics_port, 9200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn compound_duration_flag_is_parsed() {
        let args = serve_args(&["tcpscope", "serve", "--pod-refresh-interval", "1h30m"]);
        assert_eq!(args.pod_refresh_interval, Some(Duration::from_secs(5400)));
    }

    #[test]
    fn bad_duration_is_rejected_by_parser() {
        assert!(Cli::try_parse_from(["tcpscope", "serve", "--metric-ttl", "soon"]).is_err());
    }

    #[test]
    fn invalid_ignore_ip_is_an_error() {
        let mut config = ExporterConfig::default();
        let result =
            serve_args(&["tcpscope", "serve", "--ignore-src-ips", "10.0.0.300"]).apply(&mut config);
        assert!(result.is_err());
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tcpscope.yaml");
        std::fs::write(&path, "sample_interval: 30s\nmetrics_port: 9300\n").unwrap();

        let mut config = base_config(Some(&path)).unwrap();
        serve_args(&["tcpscope", "serve", "--metrics-port", "9400"]).apply(&mut config).unwrap();
        assert_eq!(config.sample_interval, Duration::from_secs(30));
        assert_eq!(config.metrics_port, 9400);
    }
}
