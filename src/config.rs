use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{PeerdError, Result};
use crate::supervisor::ProcessSpec;
use crate::types::LabelSelector;

const DEFAULT_CONFIG_FILE: &str = "gluster-peerd.toml";

/// Command line flags. Anything left unset falls through to the config
/// file, then `PEERD_*` environment variables, then built-in defaults.
#[derive(Parser, Debug, Default, Serialize)]
#[clap(
    name = "gluster-peerd",
    version,
    about = "Keeps /etc/hosts in sync with the running GlusterFS pods"
)]
pub struct Args {
    /// Config file path
    #[clap(short, long)]
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Namespace to watch
    #[clap(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Service name
    #[clap(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    /// Volume name
    #[clap(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,

    /// Replica count
    #[clap(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replica: Option<u32>,

    /// Seconds between reconciliation passes
    #[clap(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beat: Option<u64>,

    /// --labels key1=value1 --labels key2=value2 ...
    #[clap(long = "labels")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,

    /// Hosts file to keep in sync
    #[clap(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosts_file: Option<PathBuf>,

    /// Seconds to wait between the prerequisite and the daemon
    #[clap(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settle_delay: Option<u64>,

    /// Seconds allowed for one control-plane query
    #[clap(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_timeout: Option<u64>,

    /// Remove entries for pods that are no longer running
    #[clap(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub prune_stale: bool,

    /// Probe newly seen pods into the gluster trusted pool
    #[clap(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub probe_peers: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub namespace: String,
    /// Reserved, not consumed by reconciliation
    pub service: String,
    /// Reserved, not consumed by reconciliation
    pub volume: String,
    /// Reserved, not consumed by reconciliation
    pub replica: u32,
    pub beat: u64,
    pub labels: Vec<String>,
    pub hosts_file: PathBuf,
    pub settle_delay: u64,
    pub query_timeout: u64,
    pub prune_stale: bool,
    pub probe_peers: bool,
    pub prerequisite: Vec<String>,
    pub daemon: Vec<String>,
    pub gluster_cli: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: "default".into(),
            service: "glusterfs-storage".into(),
            volume: "media".into(),
            replica: 1,
            beat: 5,
            labels: Vec::new(),
            hosts_file: "/etc/hosts".into(),
            settle_delay: 2,
            query_timeout: 10,
            prune_stale: false,
            probe_peers: false,
            prerequisite: vec!["/usr/bin/service".into(), "rpcbind".into(), "start".into()],
            daemon: vec![
                "/usr/sbin/glusterd".into(),
                "--log-file=-".into(),
                "--no-daemon".into(),
            ],
            gluster_cli: "/usr/sbin/gluster".into(),
        }
    }
}

impl Config {
    /// Merge defaults, config file, environment and flags, then validate.
    pub fn load(args: &Args) -> Result<Self> {
        let file = args
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed("PEERD_"))
            .merge(Serialized::defaults(args))
            .extract()
            .map_err(|e| PeerdError::config(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.selector()?;
        if self.beat == 0 {
            return Err(PeerdError::config("beat must be at least one second"));
        }
        if self.query_timeout == 0 {
            return Err(PeerdError::config("query_timeout must be at least one second"));
        }
        self.prerequisite_spec()?;
        self.daemon_spec()?;
        Ok(())
    }

    pub fn selector(&self) -> Result<LabelSelector> {
        LabelSelector::parse(&self.labels)
    }

    pub fn beat_interval(&self) -> Duration {
        Duration::from_secs(self.beat)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }

    pub fn prerequisite_spec(&self) -> Result<ProcessSpec> {
        ProcessSpec::from_argv(&self.prerequisite)
            .map_err(|e| PeerdError::config(format!("prerequisite: {}", e)))
    }

    pub fn daemon_spec(&self) -> Result<ProcessSpec> {
        ProcessSpec::from_argv(&self.daemon)
            .map_err(|e| PeerdError::config(format!("daemon: {}", e)))
    }
}
