//! GlusterFS peer inspection through the `gluster` command line tool.
//!
//! The storage daemon's peer protocol is opaque to us; we only read
//! `gluster peer status` and issue `gluster peer probe <host>`.

use std::path::PathBuf;

use async_trait::async_trait;
use log::debug;
use tokio::process::Command;

use crate::error::{PeerdError, Result};

/// One block of `gluster peer status` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub hostname: String,
    pub uuid: String,
    pub state: String,
}

/// Parse `gluster peer status` output.
///
/// Each peer block is a `Hostname:`, `Uuid:`, `State:` sequence. Other lines
/// (the `Number of Peers:` header, `Other names:` lists) are ignored, and a
/// block missing any of the three fields is dropped.
pub fn parse_peer_status(output: &str) -> Vec<PeerInfo> {
    let mut peers = Vec::new();
    let mut hostname: Option<String> = None;
    let mut uuid: Option<String> = None;

    for line in output.lines() {
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        match field.trim() {
            "Hostname" => {
                hostname = Some(value);
                uuid = None;
            }
            "Uuid" if hostname.is_some() => uuid = Some(value),
            "State" => {
                if let (Some(h), Some(u)) = (hostname.take(), uuid.take()) {
                    peers.push(PeerInfo {
                        hostname: h,
                        uuid: u,
                        state: value,
                    });
                }
            }
            _ => {}
        }
    }
    peers
}

#[async_trait]
pub trait PeerControl: Send + Sync {
    /// Peers currently known to the local storage daemon.
    async fn peer_status(&self) -> Result<Vec<PeerInfo>>;

    /// Ask the local storage daemon to add `host` to its trusted pool.
    async fn probe(&self, host: &str) -> Result<()>;
}

/// [`PeerControl`] backed by the `gluster` binary.
#[derive(Debug, Clone)]
pub struct GlusterCli {
    binary: PathBuf,
}

impl GlusterCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!("Running {} {}", self.binary.display(), args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                PeerdError::subprocess(format!("failed to run {}: {}", self.binary.display(), e))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PeerdError::subprocess(format!(
                "gluster {} exited with {}: {}{}",
                args.join(" "),
                output.status,
                stdout.trim(),
                stderr.trim()
            )));
        }
        Ok(stdout)
    }
}

#[async_trait]
impl PeerControl for GlusterCli {
    async fn peer_status(&self) -> Result<Vec<PeerInfo>> {
        let output = self.run(&["peer", "status"]).await?;
        if !output.contains("Number of Peers") {
            return Err(PeerdError::protocol(format!(
                "unexpected peer status output: {}",
                output.trim()
            )));
        }
        Ok(parse_peer_status(&output))
    }

    async fn probe(&self, host: &str) -> Result<()> {
        let output = self.run(&["peer", "probe", host]).await?;
        debug!("Probe {}: {}", host, output.trim());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEER_STATUS: &str = "\
Number of Peers: 2

Hostname: glusterfs-1
Uuid: 5e7d4f33-1b0e-4b9a-9d59-2cc2d0f1a111
State: Peer in Cluster (Connected)

Hostname: 10.0.0.3
Uuid: 0f0a3c0e-7a4d-4e4b-8a1b-3d8e5f2a2222
State: Peer Rejected (Disconnected)
Other names:
glusterfs-2
";

    #[test]
    fn test_parse_peer_status() {
        let peers = parse_peer_status(PEER_STATUS);
        assert_eq!(
            peers,
            vec![
                PeerInfo {
                    hostname: "glusterfs-1".to_string(),
                    uuid: "5e7d4f33-1b0e-4b9a-9d59-2cc2d0f1a111".to_string(),
                    state: "Peer in Cluster (Connected)".to_string(),
                },
                PeerInfo {
                    hostname: "10.0.0.3".to_string(),
                    uuid: "0f0a3c0e-7a4d-4e4b-8a1b-3d8e5f2a2222".to_string(),
                    state: "Peer Rejected (Disconnected)".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_no_peers() {
        assert!(parse_peer_status("Number of Peers: 0\n").is_empty());
        assert!(parse_peer_status("").is_empty());
    }

    #[test]
    fn test_incomplete_block_is_dropped() {
        let output = "Hostname: a\nState: Connected\nHostname: b\nUuid: 1\nState: Connected\n";
        let peers = parse_peer_status(output);
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].hostname, "b");
    }

    #[tokio::test]
    async fn test_missing_binary_is_subprocess_error() {
        let cli = GlusterCli::new("/nonexistent/gluster");
        assert!(matches!(cli.peer_status().await, Err(PeerdError::Subprocess(_))));
    }
}
