//! GlusterFS membership sidecar.
//!
//! Watches the pods selected by a label selector and keeps `/etc/hosts`
//! pointing every running pod name at its current IP, so the storage daemon
//! can address its peers by name. Also supervises `rpcbind` and `glusterd`.

pub mod cluster;
pub mod config;
pub mod error;
pub mod hosts;
pub mod peers;
pub mod reconciler;
pub mod supervisor;
pub mod types;

pub use cluster::{InstanceSource, KubeInstanceSource};
pub use config::{Args, Config};
pub use error::{PeerdError, Result};
pub use hosts::{HostRecordStore, HostsFile};
pub use peers::{GlusterCli, PeerControl, PeerInfo};
pub use reconciler::{PassReport, Reconciler, ReconcilerOptions};
pub use types::{HostRecord, Instance, InstancePhase, LabelSelector, Update};
