//! Data structures shared by the query client, the host store and the
//! reconciler.
//!
//! Instances are ephemeral query results; host records are what ends up in
//! the hosts file.  An [`Update`] describes one change a reconciliation pass
//! applied to the record set, so passes can be logged and asserted on.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::{PeerdError, Result};

/// Lifecycle phase of a workload instance as reported by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstancePhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl InstancePhase {
    /// Map a control-plane phase string. Anything unrecognised is `Unknown`.
    pub fn from_api(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => Self::Pending,
            Some("Running") => Self::Running,
            Some("Succeeded") => Self::Succeeded,
            Some("Failed") => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

/// An observed workload instance. Produced fresh on every poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    /// Stable name, used as the hostname in the hosts file
    pub name: String,
    /// Address as reported by the control plane, not yet validated
    pub address: String,
    pub phase: InstancePhase,
}

impl Instance {
    pub fn new(name: impl Into<String>, address: impl Into<String>, phase: InstancePhase) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            phase,
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase == InstancePhase::Running
    }

    /// Turn this instance into a host record, canonicalising its address.
    pub fn to_host_record(&self) -> Result<HostRecord> {
        validate_hostname(&self.name).map_err(|reason| PeerdError::resolve(&self.name, reason))?;
        let address = self.address.trim();
        if address.is_empty() {
            return Err(PeerdError::resolve(&self.name, "no address assigned"));
        }
        let address = IpAddr::from_str(address).map_err(|e| {
            PeerdError::resolve(&self.name, format!("invalid address {:?}: {}", address, e))
        })?;
        Ok(HostRecord::new(self.name.clone(), address))
    }
}

/// A persisted name to address mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRecord {
    pub name: String,
    pub address: IpAddr,
}

impl HostRecord {
    pub fn new(name: impl Into<String>, address: IpAddr) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }
}

/// Ordered set of label key/value pairs that must all match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    pairs: Vec<(String, String)>,
}

impl LabelSelector {
    /// Build a selector from `key=value` entries.
    ///
    /// Each entry must contain exactly one `=` and a non-empty key. Keys and
    /// values may not contain whitespace or selector syntax (`,`, `!`, parens),
    /// which the server would read as extra requirements. A later entry with a
    /// key already seen replaces the earlier value.
    pub fn parse<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut selector = Self::default();
        for entry in entries {
            let entry = entry.as_ref();
            let mut parts = entry.split('=');
            let (key, value) = match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(value), None) => (key.trim(), value.trim()),
                _ => {
                    return Err(PeerdError::config(format!(
                        "label {:?} must be like \"key=value\"",
                        entry
                    )))
                }
            };
            if key.is_empty() {
                return Err(PeerdError::config(format!("label {:?} has an empty key", entry)));
            }
            for (part, text) in [("key", key), ("value", value)] {
                if let Some(c) = text.chars().find(|c| is_selector_syntax(*c)) {
                    return Err(PeerdError::config(format!(
                        "label {:?} has {:?} in its {}",
                        entry, c, part
                    )));
                }
            }
            selector.insert(key, value);
        }
        Ok(selector)
    }

    fn insert(&mut self, key: &str, value: &str) {
        match self.pairs.iter_mut().find(|(k, _)| k == key) {
            Some(pair) => pair.1 = value.to_string(),
            None => self.pairs.push((key.to_string(), value.to_string())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// True when every pair is present in `labels` with an equal value.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.pairs
            .iter()
            .all(|(k, v)| labels.get(k).map(|actual| actual == v).unwrap_or(false))
    }
}

/// Renders as an equality-based selector string, e.g. `app=gluster,tier=storage`.
impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, (k, v)) in self.pairs.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        Ok(())
    }
}

/// One change applied to the host record set during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// `name` now resolves to `ip`, either newly or with a changed address.
    Set { name: String, ip: IpAddr },
    /// `name` was no longer observed and its managed entry was pruned.
    Remove { name: String },
}

fn is_selector_syntax(c: char) -> bool {
    c.is_whitespace() || matches!(c, ',' | '!' | '(' | ')')
}

/// Check that a name can be written as a hosts file hostname.
pub(crate) fn validate_hostname(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("empty hostname".to_string());
    }
    if let Some(c) = name.chars().find(|c| c.is_whitespace() || *c == '#') {
        return Err(format!("hostname {:?} contains {:?}", name, c));
    }
    Ok(())
}
