//! Hosts file record set.
//!
//! [`HostsFile`] is a line-preserving model of `/etc/hosts`: comments,
//! blank lines and entries we do not own survive a decode/encode cycle.
//! Entries written by the sidecar are tagged with [`MANAGED_MARKER`] so they
//! can be told apart from lines the kubelet or the image put there.

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::{PeerdError, Result};
use crate::types::{validate_hostname, HostRecord};

pub mod store;
pub use store::HostRecordStore;

/// Trailing comment carried by every entry line the sidecar writes.
pub const MANAGED_MARKER: &str = "gluster-peerd";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Blank,
    Comment(String),
    Entry {
        address: IpAddr,
        /// Interface scope of a link-local IPv6 address, as in `fe80::1%eth0`
        zone: Option<String>,
        names: Vec<String>,
        comment: Option<String>,
    },
}

impl Line {
    fn is_managed(&self) -> bool {
        matches!(self, Line::Entry { comment: Some(c), .. } if c == MANAGED_MARKER)
    }

    fn check(&self) -> Result<()> {
        if let Line::Entry { address, names, .. } = self {
            if names.is_empty() {
                return Err(PeerdError::encode(format!("address {} has no hostnames", address)));
            }
            for name in names {
                validate_hostname(name).map_err(PeerdError::encode)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::Blank => Ok(()),
            Line::Comment(c) if c.is_empty() => f.write_str("#"),
            Line::Comment(c) => write!(f, "# {}", c),
            Line::Entry {
                address,
                zone,
                names,
                comment,
            } => {
                write!(f, "{}", address)?;
                if let Some(zone) = zone {
                    write!(f, "%{}", zone)?;
                }
                write!(f, "\t{}", names.join(" "))?;
                if let Some(c) = comment {
                    write!(f, " # {}", c)?;
                }
                Ok(())
            }
        }
    }
}

/// Split an optional `%zone` suffix off a hosts file address field.
fn parse_address(field: &str) -> std::result::Result<(IpAddr, Option<String>), String> {
    let (addr, zone) = match field.split_once('%') {
        Some((addr, zone)) => (addr, Some(zone)),
        None => (field, None),
    };
    let address =
        IpAddr::from_str(addr).map_err(|e| format!("invalid address {:?}: {}", field, e))?;
    match zone {
        None => Ok((address, None)),
        Some("") => Err(format!("address {:?} has an empty zone", field)),
        Some(_) if address.is_ipv4() => {
            Err(format!("address {:?} is IPv4 and cannot carry a zone", field))
        }
        Some(zone) => Ok((address, Some(zone.to_string()))),
    }
}

/// Decoded hosts file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostsFile {
    lines: Vec<Line>,
}

impl HostsFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse hosts file syntax. Line numbers in errors are 1-based.
    ///
    /// IPv6 addresses may carry a `%zone` suffix; it is kept verbatim and
    /// written back on encode.
    pub fn decode(input: &str) -> Result<Self> {
        let mut lines = Vec::new();
        for (idx, raw) in input.lines().enumerate() {
            let (content, comment) = match raw.split_once('#') {
                Some((content, comment)) => (content, Some(comment.trim().to_string())),
                None => (raw, None),
            };

            let mut fields = content.split_whitespace();
            let Some(address) = fields.next() else {
                lines.push(match comment {
                    Some(c) => Line::Comment(c),
                    None => Line::Blank,
                });
                continue;
            };

            let (address, zone) =
                parse_address(address).map_err(|reason| PeerdError::decode(idx + 1, reason))?;
            let names: Vec<String> = fields.map(str::to_string).collect();
            if names.is_empty() {
                return Err(PeerdError::decode(
                    idx + 1,
                    format!("address {} has no hostnames", address),
                ));
            }
            lines.push(Line::Entry {
                address,
                zone,
                names,
                comment,
            });
        }
        Ok(Self { lines })
    }

    /// Render the whole set back to hosts file syntax.
    pub fn encode(&self) -> Result<String> {
        let mut out = String::new();
        for line in &self.lines {
            line.check()?;
            out.push_str(&line.to_string());
            out.push('\n');
        }
        Ok(out)
    }

    /// Every address `name` currently resolves to, in file order.
    pub fn lookup(&self, name: &str) -> Vec<IpAddr> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                Line::Entry { address, names, .. } if names.iter().any(|n| n == name) => {
                    Some(*address)
                }
                _ => None,
            })
            .collect()
    }

    /// All name/address pairs, in file order.
    pub fn records(&self) -> Vec<HostRecord> {
        let mut records = Vec::new();
        for line in &self.lines {
            if let Line::Entry { address, names, .. } = line {
                records.extend(names.iter().map(|n| HostRecord::new(n.clone(), *address)));
            }
        }
        records
    }

    /// Names carried on managed entry lines.
    pub fn managed_names(&self) -> Vec<String> {
        self.lines
            .iter()
            .filter(|line| line.is_managed())
            .flat_map(|line| match line {
                Line::Entry { names, .. } => names.clone(),
                _ => Vec::new(),
            })
            .collect()
    }

    /// Number of name/address pairs.
    pub fn len(&self) -> usize {
        self.lines
            .iter()
            .map(|line| match line {
                Line::Entry { names, .. } => names.len(),
                _ => 0,
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point `record.name` at `record.address`, last writer wins.
    ///
    /// Returns `false` when the name already resolves to exactly that
    /// address, in which case nothing is touched.
    pub fn set(&mut self, record: &HostRecord) -> bool {
        if self.lookup(&record.name) == [record.address] {
            return false;
        }

        self.remove_name(&record.name);

        let existing = self.lines.iter_mut().find(|line| {
            line.is_managed()
                && matches!(
                    line,
                    Line::Entry { address, zone: None, .. } if *address == record.address
                )
        });
        match existing {
            Some(Line::Entry { names, .. }) => names.push(record.name.clone()),
            _ => self.lines.push(Line::Entry {
                address: record.address,
                zone: None,
                names: vec![record.name.clone()],
                comment: Some(MANAGED_MARKER.to_string()),
            }),
        }
        true
    }

    /// Remove managed names that are not in `keep`. Returns the pruned names.
    pub fn prune_managed(&mut self, keep: &HashSet<String>) -> Vec<String> {
        let mut pruned = Vec::new();
        for line in self.lines.iter_mut().filter(|line| line.is_managed()) {
            if let Line::Entry { names, .. } = line {
                names.retain(|n| {
                    let stale = !keep.contains(n);
                    if stale {
                        pruned.push(n.clone());
                    }
                    !stale
                });
            }
        }
        self.drop_empty_entries();
        pruned
    }

    fn remove_name(&mut self, name: &str) {
        for line in &mut self.lines {
            if let Line::Entry { names, .. } = line {
                names.retain(|n| n != name);
            }
        }
        self.drop_empty_entries();
    }

    fn drop_empty_entries(&mut self) {
        self.lines
            .retain(|line| !matches!(line, Line::Entry { names, .. } if names.is_empty()));
    }
}
