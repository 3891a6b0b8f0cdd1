use std::path::{Path, PathBuf};

use log::debug;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::HostsFile;
use crate::error::Result;

/// Loads and persists the hosts file.
///
/// `save` truncates and rewrites the destination in place: a pod's
/// `/etc/hosts` is a bind mount, so it cannot be replaced by renaming a
/// sibling file over it.
#[derive(Debug, Clone)]
pub struct HostRecordStore {
    source: PathBuf,
    destination: PathBuf,
}

impl HostRecordStore {
    /// Load from and save to the same file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            source: path.clone(),
            destination: path,
        }
    }

    /// Load from `source` but write to `destination`, which must exist.
    pub fn with_destination(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub async fn load(&self) -> Result<HostsFile> {
        let content = fs::read_to_string(&self.source).await?;
        let hosts = HostsFile::decode(&content)?;
        debug!("Loaded {} host records from {}", hosts.len(), self.source.display());
        Ok(hosts)
    }

    /// Replace the destination content with the full encoding of `hosts`.
    ///
    /// Encoding happens before the file is opened, so an encode error never
    /// truncates the existing file.
    pub async fn save(&self, hosts: &HostsFile) -> Result<()> {
        let content = hosts.encode()?;
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.destination)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;
        debug!("Saved {} host records to {}", hosts.len(), self.destination.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PeerdError;
    use crate::types::HostRecord;

    #[tokio::test]
    async fn test_load_set_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        std::fs::write(&path, "127.0.0.1\tlocalhost\n10.0.0.5\told-entry extra\n").unwrap();

        let store = HostRecordStore::new(&path);
        let mut hosts = store.load().await.unwrap();
        hosts.set(&HostRecord::new("pod-a", "10.0.0.1".parse().unwrap()));
        store.save(&hosts).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "127.0.0.1\tlocalhost\n10.0.0.5\told-entry extra\n10.0.0.1\tpod-a # gluster-peerd\n"
        );
        assert_eq!(store.load().await.unwrap(), hosts);
    }

    #[tokio::test]
    async fn test_save_truncates_longer_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        let long_line = "10.0.0.1\ta-very-long-hostname-that-will-not-survive\n";
        std::fs::write(&path, long_line.repeat(20)).unwrap();

        let store = HostRecordStore::new(&path);
        let mut hosts = HostsFile::new();
        hosts.set(&HostRecord::new("pod-a", "10.0.0.1".parse().unwrap()));
        store.save(&hosts).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "10.0.0.1\tpod-a # gluster-peerd\n"
        );
    }

    #[tokio::test]
    async fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = HostRecordStore::new(dir.path().join("missing"));
        assert!(matches!(store.load().await, Err(PeerdError::Io(_))));
    }

    #[tokio::test]
    async fn test_encode_failure_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        std::fs::write(&path, "127.0.0.1\tlocalhost\n").unwrap();

        let store = HostRecordStore::new(&path);
        let mut hosts = store.load().await.unwrap();
        hosts.set(&HostRecord::new("bad#name", "10.0.0.1".parse().unwrap()));

        assert!(matches!(store.save(&hosts).await, Err(PeerdError::Encode(_))));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "127.0.0.1\tlocalhost\n");
    }

    #[tokio::test]
    async fn test_save_to_unwritable_destination_keeps_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("hosts");
        std::fs::write(&source, "127.0.0.1\tlocalhost\n").unwrap();
        let destination = dir.path().join("hosts.d");
        std::fs::create_dir(&destination).unwrap();

        let store = HostRecordStore::with_destination(&source, &destination);
        let mut hosts = store.load().await.unwrap();
        hosts.set(&HostRecord::new("pod-a", "10.0.0.1".parse().unwrap()));

        assert!(matches!(store.save(&hosts).await, Err(PeerdError::Io(_))));
        assert_eq!(std::fs::read_to_string(&source).unwrap(), "127.0.0.1\tlocalhost\n");
    }
}
