use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Instance, LabelSelector};

pub mod kubernetes;
pub use kubernetes::{running_instances, KubeInstanceSource};

#[async_trait]
pub trait InstanceSource: Send + Sync {
    /// List running instances in `namespace` matching every selector pair.
    ///
    /// Implementations must exclude instances in any phase other than
    /// running. Read-only.
    async fn list_running(&self, namespace: &str, selector: &LabelSelector)
        -> Result<Vec<Instance>>;
}
