//! Scoped ownership of docker images and containers
//!
//! A guard is created before the resource exists. `release` removes it on the
//! normal path; if the guard is dropped unreleased (timeout, cancellation,
//! panic) `Drop` removes it synchronously so nothing outlives the attempt.

use std::process::Stdio;
use std::time::Duration;

use tracing::{debug, warn};

/// Upper bound on a single async removal
const RELEASE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResourceKind {
    Image,
    Container,
}

pub(crate) struct ResourceGuard {
    docker_bin: String,
    kind: ResourceKind,
    id: String,
    released: bool,
}

impl ResourceGuard {
    pub(crate) fn image(docker_bin: &str, tag: String) -> Self {
        Self::new(docker_bin, ResourceKind::Image, tag)
    }

    pub(crate) fn container(docker_bin: &str, name: String) -> Self {
        Self::new(docker_bin, ResourceKind::Container, name)
    }

    fn new(docker_bin: &str, kind: ResourceKind, id: String) -> Self {
        debug!(?kind, %id, "ResourceGuard::new: called");
        Self {
            docker_bin: docker_bin.to_string(),
            kind,
            id,
            released: false,
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    fn removal_args(&self) -> [&str; 3] {
        match self.kind {
            ResourceKind::Image => ["rmi", "-f", &self.id],
            ResourceKind::Container => ["rm", "-f", &self.id],
        }
    }

    /// Remove the resource; failures are logged, not returned
    pub(crate) async fn release(mut self) {
        self.released = true;
        let mut cmd = tokio::process::Command::new(&self.docker_bin);
        cmd.args(self.removal_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(RELEASE_TIMEOUT, cmd.status()).await {
            Ok(Ok(status)) => debug!(kind = ?self.kind, id = %self.id, ?status, "ResourceGuard::release: done"),
            Ok(Err(e)) => warn!(kind = ?self.kind, id = %self.id, error = %e, "Failed to remove docker resource"),
            Err(_) => warn!(kind = ?self.kind, id = %self.id, "Timed out removing docker resource"),
        }
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        debug!(kind = ?self.kind, id = %self.id, "ResourceGuard::drop: removing unreleased resource");
        // Drop cannot await, and this only runs when `execute` was abandoned
        // mid-flight (Ctrl-C, outer timeout). Blocking the worker for a
        // `docker rm -f` is what guarantees the resource is gone before the
        // cancellation is acknowledged.
        let result = std::process::Command::new(&self.docker_bin)
            .args(self.removal_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(e) = result {
            warn!(kind = ?self.kind, id = %self.id, error = %e, "Failed to remove docker resource on drop");
        }
    }
}
