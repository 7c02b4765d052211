use async_trait::async_trait;

use crate::error::Result;

/// Mutual exclusion around the bootstrap step across replicas.
#[async_trait]
pub trait BootstrapLock: Send + Sync {
    /// Block until the lock is held.
    async fn acquire(&self) -> Result<()>;

    /// Release a held lock. Releasing an unheld lock is a no-op.
    async fn release(&self) -> Result<()>;
}

/// For single-replica deployments and stores that cannot lock.
#[derive(Debug, Default)]
pub struct NoLock;

#[async_trait]
impl BootstrapLock for NoLock {
    async fn acquire(&self) -> Result<()> {
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        Ok(())
    }
}
