// incident_ingestor/src/store.rs
// Boundary between the writer and a concrete graph database.

use async_trait::async_trait;

use crate::error::Result;
use crate::plan::Operation;
use crate::schema::Label;

/// A graph store able to apply planned merge operations.
///
/// Implementations must give every call to [`GraphStore::apply_batch`]
/// all-or-nothing semantics; nothing is promised across batches.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Applies one batch as a single transaction.
    async fn apply_batch(&self, batch: &[Operation],) -> Result<(),>;

    /// Removes every node and relationship. Destructive; only called on explicit opt-in.
    async fn clear(&self,) -> Result<(),>;

    /// Creates uniqueness constraints / indexes backing the merge keys of `labels`.
    async fn ensure_constraints(&self, labels: &[Label],) -> Result<(),>;

    /// Releases the client. The store must not be used afterwards.
    async fn close(self,) -> Result<(),>
    where
        Self: Sized;
}
