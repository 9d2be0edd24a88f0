// ViolationLog trait: backend-agnostic append-only storage.
//
// Implementors: JsonlViolationLog (one JSON object per line on disk) and
// MemoryViolationLog (tests, ephemeral runs). The recorder serializes
// calls, so implementations do not need their own write lock.

use anyhow::Result;
use async_trait::async_trait;

use super::models::ViolationRecord;

#[async_trait]
pub trait ViolationLog: Send + Sync {
    /// Human-readable location, for status output.
    fn describe(&self) -> String;

    /// Append one record. Existing records are never touched.
    async fn append(&self, record: &ViolationRecord) -> Result<()>;

    /// Every record in append order.
    async fn load(&self) -> Result<Vec<ViolationRecord>>;
}
