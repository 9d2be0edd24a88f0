// In-memory violation log for tests and runs without an audit file.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::models::ViolationRecord;
use super::traits::ViolationLog;

#[derive(Default)]
pub struct MemoryViolationLog {
    records: Mutex<Vec<ViolationRecord>>,
}

impl MemoryViolationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with pre-existing records, as if replayed from disk.
    pub fn with_records(records: Vec<ViolationRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }
}

#[async_trait]
impl ViolationLog for MemoryViolationLog {
    fn describe(&self) -> String {
        "in-memory".to_string()
    }

    async fn append(&self, record: &ViolationRecord) -> Result<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Vec<ViolationRecord>> {
        Ok(self.records.lock().await.clone())
    }
}
