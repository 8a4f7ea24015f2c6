//! Borrow/return history collaborator.
//!
//! The realtime core only needs `record_borrow` / `record_return` as
//! best-effort side effects after a committed mutation; the records API reads
//! the same store. The seam is a trait so tests can swap in a failing backend
//! and prove that history failures never reach the client.

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::inventory::TOOL_ID;

/// The cabinet is operated by a single badge-registered employee.
pub const EMPLOYEE_ID: i64 = 1;

pub type RecordId = i64;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history backend unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordAction {
    Borrow,
    Return,
}

#[derive(Debug, Clone, Serialize)]
pub struct BorrowRecord {
    pub id: RecordId,
    pub employee_id: i64,
    pub tool_id: i64,
    pub action: RecordAction,
    pub quantity: i64,
    pub borrow_time: DateTime<Utc>,
    pub return_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordStatistics {
    pub today_borrows: i64,
    pub today_returns: i64,
    pub total_borrows: i64,
    pub total_returns: i64,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Record a committed borrow. May fail; the caller logs and moves on.
    async fn record_borrow(&self, quantity: i64) -> Result<RecordId, HistoryError>;
    /// Record a committed return. May fail; the caller logs and moves on.
    async fn record_return(&self, quantity: i64) -> Result<RecordId, HistoryError>;
    /// Records ordered newest-first, paged.
    async fn list_records(&self, skip: usize, limit: usize) -> Vec<BorrowRecord>;
    /// The most recent borrow that has not been returned yet.
    async fn current_borrow(&self) -> Option<BorrowRecord>;
    async fn statistics(&self) -> RecordStatistics;
}

#[derive(Default)]
struct RecordsInner {
    next_id: RecordId,
    records: Vec<BorrowRecord>,
}

/// Process-local history store. Persistence of records is a separate
/// subsystem's concern; the core only depends on the [`RecordStore`] contract.
pub struct InMemoryRecordStore {
    inner: Mutex<RecordsInner>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        InMemoryRecordStore {
            inner: Mutex::new(RecordsInner { next_id: 1, records: Vec::new() }),
        }
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

fn start_of_today() -> DateTime<Utc> {
    Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc()
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn record_borrow(&self, quantity: i64) -> Result<RecordId, HistoryError> {
        let mut inner = self.inner.lock().await;
        let id = inner.next_id;
        inner.next_id += 1;
        let now = Utc::now();
        inner.records.push(BorrowRecord {
            id,
            employee_id: EMPLOYEE_ID,
            tool_id: TOOL_ID,
            action: RecordAction::Borrow,
            quantity,
            borrow_time: now,
            return_time: None,
            created_at: now,
        });
        Ok(id)
    }

    async fn record_return(&self, quantity: i64) -> Result<RecordId, HistoryError> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();

        // Close the most recent outstanding borrow if there is one.
        if let Some(open) = inner
            .records
            .iter_mut()
            .filter(|r| r.action == RecordAction::Borrow && r.return_time.is_none())
            .max_by_key(|r| r.borrow_time)
        {
            open.action = RecordAction::Return;
            open.return_time = Some(now);
            return Ok(open.id);
        }

        // Nothing outstanding: keep a record of the return anyway.
        let id = inner.next_id;
        inner.next_id += 1;
        inner.records.push(BorrowRecord {
            id,
            employee_id: EMPLOYEE_ID,
            tool_id: TOOL_ID,
            action: RecordAction::Return,
            quantity,
            borrow_time: now,
            return_time: Some(now),
            created_at: now,
        });
        Ok(id)
    }

    async fn list_records(&self, skip: usize, limit: usize) -> Vec<BorrowRecord> {
        let inner = self.inner.lock().await;
        let mut records = inner.records.clone();
        records.sort_by(|a, b| b.borrow_time.cmp(&a.borrow_time));
        records.into_iter().skip(skip).take(limit).collect()
    }

    async fn current_borrow(&self) -> Option<BorrowRecord> {
        let inner = self.inner.lock().await;
        inner
            .records
            .iter()
            .filter(|r| r.action == RecordAction::Borrow && r.return_time.is_none())
            .max_by_key(|r| r.borrow_time)
            .cloned()
    }

    async fn statistics(&self) -> RecordStatistics {
        let inner = self.inner.lock().await;
        let today = start_of_today();
        let mut stats = RecordStatistics {
            today_borrows: 0,
            today_returns: 0,
            total_borrows: 0,
            total_returns: 0,
        };
        for record in &inner.records {
            match record.action {
                RecordAction::Borrow => {
                    stats.total_borrows += 1;
                    if record.borrow_time >= today {
                        stats.today_borrows += 1;
                    }
                }
                RecordAction::Return => {
                    stats.total_returns += 1;
                    if record.borrow_time >= today {
                        stats.today_returns += 1;
                    }
                }
            }
        }
        stats
    }
}
