use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::history::{BorrowRecord, RecordStatistics};
use crate::protocol::now_rfc3339;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RecordsQuery {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

/// `GET /api/records`: borrow/return history, newest first.
pub async fn list_records(
    State(state): State<AppState>,
    Query(query): Query<RecordsQuery>,
) -> Json<Vec<BorrowRecord>> {
    Json(state.history.list_records(query.skip, query.limit).await)
}

#[derive(Debug, Serialize)]
pub struct CurrentBorrowView {
    pub id: i64,
    pub borrow_time: DateTime<Utc>,
    pub quantity: i64,
    pub duration_seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct CurrentBorrowResponse {
    pub is_borrowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<CurrentBorrowView>,
    pub timestamp: String,
}

/// `GET /api/records/current`: the outstanding borrow, if any.
pub async fn get_current_record(State(state): State<AppState>) -> Json<CurrentBorrowResponse> {
    let response = match state.history.current_borrow().await {
        Some(record) => CurrentBorrowResponse {
            is_borrowed: true,
            record: Some(CurrentBorrowView {
                id: record.id,
                borrow_time: record.borrow_time,
                quantity: record.quantity,
                duration_seconds: (Utc::now() - record.borrow_time).num_seconds(),
            }),
            timestamp: now_rfc3339(),
        },
        None => CurrentBorrowResponse {
            is_borrowed: false,
            record: None,
            timestamp: now_rfc3339(),
        },
    };
    Json(response)
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub stats: RecordStatistics,
    pub timestamp: String,
}

/// `GET /api/records/stats`: today's and all-time borrow/return counts.
pub async fn get_record_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        stats: state.history.statistics().await,
        timestamp: now_rfc3339(),
    })
}
