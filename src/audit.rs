//! Best-effort audit trail of rate limit decisions.
//!
//! The engine appends one record per decision, fire-and-forget. A sink that
//! errors is logged and ignored; the request path never waits on it and
//! never fails because of it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::info;

use crate::error::Result;

/// Outcome of a rate limit decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The request was admitted
    Allowed,
    /// The request was rejected
    Denied,
}

impl Outcome {
    /// Stable string form for logs and downstream storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Allowed => "allowed",
            Outcome::Denied => "denied",
        }
    }
}

/// One audited rate limit decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    /// The caller's user id
    pub user_id: String,
    /// The endpoint identifier
    pub endpoint: String,
    /// When the decision was made
    pub at: DateTime<Utc>,
    /// What was decided
    pub outcome: Outcome,
}

/// Sink for decision records.
///
/// Implementations may do I/O; the engine calls `append` from a spawned task
/// so sink latency never shows up in decision latency.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one decision record.
    async fn append(&self, record: AuditRecord) -> Result<()>;
}

/// Sink that emits each record as a structured log event.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<()> {
        info!(
            user_id = %record.user_id,
            endpoint = %record.endpoint,
            at = %record.at.to_rfc3339(),
            outcome = record.outcome.as_str(),
            "Rate limit decision"
        );
        Ok(())
    }
}

/// Sink that buffers records in memory. Intended for tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl RecordingAuditSink {
    /// Create an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records appended so far.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<()> {
        self.records.lock().push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_sink_keeps_order() {
        let sink = RecordingAuditSink::new();
        let now = Utc::now();

        for (user, outcome) in [("a", Outcome::Allowed), ("b", Outcome::Denied)] {
            sink.append(AuditRecord {
                user_id: user.to_string(),
                endpoint: "GET /api/v1/data/{path}".to_string(),
                at: now,
                outcome,
            })
            .await
            .unwrap();
        }

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].user_id, "a");
        assert_eq!(records[0].outcome, Outcome::Allowed);
        assert_eq!(records[1].outcome, Outcome::Denied);
    }

    #[test]
    fn test_tracing_sink_accepts_records() {
        let sink = TracingAuditSink;
        let record = AuditRecord {
            user_id: "user-1".to_string(),
            endpoint: "GET /health".to_string(),
            at: Utc::now(),
            outcome: Outcome::Allowed,
        };

        tokio_test::block_on(async {
            assert!(sink.append(record).await.is_ok());
        });
    }

    #[test]
    fn test_outcome_strings() {
        assert_eq!(Outcome::Allowed.as_str(), "allowed");
        assert_eq!(Outcome::Denied.as_str(), "denied");
    }
}
