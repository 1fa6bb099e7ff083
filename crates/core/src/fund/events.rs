//! Audit and notification events.
//!
//! The service pushes events into a bounded channel with `try_send` and never
//! waits on it. A separate worker drains the channel into the sinks; sink
//! failures are logged and dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rights_shared::types::{FundId, MerchantId, OperatorId, TenantId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::balance::{BalanceChange, RightsBalance};
use super::context::TenantContext;
use super::error::FundError;
use super::types::TransactionKind;

/// Audit category every ledger event is filed under.
pub const AUDIT_CATEGORY: &str = "fund";

/// Operation being audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Single deposit.
    Deposit,
    /// Batch of deposits.
    BatchDeposit,
    /// Allocation.
    Allocate,
    /// Freeze.
    Freeze,
    /// Unfreeze.
    Unfreeze,
    /// Consumption.
    Consume,
    /// Balance read.
    BalanceQuery,
}

/// Whether the audited operation succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Operation succeeded.
    Success,
    /// Operation failed with the given error code.
    Failure {
        /// `FundError::error_code` of the failure.
        error_code: String,
    },
}

impl AuditOutcome {
    /// Outcome of a finished operation.
    #[must_use]
    pub fn of<T>(result: &Result<T, FundError>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(err) => Self::Failure {
                error_code: err.error_code().to_string(),
            },
        }
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Always [`AUDIT_CATEGORY`].
    pub category: String,
    /// Audited operation.
    pub action: AuditAction,
    /// Tenant of the caller.
    pub tenant_id: TenantId,
    /// Operator of the caller.
    pub operator_id: OperatorId,
    /// Merchant concerned, if the operation targets one.
    pub merchant_id: Option<MerchantId>,
    /// Success or failure.
    pub outcome: AuditOutcome,
    /// Operation-specific details.
    pub payload: serde_json::Value,
    /// When the operation finished.
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    /// Creates an audit event for the caller in `ctx`.
    #[must_use]
    pub fn new(
        ctx: &TenantContext,
        action: AuditAction,
        merchant_id: Option<MerchantId>,
        outcome: AuditOutcome,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            category: AUDIT_CATEGORY.to_string(),
            action,
            tenant_id: ctx.tenant_id(),
            operator_id: ctx.operator_id(),
            merchant_id,
            outcome,
            payload,
            occurred_at: Utc::now(),
        }
    }
}

/// Notification that a merchant's balance changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChangedEvent {
    /// Tenant.
    pub tenant_id: TenantId,
    /// Merchant.
    pub merchant_id: MerchantId,
    /// Fund that caused the change, if any.
    pub fund_id: Option<FundId>,
    /// Operation applied.
    pub kind: TransactionKind,
    /// Unsigned amount.
    pub amount: Decimal,
    /// Available balance after the change.
    pub available_balance: Decimal,
    /// Total balance after the change.
    pub total_balance: Decimal,
    /// Frozen balance after the change.
    pub frozen_balance: Decimal,
    /// Commit time.
    pub occurred_at: DateTime<Utc>,
}

impl BalanceChangedEvent {
    /// Builds the event from the committed balance and the change applied to it.
    #[must_use]
    pub fn new(balance: &RightsBalance, change: &BalanceChange, fund_id: Option<FundId>) -> Self {
        Self {
            tenant_id: balance.tenant_id,
            merchant_id: balance.merchant_id,
            fund_id,
            kind: change.kind,
            amount: change.amount,
            available_balance: balance.available_balance(),
            total_balance: balance.total_balance,
            frozen_balance: balance.frozen_balance,
            occurred_at: Utc::now(),
        }
    }
}

/// Anything the worker delivers.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    /// Audit record.
    Audit(AuditEvent),
    /// Balance notification.
    BalanceChanged(BalanceChangedEvent),
}

/// Error returned by a sink. Never reaches a ledger caller.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Downstream system could not be reached.
    #[error("Sink unavailable: {0}")]
    Unavailable(String),

    /// Downstream system refused the event.
    #[error("Sink rejected event: {0}")]
    Rejected(String),
}

/// Receives audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Records one event.
    async fn log(&self, event: &AuditEvent) -> Result<(), SinkError>;
}

/// Receives balance notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Handles one balance change.
    async fn on_balance_changed(&self, event: &BalanceChangedEvent) -> Result<(), SinkError>;
}

/// Audit sink that writes events to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn log(&self, event: &AuditEvent) -> Result<(), SinkError> {
        info!(
            category = %event.category,
            action = ?event.action,
            tenant_id = %event.tenant_id,
            operator_id = %event.operator_id,
            merchant_id = ?event.merchant_id.map(MerchantId::into_inner),
            outcome = ?event.outcome,
            payload = %event.payload,
            "audit"
        );
        Ok(())
    }
}

/// Notification sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotificationSink;

#[async_trait]
impl NotificationSink for NoopNotificationSink {
    async fn on_balance_changed(&self, _event: &BalanceChangedEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Non-blocking handle for emitting events.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: mpsc::Sender<LedgerEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventPublisher {
    /// Emits an event without waiting. A full or closed channel drops it.
    pub fn publish(&self, event: LedgerEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(event = ?event_name(&event), "Event channel full, dropping event");
            }
            Err(TrySendError::Closed(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(event = ?event_name(&event), "Event worker stopped, dropping event");
            }
        }
    }

    /// Shorthand for publishing an audit event.
    pub fn audit(&self, event: AuditEvent) {
        self.publish(LedgerEvent::Audit(event));
    }

    /// Shorthand for publishing a balance notification.
    pub fn balance_changed(&self, event: BalanceChangedEvent) {
        self.publish(LedgerEvent::BalanceChanged(event));
    }

    /// Number of events dropped so far.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

fn event_name(event: &LedgerEvent) -> &'static str {
    match event {
        LedgerEvent::Audit(_) => "audit",
        LedgerEvent::BalanceChanged(_) => "balance_changed",
    }
}

/// Creates a bounded event channel.
#[must_use]
pub fn event_channel(capacity: usize) -> (EventPublisher, mpsc::Receiver<LedgerEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        EventPublisher {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}

/// Spawns the worker draining `rx` into the sinks.
///
/// The worker exits once every [`EventPublisher`] has been dropped and the
/// channel is empty.
pub fn spawn_event_worker(
    mut rx: mpsc::Receiver<LedgerEvent>,
    audit: Arc<dyn AuditSink>,
    notify: Arc<dyn NotificationSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match &event {
                LedgerEvent::Audit(audit_event) => {
                    if let Err(e) = audit.log(audit_event).await {
                        warn!(error = %e, action = ?audit_event.action, "Audit sink failed");
                    }
                }
                LedgerEvent::BalanceChanged(change) => {
                    if let Err(e) = notify.on_balance_changed(change).await {
                        warn!(
                            error = %e,
                            merchant_id = %change.merchant_id,
                            "Notification sink failed"
                        );
                    }
                }
            }
        }
        debug!("Event worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct FlakyAudit {
        seen: Mutex<Vec<AuditAction>>,
    }

    #[async_trait]
    impl AuditSink for FlakyAudit {
        async fn log(&self, event: &AuditEvent) -> Result<(), SinkError> {
            let mut seen = self.seen.lock().await;
            seen.push(event.action);
            if seen.len() == 1 {
                return Err(SinkError::Unavailable("first call fails".into()));
            }
            Ok(())
        }
    }

    fn ctx() -> TenantContext {
        TenantContext::new(TenantId::new(1), OperatorId::new(2)).unwrap()
    }

    fn audit(action: AuditAction) -> AuditEvent {
        AuditEvent::new(
            &ctx(),
            action,
            Some(MerchantId::new(7)),
            AuditOutcome::Success,
            serde_json::json!({}),
        )
    }

    #[test]
    fn test_outcome_of_result() {
        let ok: Result<(), FundError> = Ok(());
        assert_eq!(AuditOutcome::of(&ok), AuditOutcome::Success);

        let err: Result<(), FundError> = Err(FundError::MissingTenantContext);
        assert_eq!(
            AuditOutcome::of(&err),
            AuditOutcome::Failure {
                error_code: "MISSING_TENANT_CONTEXT".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_publish_drops_when_full() {
        let (publisher, mut rx) = event_channel(1);
        publisher.audit(audit(AuditAction::Deposit));
        publisher.audit(audit(AuditAction::Freeze));

        assert_eq!(publisher.dropped_count(), 1);
        let first = rx.recv().await.unwrap();
        assert!(matches!(first, LedgerEvent::Audit(e) if e.action == AuditAction::Deposit));
    }

    #[tokio::test]
    async fn test_publish_after_worker_stopped() {
        let (publisher, rx) = event_channel(4);
        drop(rx);
        publisher.audit(audit(AuditAction::Deposit));
        assert_eq!(publisher.dropped_count(), 1);
    }

    #[tokio::test]
    async fn test_worker_survives_sink_failure() {
        let (publisher, rx) = event_channel(8);
        let sink = Arc::new(FlakyAudit::default());
        let worker = spawn_event_worker(rx, sink.clone(), Arc::new(NoopNotificationSink));

        publisher.audit(audit(AuditAction::Deposit));
        publisher.audit(audit(AuditAction::Allocate));
        let mut balance = RightsBalance::zero(TenantId::new(1), MerchantId::new(7));
        let change = balance.credit(TransactionKind::Deposit, dec!(5)).unwrap();
        publisher.balance_changed(BalanceChangedEvent::new(&balance, &change, None));
        drop(publisher);

        worker.await.unwrap();
        assert_eq!(
            *sink.seen.lock().await,
            vec![AuditAction::Deposit, AuditAction::Allocate]
        );
    }
}
