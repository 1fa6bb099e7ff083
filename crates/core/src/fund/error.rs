//! Fund ledger error types.
//!
//! Validation and business-rule errors are returned synchronously. Only
//! `ConcurrencyConflict` is retried by the service.

use std::time::Duration;

use rights_shared::AppError;
use rights_shared::types::{FundId, MerchantId, TenantId};
use rust_decimal::Decimal;
use thiserror::Error;

use super::types::FundStatus;

/// Errors that can occur during fund ledger operations.
#[derive(Debug, Error)]
pub enum FundError {
    // ========== Validation Errors ==========
    /// Malformed input. Never reaches the store.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// No tenant or operator could be resolved for the caller.
    #[error("Missing tenant context")]
    MissingTenantContext,

    // ========== Business Rule Errors ==========
    /// Available balance is lower than the requested amount.
    #[error(
        "Insufficient balance for merchant {merchant_id}: available {available}, requested {requested}, short by {shortfall}"
    )]
    InsufficientBalance {
        /// Merchant whose balance was checked.
        merchant_id: MerchantId,
        /// Available balance at the time of the check.
        available: Decimal,
        /// Amount requested.
        requested: Decimal,
        /// `requested - available`.
        shortfall: Decimal,
    },

    /// Frozen balance is lower than the amount to release.
    #[error(
        "Insufficient frozen balance for merchant {merchant_id}: frozen {frozen}, requested {requested}, short by {shortfall}"
    )]
    InsufficientFrozenBalance {
        /// Merchant whose balance was checked.
        merchant_id: MerchantId,
        /// Frozen balance at the time of the check.
        frozen: Decimal,
        /// Amount requested.
        requested: Decimal,
        /// `requested - frozen`.
        shortfall: Decimal,
    },

    /// Fund status cannot move from `from` to `to`.
    #[error("Invalid fund status transition from {from:?} to {to:?}")]
    InvalidStatusTransition {
        /// Current status.
        from: FundStatus,
        /// Requested status.
        to: FundStatus,
    },

    // ========== Tenant Isolation Errors ==========
    /// A row belonging to another tenant surfaced in a scoped lookup.
    #[error("Cross-tenant access: expected tenant {expected}, found {found}")]
    CrossTenantAccess {
        /// Tenant of the caller.
        expected: TenantId,
        /// Tenant carried by the row.
        found: TenantId,
    },

    /// Resource not found in the caller's tenant.
    #[error("Not found: {0}")]
    NotFound(String),

    // ========== Concurrency Errors ==========
    /// Balance row changed underneath the unit of work.
    #[error("Concurrent modification of merchant {merchant_id} balance, please retry")]
    ConcurrencyConflict {
        /// Merchant whose balance row conflicted.
        merchant_id: MerchantId,
    },

    /// The attempt did not finish in time and was rolled back.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    // ========== Batch Errors ==========
    /// A batch item failed; items before it stay committed.
    #[error("Batch item {index} failed: {source}")]
    BatchItemFailed {
        /// 1-based position of the failing item.
        index: usize,
        /// Funds committed before the failure, in request order.
        committed: Vec<FundId>,
        /// Why the item failed.
        #[source]
        source: Box<FundError>,
    },

    // ========== Store Errors ==========
    /// Lower-level store failure. The unit of work was rolled back.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl FundError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::MissingTenantContext => "MISSING_TENANT_CONTEXT",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::InsufficientFrozenBalance { .. } => "INSUFFICIENT_FROZEN_BALANCE",
            Self::InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION",
            Self::CrossTenantAccess { .. } => "CROSS_TENANT_ACCESS",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ConcurrencyConflict { .. } => "CONCURRENCY_CONFLICT",
            Self::Timeout(_) => "TIMEOUT",
            Self::BatchItemFailed { .. } => "BATCH_ITEM_FAILED",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - validation errors
            Self::Validation(_) => 400,

            // 401 Unauthorized - no tenant
            Self::MissingTenantContext => 401,

            // 403 Forbidden - isolation breach
            Self::CrossTenantAccess { .. } => 403,

            // 404 Not Found
            Self::NotFound(_) => 404,

            // 409 Conflict - concurrency errors
            Self::ConcurrencyConflict { .. } => 409,

            // 422 Unprocessable - business rules
            Self::InsufficientBalance { .. }
            | Self::InsufficientFrozenBalance { .. }
            | Self::InvalidStatusTransition { .. } => 422,

            // 504 Gateway Timeout
            Self::Timeout(_) => 504,

            // Batch failures report the status of the failing item
            Self::BatchItemFailed { source, .. } => source.http_status_code(),

            // 500 Internal Server Error
            Self::Persistence(_) => 500,
        }
    }

    /// Returns true if this error is retried by the service.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// Shorthand for an insufficient available balance.
    #[must_use]
    pub fn insufficient_balance(
        merchant_id: MerchantId,
        available: Decimal,
        requested: Decimal,
    ) -> Self {
        Self::InsufficientBalance {
            merchant_id,
            available,
            requested,
            shortfall: requested - available,
        }
    }

    /// Shorthand for an insufficient frozen balance.
    #[must_use]
    pub fn insufficient_frozen(merchant_id: MerchantId, frozen: Decimal, requested: Decimal) -> Self {
        Self::InsufficientFrozenBalance {
            merchant_id,
            frozen,
            requested,
            shortfall: requested - frozen,
        }
    }
}

impl From<FundError> for AppError {
    fn from(err: FundError) -> Self {
        let message = err.to_string();
        match err {
            FundError::Validation(_) => Self::Validation(message),
            FundError::MissingTenantContext => Self::Unauthorized(message),
            FundError::CrossTenantAccess { .. } => Self::Forbidden(message),
            FundError::NotFound(_) => Self::NotFound(message),
            FundError::InsufficientBalance { .. }
            | FundError::InsufficientFrozenBalance { .. }
            | FundError::InvalidStatusTransition { .. } => Self::BusinessRule(message),
            FundError::ConcurrencyConflict { .. } => Self::Conflict(message),
            FundError::Timeout(_) => Self::Timeout(message),
            FundError::BatchItemFailed { source, .. } => {
                // Keep the failing item's category, with the batch position in the message.
                match Self::from(*source) {
                    Self::Validation(_) => Self::Validation(message),
                    Self::Unauthorized(_) => Self::Unauthorized(message),
                    Self::Forbidden(_) => Self::Forbidden(message),
                    Self::NotFound(_) => Self::NotFound(message),
                    Self::BusinessRule(_) => Self::BusinessRule(message),
                    Self::Conflict(_) => Self::Conflict(message),
                    Self::Timeout(_) => Self::Timeout(message),
                    Self::Database(_) => Self::Database(message),
                    Self::Internal(_) => Self::Internal(message),
                }
            }
            FundError::Persistence(_) => Self::Database(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            FundError::Validation("x".into()).error_code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            FundError::MissingTenantContext.error_code(),
            "MISSING_TENANT_CONTEXT"
        );
        assert_eq!(
            FundError::insufficient_balance(MerchantId::new(7), dec!(600), dec!(700)).error_code(),
            "INSUFFICIENT_BALANCE"
        );
    }

    #[test]
    fn test_shortfall_is_reported() {
        let err = FundError::insufficient_balance(MerchantId::new(7), dec!(600), dec!(700));
        match err {
            FundError::InsufficientBalance { shortfall, .. } => assert_eq!(shortfall, dec!(100)),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = FundError::insufficient_frozen(MerchantId::new(7), dec!(0), dec!(50));
        assert_eq!(
            err.to_string(),
            "Insufficient frozen balance for merchant 7: frozen 0, requested 50, short by 50"
        );
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(FundError::Validation("x".into()).http_status_code(), 400);
        assert_eq!(FundError::MissingTenantContext.http_status_code(), 401);
        assert_eq!(
            FundError::CrossTenantAccess {
                expected: TenantId::new(1),
                found: TenantId::new(2)
            }
            .http_status_code(),
            403
        );
        assert_eq!(
            FundError::ConcurrencyConflict {
                merchant_id: MerchantId::new(1)
            }
            .http_status_code(),
            409
        );
        assert_eq!(FundError::Persistence("x".into()).http_status_code(), 500);
        assert_eq!(
            FundError::Timeout(Duration::from_millis(5)).http_status_code(),
            504
        );
    }

    #[test]
    fn test_batch_error_reports_index_and_inner_status() {
        let err = FundError::BatchItemFailed {
            index: 2,
            committed: vec![FundId::new()],
            source: Box::new(FundError::Validation("amount must be positive".into())),
        };
        assert_eq!(err.http_status_code(), 400);
        assert_eq!(
            err.to_string(),
            "Batch item 2 failed: Validation failed: amount must be positive"
        );

        let app: AppError = err.into();
        assert_eq!(app.status_code(), 400);
        assert!(app.to_string().contains("Batch item 2"));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(
            FundError::ConcurrencyConflict {
                merchant_id: MerchantId::new(1)
            }
            .is_retryable()
        );
        assert!(!FundError::Persistence("x".into()).is_retryable());
        assert!(!FundError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(
            !FundError::insufficient_balance(MerchantId::new(1), dec!(0), dec!(1)).is_retryable()
        );
    }

    #[test]
    fn test_into_app_error() {
        let app: AppError = FundError::MissingTenantContext.into();
        assert_eq!(app.status_code(), 401);

        let app: AppError = FundError::insufficient_balance(MerchantId::new(7), dec!(1), dec!(2)).into();
        assert_eq!(app.status_code(), 422);
        assert_eq!(app.error_code(), "BUSINESS_RULE_VIOLATION");
    }
}
