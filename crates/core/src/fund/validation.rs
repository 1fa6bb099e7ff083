//! Input validation for fund ledger requests.
//!
//! Everything here runs before the store is touched.

use chrono::{DateTime, Utc};
use rights_shared::types::{Currency, MerchantId, Money};
use rust_decimal::Decimal;

use super::error::FundError;
use super::types::{AllocateRequest, BatchDepositRequest, ConsumeRequest, DepositRequest, FundDraft, FundType};

/// Maximum length of descriptions and freeze reasons, in characters.
pub const MAX_DESCRIPTION_LEN: usize = 255;

/// Maximum length of an idempotency key or order reference.
pub const MAX_KEY_LEN: usize = 64;

/// Validates a merchant ID.
pub fn validate_merchant(merchant_id: MerchantId) -> Result<(), FundError> {
    if !merchant_id.is_valid() {
        return Err(FundError::Validation(format!(
            "merchant_id must be positive, got {merchant_id}"
        )));
    }
    Ok(())
}

/// Rejects a time window whose start lies after its end.
pub fn validate_time_range(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<(), FundError> {
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(FundError::Validation(
                "start_time must not be after end_time".to_string(),
            ));
        }
    }
    Ok(())
}

/// Validates that an amount is strictly positive.
pub fn validate_amount(amount: Decimal) -> Result<(), FundError> {
    if amount <= Decimal::ZERO {
        return Err(FundError::Validation(format!(
            "amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

/// Validates a positive amount that fits the currency's minor units.
pub fn validate_money(amount: Decimal, currency: Currency) -> Result<(), FundError> {
    validate_amount(amount)?;
    if !Money::new(amount, currency).fits_currency_scale() {
        return Err(FundError::Validation(format!(
            "amount {amount} has more than {} decimal places for {currency}",
            currency.minor_units()
        )));
    }
    Ok(())
}

/// Validates a description or reason.
pub fn validate_description(description: &str) -> Result<(), FundError> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(FundError::Validation(format!(
            "description exceeds {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(())
}

/// Validates an optional idempotency key.
pub fn validate_idempotency_key(key: Option<&str>) -> Result<(), FundError> {
    match key {
        Some(k) if k.trim().is_empty() => Err(FundError::Validation(
            "idempotency_key must not be blank".to_string(),
        )),
        Some(k) if k.len() > MAX_KEY_LEN => Err(FundError::Validation(format!(
            "idempotency_key exceeds {MAX_KEY_LEN} bytes"
        ))),
        _ => Ok(()),
    }
}

/// Validates a merchant/amount pair for freeze and unfreeze.
///
/// Holds are booked in the base currency, so the amount must fit its scale.
pub fn validate_hold(
    merchant_id: MerchantId,
    amount: Decimal,
    reason: &str,
    base_currency: Currency,
) -> Result<(), FundError> {
    validate_merchant(merchant_id)?;
    validate_money(amount, base_currency)?;
    validate_description(reason)
}

/// Validates a deposit request and turns it into a fund draft.
pub fn validate_deposit(request: &DepositRequest) -> Result<FundDraft, FundError> {
    validate_merchant(request.merchant_id)?;
    validate_money(request.amount, request.currency)?;
    validate_description(&request.description)?;
    validate_idempotency_key(request.idempotency_key.as_deref())?;

    Ok(FundDraft {
        merchant_id: request.merchant_id,
        fund_type: FundType::Deposit,
        amount: request.amount,
        currency: request.currency,
        description: request.description.clone(),
        idempotency_key: request.idempotency_key.clone(),
    })
}

/// Validates an allocation request in the tenant's base currency.
pub fn validate_allocation(
    request: &AllocateRequest,
    base_currency: Currency,
) -> Result<FundDraft, FundError> {
    validate_merchant(request.merchant_id)?;
    validate_money(request.amount, base_currency)?;
    validate_description(&request.description)?;
    validate_idempotency_key(request.idempotency_key.as_deref())?;

    Ok(FundDraft {
        merchant_id: request.merchant_id,
        fund_type: FundType::Allocation,
        amount: request.amount,
        currency: base_currency,
        description: request.description.clone(),
        idempotency_key: request.idempotency_key.clone(),
    })
}

/// Validates the batch envelope. Items are validated one by one as they are applied.
pub fn validate_batch(request: &BatchDepositRequest, max_batch_size: usize) -> Result<(), FundError> {
    if request.deposits.is_empty() {
        return Err(FundError::Validation("batch must contain at least one deposit".to_string()));
    }
    if request.deposits.len() > max_batch_size {
        return Err(FundError::Validation(format!(
            "batch of {} deposits exceeds the limit of {max_batch_size}",
            request.deposits.len()
        )));
    }
    Ok(())
}

/// Validates a consumption request against the base currency's scale.
pub fn validate_consume(request: &ConsumeRequest, base_currency: Currency) -> Result<(), FundError> {
    validate_merchant(request.merchant_id)?;
    validate_money(request.amount, base_currency)?;
    if request.reference.trim().is_empty() {
        return Err(FundError::Validation("reference is required".to_string()));
    }
    if request.reference.len() > MAX_KEY_LEN {
        return Err(FundError::Validation(format!(
            "reference exceeds {MAX_KEY_LEN} bytes"
        )));
    }
    validate_description(&request.description)
}
