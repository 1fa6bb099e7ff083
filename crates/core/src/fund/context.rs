//! Tenant context resolved once at the transport boundary.

use rights_shared::types::{OperatorId, TenantId};
use serde::{Deserialize, Serialize};

use super::error::FundError;

/// Validated tenant and operator for one call.
///
/// Fields are private so a context can only exist with both IDs valid; there is
/// no default tenant to fall back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TenantContext {
    tenant_id: TenantId,
    operator_id: OperatorId,
}

impl TenantContext {
    /// Creates a context, failing closed on a missing or non-positive ID.
    pub fn new(tenant_id: TenantId, operator_id: OperatorId) -> Result<Self, FundError> {
        if !tenant_id.is_valid() || !operator_id.is_valid() {
            return Err(FundError::MissingTenantContext);
        }
        Ok(Self {
            tenant_id,
            operator_id,
        })
    }

    /// Tenant every store access is scoped to.
    #[must_use]
    pub const fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Operator recorded on entries and audit events.
    #[must_use]
    pub const fn operator_id(&self) -> OperatorId {
        self.operator_id
    }
}

/// Raw identity as handed over by the session layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestIdentity {
    /// Tenant claim, if any.
    pub tenant_id: Option<i64>,
    /// Operator claim, if any.
    pub operator_id: Option<i64>,
}

/// Resolves a [`TenantContext`] for an incoming request.
pub trait TenantResolver: Send + Sync {
    /// Returns the caller's context or `MissingTenantContext`.
    fn resolve(&self, identity: &RequestIdentity) -> Result<TenantContext, FundError>;
}

/// Resolver that trusts the identity's claims and rejects anything incomplete.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl TenantResolver for IdentityResolver {
    fn resolve(&self, identity: &RequestIdentity) -> Result<TenantContext, FundError> {
        let tenant_id = identity.tenant_id.ok_or(FundError::MissingTenantContext)?;
        let operator_id = identity.operator_id.ok_or(FundError::MissingTenantContext)?;
        TenantContext::new(TenantId::new(tenant_id), OperatorId::new(operator_id))
    }
}
