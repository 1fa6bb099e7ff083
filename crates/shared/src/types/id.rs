//! Typed IDs for type-safe entity references.
//!
//! Using typed IDs prevents accidentally passing a `MerchantId` where a `TenantId` is expected.
//!
//! Tenants, merchants and operators are owned by the surrounding platform and
//! keyed by positive integers; the ledger's own records use time-ordered UUIDs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to generate typed UUID wrappers for ledger-owned records.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Creates a new random ID using UUID v7 (time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            #[must_use]
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

/// Macro to generate wrappers for platform-owned integer keys.
///
/// Zero and negative values are never valid keys; `is_valid` lets callers
/// fail closed instead of silently falling back to a default tenant.
macro_rules! external_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Wraps a raw key.
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw key.
            #[must_use]
            pub const fn into_inner(self) -> i64 {
                self.0
            }

            /// Returns true if the key can refer to an existing record.
            #[must_use]
            pub const fn is_valid(self) -> bool {
                self.0 > 0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

external_id!(TenantId, "Identifier of an isolated customer organization.");
external_id!(MerchantId, "Identifier of a merchant within a tenant.");
external_id!(OperatorId, "Identifier of the user performing an operation.");

typed_id!(FundId, "Unique identifier for a fund record.");
typed_id!(
    FundTransactionId,
    "Unique identifier for an immutable fund ledger entry."
);
