//! # Access Control
//!
//! Role checks for the vault contracts. Each contract instance carries a
//! [`Roles`] pair: an `admin` (super-role, can reassign the operational
//! owner and manage the allowlist) and an `owner` (the fund manager,
//! performing day-to-day configuration). Privileged operations call the
//! `require_*` methods with the caller's address before touching any
//! state, so an authorization failure always aborts with zero mutation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A participant address. Hex-encoded public key or any other opaque
/// identifier assigned by the enclosing ledger.
pub type Address = String;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by role checks.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The caller does not hold the required role.
    #[error("unauthorized: {caller} is not the {role}")]
    Unauthorized {
        /// The address that attempted the operation.
        caller: Address,
        /// The role the operation requires.
        role: String,
    },
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// The admin/owner role pair carried by every vault contract instance.
///
/// The convention across the system: `admin` can reassign `owner` and
/// edit the allowlist, while `owner` performs operational configuration
/// (prices, accepted tokens, redemption scheduling).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roles {
    /// The super-role. Immutable after initialization.
    pub admin: Address,
    /// The operational manager. Reassignable by the admin.
    pub owner: Address,
}

impl Roles {
    /// Creates a role pair.
    pub fn new(owner: impl Into<Address>, admin: impl Into<Address>) -> Self {
        Self {
            admin: admin.into(),
            owner: owner.into(),
        }
    }

    /// Returns `true` if `caller` is the admin.
    pub fn is_admin(&self, caller: &str) -> bool {
        !self.admin.is_empty() && self.admin == caller
    }

    /// Returns `true` if `caller` is the owner.
    pub fn is_owner(&self, caller: &str) -> bool {
        !self.owner.is_empty() && self.owner == caller
    }

    /// Fails with [`AccessError::Unauthorized`] unless `caller` is the admin.
    pub fn require_admin(&self, caller: &str) -> Result<(), AccessError> {
        if self.is_admin(caller) {
            Ok(())
        } else {
            Err(AccessError::Unauthorized {
                caller: caller.to_string(),
                role: "admin".to_string(),
            })
        }
    }

    /// Fails with [`AccessError::Unauthorized`] unless `caller` is the owner.
    pub fn require_owner(&self, caller: &str) -> Result<(), AccessError> {
        if self.is_owner(caller) {
            Ok(())
        } else {
            Err(AccessError::Unauthorized {
                caller: caller.to_string(),
                role: "owner".to_string(),
            })
        }
    }
}
