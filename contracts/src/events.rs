//! # Emitted Records
//!
//! Every contract appends observable records to its own event log as it
//! mutates state. Field order is stable — downstream consumers (indexers,
//! test assertions) match on exact record contents. Records are plain
//! serde-serializable enums; nothing here carries behavior.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vault_core::access::Address;
use vault_core::token::TokenId;

/// Records emitted by [`crate::managed_vault::ManagedVault`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultEvent {
    /// New NAV price and per-token price table recorded.
    PricesSet {
        block: u64,
        nav_price: u64,
        total_value: u64,
    },
    /// A depositor credited a pending deposit.
    TokenDeposited {
        user: Address,
        token: TokenId,
        amount: u64,
    },
    /// Shares issued against pending deposits.
    SharesMinted { to: Address, amount: u64 },
    /// Shares destroyed from the redemption queue's custodial balance.
    SharesBurned { from: Address, amount: u64 },
    /// Shares moved between holders (including queue custody moves).
    SharesTransferred {
        from: Address,
        to: Address,
        amount: u64,
    },
    /// Admin added or removed an address from the allowlist.
    AllowlistChanged { address: Address, allowed: bool },
    /// Admin reassigned the operational owner.
    OwnerChanged {
        previous: Address,
        new_owner: Address,
    },
}

/// Records emitted by [`crate::redemption::RedemptionQueue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueEvent {
    /// A new epoch was scheduled (epoch 0 at initialization, then one per
    /// activation).
    NewRedemption {
        epoch_id: u64,
        redemption_time: DateTime<Utc>,
        registration_end_time: DateTime<Utc>,
        fee_bps: u16,
        token: TokenId,
    },
    /// An epoch was activated: price snapshotted, registered shares burned.
    RedemptionActivated {
        epoch_id: u64,
        price: u64,
        token: TokenId,
    },
    /// A claimant settled their registered shares for payout.
    Redeemed {
        epoch_id: u64,
        user: Address,
        amount: u64,
        token: TokenId,
    },
}

/// Records emitted by [`crate::factory::VaultFactory`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactoryEvent {
    /// A new vault/queue pair was created and wired together.
    VaultCreated {
        vault: Address,
        queue: Address,
        manager: Address,
        name: String,
        symbol: String,
    },
    /// A deployed pair was toggled active/inactive.
    StateChanged { vault: Address, active: bool },
}
