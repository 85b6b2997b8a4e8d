//! # Managed Vault Contracts
//!
//! The contract layer of the managed-fund system. Three cooperating state
//! machines implement a share-based fund with scheduled redemptions:
//!
//! - **Managed Vault** — multi-token deposit intake priced against
//!   manager-set NAV, share issuance, and allowlist-gated share transfers.
//! - **Redemption Queue** — recurring time-boxed epochs in which holders
//!   register shares, activation with a 5000-block price-freshness gate,
//!   and fee-adjusted claim settlement.
//! - **Vault Factory** — owner-gated construction of wired vault/queue
//!   pairs with a per-deployment active flag.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow — we use `checked_add`
//!    and u128-widened multiply-then-divide everywhere, because wrapping
//!    arithmetic and money do not mix.
//! 2. State transitions are explicit: enum variants, not boolean flags.
//! 3. Role checks gate every privileged operation before any state is
//!    touched, so a failed call never leaves a partial write.
//! 4. Claims are zeroed before their payout transfers; batched settlement
//!    validates every epoch before paying any of them.
//! 5. Every public type is serializable (serde) for wire transport and
//!    persistent storage.

pub mod events;
pub mod factory;
pub mod managed_vault;
pub mod redemption;
