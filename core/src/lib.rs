//! # Vault Core
//!
//! Shared primitives for the managed vault system:
//!
//! - **Token Ledger** — the fungible-token collaborator the contracts
//!   settle against: multi-token balances, allowances, transfers. The
//!   contracts never implement token semantics themselves; they call
//!   into this ledger.
//! - **Access** — explicit admin/owner capability checks. Privileged
//!   operations take the caller's address and verify it against the
//!   stored role, rather than relying on inherited access-control
//!   machinery.
//! - **Environment** — the [`env::BlockEnv`] snapshot of the enclosing
//!   ledger's block height and timestamp. Every operation that gates on
//!   time windows or price freshness takes it as an argument, which
//!   keeps those gates deterministic under test.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow — `checked_add` and
//!    `checked_sub` everywhere, because wrapping arithmetic and money do
//!    not mix.
//! 2. State transitions are explicit: enum variants, not boolean flags.
//! 3. Every public type is serializable (serde) for wire transport and
//!    persistent storage.

pub mod access;
pub mod env;
pub mod token;
