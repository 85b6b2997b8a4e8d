//! # Managed Vault
//!
//! A share-based fund vault. Depositors contribute accepted tokens, the
//! manager records net-asset-value (NAV) prices, and pending deposits are
//! converted into newly minted shares priced at the current NAV. The vault
//! itself is the share token: it keeps per-holder balances, allowances,
//! and an allowlist gating public share transfers.
//!
//! ## Price / deposit ordering
//!
//! Shares must only ever be minted against a price set *after* the
//! deposits it prices. The intended call sequence is set-prices →
//! deposit → set-prices → mint, and [`ManagedVault::mint`] enforces it:
//! the recorded price block has to postdate the most recent pending
//! deposit.
//!
//! ## The redemption queue
//!
//! Exactly one address — the paired [`crate::redemption::RedemptionQueue`]
//! — may burn shares or move them in and out of queue custody. It is
//! placed on the allowlist at initialization and holds registered shares
//! until activation burns them.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use vault_core::access::{AccessError, Address, Roles};
use vault_core::env::BlockEnv;
use vault_core::token::{TokenError, TokenId, TokenLedger};

use crate::events::VaultEvent;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The vault has already been initialized.
    #[error("vault is already initialized")]
    AlreadyInitialized,

    /// The vault has not been initialized yet.
    #[error("vault is not initialized")]
    NotInitialized,

    /// The caller lacks the required role.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// Public share transfer blocked by the allowlist rule.
    #[error("Transfer not allowed")]
    TransferNotAllowed,

    /// An empty address was supplied where a real one is required.
    #[error("zero address")]
    ZeroAddress,

    /// The token is not configured as accepted for deposits.
    #[error("token {0} is not accepted for deposits")]
    TokenNotAccepted(TokenId),

    /// The deposit is below the configured per-token minimum.
    #[error("deposit of {amount} is below the minimum of {minimum}")]
    DepositBelowMinimum {
        /// Amount the depositor offered.
        amount: u64,
        /// Configured minimum for this token.
        minimum: u64,
    },

    /// `set_prices` was called with mismatched array lengths.
    #[error("tokens and prices length mismatch: {tokens} tokens, {prices} prices")]
    LengthMismatch {
        /// Number of token entries supplied.
        tokens: usize,
        /// Number of price entries supplied.
        prices: usize,
    },

    /// `set_prices` tried to move the price block backwards.
    #[error("price block {block} precedes the last recorded price block {last}")]
    PriceBlockRegression {
        /// The block number that was supplied.
        block: u64,
        /// The last recorded price block.
        last: u64,
    },

    /// `mint` was called with nothing to convert.
    #[error("no pending deposits to convert")]
    NoPendingDeposits,

    /// `mint` was called before any NAV price was recorded.
    #[error("NAV price is not set")]
    NavPriceNotSet,

    /// The current price predates the deposits it would be applied to.
    #[error("price block {price_block} does not postdate the latest deposit block {deposit_block}")]
    PriceNotRefreshed {
        /// Block of the last recorded price.
        price_block: u64,
        /// Block of the most recent pending deposit.
        deposit_block: u64,
    },

    /// A pending deposit references a token absent from the price table.
    #[error("token {0} has no recorded price")]
    MissingTokenPrice(TokenId),

    /// The shares computed from pending deposits fall short of the
    /// manager's requested minimum.
    #[error("computed shares {computed} below the requested minimum {requested}")]
    MintBelowRequested {
        /// Total shares the pending deposits convert to.
        computed: u64,
        /// Minimum the manager asked for.
        requested: u64,
    },

    /// A share holder's balance is short.
    #[error("insufficient shares: available {available}, requested {requested}")]
    InsufficientShares {
        /// Holder's current share balance.
        available: u64,
        /// Amount the operation tried to move.
        requested: u64,
    },

    /// A share spender's allowance is short.
    #[error("insufficient share allowance: approved {allowance}, requested {requested}")]
    InsufficientShareAllowance {
        /// Amount the holder approved for this spender.
        allowance: u64,
        /// Amount the spender tried to move.
        requested: u64,
    },

    /// Arithmetic overflow in share accounting.
    #[error("share amount overflow")]
    Overflow,

    /// The deposit pull through the token ledger failed.
    #[error(transparent)]
    Token(#[from] TokenError),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Per-token deposit configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositConfig {
    /// Whether the token is currently accepted for deposits.
    pub accepted: bool,
    /// Minimum amount per deposit, in the token's native unit.
    pub minimum_deposit: u64,
}

/// The latest manager-recorded price state.
///
/// `nav_price` converts between deposited token value and shares;
/// `token_prices` values each accepted token; `block` is the block height
/// the prices were observed at and is the sole input to the freshness
/// predicate the redemption queue checks at activation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceState {
    /// Value per share, in the shared fixed-point price scale.
    pub nav_price: u64,
    /// Manager-reported total value under management.
    pub total_value: u64,
    /// Block height of the last price update. Strictly non-decreasing.
    pub block: u64,
    /// Per-token prices in the same scale as `nav_price`.
    pub token_prices: HashMap<TokenId, u64>,
}

/// A deposit awaiting conversion into shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDeposit {
    /// The depositor.
    pub user: Address,
    /// The deposited token.
    pub token: TokenId,
    /// Amount deposited, in the token's native unit.
    pub amount: u64,
}

/// The managed vault contract. One instance per deployment, created by
/// the factory and initialized exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedVault {
    address: Address,
    initialized: bool,
    name: String,
    symbol: String,
    roles: Roles,
    redemption_queue: Address,
    allowlist: HashSet<Address>,
    deposit_config: HashMap<TokenId, DepositConfig>,
    price: PriceState,
    balances: HashMap<Address, u64>,
    share_allowances: HashMap<Address, HashMap<Address, u64>>,
    total_shares: u64,
    pending_deposits: Vec<PendingDeposit>,
    last_deposit_block: u64,
    events: Vec<VaultEvent>,
}

impl ManagedVault {
    /// Creates an uninitialized vault at the given address.
    ///
    /// Every state-touching operation fails with
    /// [`VaultError::NotInitialized`] until [`initialize`](Self::initialize)
    /// runs.
    pub fn new(address: impl Into<Address>) -> Self {
        Self {
            address: address.into(),
            initialized: false,
            name: String::new(),
            symbol: String::new(),
            roles: Roles::new("", ""),
            redemption_queue: String::new(),
            allowlist: HashSet::new(),
            deposit_config: HashMap::new(),
            price: PriceState::default(),
            balances: HashMap::new(),
            share_allowances: HashMap::new(),
            total_shares: 0,
            pending_deposits: Vec::new(),
            last_deposit_block: 0,
            events: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// One-time initialization: wires the roles, the privileged queue
    /// address, and the share-token metadata.
    ///
    /// The queue address is placed on the allowlist so registered shares
    /// can be held in custody.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::AlreadyInitialized`] on re-entry,
    /// [`VaultError::ZeroAddress`] if any role address is empty.
    pub fn initialize(
        &mut self,
        owner: &str,
        admin: &str,
        redemption_queue: &str,
        name: impl Into<String>,
        symbol: impl Into<String>,
    ) -> Result<(), VaultError> {
        if self.initialized {
            return Err(VaultError::AlreadyInitialized);
        }
        if owner.is_empty() || admin.is_empty() || redemption_queue.is_empty() {
            return Err(VaultError::ZeroAddress);
        }

        self.roles = Roles::new(owner, admin);
        self.redemption_queue = redemption_queue.to_string();
        self.name = name.into();
        self.symbol = symbol.into();
        self.allowlist.insert(redemption_queue.to_string());
        self.initialized = true;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Owner configuration
    // -----------------------------------------------------------------------

    /// Owner-only: marks a token accepted (or not) for deposits.
    pub fn set_token_deposit_state(
        &mut self,
        caller: &str,
        token: &str,
        accepted: bool,
    ) -> Result<(), VaultError> {
        self.require_initialized()?;
        self.roles.require_owner(caller)?;
        self.deposit_config
            .entry(token.to_string())
            .or_default()
            .accepted = accepted;
        Ok(())
    }

    /// Owner-only: sets the minimum per-deposit amount for a token.
    pub fn set_token_minimum_deposit_amount(
        &mut self,
        caller: &str,
        token: &str,
        amount: u64,
    ) -> Result<(), VaultError> {
        self.require_initialized()?;
        self.roles.require_owner(caller)?;
        self.deposit_config
            .entry(token.to_string())
            .or_default()
            .minimum_deposit = amount;
        Ok(())
    }

    /// Owner-only: records the NAV price, the per-token price table, and
    /// the block the observation was made at. The sole mechanism that
    /// advances price freshness.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::LengthMismatch`] if `tokens` and `prices`
    /// differ in length, [`VaultError::PriceBlockRegression`] if the
    /// supplied block precedes the last recorded one.
    pub fn set_prices(
        &mut self,
        caller: &str,
        block_number: u64,
        nav_price: u64,
        total_value: u64,
        tokens: &[TokenId],
        prices: &[u64],
    ) -> Result<(), VaultError> {
        self.require_initialized()?;
        self.roles.require_owner(caller)?;
        if tokens.len() != prices.len() {
            return Err(VaultError::LengthMismatch {
                tokens: tokens.len(),
                prices: prices.len(),
            });
        }
        if block_number < self.price.block {
            return Err(VaultError::PriceBlockRegression {
                block: block_number,
                last: self.price.block,
            });
        }

        self.price.nav_price = nav_price;
        self.price.total_value = total_value;
        self.price.block = block_number;
        for (token, price) in tokens.iter().zip(prices.iter()) {
            self.price.token_prices.insert(token.clone(), *price);
        }

        self.events.push(VaultEvent::PricesSet {
            block: block_number,
            nav_price,
            total_value,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Deposits and minting
    // -----------------------------------------------------------------------

    /// Pulls `amount` of `token` from the caller into the vault and
    /// credits a pending deposit. No shares are minted here — the manager
    /// converts pending deposits with [`mint`](Self::mint) after recording
    /// a fresh price.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::TokenNotAccepted`] /
    /// [`VaultError::DepositBelowMinimum`] on configuration failures; the
    /// token ledger's errors (insufficient balance or allowance) propagate
    /// unchanged from the pull.
    pub fn deposit_token(
        &mut self,
        tokens: &mut TokenLedger,
        env: &BlockEnv,
        caller: &str,
        token: &str,
        amount: u64,
    ) -> Result<(), VaultError> {
        self.require_initialized()?;
        let config = self
            .deposit_config
            .get(token)
            .copied()
            .unwrap_or_default();
        if !config.accepted {
            return Err(VaultError::TokenNotAccepted(token.to_string()));
        }
        if amount < config.minimum_deposit {
            return Err(VaultError::DepositBelowMinimum {
                amount,
                minimum: config.minimum_deposit,
            });
        }

        tokens.transfer_from(token, &self.address, caller, &self.address, amount)?;

        self.pending_deposits.push(PendingDeposit {
            user: caller.to_string(),
            token: token.to_string(),
            amount,
        });
        self.last_deposit_block = env.number;
        self.events.push(VaultEvent::TokenDeposited {
            user: caller.to_string(),
            token: token.to_string(),
            amount,
        });
        Ok(())
    }

    /// Owner-only: converts all pending deposits into shares at the
    /// current NAV price. Each depositor receives
    /// `floor(Σ amount × token_price / nav_price)` shares.
    ///
    /// `min_shares` is the manager's minimum-acceptable total across the
    /// whole conversion; the call fails if the computed total falls short,
    /// so a price moving between inspection and execution cannot silently
    /// under-issue.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::PriceNotRefreshed`] unless the price block
    /// postdates the most recent pending deposit, and
    /// [`VaultError::MintBelowRequested`] if the conversion total is below
    /// `min_shares`. Nothing is cleared or credited on failure.
    pub fn mint(&mut self, caller: &str, min_shares: u64) -> Result<u64, VaultError> {
        self.require_initialized()?;
        self.roles.require_owner(caller)?;
        if self.pending_deposits.is_empty() {
            return Err(VaultError::NoPendingDeposits);
        }
        if self.price.nav_price == 0 {
            return Err(VaultError::NavPriceNotSet);
        }
        if self.price.block <= self.last_deposit_block {
            return Err(VaultError::PriceNotRefreshed {
                price_block: self.price.block,
                deposit_block: self.last_deposit_block,
            });
        }

        // Aggregate deposited value per user, preserving first-deposit order.
        let mut order: Vec<Address> = Vec::new();
        let mut values: HashMap<Address, u128> = HashMap::new();
        for deposit in &self.pending_deposits {
            let price = *self
                .price
                .token_prices
                .get(&deposit.token)
                .ok_or_else(|| VaultError::MissingTokenPrice(deposit.token.clone()))?;
            let value = (deposit.amount as u128) * (price as u128);
            match values.get_mut(&deposit.user) {
                Some(total) => {
                    *total = total.checked_add(value).ok_or(VaultError::Overflow)?;
                }
                None => {
                    order.push(deposit.user.clone());
                    values.insert(deposit.user.clone(), value);
                }
            }
        }

        let nav = self.price.nav_price as u128;
        let mut issuance: Vec<(Address, u64)> = Vec::with_capacity(order.len());
        let mut total_minted: u64 = 0;
        for user in order {
            let shares_u128 = values[&user] / nav;
            let shares = u64::try_from(shares_u128).map_err(|_| VaultError::Overflow)?;
            total_minted = total_minted
                .checked_add(shares)
                .ok_or(VaultError::Overflow)?;
            issuance.push((user, shares));
        }
        if total_minted < min_shares {
            return Err(VaultError::MintBelowRequested {
                computed: total_minted,
                requested: min_shares,
            });
        }
        self.total_shares = self
            .total_shares
            .checked_add(total_minted)
            .ok_or(VaultError::Overflow)?;

        // All checks passed — commit.
        for (user, shares) in issuance {
            *self.balances.entry(user.clone()).or_insert(0) += shares;
            self.events.push(VaultEvent::SharesMinted {
                to: user,
                amount: shares,
            });
        }
        self.pending_deposits.clear();

        Ok(total_minted)
    }

    // -----------------------------------------------------------------------
    // Share token
    // -----------------------------------------------------------------------

    /// Approves `spender` to move up to `amount` of the caller's shares
    /// via [`transfer_from`](Self::transfer_from).
    pub fn approve(
        &mut self,
        caller: &str,
        spender: &str,
        amount: u64,
    ) -> Result<(), VaultError> {
        self.require_initialized()?;
        self.share_allowances
            .entry(caller.to_string())
            .or_default()
            .insert(spender.to_string(), amount);
        Ok(())
    }

    /// Public share transfer. Both sender and receiver must be on the
    /// allowlist unless the caller is the admin.
    pub fn transfer(&mut self, caller: &str, to: &str, amount: u64) -> Result<(), VaultError> {
        self.require_initialized()?;
        if !self.transfer_allowed(caller, caller, to) {
            return Err(VaultError::TransferNotAllowed);
        }
        self.move_shares(caller, to, amount)?;
        self.events.push(VaultEvent::SharesTransferred {
            from: caller.to_string(),
            to: to.to_string(),
            amount,
        });
        Ok(())
    }

    /// Allowance-spending share transfer, under the same allowlist rule
    /// as [`transfer`](Self::transfer) applied to the sender/receiver pair.
    pub fn transfer_from(
        &mut self,
        caller: &str,
        from: &str,
        to: &str,
        amount: u64,
    ) -> Result<(), VaultError> {
        self.require_initialized()?;
        if !self.transfer_allowed(caller, from, to) {
            return Err(VaultError::TransferNotAllowed);
        }

        let allowance = self.share_allowance(from, caller);
        if allowance < amount {
            return Err(VaultError::InsufficientShareAllowance {
                allowance,
                requested: amount,
            });
        }
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(VaultError::InsufficientShares {
                available: balance,
                requested: amount,
            });
        }

        self.share_allowances
            .entry(from.to_string())
            .or_default()
            .insert(caller.to_string(), allowance - amount);
        self.move_shares(from, to, amount)?;
        self.events.push(VaultEvent::SharesTransferred {
            from: from.to_string(),
            to: to.to_string(),
            amount,
        });
        Ok(())
    }

    /// Queue-only: destroys `amount` shares from the queue's custodial
    /// balance. Called during redemption activation.
    pub fn burn(&mut self, caller: &str, amount: u64) -> Result<(), VaultError> {
        self.require_initialized()?;
        self.require_queue(caller)?;

        let custody = self.balance_of(&self.redemption_queue);
        if custody < amount {
            return Err(VaultError::InsufficientShares {
                available: custody,
                requested: amount,
            });
        }
        if let Some(balance) = self.balances.get_mut(&self.redemption_queue) {
            *balance -= amount;
        }
        self.total_shares -= amount;
        self.events.push(VaultEvent::SharesBurned {
            from: self.redemption_queue.clone(),
            amount,
        });
        Ok(())
    }

    /// Queue-only: moves `shares` from `user` into queue custody.
    ///
    /// Used by registration; this path bypasses the public allowlist rule
    /// because the queue is the single privileged mover of custodial
    /// shares.
    pub fn transfer_to_queue(
        &mut self,
        caller: &str,
        user: &str,
        shares: u64,
    ) -> Result<(), VaultError> {
        self.require_initialized()?;
        self.require_queue(caller)?;
        let queue = self.redemption_queue.clone();
        self.move_shares(user, &queue, shares)?;
        self.events.push(VaultEvent::SharesTransferred {
            from: user.to_string(),
            to: queue,
            amount: shares,
        });
        Ok(())
    }

    /// Queue-only: returns `shares` from queue custody to `user`.
    /// The unregistration counterpart of
    /// [`transfer_to_queue`](Self::transfer_to_queue).
    pub fn transfer_from_queue(
        &mut self,
        caller: &str,
        user: &str,
        shares: u64,
    ) -> Result<(), VaultError> {
        self.require_initialized()?;
        self.require_queue(caller)?;
        let queue = self.redemption_queue.clone();
        self.move_shares(&queue, user, shares)?;
        self.events.push(VaultEvent::SharesTransferred {
            from: queue,
            to: user.to_string(),
            amount: shares,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Admin
    // -----------------------------------------------------------------------

    /// Admin-only: reassigns the operational owner.
    pub fn change_owner(&mut self, caller: &str, new_owner: &str) -> Result<(), VaultError> {
        self.require_initialized()?;
        self.roles.require_admin(caller)?;
        if new_owner.is_empty() {
            return Err(VaultError::ZeroAddress);
        }
        let previous = std::mem::replace(&mut self.roles.owner, new_owner.to_string());
        self.events.push(VaultEvent::OwnerChanged {
            previous,
            new_owner: new_owner.to_string(),
        });
        Ok(())
    }

    /// Admin-only: adds or removes an address from the transfer allowlist.
    pub fn change_allowlist(
        &mut self,
        caller: &str,
        address: &str,
        allowed: bool,
    ) -> Result<(), VaultError> {
        self.require_initialized()?;
        self.roles.require_admin(caller)?;
        if allowed {
            self.allowlist.insert(address.to_string());
        } else {
            self.allowlist.remove(address);
        }
        self.events.push(VaultEvent::AllowlistChanged {
            address: address.to_string(),
            allowed,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// Share token name. Empty before initialization.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Share token symbol. Empty before initialization.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// This vault's own address on the ledger.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The admin address. Empty before initialization.
    pub fn admin(&self) -> &str {
        &self.roles.admin
    }

    /// The operational owner (manager). Empty before initialization.
    pub fn owner(&self) -> &str {
        &self.roles.owner
    }

    /// The privileged redemption queue address.
    pub fn redemption_queue(&self) -> &str {
        &self.redemption_queue
    }

    /// Whether `address` is on the transfer allowlist.
    pub fn allowlist(&self, address: &str) -> bool {
        self.allowlist.contains(address)
    }

    /// Share balance of `address`.
    pub fn balance_of(&self, address: &str) -> u64 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    /// Remaining share allowance `owner -> spender`.
    pub fn share_allowance(&self, owner: &str, spender: &str) -> u64 {
        self.share_allowances
            .get(owner)
            .and_then(|per_spender| per_spender.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// Total shares in existence, the queue's custodial balance included.
    pub fn total_shares(&self) -> u64 {
        self.total_shares
    }

    /// The latest NAV price. 0 until the first `set_prices`.
    pub fn nav_price(&self) -> u64 {
        self.price.nav_price
    }

    /// Block height of the latest price update.
    pub fn price_block(&self) -> u64 {
        self.price.block
    }

    /// Latest recorded price for `token`, if any.
    pub fn token_price(&self, token: &str) -> Option<u64> {
        self.price.token_prices.get(token).copied()
    }

    /// Deposit configuration for `token`.
    pub fn deposit_config(&self, token: &str) -> DepositConfig {
        self.deposit_config.get(token).copied().unwrap_or_default()
    }

    /// Pending deposits awaiting conversion, in arrival order.
    pub fn pending_deposits(&self) -> &[PendingDeposit] {
        &self.pending_deposits
    }

    /// The freshness predicate the queue checks at activation: blocks
    /// elapsed since the last price update.
    pub fn blocks_since_price_update(&self, current_block: u64) -> u64 {
        current_block.saturating_sub(self.price.block)
    }

    /// The emitted-record log, in emission order.
    pub fn events(&self) -> &[VaultEvent] {
        &self.events
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn require_initialized(&self) -> Result<(), VaultError> {
        if self.initialized {
            Ok(())
        } else {
            Err(VaultError::NotInitialized)
        }
    }

    fn require_queue(&self, caller: &str) -> Result<(), VaultError> {
        if caller == self.redemption_queue {
            Ok(())
        } else {
            Err(VaultError::Access(AccessError::Unauthorized {
                caller: caller.to_string(),
                role: "redemption queue".to_string(),
            }))
        }
    }

    fn transfer_allowed(&self, caller: &str, from: &str, to: &str) -> bool {
        self.roles.is_admin(caller)
            || (self.allowlist.contains(from) && self.allowlist.contains(to))
    }

    fn move_shares(&mut self, from: &str, to: &str, amount: u64) -> Result<(), VaultError> {
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(VaultError::InsufficientShares {
                available: balance,
                requested: amount,
            });
        }
        if let Some(b) = self.balances.get_mut(from) {
            *b -= amount;
        }
        let receiving = self.balances.entry(to.to_string()).or_insert(0);
        *receiving = receiving.checked_add(amount).ok_or(VaultError::Overflow)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_core::env::BlockEnv;

    const MANAGER: &str = "manager";
    const ADMIN: &str = "deployer";
    const QUEUE: &str = "queue";

    fn initialized_vault() -> ManagedVault {
        let mut vault = ManagedVault::new("vault");
        vault
            .initialize(MANAGER, ADMIN, QUEUE, "TOKEN", "TKN")
            .unwrap();
        vault
    }

    /// Vault plus a token ledger holding 10_000 DAI for alice, approved
    /// to the vault, with DAI accepted at minimum 100.
    fn vault_with_deposit_setup() -> (ManagedVault, TokenLedger, TokenId) {
        let mut vault = initialized_vault();
        let mut tokens = TokenLedger::new();
        let dai = tokens.create_token("Dai Stablecoin", "DAI", 18).unwrap();
        tokens.mint(&dai, "alice", 10_000).unwrap();
        tokens.approve(&dai, "alice", "vault", u64::MAX).unwrap();
        vault.set_token_deposit_state(MANAGER, &dai, true).unwrap();
        vault
            .set_token_minimum_deposit_amount(MANAGER, &dai, 100)
            .unwrap();
        (vault, tokens, dai)
    }

    // -----------------------------------------------------------------------
    // Initialization
    // -----------------------------------------------------------------------

    #[test]
    fn uninitialized_vault_is_blank() {
        let vault = ManagedVault::new("vault");
        assert_eq!(vault.name(), "");
        assert_eq!(vault.symbol(), "");
        assert_eq!(vault.admin(), "");
        assert_eq!(vault.redemption_queue(), "");
    }

    #[test]
    fn initialize_wires_roles_and_allowlists_queue() {
        let vault = initialized_vault();
        assert_eq!(vault.name(), "TOKEN");
        assert_eq!(vault.symbol(), "TKN");
        assert_eq!(vault.admin(), ADMIN);
        assert_eq!(vault.owner(), MANAGER);
        assert_eq!(vault.redemption_queue(), QUEUE);
        assert!(vault.allowlist(QUEUE));
    }

    #[test]
    fn initialize_callable_only_once() {
        let mut vault = initialized_vault();
        let result = vault.initialize(MANAGER, ADMIN, QUEUE, "TOKEN", "TKN");
        assert!(matches!(result, Err(VaultError::AlreadyInitialized)));
    }

    #[test]
    fn initialize_rejects_empty_addresses() {
        let mut vault = ManagedVault::new("vault");
        let result = vault.initialize("", ADMIN, QUEUE, "TOKEN", "TKN");
        assert!(matches!(result, Err(VaultError::ZeroAddress)));
    }

    #[test]
    fn operations_fail_before_initialize() {
        let mut vault = ManagedVault::new("vault");
        assert!(matches!(
            vault.set_token_deposit_state(MANAGER, "dai", true),
            Err(VaultError::NotInitialized)
        ));
        assert!(matches!(
            vault.transfer(MANAGER, "alice", 1),
            Err(VaultError::NotInitialized)
        ));
    }

    // -----------------------------------------------------------------------
    // Prices
    // -----------------------------------------------------------------------

    #[test]
    fn set_prices_records_state() {
        let mut vault = initialized_vault();
        vault
            .set_prices(MANAGER, 7, 100, 1385, &["dai".into()], &[1])
            .unwrap();
        assert_eq!(vault.nav_price(), 100);
        assert_eq!(vault.price_block(), 7);
        assert_eq!(vault.token_price("dai"), Some(1));
    }

    #[test]
    fn set_prices_owner_only() {
        let mut vault = initialized_vault();
        let result = vault.set_prices(ADMIN, 7, 100, 1385, &[], &[]);
        assert!(matches!(result, Err(VaultError::Access(_))));
    }

    #[test]
    fn set_prices_length_mismatch_rejected() {
        let mut vault = initialized_vault();
        let result = vault.set_prices(MANAGER, 7, 100, 1385, &["dai".into()], &[1, 2]);
        assert!(matches!(
            result,
            Err(VaultError::LengthMismatch {
                tokens: 1,
                prices: 2
            })
        ));
    }

    #[test]
    fn price_block_cannot_move_backwards() {
        let mut vault = initialized_vault();
        vault.set_prices(MANAGER, 10, 100, 0, &[], &[]).unwrap();
        let result = vault.set_prices(MANAGER, 9, 100, 0, &[], &[]);
        assert!(matches!(
            result,
            Err(VaultError::PriceBlockRegression { block: 9, last: 10 })
        ));
        // Re-recording at the same block is allowed (non-decreasing).
        vault.set_prices(MANAGER, 10, 120, 0, &[], &[]).unwrap();
        assert_eq!(vault.nav_price(), 120);
    }

    #[test]
    fn blocks_since_price_update_counts_from_price_block() {
        let mut vault = initialized_vault();
        vault.set_prices(MANAGER, 100, 100, 0, &[], &[]).unwrap();
        assert_eq!(vault.blocks_since_price_update(100), 0);
        assert_eq!(vault.blocks_since_price_update(5100), 5000);
    }

    // -----------------------------------------------------------------------
    // Deposits
    // -----------------------------------------------------------------------

    #[test]
    fn deposit_pulls_tokens_and_credits_pending() {
        let (mut vault, mut tokens, dai) = vault_with_deposit_setup();
        let env = BlockEnv::genesis().advanced(5, chrono::Duration::zero());

        vault
            .deposit_token(&mut tokens, &env, "alice", &dai, 1000)
            .unwrap();

        assert_eq!(tokens.balance_of(&dai, "alice"), 9_000);
        assert_eq!(tokens.balance_of(&dai, "vault"), 1_000);
        assert_eq!(vault.pending_deposits().len(), 1);
        assert_eq!(vault.pending_deposits()[0].amount, 1000);
        // No shares minted by a deposit.
        assert_eq!(vault.total_shares(), 0);
    }

    #[test]
    fn deposit_of_unaccepted_token_rejected() {
        let (mut vault, mut tokens, dai) = vault_with_deposit_setup();
        vault.set_token_deposit_state(MANAGER, &dai, false).unwrap();
        let env = BlockEnv::genesis();
        let result = vault.deposit_token(&mut tokens, &env, "alice", &dai, 1000);
        assert!(matches!(result, Err(VaultError::TokenNotAccepted(_))));
    }

    #[test]
    fn deposit_below_minimum_rejected() {
        let (mut vault, mut tokens, dai) = vault_with_deposit_setup();
        let env = BlockEnv::genesis();
        let result = vault.deposit_token(&mut tokens, &env, "alice", &dai, 99);
        assert!(matches!(
            result,
            Err(VaultError::DepositBelowMinimum {
                amount: 99,
                minimum: 100
            })
        ));
    }

    #[test]
    fn deposit_without_token_approval_rejected() {
        let (mut vault, mut tokens, dai) = vault_with_deposit_setup();
        tokens.approve(&dai, "alice", "vault", 0).unwrap();
        let env = BlockEnv::genesis();
        let result = vault.deposit_token(&mut tokens, &env, "alice", &dai, 1000);
        assert!(matches!(
            result,
            Err(VaultError::Token(TokenError::InsufficientAllowance { .. }))
        ));
        assert!(vault.pending_deposits().is_empty());
    }

    // -----------------------------------------------------------------------
    // Minting
    // -----------------------------------------------------------------------

    #[test]
    fn mint_converts_pending_deposits_at_nav() {
        let (mut vault, mut tokens, dai) = vault_with_deposit_setup();
        let env = BlockEnv::genesis();

        vault
            .set_prices(MANAGER, env.number, 100, 1385, &[dai.clone()], &[1])
            .unwrap();
        let env = env.advanced(1, chrono::Duration::zero());
        vault
            .deposit_token(&mut tokens, &env, "alice", &dai, 1000)
            .unwrap();
        let env = env.advanced(1, chrono::Duration::zero());
        vault
            .set_prices(MANAGER, env.number, 100, 1385, &[dai.clone()], &[1])
            .unwrap();

        let minted = vault.mint(MANAGER, 10).unwrap();
        assert_eq!(minted, 10);
        assert_eq!(vault.balance_of("alice"), 10);
        assert_eq!(vault.total_shares(), 10);
        assert!(vault.pending_deposits().is_empty());
    }

    #[test]
    fn mint_distributes_proportionally_to_value() {
        // Two depositors at NAV 100 and token price 1: 1000 and 500 units
        // convert to 10 and 5 shares.
        let (mut vault, mut tokens, dai) = vault_with_deposit_setup();
        tokens.mint(&dai, "bob", 500).unwrap();
        tokens.approve(&dai, "bob", "vault", u64::MAX).unwrap();

        let env = BlockEnv::genesis().advanced(1, chrono::Duration::zero());
        vault
            .deposit_token(&mut tokens, &env, "alice", &dai, 1000)
            .unwrap();
        vault
            .deposit_token(&mut tokens, &env, "bob", &dai, 500)
            .unwrap();
        vault
            .set_prices(MANAGER, 2, 100, 1500, &[dai.clone()], &[1])
            .unwrap();

        let minted = vault.mint(MANAGER, 10).unwrap();
        assert_eq!(minted, 15);
        assert_eq!(vault.balance_of("alice"), 10);
        assert_eq!(vault.balance_of("bob"), 5);
        assert_eq!(vault.total_shares(), 15);
    }

    #[test]
    fn mint_requires_price_after_deposits() {
        let (mut vault, mut tokens, dai) = vault_with_deposit_setup();
        let env = BlockEnv::genesis().advanced(3, chrono::Duration::zero());

        vault
            .set_prices(MANAGER, 3, 100, 1385, &[dai.clone()], &[1])
            .unwrap();
        vault
            .deposit_token(&mut tokens, &env, "alice", &dai, 1000)
            .unwrap();

        // Price block 3 does not postdate the deposit at block 3.
        let result = vault.mint(MANAGER, 10);
        assert!(matches!(result, Err(VaultError::PriceNotRefreshed { .. })));
        // Pending deposits survive the failed mint.
        assert_eq!(vault.pending_deposits().len(), 1);
    }

    #[test]
    fn mint_below_requested_minimum_rejected() {
        let (mut vault, mut tokens, dai) = vault_with_deposit_setup();
        let env = BlockEnv::genesis().advanced(1, chrono::Duration::zero());
        vault
            .deposit_token(&mut tokens, &env, "alice", &dai, 1000)
            .unwrap();
        vault
            .set_prices(MANAGER, 2, 100, 1000, &[dai.clone()], &[1])
            .unwrap();

        let result = vault.mint(MANAGER, 11);
        assert!(matches!(
            result,
            Err(VaultError::MintBelowRequested {
                computed: 10,
                requested: 11
            })
        ));
        assert_eq!(vault.total_shares(), 0);
    }

    #[test]
    fn mint_with_no_pending_deposits_rejected() {
        let mut vault = initialized_vault();
        vault.set_prices(MANAGER, 1, 100, 0, &[], &[]).unwrap();
        assert!(matches!(
            vault.mint(MANAGER, 0),
            Err(VaultError::NoPendingDeposits)
        ));
    }

    // -----------------------------------------------------------------------
    // Transfers and the allowlist
    // -----------------------------------------------------------------------

    fn vault_with_shares() -> ManagedVault {
        let mut vault = initialized_vault();
        // Mint path exercised elsewhere; seed balances directly through it.
        let mut tokens = TokenLedger::new();
        let dai = tokens.create_token("Dai Stablecoin", "DAI", 18).unwrap();
        tokens.mint(&dai, "alice", 10_000).unwrap();
        tokens.approve(&dai, "alice", "vault", u64::MAX).unwrap();
        vault.set_token_deposit_state(MANAGER, &dai, true).unwrap();
        let env = BlockEnv::genesis().advanced(1, chrono::Duration::zero());
        vault
            .deposit_token(&mut tokens, &env, "alice", &dai, 1000)
            .unwrap();
        vault
            .set_prices(MANAGER, 2, 100, 1000, &[dai], &[1])
            .unwrap();
        vault.mint(MANAGER, 10).unwrap();
        vault
    }

    #[test]
    fn transfer_blocked_off_allowlist() {
        let mut vault = vault_with_shares();
        let result = vault.transfer("alice", "bob", 5);
        assert!(matches!(result, Err(VaultError::TransferNotAllowed)));
        assert_eq!(vault.balance_of("alice"), 10);
    }

    #[test]
    fn transfer_allowed_when_both_parties_allowlisted() {
        let mut vault = vault_with_shares();
        vault.change_allowlist(ADMIN, "alice", true).unwrap();
        vault.change_allowlist(ADMIN, "bob", true).unwrap();
        vault.transfer("alice", "bob", 5).unwrap();
        assert_eq!(vault.balance_of("alice"), 5);
        assert_eq!(vault.balance_of("bob"), 5);
    }

    #[test]
    fn transfer_blocked_when_receiver_off_allowlist() {
        let mut vault = vault_with_shares();
        vault.change_allowlist(ADMIN, "alice", true).unwrap();
        let result = vault.transfer("alice", "bob", 5);
        assert!(matches!(result, Err(VaultError::TransferNotAllowed)));
    }

    #[test]
    fn admin_bypasses_allowlist() {
        let mut vault = vault_with_shares();
        vault.approve("alice", ADMIN, u64::MAX).unwrap();
        vault.transfer_from(ADMIN, "alice", "bob", 5).unwrap();
        assert_eq!(vault.balance_of("bob"), 5);
    }

    #[test]
    fn transfer_from_spends_share_allowance() {
        let mut vault = vault_with_shares();
        vault.change_allowlist(ADMIN, "alice", true).unwrap();
        vault.change_allowlist(ADMIN, "carol", true).unwrap();
        vault.approve("alice", "spender", 6).unwrap();
        vault.change_allowlist(ADMIN, "spender", true).unwrap();

        // Spender is not admin; sender and receiver are allowlisted.
        vault.transfer_from("spender", "alice", "carol", 4).unwrap();
        assert_eq!(vault.share_allowance("alice", "spender"), 2);

        let result = vault.transfer_from("spender", "alice", "carol", 4);
        assert!(matches!(
            result,
            Err(VaultError::InsufficientShareAllowance {
                allowance: 2,
                requested: 4
            })
        ));
    }

    // -----------------------------------------------------------------------
    // Queue privileges
    // -----------------------------------------------------------------------

    #[test]
    fn burn_callable_only_by_queue() {
        let mut vault = vault_with_shares();
        vault.transfer_to_queue(QUEUE, "alice", 10).unwrap();

        assert!(matches!(
            vault.burn("alice", 10),
            Err(VaultError::Access(_))
        ));
        assert!(matches!(vault.burn(ADMIN, 10), Err(VaultError::Access(_))));

        vault.burn(QUEUE, 10).unwrap();
        assert_eq!(vault.total_shares(), 0);
        assert_eq!(vault.balance_of(QUEUE), 0);
    }

    #[test]
    fn burn_limited_to_custodial_balance() {
        let mut vault = vault_with_shares();
        vault.transfer_to_queue(QUEUE, "alice", 4).unwrap();
        let result = vault.burn(QUEUE, 5);
        assert!(matches!(
            result,
            Err(VaultError::InsufficientShares {
                available: 4,
                requested: 5
            })
        ));
    }

    #[test]
    fn custody_round_trip() {
        let mut vault = vault_with_shares();
        vault.transfer_to_queue(QUEUE, "alice", 7).unwrap();
        assert_eq!(vault.balance_of("alice"), 3);
        assert_eq!(vault.balance_of(QUEUE), 7);

        vault.transfer_from_queue(QUEUE, "alice", 7).unwrap();
        assert_eq!(vault.balance_of("alice"), 10);
        assert_eq!(vault.balance_of(QUEUE), 0);
    }

    #[test]
    fn custody_moves_restricted_to_queue() {
        let mut vault = vault_with_shares();
        assert!(matches!(
            vault.transfer_to_queue("alice", "alice", 5),
            Err(VaultError::Access(_))
        ));
        assert!(matches!(
            vault.transfer_from_queue(ADMIN, "alice", 5),
            Err(VaultError::Access(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Admin operations
    // -----------------------------------------------------------------------

    #[test]
    fn change_owner_admin_only() {
        let mut vault = initialized_vault();
        assert!(matches!(
            vault.change_owner(MANAGER, "alice"),
            Err(VaultError::Access(_))
        ));
        vault.change_owner(ADMIN, "alice").unwrap();
        assert_eq!(vault.owner(), "alice");
    }

    #[test]
    fn change_allowlist_admin_only() {
        let mut vault = initialized_vault();
        assert!(matches!(
            vault.change_allowlist(MANAGER, "alice", true),
            Err(VaultError::Access(_))
        ));
        vault.change_allowlist(ADMIN, "alice", true).unwrap();
        assert!(vault.allowlist("alice"));
        vault.change_allowlist(ADMIN, "alice", false).unwrap();
        assert!(!vault.allowlist("alice"));
    }

    #[test]
    fn vault_serialization_roundtrip() {
        let vault = vault_with_shares();
        let json = serde_json::to_string(&vault).unwrap();
        let back: ManagedVault = serde_json::from_str(&json).unwrap();
        assert_eq!(back.balance_of("alice"), 10);
        assert_eq!(back.total_shares(), 10);
        assert_eq!(back.owner(), MANAGER);
    }
}
