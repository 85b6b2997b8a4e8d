//! # Token Ledger
//!
//! The fungible-token collaborator shared by the vault contracts. Tracks
//! any number of registered tokens with per-address balances and
//! ERC20-style allowances. The vault pulls deposits through
//! `transfer_from`, the redemption queue pulls settlement funding the
//! same way and pays claimants with `transfer` — the contracts never
//! reimplement token semantics themselves.
//!
//! Supply and balances are maintained atomically with checked math on
//! every operation. An operation either fully applies or returns an
//! error with nothing written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::access::Address;

/// Unique identifier for a token, assigned by the ledger at registration.
pub type TokenId = String;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during token ledger operations.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The referenced token does not exist.
    #[error("token not found: {0}")]
    TokenNotFound(TokenId),

    /// A token with this symbol already exists.
    #[error("duplicate symbol: a token with symbol '{0}' already exists")]
    DuplicateSymbol(String),

    /// A supply or balance overflow would occur.
    #[error("supply overflow: adding {amount} would exceed u64::MAX")]
    SupplyOverflow {
        /// The amount that was attempted.
        amount: u64,
    },

    /// The holder's balance is short for a transfer or burn.
    #[error("insufficient balance: account has {balance}, requested {requested}")]
    InsufficientBalance {
        /// Current balance of the account.
        balance: u64,
        /// Amount the caller tried to move.
        requested: u64,
    },

    /// The spender's allowance is short for a `transfer_from`.
    #[error("insufficient allowance: approved {allowance}, requested {requested}")]
    InsufficientAllowance {
        /// Amount the owner approved for this spender.
        allowance: u64,
        /// Amount the spender tried to move.
        requested: u64,
    },
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Metadata and supply information for a registered token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Unique token identifier.
    pub token_id: TokenId,
    /// Human-readable token name (e.g., "Dai Stablecoin").
    pub name: String,
    /// Ticker symbol. Unique across the ledger, case-insensitive.
    pub symbol: String,
    /// Number of decimal places.
    pub decimals: u8,
    /// Current total supply in the smallest denomination.
    pub total_supply: u64,
    /// Timestamp when the token was registered.
    pub created_at: DateTime<Utc>,
}

/// The token ledger — balances, allowances, and supply for every
/// registered token.
///
/// In production this state would live in the enclosing ledger's state
/// trie; the in-memory representation carries the validation logic and
/// is what the contracts and tests operate on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenLedger {
    /// Registered tokens keyed by their unique ID.
    tokens: HashMap<TokenId, TokenInfo>,
    /// Per-token, per-address balances: `token_id -> (address -> balance)`.
    balances: HashMap<TokenId, HashMap<Address, u64>>,
    /// Per-token allowances: `token_id -> (owner -> (spender -> amount))`.
    allowances: HashMap<TokenId, HashMap<Address, HashMap<Address, u64>>>,
    /// Index from upper-cased symbol to token ID for uniqueness enforcement.
    symbol_index: HashMap<String, TokenId>,
}

impl TokenLedger {
    /// Creates a new, empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new token with zero supply and returns its unique ID.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::DuplicateSymbol`] if the symbol is already taken.
    pub fn create_token(
        &mut self,
        name: impl Into<String>,
        symbol: impl Into<String>,
        decimals: u8,
    ) -> Result<TokenId, TokenError> {
        let symbol = symbol.into();
        let symbol_upper = symbol.to_uppercase();
        if self.symbol_index.contains_key(&symbol_upper) {
            return Err(TokenError::DuplicateSymbol(symbol));
        }

        let token_id = Uuid::new_v4().to_string();
        let info = TokenInfo {
            token_id: token_id.clone(),
            name: name.into(),
            symbol: symbol_upper.clone(),
            decimals,
            total_supply: 0,
            created_at: Utc::now(),
        };

        self.tokens.insert(token_id.clone(), info);
        self.balances.insert(token_id.clone(), HashMap::new());
        self.allowances.insert(token_id.clone(), HashMap::new());
        self.symbol_index.insert(symbol_upper, token_id.clone());

        Ok(token_id)
    }

    /// Mints new tokens to the specified address.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::TokenNotFound`] if the token does not exist.
    /// Returns [`TokenError::SupplyOverflow`] if the mint would overflow u64.
    pub fn mint(&mut self, token_id: &str, to: &str, amount: u64) -> Result<(), TokenError> {
        let info = self
            .tokens
            .get_mut(token_id)
            .ok_or_else(|| TokenError::TokenNotFound(token_id.to_string()))?;

        info.total_supply = info
            .total_supply
            .checked_add(amount)
            .ok_or(TokenError::SupplyOverflow { amount })?;

        let balances = self
            .balances
            .entry(token_id.to_string())
            .or_default();
        let balance = balances.entry(to.to_string()).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(TokenError::SupplyOverflow { amount })?;

        Ok(())
    }

    /// Burns tokens from the specified address.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::TokenNotFound`] if the token does not exist.
    /// Returns [`TokenError::InsufficientBalance`] if the holder is short.
    pub fn burn(&mut self, token_id: &str, from: &str, amount: u64) -> Result<(), TokenError> {
        if !self.tokens.contains_key(token_id) {
            return Err(TokenError::TokenNotFound(token_id.to_string()));
        }
        self.debit(token_id, from, amount)?;

        let info = self
            .tokens
            .get_mut(token_id)
            .ok_or_else(|| TokenError::TokenNotFound(token_id.to_string()))?;
        info.total_supply = info.total_supply.saturating_sub(amount);

        Ok(())
    }

    /// Moves `amount` from `caller` to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InsufficientBalance`] if the caller is short.
    pub fn transfer(
        &mut self,
        token_id: &str,
        caller: &str,
        to: &str,
        amount: u64,
    ) -> Result<(), TokenError> {
        if !self.tokens.contains_key(token_id) {
            return Err(TokenError::TokenNotFound(token_id.to_string()));
        }
        self.debit(token_id, caller, amount)?;
        self.credit(token_id, to, amount)
    }

    /// Sets the allowance `owner -> spender` for the caller's funds.
    ///
    /// Mirrors ERC20 `approve`: a later call overwrites the previous value.
    pub fn approve(
        &mut self,
        token_id: &str,
        caller: &str,
        spender: &str,
        amount: u64,
    ) -> Result<(), TokenError> {
        if !self.tokens.contains_key(token_id) {
            return Err(TokenError::TokenNotFound(token_id.to_string()));
        }
        self.allowances
            .entry(token_id.to_string())
            .or_default()
            .entry(caller.to_string())
            .or_default()
            .insert(spender.to_string(), amount);
        Ok(())
    }

    /// Moves `amount` from `from` to `to`, spending the caller's allowance.
    ///
    /// The allowance is decremented before the balances move, and the
    /// whole call aborts with no effect if either check fails.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InsufficientAllowance`] if the caller's
    /// allowance from `from` is short, [`TokenError::InsufficientBalance`]
    /// if `from`'s balance is short.
    pub fn transfer_from(
        &mut self,
        token_id: &str,
        caller: &str,
        from: &str,
        to: &str,
        amount: u64,
    ) -> Result<(), TokenError> {
        if !self.tokens.contains_key(token_id) {
            return Err(TokenError::TokenNotFound(token_id.to_string()));
        }

        let allowance = self.allowance(token_id, from, caller);
        if allowance < amount {
            return Err(TokenError::InsufficientAllowance {
                allowance,
                requested: amount,
            });
        }
        let balance = self.balance_of(token_id, from);
        if balance < amount {
            return Err(TokenError::InsufficientBalance {
                balance,
                requested: amount,
            });
        }

        if let Some(per_owner) = self.allowances.get_mut(token_id) {
            if let Some(per_spender) = per_owner.get_mut(from) {
                per_spender.insert(caller.to_string(), allowance - amount);
            }
        }
        self.debit(token_id, from, amount)?;
        self.credit(token_id, to, amount)
    }

    /// Returns the balance of `address` for the given token, or 0.
    pub fn balance_of(&self, token_id: &str, address: &str) -> u64 {
        self.balances
            .get(token_id)
            .and_then(|b| b.get(address))
            .copied()
            .unwrap_or(0)
    }

    /// Returns the remaining allowance `owner -> spender`, or 0.
    pub fn allowance(&self, token_id: &str, owner: &str, spender: &str) -> u64 {
        self.allowances
            .get(token_id)
            .and_then(|per_owner| per_owner.get(owner))
            .and_then(|per_spender| per_spender.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// Returns the total supply of a token, or 0 if it does not exist.
    pub fn total_supply(&self, token_id: &str) -> u64 {
        self.tokens
            .get(token_id)
            .map(|t| t.total_supply)
            .unwrap_or(0)
    }

    /// Returns metadata for a token, or `None` if it does not exist.
    pub fn token_info(&self, token_id: &str) -> Option<&TokenInfo> {
        self.tokens.get(token_id)
    }

    /// Returns the number of registered tokens.
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    fn credit(&mut self, token_id: &str, to: &str, amount: u64) -> Result<(), TokenError> {
        let balances = self.balances.entry(token_id.to_string()).or_default();
        let balance = balances.entry(to.to_string()).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(TokenError::SupplyOverflow { amount })?;
        Ok(())
    }

    fn debit(&mut self, token_id: &str, from: &str, amount: u64) -> Result<(), TokenError> {
        let balance = self.balance_of(token_id, from);
        if balance < amount {
            return Err(TokenError::InsufficientBalance {
                balance,
                requested: amount,
            });
        }
        if let Some(b) = self.balances.get_mut(token_id).and_then(|m| m.get_mut(from)) {
            *b -= amount;
        }
        Ok(())
    }
}
