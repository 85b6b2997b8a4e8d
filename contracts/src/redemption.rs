//! # Redemption Queue
//!
//! Runs successive time-boxed redemption epochs against a paired
//! [`ManagedVault`]. Holders register shares while an epoch's registration
//! window is open; the manager activates the epoch once its redemption
//! date arrives, which snapshots the NAV price, burns the registered
//! shares, and schedules the next epoch in the same call. Claimants then
//! settle individually, each payout computed from the snapshotted price
//! minus the epoch's fee.
//!
//! Activation is gated on price freshness: the vault's last price update
//! must be at most [`MAX_PRICE_AGE_BLOCKS`] blocks old, so an epoch can
//! never settle against a forgotten price.
//!
//! Settlement ordering is strict. A claim is zeroed before its payout
//! transfer, and a batched `redeem` validates every epoch id before
//! settling any of them, so a failing id aborts the whole call with
//! nothing paid.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

use vault_core::access::{AccessError, Address, Roles};
use vault_core::env::BlockEnv;
use vault_core::token::{TokenError, TokenId, TokenLedger};

use crate::events::QueueEvent;
use crate::managed_vault::{ManagedVault, VaultError};

/// Maximum redemption fee, in basis points (10%).
pub const MAX_FEE_BPS: u16 = 1000;

/// Basis-point denominator for fee math.
pub const FEE_DENOMINATOR: u64 = 10_000;

/// Maximum allowed block-age of the vault's price at activation.
pub const MAX_PRICE_AGE_BLOCKS: u64 = 5000;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during redemption queue operations.
#[derive(Debug, Error)]
pub enum RedemptionError {
    /// The caller lacks the required role.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// Interval, preparation time, or settlement token not yet configured.
    #[error("redemption schedule is not fully configured")]
    NotConfigured,

    /// A new interval would undercut the configured preparation time.
    #[error(
        "redemption interval of {interval_secs}s is shorter than the \
         preparation time of {preparation_secs}s"
    )]
    IntervalTooShort {
        /// The interval that was supplied.
        interval_secs: u64,
        /// The currently configured preparation time.
        preparation_secs: u64,
    },

    /// `initialize_redemptions` was called a second time.
    #[error("Redemptions are already active")]
    AlreadyInitialized,

    /// An epoch operation arrived before `initialize_redemptions`.
    #[error("redemptions are not initialized")]
    NotInitialized,

    /// The fee exceeds the protocol maximum.
    #[error("fee of {fee_bps} bps exceeds the maximum of {max} bps")]
    FeeTooHigh {
        /// The fee that was supplied.
        fee_bps: u16,
        /// The protocol maximum.
        max: u16,
    },

    /// An explicit redemption date does not leave room for preparation.
    #[error("redemption time must lie beyond the preparation window")]
    RedemptionDateTooSoon,

    /// Register/unregister arrived outside the registration window.
    #[error("registration window is closed for epoch {epoch_id}")]
    RegistrationClosed {
        /// The epoch whose window has passed.
        epoch_id: u64,
    },

    /// The caller holds fewer vault shares than they tried to register.
    #[error("Too few vault tokens")]
    TooFewVaultTokens,

    /// The caller tried to unregister more than their registered claim.
    #[error("Too few registered tokens")]
    TooFewRegisteredTokens,

    /// Activation attempted before the epoch's redemption date.
    #[error("Redemption time in the future")]
    RedemptionTimeInFuture,

    /// The vault's price is older than the freshness bound.
    #[error("Price not set within {max} blocks")]
    StalePrice {
        /// Blocks elapsed since the last price update.
        age_blocks: u64,
        /// The freshness bound.
        max: u64,
    },

    /// Redeem referenced an epoch that was never scheduled.
    #[error("unknown epoch id: {0}")]
    UnknownEpoch(u64),

    /// Redeem referenced an epoch that has not been activated.
    #[error("Redemption is not active yet")]
    RedemptionNotActive {
        /// The epoch that is still pending activation.
        epoch_id: u64,
    },

    /// The caller has no registered claim in the referenced epoch.
    #[error("No tokens registered")]
    NoTokensRegistered,

    /// Arithmetic overflow in claim or payout accounting.
    #[error("redemption amount overflow")]
    Overflow,

    /// A share custody or burn operation on the vault failed.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// A settlement-token transfer failed.
    #[error(transparent)]
    Token(#[from] TokenError),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Lifecycle state of an epoch, computed from the current time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpochState {
    /// Holders may register and unregister shares.
    RegistrationOpen,
    /// The window has passed; the epoch awaits activation.
    RegistrationClosed,
    /// Activated. Claims settle individually, permanently.
    Active,
}

impl fmt::Display for EpochState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpochState::RegistrationOpen => write!(f, "registration open"),
            EpochState::RegistrationClosed => write!(f, "registration closed"),
            EpochState::Active => write!(f, "active"),
        }
    }
}

/// One scheduled redemption cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionEpoch {
    /// Monotonic epoch id, starting at 0.
    pub id: u64,
    /// When the epoch becomes eligible for activation.
    pub redemption_time: DateTime<Utc>,
    /// End of the registration window. Always at or before
    /// `redemption_time`.
    pub registration_end_time: DateTime<Utc>,
    /// Settlement token claimants are paid in.
    pub token: TokenId,
    /// Redemption fee in basis points, fixed at scheduling.
    pub fee_bps: u16,
    /// Total shares currently registered.
    pub pending: u64,
    /// NAV price snapshotted at activation. 0 beforehand.
    pub price: u64,
    /// One-way activation flag.
    pub active: bool,
}

impl RedemptionEpoch {
    /// The epoch's lifecycle state as of `now`.
    pub fn state(&self, now: DateTime<Utc>) -> EpochState {
        if self.active {
            EpochState::Active
        } else if now < self.registration_end_time {
            EpochState::RegistrationOpen
        } else {
            EpochState::RegistrationClosed
        }
    }
}

/// The redemption queue contract, wired to one vault at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionQueue {
    address: Address,
    roles: Roles,
    vault: Address,
    interval_secs: Option<u64>,
    preparation_secs: Option<u64>,
    token: Option<TokenId>,
    epochs: Vec<RedemptionEpoch>,
    /// `epoch id -> (user -> registered shares)`.
    claims: HashMap<u64, HashMap<Address, u64>>,
    events: Vec<QueueEvent>,
}

impl RedemptionQueue {
    /// Creates a queue paired with `vault`, with no schedule configured.
    pub fn new(
        address: impl Into<Address>,
        owner: &str,
        admin: &str,
        vault: impl Into<Address>,
    ) -> Self {
        Self {
            address: address.into(),
            roles: Roles::new(owner, admin),
            vault: vault.into(),
            interval_secs: None,
            preparation_secs: None,
            token: None,
            epochs: Vec::new(),
            claims: HashMap::new(),
            events: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Owner-only: sets the default spacing between epochs.
    ///
    /// # Errors
    ///
    /// Returns [`RedemptionError::IntervalTooShort`] if the interval would
    /// undercut the configured preparation time.
    pub fn set_redemption_interval(
        &mut self,
        caller: &str,
        seconds: u64,
    ) -> Result<(), RedemptionError> {
        self.roles.require_owner(caller)?;
        if let Some(preparation) = self.preparation_secs {
            if seconds < preparation {
                return Err(RedemptionError::IntervalTooShort {
                    interval_secs: seconds,
                    preparation_secs: preparation,
                });
            }
        }
        self.interval_secs = Some(seconds);
        Ok(())
    }

    /// Owner-only: sets the gap between registration close and the
    /// redemption date.
    pub fn set_preparation_time(
        &mut self,
        caller: &str,
        seconds: u64,
    ) -> Result<(), RedemptionError> {
        self.roles.require_owner(caller)?;
        self.preparation_secs = Some(seconds);
        Ok(())
    }

    /// Owner-only: sets the settlement token claimants are paid in.
    pub fn set_redemption_token(
        &mut self,
        caller: &str,
        token: &str,
    ) -> Result<(), RedemptionError> {
        self.roles.require_owner(caller)?;
        self.token = Some(token.to_string());
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Epoch lifecycle
    // -----------------------------------------------------------------------

    /// Owner-only, once per queue: schedules epoch 0.
    ///
    /// With `exact_time` of `None` the redemption date is `now + interval`;
    /// an explicit date must lie beyond `now + preparation`.
    ///
    /// # Errors
    ///
    /// Returns [`RedemptionError::AlreadyInitialized`] on re-entry,
    /// [`RedemptionError::NotConfigured`] until interval, preparation
    /// time, and token are all set, [`RedemptionError::FeeTooHigh`] above
    /// [`MAX_FEE_BPS`].
    pub fn initialize_redemptions(
        &mut self,
        caller: &str,
        env: &BlockEnv,
        exact_time: Option<DateTime<Utc>>,
        fee_bps: u16,
    ) -> Result<(), RedemptionError> {
        self.roles.require_owner(caller)?;
        if !self.epochs.is_empty() {
            return Err(RedemptionError::AlreadyInitialized);
        }
        let schedule = self.plan_epoch(env, exact_time, fee_bps)?;
        self.push_epoch(schedule);
        Ok(())
    }

    /// Registers `shares` of the caller's vault balance against the
    /// current epoch, moving them into queue custody.
    ///
    /// # Errors
    ///
    /// Returns [`RedemptionError::RegistrationClosed`] outside the
    /// window, [`RedemptionError::TooFewVaultTokens`] if the caller's
    /// balance is short.
    pub fn register(
        &mut self,
        vault: &mut ManagedVault,
        env: &BlockEnv,
        caller: &str,
        shares: u64,
    ) -> Result<(), RedemptionError> {
        let idx = self.open_epoch_index(env.timestamp)?;
        if vault.balance_of(caller) < shares {
            return Err(RedemptionError::TooFewVaultTokens);
        }

        vault.transfer_to_queue(&self.address, caller, shares)?;

        let epoch = &mut self.epochs[idx];
        epoch.pending = epoch
            .pending
            .checked_add(shares)
            .ok_or(RedemptionError::Overflow)?;
        let claim = self
            .claims
            .entry(epoch.id)
            .or_default()
            .entry(caller.to_string())
            .or_insert(0);
        *claim = claim.checked_add(shares).ok_or(RedemptionError::Overflow)?;
        Ok(())
    }

    /// Returns `shares` of the caller's registered claim to their vault
    /// balance. The exact inverse of [`register`](Self::register) within
    /// the same window.
    ///
    /// # Errors
    ///
    /// Returns [`RedemptionError::TooFewRegisteredTokens`] if the claim
    /// is smaller than `shares`.
    pub fn unregister(
        &mut self,
        vault: &mut ManagedVault,
        env: &BlockEnv,
        caller: &str,
        shares: u64,
    ) -> Result<(), RedemptionError> {
        let idx = self.open_epoch_index(env.timestamp)?;
        let epoch_id = self.epochs[idx].id;
        let claim = self.claim(epoch_id, caller);
        if claim < shares {
            return Err(RedemptionError::TooFewRegisteredTokens);
        }

        vault.transfer_from_queue(&self.address, caller, shares)?;

        self.epochs[idx].pending -= shares;
        if let Some(per_user) = self.claims.get_mut(&epoch_id) {
            per_user.insert(caller.to_string(), claim - shares);
        }
        Ok(())
    }

    /// Owner-only: activates the current epoch and schedules the next in
    /// the same call.
    ///
    /// Pulls the full payout pool for the registered shares from the
    /// caller, snapshots the vault's NAV price, burns the registered
    /// shares from queue custody, and schedules epoch N+1 under the same
    /// date and fee rules as [`initialize_redemptions`](Self::initialize_redemptions).
    ///
    /// # Errors
    ///
    /// Returns [`RedemptionError::RedemptionTimeInFuture`] before the
    /// redemption date and [`RedemptionError::StalePrice`] if the vault's
    /// price is more than [`MAX_PRICE_AGE_BLOCKS`] blocks old. A short
    /// settlement-token balance surfaces as the token ledger's error.
    /// All validation, the next epoch's included, happens before any
    /// state is written.
    pub fn activate_redemption(
        &mut self,
        vault: &mut ManagedVault,
        tokens: &mut TokenLedger,
        env: &BlockEnv,
        caller: &str,
        next_exact_time: Option<DateTime<Utc>>,
        next_fee_bps: u16,
    ) -> Result<(), RedemptionError> {
        self.roles.require_owner(caller)?;
        if self.epochs.is_empty() {
            return Err(RedemptionError::NotInitialized);
        }
        let idx = self.epochs.len() - 1;
        if env.timestamp < self.epochs[idx].redemption_time {
            return Err(RedemptionError::RedemptionTimeInFuture);
        }
        let age = vault.blocks_since_price_update(env.number);
        if age > MAX_PRICE_AGE_BLOCKS {
            return Err(RedemptionError::StalePrice {
                age_blocks: age,
                max: MAX_PRICE_AGE_BLOCKS,
            });
        }
        let next = self.plan_epoch(env, next_exact_time, next_fee_bps)?;

        let price = vault.nav_price();
        let pending = self.epochs[idx].pending;
        let fee_bps = self.epochs[idx].fee_bps;
        let token = self.epochs[idx].token.clone();

        // Fund the payout pool from the manager, then burn the custodied
        // shares. Only after both succeed is the epoch marked active.
        let pool = payout_amount(pending, price, fee_bps)?;
        if pool > 0 {
            tokens.transfer_from(&token, &self.address, caller, &self.address, pool)?;
        }
        vault.burn(&self.address, pending)?;

        let epoch = &mut self.epochs[idx];
        epoch.price = price;
        epoch.active = true;
        let epoch_id = epoch.id;
        self.events.push(QueueEvent::RedemptionActivated {
            epoch_id,
            price,
            token,
        });
        self.push_epoch(next);
        Ok(())
    }

    /// Settles the caller's registered claims in the given epochs,
    /// paying `floor(claim × price × (10000 − fee) / 10000)` settlement
    /// tokens per epoch.
    ///
    /// Every epoch id is validated before any claim is settled; a single
    /// bad id fails the whole call with nothing paid. Each claim is
    /// zeroed before its payout transfer.
    ///
    /// Returns the total amount paid out.
    ///
    /// # Errors
    ///
    /// Returns [`RedemptionError::RedemptionNotActive`] for an epoch
    /// still awaiting activation, [`RedemptionError::NoTokensRegistered`]
    /// where the caller has no claim (a repeated epoch id included).
    pub fn redeem(
        &mut self,
        tokens: &mut TokenLedger,
        caller: &str,
        epoch_ids: &[u64],
    ) -> Result<u64, RedemptionError> {
        // Validation pass: every id must refer to an activated epoch with
        // a live claim. Duplicated ids would find their claim already
        // zeroed, so they fail here too.
        let mut seen: HashSet<u64> = HashSet::new();
        for &epoch_id in epoch_ids {
            let epoch = self
                .epochs
                .get(epoch_id as usize)
                .ok_or(RedemptionError::UnknownEpoch(epoch_id))?;
            if !epoch.active {
                return Err(RedemptionError::RedemptionNotActive { epoch_id });
            }
            if self.claim(epoch_id, caller) == 0 || !seen.insert(epoch_id) {
                return Err(RedemptionError::NoTokensRegistered);
            }
        }

        // Settlement pass: zero each claim, then pay it out.
        let mut total_paid: u64 = 0;
        for &epoch_id in epoch_ids {
            let claim = self.claim(epoch_id, caller);
            if let Some(per_user) = self.claims.get_mut(&epoch_id) {
                per_user.insert(caller.to_string(), 0);
            }

            let epoch = &self.epochs[epoch_id as usize];
            let payout = payout_amount(claim, epoch.price, epoch.fee_bps)?;
            let token = epoch.token.clone();
            if payout > 0 {
                tokens.transfer(&token, &self.address, caller, payout)?;
            }
            total_paid = total_paid
                .checked_add(payout)
                .ok_or(RedemptionError::Overflow)?;
            self.events.push(QueueEvent::Redeemed {
                epoch_id,
                user: caller.to_string(),
                amount: payout,
                token,
            });
        }
        Ok(total_paid)
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// This queue's own address on the ledger.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The operational owner (manager).
    pub fn owner(&self) -> &str {
        &self.roles.owner
    }

    /// The admin address.
    pub fn admin(&self) -> &str {
        &self.roles.admin
    }

    /// The paired vault's address.
    pub fn vault(&self) -> &str {
        &self.vault
    }

    /// The configured settlement token, if any.
    pub fn redemption_token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// The epoch with the given id, if it was ever scheduled.
    pub fn epoch(&self, epoch_id: u64) -> Option<&RedemptionEpoch> {
        self.epochs.get(epoch_id as usize)
    }

    /// Number of epochs scheduled so far.
    pub fn epoch_count(&self) -> usize {
        self.epochs.len()
    }

    /// The redemption date of the latest non-activated epoch, if any.
    pub fn next_redemption_time(&self) -> Option<DateTime<Utc>> {
        self.epochs
            .last()
            .filter(|epoch| !epoch.active)
            .map(|epoch| epoch.redemption_time)
    }

    /// `user`'s registered shares in the given epoch, or 0.
    pub fn claim(&self, epoch_id: u64, user: &str) -> u64 {
        self.claims
            .get(&epoch_id)
            .and_then(|per_user| per_user.get(user))
            .copied()
            .unwrap_or(0)
    }

    /// The emitted-record log, in emission order.
    pub fn events(&self) -> &[QueueEvent] {
        &self.events
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    /// Validates fee and dates for a new epoch against the current
    /// configuration, without writing anything.
    fn plan_epoch(
        &self,
        env: &BlockEnv,
        exact_time: Option<DateTime<Utc>>,
        fee_bps: u16,
    ) -> Result<PlannedEpoch, RedemptionError> {
        if fee_bps > MAX_FEE_BPS {
            return Err(RedemptionError::FeeTooHigh {
                fee_bps,
                max: MAX_FEE_BPS,
            });
        }
        let (interval, preparation, token) =
            match (self.interval_secs, self.preparation_secs, &self.token) {
                (Some(i), Some(p), Some(t)) => (i, p, t.clone()),
                _ => return Err(RedemptionError::NotConfigured),
            };

        let preparation = Duration::seconds(preparation as i64);
        let redemption_time = match exact_time {
            None => env.timestamp + Duration::seconds(interval as i64),
            Some(time) => {
                if time <= env.timestamp + preparation {
                    return Err(RedemptionError::RedemptionDateTooSoon);
                }
                time
            }
        };

        Ok(PlannedEpoch {
            redemption_time,
            registration_end_time: redemption_time - preparation,
            token,
            fee_bps,
        })
    }

    fn push_epoch(&mut self, planned: PlannedEpoch) {
        let id = self.epochs.len() as u64;
        self.events.push(QueueEvent::NewRedemption {
            epoch_id: id,
            redemption_time: planned.redemption_time,
            registration_end_time: planned.registration_end_time,
            fee_bps: planned.fee_bps,
            token: planned.token.clone(),
        });
        self.epochs.push(RedemptionEpoch {
            id,
            redemption_time: planned.redemption_time,
            registration_end_time: planned.registration_end_time,
            token: planned.token,
            fee_bps: planned.fee_bps,
            pending: 0,
            price: 0,
            active: false,
        });
    }

    /// The latest epoch's index, provided its registration window is
    /// still open as of `now`.
    fn open_epoch_index(&self, now: DateTime<Utc>) -> Result<usize, RedemptionError> {
        let idx = match self.epochs.len() {
            0 => return Err(RedemptionError::NotInitialized),
            n => n - 1,
        };
        let epoch = &self.epochs[idx];
        match epoch.state(now) {
            EpochState::RegistrationOpen => Ok(idx),
            _ => Err(RedemptionError::RegistrationClosed { epoch_id: epoch.id }),
        }
    }
}

/// A validated epoch schedule, not yet written to the queue.
struct PlannedEpoch {
    redemption_time: DateTime<Utc>,
    registration_end_time: DateTime<Utc>,
    token: TokenId,
    fee_bps: u16,
}

/// `floor(shares × price × (10000 − fee) / 10000)`, widened through u128.
fn payout_amount(shares: u64, price: u64, fee_bps: u16) -> Result<u64, RedemptionError> {
    let net_bps = (FEE_DENOMINATOR - fee_bps as u64) as u128;
    let gross = (shares as u128) * (price as u128) * net_bps;
    u64::try_from(gross / FEE_DENOMINATOR as u128).map_err(|_| RedemptionError::Overflow)
}
