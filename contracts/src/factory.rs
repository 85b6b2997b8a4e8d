//! # Vault Factory
//!
//! Builds wired [`ManagedVault`]/[`RedemptionQueue`] pairs. Each call to
//! [`VaultFactory::create_vault`] produces a fresh pair with generated
//! addresses, the queue's address injected into the vault, and the
//! factory's owner installed as admin of both. The factory keeps a
//! registry of every deployment with an active flag the owner can toggle;
//! new deployments start inactive until explicitly enabled.
//!
//! The pair itself is returned to the caller. The factory holds only the
//! registry record, not the contract state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use vault_core::access::Address;

use crate::events::FactoryEvent;
use crate::managed_vault::{ManagedVault, VaultError};
use crate::redemption::RedemptionQueue;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during factory operations.
#[derive(Debug, Error)]
pub enum FactoryError {
    /// The caller is not the factory owner.
    #[error("Ownable: caller is not the owner")]
    NotOwner,

    /// The referenced vault was not deployed by this factory.
    #[error("unknown vault: {0}")]
    UnknownVault(Address),

    /// A state toggle would leave the flag unchanged.
    #[error("vault {vault} is already in the requested state")]
    StateUnchanged {
        /// The vault whose flag was targeted.
        vault: Address,
        /// The flag value it already holds.
        active: bool,
    },

    /// Initialization of the new vault failed.
    #[error(transparent)]
    Vault(#[from] VaultError),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A freshly built, fully wired vault/queue pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultPair {
    /// The vault, initialized with the queue's address injected.
    pub vault: ManagedVault,
    /// The queue, paired back to the vault.
    pub queue: RedemptionQueue,
}

/// Registry entry for one deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRecord {
    /// Address of the deployed vault.
    pub vault: Address,
    /// Address of its paired queue.
    pub queue: Address,
    /// The manager the pair was created for.
    pub manager: Address,
    /// Share token name.
    pub name: String,
    /// Share token symbol.
    pub symbol: String,
    /// Owner-toggled active flag. Deployments start inactive.
    pub active: bool,
}

/// The factory contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultFactory {
    owner: Address,
    records: HashMap<Address, VaultRecord>,
    /// Vault addresses in creation order.
    deployments: Vec<Address>,
    events: Vec<FactoryEvent>,
}

impl VaultFactory {
    /// Creates a factory owned by `owner`.
    pub fn new(owner: impl Into<Address>) -> Self {
        Self {
            owner: owner.into(),
            records: HashMap::new(),
            deployments: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Owner-only: builds a wired vault/queue pair for `manager`.
    ///
    /// The vault is initialized with `manager` as owner, the factory
    /// owner as admin, and the generated queue address injected; the
    /// queue carries the same role pairing and points back at the vault.
    /// The deployment is registered inactive.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::NotOwner`] for any other caller; vault
    /// initialization failures (an empty manager address) propagate.
    pub fn create_vault(
        &mut self,
        caller: &str,
        manager: &str,
        name: &str,
        symbol: &str,
    ) -> Result<VaultPair, FactoryError> {
        self.require_owner(caller)?;

        let vault_address = format!("vault-{}", Uuid::new_v4());
        let queue_address = format!("queue-{}", Uuid::new_v4());

        let mut vault = ManagedVault::new(vault_address.clone());
        vault.initialize(manager, &self.owner, &queue_address, name, symbol)?;
        let queue = RedemptionQueue::new(
            queue_address.clone(),
            manager,
            &self.owner,
            vault_address.clone(),
        );

        self.records.insert(
            vault_address.clone(),
            VaultRecord {
                vault: vault_address.clone(),
                queue: queue_address.clone(),
                manager: manager.to_string(),
                name: name.to_string(),
                symbol: symbol.to_string(),
                active: false,
            },
        );
        self.deployments.push(vault_address.clone());
        self.events.push(FactoryEvent::VaultCreated {
            vault: vault_address,
            queue: queue_address,
            manager: manager.to_string(),
            name: name.to_string(),
            symbol: symbol.to_string(),
        });

        Ok(VaultPair { vault, queue })
    }

    /// Owner-only: toggles a deployment's active flag.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::UnknownVault`] for an address the factory
    /// never deployed, [`FactoryError::StateUnchanged`] if the flag
    /// already holds the requested value.
    pub fn change_state(
        &mut self,
        caller: &str,
        vault: &str,
        active: bool,
    ) -> Result<(), FactoryError> {
        self.require_owner(caller)?;
        let record = self
            .records
            .get_mut(vault)
            .ok_or_else(|| FactoryError::UnknownVault(vault.to_string()))?;
        if record.active == active {
            return Err(FactoryError::StateUnchanged {
                vault: vault.to_string(),
                active,
            });
        }
        record.active = active;
        self.events.push(FactoryEvent::StateChanged {
            vault: vault.to_string(),
            active,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// The factory owner.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Whether `vault` was deployed by this factory.
    pub fn exists(&self, vault: &str) -> bool {
        self.records.contains_key(vault)
    }

    /// Whether `vault` is deployed and currently active.
    pub fn is_active(&self, vault: &str) -> bool {
        self.records.get(vault).map(|r| r.active).unwrap_or(false)
    }

    /// Registry entry for `vault`, if deployed by this factory.
    pub fn record(&self, vault: &str) -> Option<&VaultRecord> {
        self.records.get(vault)
    }

    /// Number of deployments.
    pub fn vault_count(&self) -> usize {
        self.deployments.len()
    }

    /// Registry entries in creation order.
    pub fn vaults(&self) -> impl Iterator<Item = &VaultRecord> {
        self.deployments
            .iter()
            .filter_map(move |address| self.records.get(address))
    }

    /// The emitted-record log, in emission order.
    pub fn events(&self) -> &[FactoryEvent] {
        &self.events
    }

    fn require_owner(&self, caller: &str) -> Result<(), FactoryError> {
        if caller == self.owner {
            Ok(())
        } else {
            Err(FactoryError::NotOwner)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPLOYER: &str = "deployer";
    const MANAGER: &str = "manager";

    fn factory_with_vault() -> (VaultFactory, VaultPair) {
        let mut factory = VaultFactory::new(DEPLOYER);
        let pair = factory
            .create_vault(DEPLOYER, MANAGER, "TOKEN", "TKN")
            .unwrap();
        (factory, pair)
    }

    #[test]
    fn create_vault_wires_the_pair() {
        let (factory, pair) = factory_with_vault();

        assert_eq!(pair.vault.redemption_queue(), pair.queue.address());
        assert_eq!(pair.queue.vault(), pair.vault.address());
        assert_eq!(pair.vault.owner(), MANAGER);
        assert_eq!(pair.vault.admin(), DEPLOYER);
        assert_eq!(pair.queue.owner(), MANAGER);
        assert_eq!(pair.queue.admin(), DEPLOYER);
        assert!(pair.vault.allowlist(pair.queue.address()));
        assert_eq!(pair.vault.name(), "TOKEN");
        assert_eq!(pair.vault.symbol(), "TKN");
        assert_eq!(factory.vault_count(), 1);
    }

    #[test]
    fn create_vault_owner_only() {
        let mut factory = VaultFactory::new(DEPLOYER);
        let err = factory
            .create_vault(MANAGER, MANAGER, "TOKEN", "TKN")
            .unwrap_err();
        assert_eq!(err.to_string(), "Ownable: caller is not the owner");
        assert_eq!(factory.vault_count(), 0);
    }

    #[test]
    fn create_vault_rejects_empty_manager() {
        let mut factory = VaultFactory::new(DEPLOYER);
        let result = factory.create_vault(DEPLOYER, "", "TOKEN", "TKN");
        assert!(matches!(result, Err(FactoryError::Vault(_))));
        assert_eq!(factory.vault_count(), 0);
    }

    #[test]
    fn deployments_start_inactive() {
        let (factory, pair) = factory_with_vault();
        assert!(factory.exists(pair.vault.address()));
        assert!(!factory.is_active(pair.vault.address()));
    }

    #[test]
    fn change_state_toggles_flag() {
        let (mut factory, pair) = factory_with_vault();
        factory
            .change_state(DEPLOYER, pair.vault.address(), true)
            .unwrap();
        assert!(factory.is_active(pair.vault.address()));
        factory
            .change_state(DEPLOYER, pair.vault.address(), false)
            .unwrap();
        assert!(!factory.is_active(pair.vault.address()));
    }

    #[test]
    fn change_state_to_same_value_rejected() {
        let (mut factory, pair) = factory_with_vault();
        let result = factory.change_state(DEPLOYER, pair.vault.address(), false);
        assert!(matches!(
            result,
            Err(FactoryError::StateUnchanged { active: false, .. })
        ));
    }

    #[test]
    fn change_state_owner_only() {
        let (mut factory, pair) = factory_with_vault();
        let result = factory.change_state(MANAGER, pair.vault.address(), true);
        assert!(matches!(result, Err(FactoryError::NotOwner)));
    }

    #[test]
    fn change_state_unknown_vault_rejected() {
        let mut factory = VaultFactory::new(DEPLOYER);
        let result = factory.change_state(DEPLOYER, "vault-nowhere", true);
        assert!(matches!(result, Err(FactoryError::UnknownVault(_))));
    }

    #[test]
    fn distinct_deployments_get_distinct_addresses() {
        let mut factory = VaultFactory::new(DEPLOYER);
        let a = factory.create_vault(DEPLOYER, MANAGER, "A", "AAA").unwrap();
        let b = factory.create_vault(DEPLOYER, MANAGER, "B", "BBB").unwrap();
        assert_ne!(a.vault.address(), b.vault.address());
        assert_ne!(a.queue.address(), b.queue.address());
        assert_eq!(factory.vault_count(), 2);
        let names: Vec<_> = factory.vaults().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn factory_serialization_roundtrip() {
        let (factory, pair) = factory_with_vault();
        let json = serde_json::to_string(&factory).unwrap();
        let back: VaultFactory = serde_json::from_str(&json).unwrap();
        assert!(back.exists(pair.vault.address()));
        assert_eq!(back.vault_count(), 1);
    }
}
