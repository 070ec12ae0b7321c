//! Registry provisioning one share ledger per asset id
//!
//! The registry owner (platform operator) provisions assets; each asset gets
//! its own `AssetLedger` keyed by a caller-chosen id, with the registry owner
//! as its initial issuer. Enumeration follows provisioning order.

use indexmap::IndexMap;
use tracing::info;

use propshare_types::AccountId;

use crate::error::{EngineError, EngineResult};
use crate::ledger::AssetLedger;
use crate::snapshot::SavedRegistry;

/// One holder's stake in one asset, for portfolio queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HolderPosition {
    pub asset_id: u64,
    pub balance: u64,
    pub claimable_rent: u64,
}

pub struct AssetRegistry {
    owner: AccountId,
    pending_owner: Option<AccountId>,
    ledgers: IndexMap<u64, AssetLedger>,
}

impl AssetRegistry {
    pub fn new(owner: AccountId) -> EngineResult<Self> {
        if owner.is_zero() {
            return Err(EngineError::ZeroAddress);
        }
        Ok(Self {
            owner,
            pending_owner: None,
            ledgers: IndexMap::new(),
        })
    }

    fn require_owner(&self, caller: &AccountId) -> EngineResult<()> {
        if caller != &self.owner {
            return Err(EngineError::NotOwner);
        }
        Ok(())
    }

    // ========================================================================
    // Provisioning
    // ========================================================================

    /// Create the ledger for a new asset id; the registry owner starts as its
    /// issuer and can hand the role over per asset afterwards
    pub fn provision(
        &mut self,
        caller: &AccountId,
        asset_id: u64,
        share_cap: u64,
        price_per_share: u64,
        metadata_base: &str,
        name: &str,
        symbol: &str,
    ) -> EngineResult<&AssetLedger> {
        self.require_owner(caller)?;
        if self.ledgers.contains_key(&asset_id) {
            return Err(EngineError::AlreadyProvisioned);
        }
        let ledger = AssetLedger::new(
            asset_id,
            self.owner,
            share_cap,
            price_per_share,
            metadata_base,
            name,
            symbol,
        )?;
        info!(
            "provisioned asset {} ({}) cap {} price {}",
            asset_id, symbol, share_cap, price_per_share
        );
        Ok(self.ledgers.entry(asset_id).or_insert(ledger))
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn ledger(&self, asset_id: u64) -> Option<&AssetLedger> {
        self.ledgers.get(&asset_id)
    }

    pub fn ledger_mut(&mut self, asset_id: u64) -> Option<&mut AssetLedger> {
        self.ledgers.get_mut(&asset_id)
    }

    pub fn exists(&self, asset_id: u64) -> bool {
        self.ledgers.contains_key(&asset_id)
    }

    pub fn len(&self) -> usize {
        self.ledgers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
    }

    /// Asset ids in provisioning order
    pub fn asset_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.ledgers.keys().copied()
    }

    pub fn ledgers(&self) -> impl Iterator<Item = &AssetLedger> {
        self.ledgers.values()
    }

    /// Portfolio of one account across all assets, in provisioning order.
    /// Entries with neither shares nor claimable rent are skipped.
    pub fn positions_of(&self, holder: &AccountId) -> EngineResult<Vec<HolderPosition>> {
        let mut positions = Vec::new();
        for (asset_id, ledger) in &self.ledgers {
            let balance = ledger.balance_of(holder);
            let claimable_rent = ledger.claimable_rent(holder)?;
            if balance > 0 || claimable_rent > 0 {
                positions.push(HolderPosition {
                    asset_id: *asset_id,
                    balance,
                    claimable_rent,
                });
            }
        }
        Ok(positions)
    }

    pub fn owner(&self) -> &AccountId {
        &self.owner
    }

    // ========================================================================
    // Ownership handover
    // ========================================================================

    pub fn transfer_ownership(
        &mut self,
        caller: &AccountId,
        new_owner: &AccountId,
    ) -> EngineResult<()> {
        self.require_owner(caller)?;
        if new_owner.is_zero() {
            return Err(EngineError::ZeroAddress);
        }
        self.pending_owner = Some(*new_owner);
        info!("registry ownership handover to {} pending", new_owner);
        Ok(())
    }

    pub fn accept_ownership(&mut self, caller: &AccountId) -> EngineResult<()> {
        match self.pending_owner {
            Some(pending) if pending == *caller => {
                self.owner = pending;
                self.pending_owner = None;
                info!("registry owner is now {}", caller);
                Ok(())
            }
            Some(_) => Err(EngineError::NotPendingOwner),
            None => Err(EngineError::OwnershipTransferNotPending),
        }
    }

    pub fn cancel_ownership_transfer(&mut self, caller: &AccountId) -> EngineResult<()> {
        self.require_owner(caller)?;
        if self.pending_owner.take().is_none() {
            return Err(EngineError::OwnershipTransferNotPending);
        }
        info!("registry ownership handover cancelled");
        Ok(())
    }

    // ========================================================================
    // Snapshot export / restore
    // ========================================================================

    pub fn export_state(&self) -> SavedRegistry {
        SavedRegistry {
            owner: self.owner,
            pending_owner: self.pending_owner,
            ledgers: self.ledgers.values().map(|l| l.export_state()).collect(),
        }
    }

    pub fn from_saved(saved: SavedRegistry) -> anyhow::Result<Self> {
        use anyhow::bail;

        if saved.owner.is_zero() {
            bail!("registry owner is the zero account");
        }
        let mut ledgers = IndexMap::new();
        for saved_ledger in saved.ledgers {
            let asset_id = saved_ledger.asset_id;
            let ledger = AssetLedger::from_saved(saved_ledger)?;
            if ledgers.insert(asset_id, ledger).is_some() {
                bail!("duplicate ledger for asset {}", asset_id);
            }
        }
        Ok(Self {
            owner: saved.owner,
            pending_owner: saved.pending_owner,
            ledgers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use propshare_settlement::InMemoryToken;
    use propshare_types::SettlementAsset;

    fn owner() -> AccountId {
        AccountId::from_label("test/platform")
    }

    fn registry_with_assets(ids: &[u64]) -> AssetRegistry {
        let mut registry = AssetRegistry::new(owner()).unwrap();
        for id in ids {
            registry
                .provision(
                    &owner(),
                    *id,
                    1_000,
                    500_000,
                    &format!("ipfs://props/{}/", id),
                    &format!("Asset {}", id),
                    &format!("AST{}", id),
                )
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_provision_and_lookup() {
        let registry = registry_with_assets(&[42]);
        assert!(registry.exists(42));
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());
        let ledger = registry.ledger(42).unwrap();
        assert_eq!(ledger.symbol(), "AST42");
        assert_eq!(ledger.issuer(), &owner());
        assert!(registry.ledger(43).is_none());
    }

    #[test]
    fn test_provision_rejects_duplicates_and_bad_input() {
        let mut registry = registry_with_assets(&[1]);
        assert_eq!(
            registry.provision(&owner(), 1, 10, 1, "", "Dup", "DUP").err(),
            Some(EngineError::AlreadyProvisioned)
        );
        assert_eq!(
            registry.provision(&owner(), 2, 0, 1, "", "Zero", "ZERO").err(),
            Some(EngineError::InvalidCap)
        );
        assert_eq!(
            registry
                .provision(&AccountId::from_label("stranger"), 2, 10, 1, "", "X", "X")
                .err(),
            Some(EngineError::NotOwner)
        );
        // Failed provisioning leaves no ledger behind
        assert!(!registry.exists(2));
    }

    #[test]
    fn test_enumeration_follows_provisioning_order() {
        let registry = registry_with_assets(&[9, 3, 7]);
        let ids: Vec<u64> = registry.asset_ids().collect();
        assert_eq!(ids, vec![9, 3, 7]);
        let symbols: Vec<&str> = registry.ledgers().map(|l| l.symbol()).collect();
        assert_eq!(symbols, vec!["AST9", "AST3", "AST7"]);
    }

    #[test]
    fn test_positions_aggregate_balance_and_rent() {
        let mut registry = registry_with_assets(&[1, 2, 3]);
        let alice = AccountId::from_label("alice");

        registry
            .ledger_mut(1)
            .unwrap()
            .mint_to(&owner(), &alice, 50)
            .unwrap();
        registry
            .ledger_mut(3)
            .unwrap()
            .mint_to(&owner(), &alice, 20)
            .unwrap();

        // Rent on asset 3 shows up as claimable in the portfolio
        let mut token = InMemoryToken::new("USDs");
        token.mint(&owner(), 1_000);
        let ledger = registry.ledger_mut(3).unwrap();
        token.approve(&owner(), ledger.ledger_account(), 1_000);
        ledger.deposit_rent(&owner(), &mut token, 1_000).unwrap();

        assert_eq!(
            registry.positions_of(&alice).unwrap(),
            vec![
                HolderPosition {
                    asset_id: 1,
                    balance: 50,
                    claimable_rent: 0
                },
                HolderPosition {
                    asset_id: 3,
                    balance: 20,
                    claimable_rent: 20
                },
            ]
        );
        assert!(registry
            .positions_of(&AccountId::from_label("nobody"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_ownership_handover() {
        let mut registry = registry_with_assets(&[]);
        let next = AccountId::from_label("next-owner");

        assert_eq!(
            registry.transfer_ownership(&next, &next),
            Err(EngineError::NotOwner)
        );
        registry.transfer_ownership(&owner(), &next).unwrap();
        assert_eq!(
            registry.accept_ownership(&AccountId::from_label("stranger")),
            Err(EngineError::NotPendingOwner)
        );
        registry.accept_ownership(&next).unwrap();
        assert_eq!(registry.owner(), &next);

        // Old owner lost provisioning rights
        assert_eq!(
            registry.provision(&owner(), 5, 10, 1, "", "X", "X").err(),
            Some(EngineError::NotOwner)
        );
        registry.provision(&next, 5, 10, 1, "", "X", "X").unwrap();
    }

    #[test]
    fn test_export_restore_roundtrip() {
        let mut registry = registry_with_assets(&[8, 4]);
        let alice = AccountId::from_label("alice");
        registry
            .ledger_mut(8)
            .unwrap()
            .mint_to(&owner(), &alice, 123)
            .unwrap();

        let restored = AssetRegistry::from_saved(registry.export_state()).unwrap();
        assert_eq!(restored.owner(), registry.owner());
        let ids: Vec<u64> = restored.asset_ids().collect();
        assert_eq!(ids, vec![8, 4]);
        assert_eq!(restored.ledger(8).unwrap().balance_of(&alice), 123);
        assert_eq!(
            restored.positions_of(&alice).unwrap(),
            vec![HolderPosition {
                asset_id: 8,
                balance: 123,
                claimable_rent: 0
            }]
        );
    }
}
