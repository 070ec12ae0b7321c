//! Per-asset share ledger with custodial issuance and rent accounting
//!
//! One `AssetLedger` tracks holder balances for a single tokenized property,
//! runs the offering state machine (active while shares remain, funded once
//! the cap is fully minted), and distributes deposited rent through a
//! cumulative per-share accumulator. Every balance change first realizes the
//! affected holders' pending rent, so entitlement follows the time shares
//! were actually held.

use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use propshare_types::{format_units, AccountId, SettlementAsset, SCALE};

use crate::error::{EngineError, EngineResult};
use crate::snapshot::{SavedHolderIndex, SavedHolding, SavedLedger, SavedOperator};

/// Issuance and offering status for one asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetInfo {
    pub total_supply: u64,
    pub minted: u64,
    pub price_per_share: u64,
    pub active: bool,
    pub funded: bool,
}

/// Authoritative share ledger for one asset
pub struct AssetLedger {
    asset_id: u64,
    name: String,
    symbol: String,
    metadata_base: String,
    /// Account holding the undistributed rent pool in the settlement asset
    ledger_account: AccountId,
    issuer: AccountId,
    pending_issuer: Option<AccountId>,
    /// Immutable share cap
    total_supply: u64,
    minted: u64,
    /// Primary-sale price per share in settlement units (informational)
    price_per_share: u64,
    active: bool,
    funded: bool,
    balances: HashMap<AccountId, u64>,
    /// holder → operators approved to move that holder's shares
    operators: HashMap<AccountId, HashSet<AccountId>>,
    /// Rent-per-share accumulator, SCALE fixed-point, monotonically non-decreasing
    cumulative_per_share: u128,
    /// Last accumulator value each holder settled against
    holder_index: HashMap<AccountId, u128>,
    /// Realized rent in settlement units, awaiting claim
    accrued: HashMap<AccountId, u64>,
    /// Lifetime rent deposited, for reporting
    total_rent_deposited: u64,
}

impl AssetLedger {
    pub fn new(
        asset_id: u64,
        issuer: AccountId,
        share_cap: u64,
        price_per_share: u64,
        metadata_base: &str,
        name: &str,
        symbol: &str,
    ) -> EngineResult<Self> {
        if share_cap == 0 {
            return Err(EngineError::InvalidCap);
        }
        if issuer.is_zero() {
            return Err(EngineError::ZeroAddress);
        }
        Ok(Self {
            asset_id,
            name: name.to_string(),
            symbol: symbol.to_string(),
            metadata_base: metadata_base.to_string(),
            ledger_account: AccountId::from_label(&format!("propshare/ledger/{}", asset_id)),
            issuer,
            pending_issuer: None,
            total_supply: share_cap,
            minted: 0,
            price_per_share,
            active: true,
            funded: false,
            balances: HashMap::new(),
            operators: HashMap::new(),
            cumulative_per_share: 0,
            holder_index: HashMap::new(),
            accrued: HashMap::new(),
            total_rent_deposited: 0,
        })
    }

    fn require_issuer(&self, caller: &AccountId) -> EngineResult<()> {
        if caller != &self.issuer {
            return Err(EngineError::NotIssuer);
        }
        Ok(())
    }

    // ========================================================================
    // Issuance
    // ========================================================================

    /// Mint shares into the issuer's own custody balance
    pub fn mint_to_custody(&mut self, caller: &AccountId, amount: u64) -> EngineResult<()> {
        let issuer = self.issuer;
        self.mint_to(caller, &issuer, amount)
    }

    /// Mint shares directly to a holder as off-ledger payment is confirmed
    pub fn mint_to(
        &mut self,
        caller: &AccountId,
        holder: &AccountId,
        amount: u64,
    ) -> EngineResult<()> {
        self.require_issuer(caller)?;
        if !self.active {
            return Err(EngineError::NotActive);
        }
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        if holder.is_zero() {
            return Err(EngineError::ZeroAddress);
        }
        let new_minted = self
            .minted
            .checked_add(amount)
            .ok_or(EngineError::Overflow("minted total"))?;
        if new_minted > self.total_supply {
            return Err(EngineError::CapExceeded);
        }
        self.realize_rent(holder)?;
        let balance = self.balances.get(holder).copied().unwrap_or(0);
        // new_minted ≤ total_supply bounds the holder balance as well
        self.balances.insert(*holder, balance + amount);
        self.minted = new_minted;
        info!(
            "asset {}: minted {} shares to {} ({}/{} issued)",
            self.asset_id, amount, holder, self.minted, self.total_supply
        );
        if self.minted == self.total_supply {
            self.active = false;
            self.funded = true;
            info!(
                "asset {}: offering funded at cap {}",
                self.asset_id, self.total_supply
            );
        }
        Ok(())
    }

    /// Burn shares out of the issuer's custody, reopening a funded offering
    pub fn burn_from_custody(&mut self, caller: &AccountId, amount: u64) -> EngineResult<()> {
        self.require_issuer(caller)?;
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        if amount > self.minted {
            return Err(EngineError::InsufficientMinted);
        }
        let issuer = self.issuer;
        let custody = self.balances.get(&issuer).copied().unwrap_or(0);
        if custody < amount {
            return Err(EngineError::InsufficientBalance);
        }
        self.realize_rent(&issuer)?;
        if custody == amount {
            self.balances.remove(&issuer);
        } else {
            self.balances.insert(issuer, custody - amount);
        }
        self.minted -= amount;
        info!(
            "asset {}: burned {} custody shares ({}/{} issued)",
            self.asset_id, amount, self.minted, self.total_supply
        );
        if self.funded && self.minted < self.total_supply {
            self.funded = false;
            self.active = true;
            info!("asset {}: reopened below cap", self.asset_id);
        }
        Ok(())
    }

    /// Toggle the offering; activating a funded asset is rejected
    pub fn set_active(&mut self, caller: &AccountId, active: bool) -> EngineResult<()> {
        self.require_issuer(caller)?;
        if active && self.funded {
            return Err(EngineError::OfferingFunded);
        }
        if self.active != active {
            info!(
                "asset {}: active {} -> {}",
                self.asset_id, self.active, active
            );
        }
        self.active = active;
        Ok(())
    }

    // ========================================================================
    // Transfers
    // ========================================================================

    /// Move shares between holders (standard fungible rules)
    pub fn transfer(&mut self, caller: &AccountId, to: &AccountId, amount: u64) -> EngineResult<()> {
        self.move_shares(caller, to, amount)
    }

    /// Operator path: `caller` must be `from` or an approved operator of `from`
    pub fn transfer_from(
        &mut self,
        caller: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
    ) -> EngineResult<()> {
        if caller != from && !self.is_operator(from, caller) {
            return Err(EngineError::NotOperator);
        }
        self.move_shares(from, to, amount)
    }

    fn move_shares(&mut self, from: &AccountId, to: &AccountId, amount: u64) -> EngineResult<()> {
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        if to.is_zero() {
            return Err(EngineError::ZeroAddress);
        }
        let from_balance = self.balances.get(from).copied().unwrap_or(0);
        if from_balance < amount {
            return Err(EngineError::InsufficientBalance);
        }
        // Settle both sides before balances move so entitlement follows
        // actual holding time
        self.realize_rent(from)?;
        self.realize_rent(to)?;
        if from == to {
            return Ok(());
        }
        if from_balance == amount {
            self.balances.remove(from);
        } else {
            self.balances.insert(*from, from_balance - amount);
        }
        let to_balance = self.balances.get(to).copied().unwrap_or(0);
        // Supply invariant bounds to_balance + amount by total_supply
        self.balances.insert(*to, to_balance + amount);
        debug!(
            "asset {}: {} -> {} {} shares",
            self.asset_id, from, to, amount
        );
        Ok(())
    }

    /// Grant or revoke an operator's right to move the caller's shares
    pub fn set_operator_approval(
        &mut self,
        caller: &AccountId,
        operator: &AccountId,
        approved: bool,
    ) -> EngineResult<()> {
        if operator.is_zero() {
            return Err(EngineError::ZeroAddress);
        }
        if approved {
            self.operators.entry(*caller).or_default().insert(*operator);
        } else if let Some(set) = self.operators.get_mut(caller) {
            set.remove(operator);
            if set.is_empty() {
                self.operators.remove(caller);
            }
        }
        debug!(
            "asset {}: operator {} for {} set to {}",
            self.asset_id, operator, caller, approved
        );
        Ok(())
    }

    pub fn is_operator(&self, holder: &AccountId, operator: &AccountId) -> bool {
        self.operators
            .get(holder)
            .map(|set| set.contains(operator))
            .unwrap_or(false)
    }

    // ========================================================================
    // Rent accounting
    // ========================================================================

    /// Pending (unrealized) rent units for a holder at the current accumulator
    fn pending_units(&self, holder: &AccountId) -> EngineResult<u64> {
        let balance = self.balances.get(holder).copied().unwrap_or(0);
        if balance == 0 {
            return Ok(0);
        }
        let index = self.holder_index.get(holder).copied().unwrap_or(0);
        // The index never exceeds the accumulator; enforced on snapshot restore
        let delta = self.cumulative_per_share - index;
        let units = delta
            .checked_mul(balance as u128)
            .ok_or(EngineError::Overflow("pending rent"))?
            / SCALE;
        u64::try_from(units).map_err(|_| EngineError::Overflow("pending rent"))
    }

    /// Convert a holder's pending rent into realized units and snap their index
    pub(crate) fn realize_rent(&mut self, holder: &AccountId) -> EngineResult<()> {
        let pending = self.pending_units(holder)?;
        if pending > 0 {
            let accrued = self.accrued.get(holder).copied().unwrap_or(0);
            let new_accrued = accrued
                .checked_add(pending)
                .ok_or(EngineError::Overflow("accrued rent"))?;
            self.accrued.insert(*holder, new_accrued);
        }
        self.holder_index.insert(*holder, self.cumulative_per_share);
        Ok(())
    }

    /// Pull rent from the issuer and fold it into the per-share accumulator
    ///
    /// The denominator is the immutable cap, so rent attributable to unminted
    /// shares stays in the ledger account. Integer division truncates; the
    /// sub-unit remainder stays in the pool permanently.
    pub fn deposit_rent(
        &mut self,
        caller: &AccountId,
        settlement: &mut dyn SettlementAsset,
        amount: u64,
    ) -> EngineResult<()> {
        self.require_issuer(caller)?;
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        if self.total_supply == 0 {
            return Err(EngineError::NoSupply);
        }
        // Compute the full state update before the external pull
        let delta = (amount as u128)
            .checked_mul(SCALE)
            .ok_or(EngineError::Overflow("rent delta"))?
            / (self.total_supply as u128);
        let new_cumulative = self
            .cumulative_per_share
            .checked_add(delta)
            .ok_or(EngineError::Overflow("rent accumulator"))?;
        let new_total = self
            .total_rent_deposited
            .checked_add(amount)
            .ok_or(EngineError::Overflow("rent total"))?;
        if !settlement.transfer_from(&self.ledger_account, caller, &self.ledger_account, amount) {
            warn!(
                "asset {}: rent deposit of {} from {} failed at settlement pull",
                self.asset_id, amount, caller
            );
            return Err(EngineError::SettlementTransferFailed("rent deposit pull"));
        }
        self.cumulative_per_share = new_cumulative;
        self.total_rent_deposited = new_total;
        info!(
            "asset {}: rent deposit {} ({}) accepted",
            self.asset_id,
            amount,
            format_units(amount, settlement.decimals())
        );
        Ok(())
    }

    /// Rent units the holder could claim right now
    ///
    /// Realized units survive a balance going to zero, so a holder who
    /// transferred shares away keeps the rent earned while holding them.
    pub fn claimable_rent(&self, holder: &AccountId) -> EngineResult<u64> {
        let accrued = self.accrued.get(holder).copied().unwrap_or(0);
        let pending = self.pending_units(holder)?;
        accrued
            .checked_add(pending)
            .ok_or(EngineError::Overflow("claimable rent"))
    }

    /// Pay out the caller's entire rent entitlement
    ///
    /// Index and realized bucket are reset before the settlement push and
    /// restored exactly if the push fails, keeping the call atomic.
    pub fn claim_rent(
        &mut self,
        caller: &AccountId,
        settlement: &mut dyn SettlementAsset,
    ) -> EngineResult<u64> {
        let total = self.claimable_rent(caller)?;
        if total == 0 {
            return Err(EngineError::NothingToClaim);
        }
        let prev_index = self.holder_index.insert(*caller, self.cumulative_per_share);
        let prev_accrued = self.accrued.remove(caller);
        if !settlement.transfer(&self.ledger_account, caller, total) {
            match prev_index {
                Some(index) => self.holder_index.insert(*caller, index),
                None => self.holder_index.remove(caller),
            };
            if let Some(accrued) = prev_accrued {
                self.accrued.insert(*caller, accrued);
            }
            warn!(
                "asset {}: rent claim of {} by {} failed at settlement push",
                self.asset_id, total, caller
            );
            return Err(EngineError::SettlementTransferFailed("rent payout"));
        }
        info!(
            "asset {}: {} claimed {} rent units ({})",
            self.asset_id,
            caller,
            total,
            format_units(total, settlement.decimals())
        );
        Ok(total)
    }

    // ========================================================================
    // Issuer handover
    // ========================================================================

    /// Begin the two-step issuer handover
    pub fn transfer_ownership(
        &mut self,
        caller: &AccountId,
        new_issuer: &AccountId,
    ) -> EngineResult<()> {
        self.require_issuer(caller)?;
        if new_issuer.is_zero() {
            return Err(EngineError::ZeroAddress);
        }
        self.pending_issuer = Some(*new_issuer);
        info!(
            "asset {}: issuer handover to {} pending",
            self.asset_id, new_issuer
        );
        Ok(())
    }

    /// Complete the handover; only the pending issuer may accept
    pub fn accept_ownership(&mut self, caller: &AccountId) -> EngineResult<()> {
        match self.pending_issuer {
            Some(pending) if pending == *caller => {
                self.issuer = pending;
                self.pending_issuer = None;
                info!("asset {}: issuer is now {}", self.asset_id, caller);
                Ok(())
            }
            Some(_) => Err(EngineError::NotPendingOwner),
            None => Err(EngineError::OwnershipTransferNotPending),
        }
    }

    /// Abort a pending handover
    pub fn cancel_ownership_transfer(&mut self, caller: &AccountId) -> EngineResult<()> {
        self.require_issuer(caller)?;
        if self.pending_issuer.take().is_none() {
            return Err(EngineError::OwnershipTransferNotPending);
        }
        info!("asset {}: issuer handover cancelled", self.asset_id);
        Ok(())
    }

    // ========================================================================
    // Views
    // ========================================================================

    pub fn asset_info(&self) -> AssetInfo {
        AssetInfo {
            total_supply: self.total_supply,
            minted: self.minted,
            price_per_share: self.price_per_share,
            active: self.active,
            funded: self.funded,
        }
    }

    pub fn asset_id(&self) -> u64 {
        self.asset_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn metadata_base(&self) -> &str {
        &self.metadata_base
    }

    pub fn issuer(&self) -> &AccountId {
        &self.issuer
    }

    /// Account under which this ledger holds its rent pool
    pub fn ledger_account(&self) -> &AccountId {
        &self.ledger_account
    }

    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    pub fn minted(&self) -> u64 {
        self.minted
    }

    /// Shares still mintable under the cap
    pub fn available(&self) -> u64 {
        self.total_supply - self.minted
    }

    pub fn price_per_share(&self) -> u64 {
        self.price_per_share
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_funded(&self) -> bool {
        self.funded
    }

    pub fn balance_of(&self, holder: &AccountId) -> u64 {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    pub fn holders(&self) -> impl Iterator<Item = (&AccountId, u64)> {
        self.balances.iter().map(|(account, balance)| (account, *balance))
    }

    pub fn total_rent_deposited(&self) -> u64 {
        self.total_rent_deposited
    }

    // ========================================================================
    // Snapshot export / restore
    // ========================================================================

    /// Export to the serializable mirror (entries sorted for stable output)
    pub fn export_state(&self) -> SavedLedger {
        let mut balances: Vec<SavedHolding> = self
            .balances
            .iter()
            .map(|(account, amount)| SavedHolding {
                account: *account,
                amount: *amount,
            })
            .collect();
        balances.sort_by_key(|h| h.account);

        let mut operators: Vec<SavedOperator> = self
            .operators
            .iter()
            .flat_map(|(holder, set)| {
                set.iter().map(|operator| SavedOperator {
                    holder: *holder,
                    operator: *operator,
                })
            })
            .collect();
        operators.sort_by_key(|o| (o.holder, o.operator));

        let mut holder_indices: Vec<SavedHolderIndex> = self
            .holder_index
            .iter()
            .map(|(account, index)| SavedHolderIndex {
                account: *account,
                index: index.to_string(),
            })
            .collect();
        holder_indices.sort_by_key(|entry| entry.account);

        let mut accrued: Vec<SavedHolding> = self
            .accrued
            .iter()
            .map(|(account, amount)| SavedHolding {
                account: *account,
                amount: *amount,
            })
            .collect();
        accrued.sort_by_key(|h| h.account);

        SavedLedger {
            asset_id: self.asset_id,
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            metadata_base: self.metadata_base.clone(),
            ledger_account: self.ledger_account,
            issuer: self.issuer,
            pending_issuer: self.pending_issuer,
            total_supply: self.total_supply,
            minted: self.minted,
            price_per_share: self.price_per_share,
            active: self.active,
            funded: self.funded,
            balances,
            operators,
            cumulative_per_share: self.cumulative_per_share.to_string(),
            holder_indices,
            accrued,
            total_rent_deposited: self.total_rent_deposited,
        }
    }

    /// Rebuild from a saved mirror, validating every ledger invariant
    pub fn from_saved(saved: SavedLedger) -> anyhow::Result<Self> {
        use anyhow::{bail, Context};

        let cumulative_per_share: u128 = saved
            .cumulative_per_share
            .parse()
            .with_context(|| format!("asset {}: invalid accumulator", saved.asset_id))?;
        if saved.total_supply == 0 {
            bail!("asset {}: zero share cap", saved.asset_id);
        }
        if saved.issuer.is_zero() || saved.ledger_account.is_zero() {
            bail!("asset {}: zero principal account", saved.asset_id);
        }
        if saved.minted > saved.total_supply {
            bail!(
                "asset {}: minted {} exceeds cap {}",
                saved.asset_id,
                saved.minted,
                saved.total_supply
            );
        }
        if saved.funded != (saved.minted == saved.total_supply) {
            bail!("asset {}: funded flag contradicts minted total", saved.asset_id);
        }
        if saved.funded && saved.active {
            bail!("asset {}: funded asset marked active", saved.asset_id);
        }

        let mut balances = HashMap::new();
        let mut balance_sum: u64 = 0;
        for holding in &saved.balances {
            if balances.insert(holding.account, holding.amount).is_some() {
                bail!(
                    "asset {}: duplicate balance entry for {}",
                    saved.asset_id,
                    holding.account
                );
            }
            balance_sum = balance_sum
                .checked_add(holding.amount)
                .with_context(|| format!("asset {}: balance sum overflow", saved.asset_id))?;
        }
        if balance_sum != saved.minted {
            bail!(
                "asset {}: balances sum to {} but minted is {}",
                saved.asset_id,
                balance_sum,
                saved.minted
            );
        }

        let mut operators: HashMap<AccountId, HashSet<AccountId>> = HashMap::new();
        for entry in &saved.operators {
            operators
                .entry(entry.holder)
                .or_default()
                .insert(entry.operator);
        }

        let mut holder_index = HashMap::new();
        for entry in &saved.holder_indices {
            let index: u128 = entry.index.parse().with_context(|| {
                format!("asset {}: invalid index for {}", saved.asset_id, entry.account)
            })?;
            if index > cumulative_per_share {
                bail!(
                    "asset {}: index for {} exceeds the accumulator",
                    saved.asset_id,
                    entry.account
                );
            }
            if holder_index.insert(entry.account, index).is_some() {
                bail!(
                    "asset {}: duplicate index entry for {}",
                    saved.asset_id,
                    entry.account
                );
            }
        }

        let mut accrued = HashMap::new();
        for holding in &saved.accrued {
            if accrued.insert(holding.account, holding.amount).is_some() {
                bail!(
                    "asset {}: duplicate accrued entry for {}",
                    saved.asset_id,
                    holding.account
                );
            }
        }

        Ok(Self {
            asset_id: saved.asset_id,
            name: saved.name,
            symbol: saved.symbol,
            metadata_base: saved.metadata_base,
            ledger_account: saved.ledger_account,
            issuer: saved.issuer,
            pending_issuer: saved.pending_issuer,
            total_supply: saved.total_supply,
            minted: saved.minted,
            price_per_share: saved.price_per_share,
            active: saved.active,
            funded: saved.funded,
            balances,
            operators,
            cumulative_per_share,
            holder_index,
            accrued,
            total_rent_deposited: saved.total_rent_deposited,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use propshare_settlement::InMemoryToken;

    fn issuer() -> AccountId {
        AccountId::from_label("test/issuer")
    }

    fn holder(name: &str) -> AccountId {
        AccountId::from_label(name)
    }

    fn make_ledger(cap: u64) -> AssetLedger {
        AssetLedger::new(
            7,
            issuer(),
            cap,
            2_000_000,
            "ipfs://props/7/",
            "Maple Street 12",
            "MAPLE12",
        )
        .unwrap()
    }

    /// Token pre-funded for the issuer with the ledger approved to pull rent
    fn rent_token(ledger: &AssetLedger, budget: u64) -> InMemoryToken {
        let mut token = InMemoryToken::new("USDs");
        token.mint(&issuer(), budget);
        token.approve(&issuer(), ledger.ledger_account(), budget);
        token
    }

    /// Wrapper that refuses any transfer whose destination matches
    struct RefusingToken {
        inner: InMemoryToken,
        refuse_to: Option<AccountId>,
    }

    impl SettlementAsset for RefusingToken {
        fn balance_of(&self, account: &AccountId) -> u64 {
            self.inner.balance_of(account)
        }
        fn allowance(&self, owner: &AccountId, spender: &AccountId) -> u64 {
            self.inner.allowance(owner, spender)
        }
        fn approve(&mut self, owner: &AccountId, spender: &AccountId, amount: u64) -> bool {
            self.inner.approve(owner, spender, amount)
        }
        fn transfer(&mut self, from: &AccountId, to: &AccountId, amount: u64) -> bool {
            if Some(*to) == self.refuse_to {
                return false;
            }
            self.inner.transfer(from, to, amount)
        }
        fn transfer_from(
            &mut self,
            spender: &AccountId,
            owner: &AccountId,
            to: &AccountId,
            amount: u64,
        ) -> bool {
            if Some(*to) == self.refuse_to {
                return false;
            }
            self.inner.transfer_from(spender, owner, to, amount)
        }
    }

    #[test]
    fn test_new_rejects_bad_arguments() {
        assert_eq!(
            AssetLedger::new(1, issuer(), 0, 1, "", "X", "X").err(),
            Some(EngineError::InvalidCap)
        );
        assert_eq!(
            AssetLedger::new(1, AccountId::ZERO, 10, 1, "", "X", "X").err(),
            Some(EngineError::ZeroAddress)
        );
    }

    #[test]
    fn test_mint_requires_issuer() {
        let mut ledger = make_ledger(1000);
        let outsider = holder("outsider");
        assert_eq!(
            ledger.mint_to(&outsider, &holder("a"), 10),
            Err(EngineError::NotIssuer)
        );
        assert_eq!(ledger.minted(), 0);
    }

    #[test]
    fn test_mint_validations() {
        let mut ledger = make_ledger(1000);
        assert_eq!(
            ledger.mint_to(&issuer(), &holder("a"), 0),
            Err(EngineError::ZeroAmount)
        );
        assert_eq!(
            ledger.mint_to(&issuer(), &AccountId::ZERO, 10),
            Err(EngineError::ZeroAddress)
        );
        assert_eq!(
            ledger.mint_to(&issuer(), &holder("a"), 1001),
            Err(EngineError::CapExceeded)
        );
        // Failed mints leave nothing behind
        assert_eq!(ledger.minted(), 0);
        assert_eq!(ledger.balance_of(&holder("a")), 0);
    }

    #[test]
    fn test_mint_inactive_fails() {
        let mut ledger = make_ledger(1000);
        ledger.set_active(&issuer(), false).unwrap();
        assert_eq!(
            ledger.mint_to(&issuer(), &holder("a"), 10),
            Err(EngineError::NotActive)
        );
        ledger.set_active(&issuer(), true).unwrap();
        ledger.mint_to(&issuer(), &holder("a"), 10).unwrap();
        assert_eq!(ledger.balance_of(&holder("a")), 10);
    }

    #[test]
    fn test_funded_transition_is_exact() {
        let mut ledger = make_ledger(1000);
        ledger.mint_to(&issuer(), &holder("a"), 999).unwrap();
        assert!(ledger.is_active());
        assert!(!ledger.is_funded());

        ledger.mint_to_custody(&issuer(), 1).unwrap();
        assert!(ledger.is_funded());
        assert!(!ledger.is_active());
        assert_eq!(ledger.available(), 0);

        // A funded offering cannot be reactivated in place
        assert_eq!(
            ledger.set_active(&issuer(), true),
            Err(EngineError::OfferingFunded)
        );
        assert_eq!(
            ledger.mint_to(&issuer(), &holder("a"), 1),
            Err(EngineError::NotActive)
        );

        // Burning custody below the cap reopens it
        ledger.burn_from_custody(&issuer(), 1).unwrap();
        assert!(!ledger.is_funded());
        assert!(ledger.is_active());
        assert_eq!(ledger.available(), 1);
    }

    #[test]
    fn test_burn_validations() {
        let mut ledger = make_ledger(1000);
        ledger.mint_to(&issuer(), &holder("a"), 100).unwrap();
        ledger.mint_to_custody(&issuer(), 100).unwrap();

        assert_eq!(
            ledger.burn_from_custody(&issuer(), 0),
            Err(EngineError::ZeroAmount)
        );
        assert_eq!(
            ledger.burn_from_custody(&issuer(), 201),
            Err(EngineError::InsufficientMinted)
        );
        // Minted covers 150 but custody holds only 100
        assert_eq!(
            ledger.burn_from_custody(&issuer(), 150),
            Err(EngineError::InsufficientBalance)
        );
        assert_eq!(
            ledger.burn_from_custody(&holder("a"), 10),
            Err(EngineError::NotIssuer)
        );

        ledger.burn_from_custody(&issuer(), 100).unwrap();
        assert_eq!(ledger.minted(), 100);
        assert_eq!(ledger.balance_of(&issuer()), 0);
    }

    #[test]
    fn test_supply_invariant_random_ops() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        for seed in 0..4u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut ledger = make_ledger(10_000);
            let accounts = [issuer(), holder("a"), holder("b"), holder("c")];

            for _ in 0..300 {
                let amount = rng.gen_range(0..50u64);
                match rng.gen_range(0..4) {
                    0 => {
                        let to = accounts[rng.gen_range(0..accounts.len())];
                        let _ = ledger.mint_to(&issuer(), &to, amount);
                    }
                    1 => {
                        let _ = ledger.mint_to_custody(&issuer(), amount);
                    }
                    2 => {
                        let _ = ledger.burn_from_custody(&issuer(), amount);
                    }
                    _ => {
                        let from = accounts[rng.gen_range(0..accounts.len())];
                        let to = accounts[rng.gen_range(0..accounts.len())];
                        let _ = ledger.transfer(&from, &to, amount);
                    }
                }

                let sum: u64 = ledger.holders().map(|(_, balance)| balance).sum();
                assert_eq!(sum, ledger.minted());
                assert!(ledger.minted() <= ledger.total_supply());
                assert_eq!(
                    ledger.is_funded(),
                    ledger.minted() == ledger.total_supply()
                );
                if ledger.is_funded() {
                    assert!(!ledger.is_active());
                }
            }
        }
    }

    #[test]
    fn test_transfer_validations() {
        let mut ledger = make_ledger(1000);
        let a = holder("a");
        let b = holder("b");
        ledger.mint_to(&issuer(), &a, 100).unwrap();

        assert_eq!(ledger.transfer(&a, &b, 0), Err(EngineError::ZeroAmount));
        assert_eq!(
            ledger.transfer(&a, &AccountId::ZERO, 10),
            Err(EngineError::ZeroAddress)
        );
        assert_eq!(
            ledger.transfer(&a, &b, 101),
            Err(EngineError::InsufficientBalance)
        );
        assert_eq!(ledger.balance_of(&a), 100);

        ledger.transfer(&a, &b, 100).unwrap();
        assert_eq!(ledger.balance_of(&a), 0);
        assert_eq!(ledger.balance_of(&b), 100);
    }

    #[test]
    fn test_operator_transfer_from() {
        let mut ledger = make_ledger(1000);
        let a = holder("a");
        let b = holder("b");
        let operator = holder("operator");
        ledger.mint_to(&issuer(), &a, 100).unwrap();

        assert_eq!(
            ledger.transfer_from(&operator, &a, &b, 10),
            Err(EngineError::NotOperator)
        );

        ledger.set_operator_approval(&a, &operator, true).unwrap();
        assert!(ledger.is_operator(&a, &operator));
        ledger.transfer_from(&operator, &a, &b, 10).unwrap();
        assert_eq!(ledger.balance_of(&b), 10);

        // Holders move their own shares without an approval
        ledger.transfer_from(&a, &a, &b, 5).unwrap();
        assert_eq!(ledger.balance_of(&b), 15);

        ledger.set_operator_approval(&a, &operator, false).unwrap();
        assert!(!ledger.is_operator(&a, &operator));
        assert_eq!(
            ledger.transfer_from(&operator, &a, &b, 10),
            Err(EngineError::NotOperator)
        );
    }

    #[test]
    fn test_rent_scenario_two_holders() {
        let mut ledger = make_ledger(1000);
        let a = holder("a");
        let b = holder("b");
        ledger.mint_to(&issuer(), &a, 600).unwrap();
        ledger.mint_to(&issuer(), &b, 400).unwrap();
        let mut token = rent_token(&ledger, 1_500);

        ledger.deposit_rent(&issuer(), &mut token, 1_000).unwrap();
        assert_eq!(ledger.claimable_rent(&a).unwrap(), 600);
        assert_eq!(ledger.claimable_rent(&b).unwrap(), 400);

        let paid = ledger.claim_rent(&a, &mut token).unwrap();
        assert_eq!(paid, 600);
        assert_eq!(token.balance_of(&a), 600);
        assert_eq!(ledger.claimable_rent(&a).unwrap(), 0);

        ledger.deposit_rent(&issuer(), &mut token, 500).unwrap();
        assert_eq!(ledger.claimable_rent(&a).unwrap(), 300);
        assert_eq!(ledger.claimable_rent(&b).unwrap(), 600);
    }

    #[test]
    fn test_no_double_claim() {
        let mut ledger = make_ledger(1000);
        let a = holder("a");
        ledger.mint_to(&issuer(), &a, 1000).unwrap();
        let mut token = rent_token(&ledger, 1_000);

        ledger.deposit_rent(&issuer(), &mut token, 1_000).unwrap();
        assert_eq!(ledger.claim_rent(&a, &mut token).unwrap(), 1_000);
        assert_eq!(
            ledger.claim_rent(&a, &mut token),
            Err(EngineError::NothingToClaim)
        );
        assert_eq!(token.balance_of(&a), 1_000);
    }

    #[test]
    fn test_rent_conservation_under_truncation() {
        let mut ledger = AssetLedger::new(3, issuer(), 3, 1, "", "Tri", "TRI").unwrap();
        let holders = [holder("a"), holder("b"), holder("c")];
        for h in &holders {
            ledger.mint_to(&issuer(), h, 1).unwrap();
        }
        let mut token = rent_token(&ledger, 100);

        // 10 / 3 truncates; each holder sees 3, shortfall 1 < cap
        ledger.deposit_rent(&issuer(), &mut token, 10).unwrap();
        let total: u64 = holders
            .iter()
            .map(|h| ledger.claimable_rent(h).unwrap())
            .sum();
        assert_eq!(total, 9);
        assert!(10 - total < 3);

        // Accumulator only grows
        let before = ledger.claimable_rent(&holders[0]).unwrap();
        ledger.deposit_rent(&issuer(), &mut token, 1).unwrap();
        assert!(ledger.claimable_rent(&holders[0]).unwrap() >= before);
    }

    #[test]
    fn test_deposit_requires_issuer_and_allowance() {
        let mut ledger = make_ledger(1000);
        ledger.mint_to(&issuer(), &holder("a"), 1000).unwrap();
        let mut token = InMemoryToken::new("USDs");
        token.mint(&issuer(), 1_000);

        assert_eq!(
            ledger.deposit_rent(&holder("a"), &mut token, 100),
            Err(EngineError::NotIssuer)
        );
        assert_eq!(
            ledger.deposit_rent(&issuer(), &mut token, 0),
            Err(EngineError::ZeroAmount)
        );

        // No allowance granted: the pull fails and the accumulator stays put
        assert_eq!(
            ledger.deposit_rent(&issuer(), &mut token, 100),
            Err(EngineError::SettlementTransferFailed("rent deposit pull"))
        );
        assert_eq!(ledger.claimable_rent(&holder("a")).unwrap(), 0);
        assert_eq!(ledger.total_rent_deposited(), 0);
        assert_eq!(token.balance_of(&issuer()), 1_000);
    }

    #[test]
    fn test_claim_rolls_back_on_failed_push() {
        let mut ledger = make_ledger(1000);
        let a = holder("a");
        ledger.mint_to(&issuer(), &a, 1000).unwrap();
        let mut token = RefusingToken {
            inner: rent_token(&ledger, 500),
            refuse_to: Some(a),
        };
        ledger.deposit_rent(&issuer(), &mut token, 500).unwrap();

        assert_eq!(ledger.claimable_rent(&a).unwrap(), 500);
        assert_eq!(
            ledger.claim_rent(&a, &mut token),
            Err(EngineError::SettlementTransferFailed("rent payout"))
        );
        // Entitlement is exactly as before the failed claim
        assert_eq!(ledger.claimable_rent(&a).unwrap(), 500);

        token.refuse_to = None;
        assert_eq!(ledger.claim_rent(&a, &mut token).unwrap(), 500);
        assert_eq!(ledger.claimable_rent(&a).unwrap(), 0);
    }

    #[test]
    fn test_transfer_realizes_rent_for_both_sides() {
        let mut ledger = make_ledger(1000);
        let a = holder("a");
        let b = holder("b");
        let c = holder("c");
        ledger.mint_to(&issuer(), &a, 600).unwrap();
        ledger.mint_to(&issuer(), &b, 400).unwrap();
        let mut token = rent_token(&ledger, 2_000);

        ledger.deposit_rent(&issuer(), &mut token, 1_000).unwrap();

        // A moves everything to C after the deposit
        ledger.transfer(&a, &c, 600).unwrap();

        // Rent earned while A held stays with A; C starts clean
        assert_eq!(ledger.claimable_rent(&a).unwrap(), 600);
        assert_eq!(ledger.claimable_rent(&c).unwrap(), 0);

        ledger.deposit_rent(&issuer(), &mut token, 1_000).unwrap();
        assert_eq!(ledger.claimable_rent(&a).unwrap(), 600);
        assert_eq!(ledger.claimable_rent(&c).unwrap(), 600);
        assert_eq!(ledger.claimable_rent(&b).unwrap(), 800);

        // A's realized entitlement survives the zero balance
        assert_eq!(ledger.balance_of(&a), 0);
        assert_eq!(ledger.claim_rent(&a, &mut token).unwrap(), 600);
    }

    #[test]
    fn test_fresh_mint_does_not_inherit_past_rent() {
        let mut ledger = make_ledger(1000);
        let a = holder("a");
        let late = holder("late");
        ledger.mint_to(&issuer(), &a, 500).unwrap();
        let mut token = rent_token(&ledger, 1_000);

        ledger.deposit_rent(&issuer(), &mut token, 1_000).unwrap();
        ledger.mint_to(&issuer(), &late, 500).unwrap();

        assert_eq!(ledger.claimable_rent(&a).unwrap(), 500);
        assert_eq!(ledger.claimable_rent(&late).unwrap(), 0);
    }

    #[test]
    fn test_two_step_issuer_handover() {
        let mut ledger = make_ledger(1000);
        let next = holder("next-issuer");
        let stranger = holder("stranger");

        assert_eq!(
            ledger.accept_ownership(&next),
            Err(EngineError::OwnershipTransferNotPending)
        );
        assert_eq!(
            ledger.transfer_ownership(&stranger, &next),
            Err(EngineError::NotIssuer)
        );
        assert_eq!(
            ledger.transfer_ownership(&issuer(), &AccountId::ZERO),
            Err(EngineError::ZeroAddress)
        );

        ledger.transfer_ownership(&issuer(), &next).unwrap();
        assert_eq!(
            ledger.accept_ownership(&stranger),
            Err(EngineError::NotPendingOwner)
        );

        // Still the old issuer until accepted
        ledger.mint_to_custody(&issuer(), 1).unwrap();

        ledger.accept_ownership(&next).unwrap();
        assert_eq!(ledger.issuer(), &next);
        assert_eq!(
            ledger.mint_to_custody(&issuer(), 1),
            Err(EngineError::NotIssuer)
        );
        ledger.mint_to_custody(&next, 1).unwrap();

        ledger.transfer_ownership(&next, &stranger).unwrap();
        ledger.cancel_ownership_transfer(&next).unwrap();
        assert_eq!(
            ledger.cancel_ownership_transfer(&next),
            Err(EngineError::OwnershipTransferNotPending)
        );
    }

    #[test]
    fn test_info_views() {
        let mut ledger = make_ledger(1000);
        ledger.mint_to(&issuer(), &holder("a"), 250).unwrap();

        let info = ledger.asset_info();
        assert_eq!(info.total_supply, 1000);
        assert_eq!(info.minted, 250);
        assert_eq!(info.price_per_share, 2_000_000);
        assert!(info.active);
        assert!(!info.funded);

        assert_eq!(ledger.minted(), 250);
        assert_eq!(ledger.available(), 750);
        assert_eq!(ledger.name(), "Maple Street 12");
        assert_eq!(ledger.symbol(), "MAPLE12");
        assert_eq!(ledger.metadata_base(), "ipfs://props/7/");
        assert_eq!(ledger.asset_id(), 7);
    }
}
