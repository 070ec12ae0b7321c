//! Escrowed secondary marketplace for asset shares
//!
//! Sellers list shares at a fixed price; the shares move into marketplace
//! custody for the order's lifetime. Buyers settle against a specific order
//! id (flat first-come-first-served list, no price matching). Every fill
//! runs three settlement legs (buyer pull, fee push, seller push) before any
//! engine state changes, so a failed leg aborts the whole call.

use chrono::Utc;
use tracing::{error, info, warn};

use propshare_types::{format_units, AccountId, SettlementAsset, BPS_DENOMINATOR};

use crate::error::{EngineError, EngineResult};
use crate::registry::AssetRegistry;
use crate::snapshot::{SavedMarketplace, SavedOrder};

/// Upper bound on the trading fee (10%)
pub const MAX_FEE_BPS: u64 = 1_000;

/// A standing sell listing; `amount_remaining` stays recorded after
/// cancellation so cancelled and fully filled orders are distinguishable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: u64,
    pub asset_id: u64,
    pub seller: AccountId,
    pub amount_listed: u64,
    pub amount_remaining: u64,
    pub price_per_share: u64,
    pub active: bool,
    pub created_at_ms: i64,
}

/// Settled amounts of one fill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuyReceipt {
    pub order_id: u64,
    pub asset_id: u64,
    pub amount: u64,
    pub total_price: u64,
    pub fee: u64,
    pub seller_proceeds: u64,
}

pub struct EscrowMarketplace {
    owner: AccountId,
    pending_owner: Option<AccountId>,
    /// Account holding escrowed shares in the ledgers and in-flight
    /// settlement units during a fill
    escrow_account: AccountId,
    fee_bps: u64,
    fee_recipient: AccountId,
    /// Order id == position + 1; orders are never removed
    orders: Vec<Order>,
}

impl EscrowMarketplace {
    pub fn new(
        owner: AccountId,
        fee_recipient: AccountId,
        fee_bps: u64,
        escrow_label: &str,
    ) -> EngineResult<Self> {
        if owner.is_zero() || fee_recipient.is_zero() {
            return Err(EngineError::ZeroAddress);
        }
        if fee_bps > MAX_FEE_BPS {
            return Err(EngineError::FeeTooHigh);
        }
        Ok(Self {
            owner,
            pending_owner: None,
            escrow_account: AccountId::from_label(escrow_label),
            fee_bps,
            fee_recipient,
            orders: Vec::new(),
        })
    }

    fn require_owner(&self, caller: &AccountId) -> EngineResult<()> {
        if caller != &self.owner {
            return Err(EngineError::NotOwner);
        }
        Ok(())
    }

    fn order_index(&self, order_id: u64) -> EngineResult<usize> {
        let index = order_id
            .checked_sub(1)
            .and_then(|i| usize::try_from(i).ok())
            .ok_or(EngineError::UnknownOrder)?;
        if index >= self.orders.len() {
            return Err(EngineError::UnknownOrder);
        }
        Ok(index)
    }

    // ========================================================================
    // Order lifecycle
    // ========================================================================

    /// List shares for sale, pulling them into escrow
    ///
    /// The seller must have approved the escrow account as an operator on the
    /// asset's ledger beforehand.
    pub fn create_order(
        &mut self,
        registry: &mut AssetRegistry,
        caller: &AccountId,
        asset_id: u64,
        amount: u64,
        price_per_share: u64,
    ) -> EngineResult<u64> {
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        if price_per_share == 0 {
            return Err(EngineError::ZeroPrice);
        }
        // The custody account cannot be a counterparty
        if caller == &self.escrow_account {
            return Err(EngineError::SelfTrade);
        }
        let ledger = registry
            .ledger_mut(asset_id)
            .ok_or(EngineError::InvalidLedger)?;
        let order_id = self.orders.len() as u64 + 1;
        // Share pull and order creation are atomic: a failed pull propagates
        // before the order is recorded
        ledger.transfer_from(&self.escrow_account, caller, &self.escrow_account, amount)?;
        self.orders.push(Order {
            id: order_id,
            asset_id,
            seller: *caller,
            amount_listed: amount,
            amount_remaining: amount,
            price_per_share,
            active: true,
            created_at_ms: Utc::now().timestamp_millis(),
        });
        info!(
            "order {}: {} listed {} shares of asset {} at {}",
            order_id, caller, amount, asset_id, price_per_share
        );
        Ok(order_id)
    }

    /// Fill an order (fully or partially) against the settlement asset
    ///
    /// Legs in order: pull `total` from the buyer into escrow, push the fee,
    /// push the seller's proceeds, then release the shares. Failure of any
    /// settlement leg refunds the buyer whatever escrow still holds from this
    /// call and aborts with no engine state change.
    pub fn buy(
        &mut self,
        registry: &mut AssetRegistry,
        settlement: &mut dyn SettlementAsset,
        caller: &AccountId,
        order_id: u64,
        amount: u64,
    ) -> EngineResult<BuyReceipt> {
        let index = self.order_index(order_id)?;
        let (asset_id, seller, remaining, price) = {
            let order = &self.orders[index];
            if !order.active {
                return Err(EngineError::OrderInactive);
            }
            (
                order.asset_id,
                order.seller,
                order.amount_remaining,
                order.price_per_share,
            )
        };
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        if caller.is_zero() {
            return Err(EngineError::ZeroAddress);
        }
        // Neither the seller nor the custody account can take the buy side
        if caller == &seller || caller == &self.escrow_account {
            return Err(EngineError::SelfTrade);
        }
        if amount > remaining {
            return Err(EngineError::InsufficientRemaining);
        }

        let total = u64::try_from(amount as u128 * price as u128)
            .map_err(|_| EngineError::Overflow("order total"))?;
        // Truncating division, applied exactly once
        let fee = (total as u128 * self.fee_bps as u128 / BPS_DENOMINATOR as u128) as u64;
        let seller_proceeds = total - fee;

        let ledger = registry
            .ledger_mut(asset_id)
            .ok_or(EngineError::InvalidLedger)?;
        // Realize rent for both sides of the upcoming share release now, so
        // the release after the settlement legs cannot fail
        ledger.realize_rent(&self.escrow_account)?;
        ledger.realize_rent(caller)?;

        if !settlement.transfer_from(&self.escrow_account, caller, &self.escrow_account, total) {
            warn!(
                "order {}: payment pull of {} from {} failed",
                order_id, total, caller
            );
            return Err(EngineError::SettlementTransferFailed("buyer payment pull"));
        }
        if fee > 0 && !settlement.transfer(&self.escrow_account, &self.fee_recipient, fee) {
            warn!("order {}: fee payout of {} failed, refunding buyer", order_id, fee);
            if !settlement.transfer(&self.escrow_account, caller, total) {
                error!(
                    "order {}: refund of {} to {} failed, units stranded in escrow",
                    order_id, total, caller
                );
            }
            return Err(EngineError::SettlementTransferFailed("fee payout"));
        }
        if seller_proceeds > 0
            && !settlement.transfer(&self.escrow_account, &seller, seller_proceeds)
        {
            // A conforming token cannot fail this leg; refund what escrow
            // still holds from this call (the fee leg already settled)
            error!(
                "order {}: seller payout of {} to {} failed, refunding buyer",
                order_id, seller_proceeds, seller
            );
            if !settlement.transfer(&self.escrow_account, caller, seller_proceeds) {
                error!(
                    "order {}: refund of {} to {} failed, units stranded in escrow",
                    order_id, seller_proceeds, caller
                );
            }
            return Err(EngineError::SettlementTransferFailed("seller payout"));
        }

        // Escrow custody covers `amount` and rent is already realized, so
        // this release cannot fail
        ledger.transfer(&self.escrow_account, caller, amount)?;
        let order = &mut self.orders[index];
        order.amount_remaining -= amount;
        if order.amount_remaining == 0 {
            order.active = false;
        }
        info!(
            "order {}: {} bought {} shares for {} ({}), fee {}, remaining {}",
            order_id,
            caller,
            amount,
            total,
            format_units(total, settlement.decimals()),
            fee,
            order.amount_remaining
        );
        Ok(BuyReceipt {
            order_id,
            asset_id,
            amount,
            total_price: total,
            fee,
            seller_proceeds,
        })
    }

    /// Cancel an order, returning all remaining escrowed shares to the seller
    ///
    /// Deactivation is irreversible; settled partial fills are not reversed.
    pub fn cancel_order(
        &mut self,
        registry: &mut AssetRegistry,
        caller: &AccountId,
        order_id: u64,
    ) -> EngineResult<u64> {
        let index = self.order_index(order_id)?;
        let (asset_id, seller, remaining, active) = {
            let order = &self.orders[index];
            (
                order.asset_id,
                order.seller,
                order.amount_remaining,
                order.active,
            )
        };
        if !active {
            return Err(EngineError::OrderInactive);
        }
        if caller != &seller {
            return Err(EngineError::NotSeller);
        }
        let ledger = registry
            .ledger_mut(asset_id)
            .ok_or(EngineError::InvalidLedger)?;
        // Active orders always have remaining > 0, so the return leg is a
        // real transfer; the order mutates only after it succeeds
        ledger.transfer(&self.escrow_account, &seller, remaining)?;
        self.orders[index].active = false;
        info!(
            "order {}: cancelled by {}, {} shares returned",
            order_id, caller, remaining
        );
        Ok(remaining)
    }

    // ========================================================================
    // Fee administration
    // ========================================================================

    pub fn set_fee(&mut self, caller: &AccountId, fee_bps: u64) -> EngineResult<()> {
        self.require_owner(caller)?;
        if fee_bps > MAX_FEE_BPS {
            return Err(EngineError::FeeTooHigh);
        }
        info!("marketplace fee {} -> {} bps", self.fee_bps, fee_bps);
        self.fee_bps = fee_bps;
        Ok(())
    }

    pub fn set_fee_recipient(
        &mut self,
        caller: &AccountId,
        recipient: &AccountId,
    ) -> EngineResult<()> {
        self.require_owner(caller)?;
        if recipient.is_zero() {
            return Err(EngineError::ZeroAddress);
        }
        info!(
            "marketplace fee recipient {} -> {}",
            self.fee_recipient, recipient
        );
        self.fee_recipient = *recipient;
        Ok(())
    }

    // ========================================================================
    // Views
    // ========================================================================

    pub fn order(&self, order_id: u64) -> Option<&Order> {
        self.order_index(order_id).ok().map(|i| &self.orders[i])
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }

    pub fn orders_for_asset(&self, asset_id: u64) -> impl Iterator<Item = &Order> + '_ {
        self.orders.iter().filter(move |o| o.asset_id == asset_id)
    }

    pub fn next_order_id(&self) -> u64 {
        self.orders.len() as u64 + 1
    }

    pub fn fee_bps(&self) -> u64 {
        self.fee_bps
    }

    pub fn fee_recipient(&self) -> &AccountId {
        &self.fee_recipient
    }

    /// Account under which this marketplace escrows shares and settles fills
    pub fn escrow_account(&self) -> &AccountId {
        &self.escrow_account
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
        info!("marketplace ownership handover to {} pending", new_owner);
        Ok(())
    }

    pub fn accept_ownership(&mut self, caller: &AccountId) -> EngineResult<()> {
        match self.pending_owner {
            Some(pending) if pending == *caller => {
                self.owner = pending;
                self.pending_owner = None;
                info!("marketplace owner is now {}", caller);
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
        info!("marketplace ownership handover cancelled");
        Ok(())
    }

    // ========================================================================
    // Snapshot export / restore
    // ========================================================================

    pub fn export_state(&self) -> SavedMarketplace {
        SavedMarketplace {
            owner: self.owner,
            pending_owner: self.pending_owner,
            escrow_account: self.escrow_account,
            fee_bps: self.fee_bps,
            fee_recipient: self.fee_recipient,
            orders: self
                .orders
                .iter()
                .map(|o| SavedOrder {
                    id: o.id,
                    asset_id: o.asset_id,
                    seller: o.seller,
                    amount_listed: o.amount_listed,
                    amount_remaining: o.amount_remaining,
                    price_per_share: o.price_per_share,
                    active: o.active,
                    created_at_ms: o.created_at_ms,
                })
                .collect(),
        }
    }

    pub fn from_saved(saved: SavedMarketplace) -> anyhow::Result<Self> {
        use anyhow::bail;

        if saved.owner.is_zero() || saved.fee_recipient.is_zero() {
            bail!("marketplace principal is the zero account");
        }
        if saved.fee_bps > MAX_FEE_BPS {
            bail!("fee {} bps exceeds the {} bps cap", saved.fee_bps, MAX_FEE_BPS);
        }
        let mut orders = Vec::with_capacity(saved.orders.len());
        for (position, o) in saved.orders.into_iter().enumerate() {
            if o.id != position as u64 + 1 {
                bail!("order {} out of sequence at position {}", o.id, position);
            }
            if o.amount_listed == 0 || o.price_per_share == 0 {
                bail!("order {} has a zero amount or price", o.id);
            }
            if o.amount_remaining > o.amount_listed {
                bail!("order {} remaining exceeds listed", o.id);
            }
            if o.active && o.amount_remaining == 0 {
                bail!("order {} active with nothing remaining", o.id);
            }
            if o.seller.is_zero() {
                bail!("order {} has a zero seller", o.id);
            }
            orders.push(Order {
                id: o.id,
                asset_id: o.asset_id,
                seller: o.seller,
                amount_listed: o.amount_listed,
                amount_remaining: o.amount_remaining,
                price_per_share: o.price_per_share,
                active: o.active,
                created_at_ms: o.created_at_ms,
            });
        }
        Ok(Self {
            owner: saved.owner,
            pending_owner: saved.pending_owner,
            escrow_account: saved.escrow_account,
            fee_bps: saved.fee_bps,
            fee_recipient: saved.fee_recipient,
            orders,
        })
    }
}
