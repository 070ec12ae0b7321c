//! In-memory settlement asset
//!
//! A reference implementation of the `SettlementAsset` trait with standard
//! stablecoin semantics: 6-decimal integer balances, explicit allowances for
//! pulls, and `false` (never a panic, never a partial move) on any shortfall.
//! Used by engine tests and host simulations in place of a real token.

use std::collections::HashMap;
use tracing::debug;

use propshare_types::{AccountId, SettlementAsset, SETTLEMENT_DECIMALS};

/// In-memory fungible token with ERC-20-shaped semantics
pub struct InMemoryToken {
    name: String,
    decimals: u32,
    total_supply: u64,
    balances: HashMap<AccountId, u64>,
    /// (owner, spender) → remaining allowance
    allowances: HashMap<(AccountId, AccountId), u64>,
}

impl InMemoryToken {
    /// Create an empty token with stablecoin precision
    pub fn new(name: &str) -> Self {
        Self::with_decimals(name, SETTLEMENT_DECIMALS)
    }

    /// Create an empty token with explicit precision
    pub fn with_decimals(name: &str, decimals: u32) -> Self {
        Self {
            name: name.to_string(),
            decimals,
            total_supply: 0,
            balances: HashMap::new(),
            allowances: HashMap::new(),
        }
    }

    /// Issue new units to an account (test/simulation faucet)
    ///
    /// Returns false on a zero destination or supply overflow.
    pub fn mint(&mut self, to: &AccountId, amount: u64) -> bool {
        if to.is_zero() {
            return false;
        }
        let balance = self.balances.get(to).copied().unwrap_or(0);
        let (Some(new_balance), Some(new_supply)) = (
            balance.checked_add(amount),
            self.total_supply.checked_add(amount),
        ) else {
            return false;
        };
        self.balances.insert(*to, new_balance);
        self.total_supply = new_supply;
        debug!("{}: minted {} to {}", self.name, amount, to);
        true
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    /// Internal move shared by `transfer` and `transfer_from`
    fn move_units(&mut self, from: &AccountId, to: &AccountId, amount: u64) -> bool {
        if to.is_zero() {
            return false;
        }
        let from_balance = self.balances.get(from).copied().unwrap_or(0);
        if from_balance < amount {
            return false;
        }
        if from == to {
            return true;
        }
        let to_balance = self.balances.get(to).copied().unwrap_or(0);
        let Some(new_to_balance) = to_balance.checked_add(amount) else {
            return false;
        };
        if from_balance == amount {
            self.balances.remove(from);
        } else {
            self.balances.insert(*from, from_balance - amount);
        }
        self.balances.insert(*to, new_to_balance);
        debug!("{}: {} -> {} amount {}", self.name, from, to, amount);
        true
    }
}

impl SettlementAsset for InMemoryToken {
    fn decimals(&self) -> u32 {
        self.decimals
    }

    fn balance_of(&self, account: &AccountId) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> u64 {
        self.allowances.get(&(*owner, *spender)).copied().unwrap_or(0)
    }

    fn approve(&mut self, owner: &AccountId, spender: &AccountId, amount: u64) -> bool {
        if owner.is_zero() || spender.is_zero() {
            return false;
        }
        if amount == 0 {
            self.allowances.remove(&(*owner, *spender));
        } else {
            self.allowances.insert((*owner, *spender), amount);
        }
        true
    }

    fn transfer(&mut self, from: &AccountId, to: &AccountId, amount: u64) -> bool {
        self.move_units(from, to, amount)
    }

    fn transfer_from(
        &mut self,
        spender: &AccountId,
        owner: &AccountId,
        to: &AccountId,
        amount: u64,
    ) -> bool {
        let allowed = self.allowance(owner, spender);
        if allowed < amount {
            return false;
        }
        if !self.move_units(owner, to, amount) {
            return false;
        }
        // Decrement only after the move succeeded
        if allowed - amount == 0 {
            self.allowances.remove(&(*owner, *spender));
        } else {
            self.allowances.insert((*owner, *spender), allowed - amount);
        }
        true
    }
}
