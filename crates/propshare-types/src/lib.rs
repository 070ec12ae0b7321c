//! Shared vocabulary for the propshare engine
//!
//! Defines the account identifier used by every component, the numeric
//! constants for rent and fee arithmetic, and the `SettlementAsset` trait
//! through which the engine moves stablecoin-denominated value. Engine
//! arithmetic is pure integer math; `format_units` exists only so log lines
//! can show human-readable settlement amounts.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Fixed-point scale for the rent-per-share accumulator
pub const SCALE: u128 = 1_000_000_000_000_000_000;

/// Denominator for basis-point fee math
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Smallest-unit precision of the settlement asset (stablecoin convention)
pub const SETTLEMENT_DECIMALS: u32 = 6;

// ============================================================================
// AccountId
// ============================================================================

/// A 20-byte principal identifier (holder, issuer, or component account)
///
/// Displayed and parsed as `0x`-prefixed lowercase hex. Component accounts
/// (ledger rent pools, marketplace escrow) are derived deterministically
/// from labels via [`AccountId::from_label`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId([u8; 20]);

impl AccountId {
    /// The all-zero account, rejected as a destination everywhere
    pub const ZERO: AccountId = AccountId([0u8; 20]);

    /// Derive a deterministic account id from a human-readable label
    pub fn from_label(label: &str) -> Self {
        let digest = Sha256::digest(label.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[..20]);
        AccountId(bytes)
    }

    /// Raw bytes of the identifier
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Whether this is the zero account
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self)
    }
}

/// Failure to parse an account id from its hex form
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseAccountIdError {
    #[error("account id must be 40 hex chars, got {0}")]
    InvalidLength(usize),
    #[error("account id contains non-hex characters")]
    InvalidHex,
}

impl FromStr for AccountId {
    type Err = ParseAccountIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.len() != 40 {
            return Err(ParseAccountIdError::InvalidLength(digits.len()));
        }
        let decoded = hex::decode(digits).map_err(|_| ParseAccountIdError::InvalidHex)?;
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&decoded);
        Ok(AccountId(bytes))
    }
}

impl TryFrom<String> for AccountId {
    type Error = ParseAccountIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> String {
        id.to_string()
    }
}

// ============================================================================
// Settlement asset trait
// ============================================================================

/// The stable settlement token the engine moves value in
///
/// ERC-20-shaped: mutating calls report success as `bool`, and the engine
/// treats `false` as an external failure. `transfer_from` is the pull path:
/// `spender` moves previously approved funds out of `owner`'s balance.
/// Implementations must be atomic per call: a `false` return means nothing
/// moved.
pub trait SettlementAsset {
    /// Smallest-unit precision of amounts
    fn decimals(&self) -> u32 {
        SETTLEMENT_DECIMALS
    }

    fn balance_of(&self, account: &AccountId) -> u64;

    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> u64;

    /// Set `spender`'s allowance over `owner`'s balance
    fn approve(&mut self, owner: &AccountId, spender: &AccountId, amount: u64) -> bool;

    /// Move `amount` from `from` to `to`
    fn transfer(&mut self, from: &AccountId, to: &AccountId, amount: u64) -> bool;

    /// Pull `amount` from `owner` to `to`, spending `spender`'s allowance
    fn transfer_from(
        &mut self,
        spender: &AccountId,
        owner: &AccountId,
        to: &AccountId,
        amount: u64,
    ) -> bool;
}

/// Render a smallest-unit amount at the given decimal precision for display
pub fn format_units(amount: u64, decimals: u32) -> String {
    if decimals > 28 {
        return amount.to_string();
    }
    rust_decimal::Decimal::from_i128_with_scale(amount as i128, decimals)
        .normalize()
        .to_string()
}
