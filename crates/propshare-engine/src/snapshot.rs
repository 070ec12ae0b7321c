//! Engine state persistence for graceful shutdown and restart
//!
//! The host captures the full engine state (registry with every ledger, plus
//! the marketplace) into a versioned JSON snapshot and restores it on
//! startup. Restore validates every ledger and marketplace invariant and
//! cross-checks escrowed shares against open orders, so a tampered or
//! corrupt snapshot is rejected rather than loaded into a broken engine.
//!
//! u128 accumulator values are serialized as strings; JSON numbers cannot
//! carry them.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{error, info, warn};

use propshare_types::AccountId;

use crate::marketplace::EscrowMarketplace;
use crate::registry::AssetRegistry;

/// Current snapshot file format version
const SNAPSHOT_VERSION: u32 = 1;

/// Complete saved state of the engine
#[derive(Serialize, Deserialize)]
pub struct SavedEngine {
    /// Format version for future migration
    pub version: u32,
    /// ISO 8601 timestamp when the snapshot was taken
    pub saved_at: String,
    pub registry: SavedRegistry,
    pub marketplace: SavedMarketplace,
}

/// Serializable mirror of `AssetRegistry` from registry.rs
#[derive(Clone, Serialize, Deserialize)]
pub struct SavedRegistry {
    pub owner: AccountId,
    pub pending_owner: Option<AccountId>,
    /// Ledgers in provisioning order
    pub ledgers: Vec<SavedLedger>,
}

/// Serializable mirror of `AssetLedger` from ledger.rs
#[derive(Clone, Serialize, Deserialize)]
pub struct SavedLedger {
    pub asset_id: u64,
    pub name: String,
    pub symbol: String,
    pub metadata_base: String,
    pub ledger_account: AccountId,
    pub issuer: AccountId,
    pub pending_issuer: Option<AccountId>,
    pub total_supply: u64,
    pub minted: u64,
    pub price_per_share: u64,
    pub active: bool,
    pub funded: bool,
    pub balances: Vec<SavedHolding>,
    pub operators: Vec<SavedOperator>,
    /// u128 fixed-point accumulator as a decimal string
    pub cumulative_per_share: String,
    pub holder_indices: Vec<SavedHolderIndex>,
    /// Realized rent entitlements in settlement units
    pub accrued: Vec<SavedHolding>,
    pub total_rent_deposited: u64,
}

/// One account's share balance or realized rent entitlement
#[derive(Clone, Serialize, Deserialize)]
pub struct SavedHolding {
    pub account: AccountId,
    pub amount: u64,
}

/// One operator approval edge
#[derive(Clone, Serialize, Deserialize)]
pub struct SavedOperator {
    pub holder: AccountId,
    pub operator: AccountId,
}

/// One holder's last-settled accumulator value, as a decimal string
#[derive(Clone, Serialize, Deserialize)]
pub struct SavedHolderIndex {
    pub account: AccountId,
    pub index: String,
}

/// Serializable mirror of `EscrowMarketplace` from marketplace.rs
#[derive(Clone, Serialize, Deserialize)]
pub struct SavedMarketplace {
    pub owner: AccountId,
    pub pending_owner: Option<AccountId>,
    pub escrow_account: AccountId,
    pub fee_bps: u64,
    pub fee_recipient: AccountId,
    /// Orders in creation order; ids are sequential from 1
    pub orders: Vec<SavedOrder>,
}

/// Serializable mirror of `Order` from marketplace.rs
#[derive(Clone, Serialize, Deserialize)]
pub struct SavedOrder {
    pub id: u64,
    pub asset_id: u64,
    pub seller: AccountId,
    pub amount_listed: u64,
    pub amount_remaining: u64,
    pub price_per_share: u64,
    pub active: bool,
    pub created_at_ms: i64,
}

impl SavedEngine {
    /// Capture the current engine state with the current timestamp
    pub fn capture(registry: &AssetRegistry, marketplace: &EscrowMarketplace) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: chrono::Utc::now().to_rfc3339(),
            registry: registry.export_state(),
            marketplace: marketplace.export_state(),
        }
    }

    /// Rebuild both components, validating their invariants and the
    /// cross-component one: escrow custody per asset covers the remaining
    /// amounts of that asset's active orders
    pub fn restore(self) -> Result<(AssetRegistry, EscrowMarketplace)> {
        use anyhow::{bail, Context};

        let registry = AssetRegistry::from_saved(self.registry)?;
        let marketplace = EscrowMarketplace::from_saved(self.marketplace)?;

        let mut open: HashMap<u64, u64> = HashMap::new();
        for order in marketplace.orders() {
            if !registry.exists(order.asset_id) {
                bail!(
                    "order {} references unknown asset {}",
                    order.id,
                    order.asset_id
                );
            }
            if order.active {
                let entry = open.entry(order.asset_id).or_insert(0);
                *entry = entry
                    .checked_add(order.amount_remaining)
                    .context("open order total overflow")?;
            }
        }
        for ledger in registry.ledgers() {
            let escrowed = ledger.balance_of(marketplace.escrow_account());
            let needed = open.get(&ledger.asset_id()).copied().unwrap_or(0);
            if escrowed < needed {
                bail!(
                    "asset {}: escrow holds {} shares but open orders need {}",
                    ledger.asset_id(),
                    escrowed,
                    needed
                );
            }
        }
        Ok((registry, marketplace))
    }
}

/// Save a snapshot to a JSON file atomically (write to .tmp, then rename)
pub fn save_snapshot(path: &Path, snapshot: &SavedEngine) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &json)?;
    std::fs::rename(&tmp_path, path)?;
    info!("Snapshot saved to {}", path.display());
    Ok(())
}

/// Save a timestamped backup copy of the snapshot into a `backups/` subfolder.
/// Never panics; logs errors and returns silently on failure.
pub fn save_backup(path: &Path, snapshot: &SavedEngine) {
    let backup_dir = match path.parent() {
        Some(parent) => parent.join("backups"),
        None => {
            error!(
                "Cannot determine parent directory for backup: {}",
                path.display()
            );
            return;
        }
    };

    if let Err(e) = std::fs::create_dir_all(&backup_dir) {
        error!(
            "Failed to create backup directory {}: {}",
            backup_dir.display(),
            e
        );
        return;
    }

    // Use ISO8601 timestamp with colons replaced by dashes for filesystem safety
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let backup_path = backup_dir.join(format!("engine-state-{}.json", timestamp));

    let json = match serde_json::to_string_pretty(snapshot) {
        Ok(j) => j,
        Err(e) => {
            error!("Failed to serialize snapshot for backup: {}", e);
            return;
        }
    };

    if let Err(e) = std::fs::write(&backup_path, &json) {
        error!("Failed to write backup file {}: {}", backup_path.display(), e);
        return;
    }

    info!("Snapshot backup saved to {}", backup_path.display());
}

/// Load a snapshot from a JSON file. Returns None if the file doesn't exist,
/// is corrupt, or carries an incompatible version.
pub fn load_snapshot(path: &Path) -> Option<SavedEngine> {
    if !path.exists() {
        return None;
    }

    let data = match std::fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) => {
            warn!("Failed to read snapshot file {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str::<SavedEngine>(&data) {
        Ok(snapshot) => {
            if snapshot.version != SNAPSHOT_VERSION {
                warn!(
                    "Snapshot file version {} != expected {}, ignoring",
                    snapshot.version, SNAPSHOT_VERSION
                );
                return None;
            }
            info!(
                "Loaded snapshot from {} (saved at {}, {} assets, {} orders)",
                path.display(),
                snapshot.saved_at,
                snapshot.registry.ledgers.len(),
                snapshot.marketplace.orders.len(),
            );
            Some(snapshot)
        }
        Err(e) => {
            warn!("Failed to parse snapshot file {}: {}", path.display(), e);
            None
        }
    }
}

/// Delete the snapshot file after a successful restore
pub fn delete_snapshot(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to delete snapshot file {}: {}", path.display(), e);
        } else {
            info!("Deleted snapshot file {}", path.display());
        }
    }
}
