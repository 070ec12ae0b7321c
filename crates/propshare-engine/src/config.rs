//! Engine configuration
//!
//! Assembled from two sources:
//! 1. `engine.toml`: fee policy, escrow label, snapshot path, asset catalog
//! 2. env vars: principal accounts (`PROPSHARE_ISSUER`,
//!    `PROPSHARE_FEE_RECIPIENT`)
//!
//! Principals accept either a 0x-prefixed 40-hex-digit account or a label
//! string that is hashed into an account.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

use propshare_types::AccountId;

use crate::marketplace::{EscrowMarketplace, MAX_FEE_BPS};
use crate::registry::AssetRegistry;

// ============================================================================
// Engine TOML (engine.toml)
// ============================================================================

/// Engine-specific TOML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EngineToml {
    #[serde(default = "default_fee_bps")]
    fee_bps: u64,
    #[serde(default = "default_escrow_label")]
    escrow_label: String,
    #[serde(default = "default_snapshot_path")]
    snapshot_path: String,
    #[serde(default)]
    assets: Vec<AssetConfig>,
}

/// Configuration for a single asset to provision at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    pub asset_id: u64,
    pub name: String,
    pub symbol: String,
    pub share_cap: u64,
    pub price_per_share: u64,
    #[serde(default)]
    pub metadata_base: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// ============================================================================
// EngineConfig
// ============================================================================

/// Full engine configuration: principals from the environment, policy and
/// asset catalog from `engine.toml`
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Platform principal: registry owner, initial issuer, marketplace owner
    pub issuer: AccountId,
    pub fee_recipient: AccountId,
    pub fee_bps: u64,
    pub escrow_label: String,
    pub snapshot_path: PathBuf,
    pub assets: Vec<AssetConfig>,
}

impl EngineConfig {
    /// Load configuration from env vars + engine.toml
    pub fn load<P: AsRef<Path>>(engine_toml_path: P) -> Result<Self> {
        let toml_str = fs::read_to_string(engine_toml_path.as_ref())
            .with_context(|| format!("Failed to read {}", engine_toml_path.as_ref().display()))?;
        let engine: EngineToml = toml::from_str(&toml_str)
            .with_context(|| format!("Failed to parse {}", engine_toml_path.as_ref().display()))?;

        if engine.fee_bps > MAX_FEE_BPS {
            bail!(
                "fee_bps {} exceeds the {} bps cap",
                engine.fee_bps,
                MAX_FEE_BPS
            );
        }

        let issuer_raw = std::env::var("PROPSHARE_ISSUER")
            .map_err(|_| anyhow!("PROPSHARE_ISSUER env var is required"))?;
        let issuer = parse_account(&issuer_raw).context("Invalid PROPSHARE_ISSUER")?;

        // Fees default to the platform principal itself
        let fee_recipient = match std::env::var("PROPSHARE_FEE_RECIPIENT") {
            Ok(raw) => parse_account(&raw).context("Invalid PROPSHARE_FEE_RECIPIENT")?,
            Err(_) => issuer,
        };

        Ok(EngineConfig {
            issuer,
            fee_recipient,
            fee_bps: engine.fee_bps,
            escrow_label: engine.escrow_label,
            snapshot_path: PathBuf::from(engine.snapshot_path),
            assets: engine.assets,
        })
    }

    /// Get the list of enabled assets
    pub fn enabled_assets(&self) -> Vec<&AssetConfig> {
        self.assets.iter().filter(|a| a.enabled).collect()
    }

    /// Build a fresh registry and marketplace and provision every enabled
    /// asset from the catalog
    pub fn bootstrap(&self) -> Result<(AssetRegistry, EscrowMarketplace)> {
        let mut registry = AssetRegistry::new(self.issuer)?;
        let marketplace = EscrowMarketplace::new(
            self.issuer,
            self.fee_recipient,
            self.fee_bps,
            &self.escrow_label,
        )?;
        for asset in self.enabled_assets() {
            registry
                .provision(
                    &self.issuer,
                    asset.asset_id,
                    asset.share_cap,
                    asset.price_per_share,
                    &asset.metadata_base,
                    &asset.name,
                    &asset.symbol,
                )
                .with_context(|| format!("Failed to provision asset {}", asset.asset_id))?;
        }
        info!(
            "engine bootstrapped: {} assets, fee {} bps, fees to {}",
            registry.len(),
            self.fee_bps,
            self.fee_recipient
        );
        Ok((registry, marketplace))
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse a principal account: 0x-prefixed hex address or a label to hash
pub fn parse_account(raw: &str) -> Result<AccountId> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("account is empty");
    }
    let account = if raw.starts_with("0x") || raw.starts_with("0X") {
        AccountId::from_str(raw).map_err(|e| anyhow!("invalid account {}: {}", raw, e))?
    } else {
        AccountId::from_label(raw)
    };
    if account.is_zero() {
        bail!("the zero account cannot be a principal");
    }
    Ok(account)
}

// ============================================================================
// Defaults
// ============================================================================

fn default_fee_bps() -> u64 {
    250
}

fn default_escrow_label() -> String {
    "propshare/marketplace/escrow".to_string()
}

fn default_snapshot_path() -> String {
    "propshare-state.json".to_string()
}

fn default_enabled() -> bool {
    true
}
