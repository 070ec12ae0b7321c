//! Propshare Engine - Tokenized real-estate share accounting
//!
//! The core accounting engine behind the platform: per-asset share ledgers
//! with custodial issuance, cumulative-index rent distribution, and an
//! escrowed secondary marketplace, all settling against a pluggable
//! stablecoin-style token (`SettlementAsset` trait in propshare-types).
//!
//! Key components:
//! - `AssetRegistry` provisioning one `AssetLedger` per asset id
//! - `AssetLedger` with the offering state machine and rent accumulator
//! - `EscrowMarketplace` with flat id-addressed orders and bps trading fees
//! - Versioned JSON state snapshots for shutdown/restart
//!
//! Every mutating operation takes the authenticated caller as an explicit
//! argument and is atomic: a failed sub-step leaves no partial state.

pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod marketplace;
pub mod registry;
pub mod snapshot;
