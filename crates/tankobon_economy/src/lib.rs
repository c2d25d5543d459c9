//! # Tankobon Economy Engine
//!
//! Pure Rust economic logic for the Tankobon content platform: gacha pack
//! opening against validated drop-rate tables, and the peer-to-peer card
//! marketplace that moves rubies and ownership atomically.
//!
//! ## Design Principles
//!
//! 1. **Integer currency** - Balances are whole rubies (`u64`); ledger
//!    deltas are signed integers. No floating point touches a balance.
//! 2. **Injected randomness** - The rarity roller consumes a caller-owned
//!    `rand` source, so every draw is reproducible under a seed.
//! 3. **Atomic units of work** - Pack opening and purchases commit all of
//!    their rows or none of them; a lost race has zero side effects.
//! 4. **External configuration** - All balance data in TOML files.
//!
//! ## Thread Safety
//!
//! The engine is called from many concurrent request handlers. All shared
//! state lives behind the store's guard; see [`engine::EconomyEngine`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use tankobon_economy::{EconomyConfig, EconomyEngine, Store};
//!
//! let config = EconomyConfig::from_path("data/economy.toml")?;
//! let store = Store::open("data/economy.ledger")?;
//! let engine = EconomyEngine::new(config, store, platform_seed)?;
//!
//! let result = engine.open_pack(account_id, "standard")?;
//! if result.contains_rare_or_better {
//!     notifications.celebrate(account_id, &result);
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod market;
pub mod packs;
pub mod rarity;
pub mod rates;
pub mod roller;
pub mod store;

pub use catalog::{ItemTemplate, TemplateCatalog, TemplateId};
pub use config::EconomyConfig;
pub use engine::{EconomyEngine, EconomyEvent};
pub use error::{EconomyError, EconomyResult};
pub use ledger::{EntryKind, Ledger, LedgerEntry};
pub use market::PurchaseResult;
pub use packs::{PackDefinition, PackResult};
pub use rarity::Rarity;
pub use rates::{RateStore, RateTable};
pub use roller::{roll_many, roll_rarity};
pub use store::{
    AccountId, InstanceId, Listing, ListingId, ListingStatus, OwnedInstance, Store,
};
