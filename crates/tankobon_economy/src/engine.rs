//! # The Engine Facade
//!
//! **THE BANK** - No rubies move without going through here.
//!
//! `EconomyEngine` is the single point of contact for the surrounding
//! platform: page code debits and credits through the six public
//! operations, admin tooling replaces drop-rate tables, and the
//! notification layer drains the event buffer.
//!
//! ## The Golden Path: Pack Opening
//!
//! ```text
//! Page handler ──> open_pack() ──> Economy Engine
//!                                       │
//!              ┌────────────────────────┼────────────────────────┐
//!              │                        │                        │
//!              ▼                        ▼                        ▼
//!       Roll rarities            Append ledger            Mint instances
//!       (seeded RNG)             (crash-safe)             + debit rubies
//!              │                        │                        │
//!              └────────────────────────┼────────────────────────┘
//!                                       ▼
//!                              Return PackResult
//! ```
//!
//! ## Thread Safety
//!
//! `EconomyEngine` is `Send + Sync` and shared across request handlers.
//! Every operation is one bounded, synchronous unit of work; races on the
//! same listing, instance, or account resolve to exactly one winner inside
//! the store's exclusive guard. Lock order where a unit needs several:
//! catalog → rng → store.

use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};
use rand::RngCore;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;

use crate::catalog::{ItemTemplate, TemplateCatalog};
use crate::config::EconomyConfig;
use crate::error::{EconomyError, EconomyResult};
use crate::ledger::LedgerEntry;
use crate::market::{self, PurchaseResult};
use crate::packs::{self, PackDefinition, PackResult};
use crate::rarity::Rarity;
use crate::rates::RateStore;
use crate::store::{AccountId, InstanceId, Listing, ListingId, OwnedInstance, Store};

/// A notable engine occurrence, drained by the notification/UI layer.
#[derive(Clone, Debug, PartialEq)]
pub enum EconomyEvent {
    /// A pack was opened.
    PackOpened {
        /// The opening account.
        account: AccountId,
        /// The pack type.
        pack_type: String,
        /// Rarities drawn, in draw order.
        rarities: Vec<Rarity>,
        /// Whether the notable threshold was reached (celebration cue).
        notable: bool,
    },
    /// A drop-rate table was replaced.
    RatesReplaced {
        /// The pack type.
        pack_type: String,
        /// New table version.
        version: u32,
    },
    /// A listing went live.
    ListingCreated {
        /// The listing.
        listing_id: ListingId,
        /// The instance on offer.
        instance_id: InstanceId,
        /// The selling account.
        seller: AccountId,
        /// Asking price in rubies.
        price: u64,
    },
    /// A listing was withdrawn by its seller.
    ListingCancelled {
        /// The listing.
        listing_id: ListingId,
    },
    /// A listing was bought.
    ListingSold {
        /// The listing.
        listing_id: ListingId,
        /// The instance that changed hands.
        instance_id: InstanceId,
        /// The selling account.
        seller: AccountId,
        /// The buying account.
        buyer: AccountId,
        /// Price paid in rubies.
        price: u64,
    },
}

/// The economy engine: gacha packs, rubies, and the card marketplace.
pub struct EconomyEngine {
    rates: RateStore,
    catalog: RwLock<TemplateCatalog>,
    packs: RwLock<HashMap<String, PackDefinition>>,
    notable_threshold: Rarity,
    store: Store,
    /// The injected random source. Never ambient: the platform seeds it,
    /// tests replace it.
    rng: Mutex<Box<dyn RngCore + Send>>,
    events: Mutex<Vec<EconomyEvent>>,
}

impl EconomyEngine {
    /// Creates an engine seeded with a 32-byte secret.
    ///
    /// The platform supplies the seed from its secret store; the engine
    /// itself never reaches for ambient entropy.
    ///
    /// # Errors
    ///
    /// Returns configuration errors from an invalid document.
    pub fn new(config: EconomyConfig, store: Store, seed: [u8; 32]) -> EconomyResult<Self> {
        Self::with_rng(config, store, ChaCha12Rng::from_seed(seed))
    }

    /// Creates an engine with an explicit random source (tests inject a
    /// seeded or scripted generator here).
    ///
    /// # Errors
    ///
    /// Returns configuration errors from an invalid document.
    pub fn with_rng(
        config: EconomyConfig,
        store: Store,
        rng: impl RngCore + Send + 'static,
    ) -> EconomyResult<Self> {
        config.validate()?;

        let rates = RateStore::new();
        for (pack_type, weights) in &config.rates {
            rates.set(pack_type, weights)?;
        }

        let mut catalog = TemplateCatalog::new();
        for template in config.templates {
            catalog.register(template)?;
        }

        Ok(Self {
            rates,
            catalog: RwLock::new(catalog),
            packs: RwLock::new(config.packs),
            notable_threshold: config.notable_threshold,
            store,
            rng: Mutex::new(Box::new(rng)),
            events: Mutex::new(Vec::new()),
        })
    }

    // ========================================================================
    // Drop-rate administration
    // ========================================================================

    /// Returns the drop-rate mapping for a pack type (standard table for
    /// unknown types; the fallback is logged).
    #[must_use]
    pub fn get_drop_rates(&self, pack_type: &str) -> HashMap<Rarity, f64> {
        self.rates.get(pack_type).to_percent_map()
    }

    /// Replaces the drop-rate table for a pack type. Administrative only.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRates` / `InvalidConfig` on rejection; the previous
    /// table stays authoritative.
    pub fn set_drop_rates(
        &self,
        pack_type: &str,
        weights: &HashMap<Rarity, f64>,
    ) -> EconomyResult<()> {
        let version = self.rates.set(pack_type, weights)?;
        tracing::info!(pack_type, version, "drop-rate table replaced");
        self.events.lock().push(EconomyEvent::RatesReplaced {
            pack_type: pack_type.to_string(),
            version,
        });
        Ok(())
    }

    // ========================================================================
    // Pack opening
    // ========================================================================

    /// Opens one pack for `account`.
    ///
    /// # Errors
    ///
    /// - `UnknownPackType` if the pack has no configured cost/count.
    /// - `InsufficientFunds` if the balance is below the pack cost.
    /// - `NoTemplatesForRarity` if a rolled rarity has no templates
    ///   (operator error; the whole unit aborts).
    pub fn open_pack(&self, account: AccountId, pack_type: &str) -> EconomyResult<PackResult> {
        let Some(def) = self.packs.read().get(pack_type).cloned() else {
            tracing::error!(pack_type, "open_pack on unconfigured pack type");
            return Err(EconomyError::UnknownPackType(pack_type.to_string()));
        };
        let table = self.rates.get(pack_type);

        let result = {
            let catalog = self.catalog.read();
            let ctx = packs::PackContext {
                catalog: &catalog,
                table: &table,
                def: &def,
                notable_threshold: self.notable_threshold,
                pack_type,
            };
            let mut rng = self.rng.lock();
            let rng: &mut dyn RngCore = &mut **rng;
            self.store
                .unit(|inner| packs::open_pack(inner, &ctx, account, rng))
        };

        match result {
            Ok(result) => {
                tracing::debug!(
                    account,
                    pack_type,
                    notable = result.contains_rare_or_better,
                    "pack opened"
                );
                self.events.lock().push(EconomyEvent::PackOpened {
                    account,
                    pack_type: pack_type.to_string(),
                    rarities: result.rarities.clone(),
                    notable: result.contains_rare_or_better,
                });
                Ok(result)
            }
            Err(err) => {
                if let EconomyError::NoTemplatesForRarity { rarity } = &err {
                    tracing::error!(
                        pack_type,
                        ?rarity,
                        "pack opening aborted: rarity has no templates"
                    );
                }
                Err(err)
            }
        }
    }

    // ========================================================================
    // Marketplace
    // ========================================================================

    /// Creates a listing for an owned, unlocked instance.
    ///
    /// # Errors
    ///
    /// `InstanceNotFound`, `InstanceLocked`, or `AlreadyListed`.
    pub fn create_listing(
        &self,
        seller: AccountId,
        instance_id: InstanceId,
        price: u64,
    ) -> EconomyResult<Listing> {
        let listing = self
            .store
            .unit(|inner| market::create_listing(inner, seller, instance_id, price))?;
        tracing::debug!(seller, instance_id, price, listing_id = listing.id, "listing created");
        self.events.lock().push(EconomyEvent::ListingCreated {
            listing_id: listing.id,
            instance_id,
            seller,
            price,
        });
        Ok(listing)
    }

    /// Cancels an ACTIVE listing. Only the seller may cancel.
    ///
    /// # Errors
    ///
    /// `ListingNotFound`, `NotOwner`, or `ListingNotActive`.
    pub fn cancel_listing(&self, seller: AccountId, listing_id: ListingId) -> EconomyResult<()> {
        self.store
            .unit(|inner| market::cancel_listing(inner, seller, listing_id))?;
        tracing::debug!(seller, listing_id, "listing cancelled");
        self.events
            .lock()
            .push(EconomyEvent::ListingCancelled { listing_id });
        Ok(())
    }

    /// Buys an ACTIVE listing: ownership and rubies move atomically.
    ///
    /// # Errors
    ///
    /// `ListingNotActive` (sold, cancelled, or never existed),
    /// `SelfPurchase`, or `InsufficientFunds`.
    pub fn purchase_listing(
        &self,
        buyer: AccountId,
        listing_id: ListingId,
    ) -> EconomyResult<PurchaseResult> {
        let result = self
            .store
            .unit(|inner| market::purchase_listing(inner, buyer, listing_id))?;
        tracing::debug!(
            buyer,
            listing_id,
            price = result.price,
            instance_id = result.instance.id,
            "listing purchased"
        );
        self.events.lock().push(EconomyEvent::ListingSold {
            listing_id,
            instance_id: result.instance.id,
            seller: result.seller,
            buyer,
            price: result.price,
        });
        Ok(result)
    }

    // ========================================================================
    // Platform seams
    // ========================================================================

    /// Seeds (or resets) an account balance. Accounts are owned by the
    /// platform; the engine only moves rubies between them.
    pub fn register_account(&self, account: AccountId, balance: u64) {
        self.store.register_account(account, balance);
    }

    /// Registers an item template authored by admin tooling.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for duplicate template IDs.
    pub fn register_template(&self, template: ItemTemplate) -> EconomyResult<()> {
        self.catalog.write().register(template)
    }

    /// Sets the lock flag on an instance.
    ///
    /// # Errors
    ///
    /// Returns `InstanceNotFound` for unknown instances.
    pub fn set_instance_locked(&self, instance: InstanceId, locked: bool) -> EconomyResult<()> {
        self.store.set_instance_locked(instance, locked)
    }

    // ========================================================================
    // Read API
    // ========================================================================

    /// Balance of an account, if it exists.
    #[must_use]
    pub fn balance(&self, account: AccountId) -> Option<u64> {
        self.store.balance(account)
    }

    /// Looks up an owned instance.
    #[must_use]
    pub fn instance(&self, id: InstanceId) -> Option<OwnedInstance> {
        self.store.instance(id)
    }

    /// All instances owned by an account.
    #[must_use]
    pub fn instances_of(&self, account: AccountId) -> Vec<OwnedInstance> {
        self.store.instances_of(account)
    }

    /// Looks up a listing.
    #[must_use]
    pub fn listing(&self, id: ListingId) -> Option<Listing> {
        self.store.listing(id)
    }

    /// All ACTIVE listings - the marketplace browse view.
    #[must_use]
    pub fn active_listings(&self) -> Vec<Listing> {
        self.store.active_listings()
    }

    /// All ledger entries touching an account, oldest first.
    #[must_use]
    pub fn ledger_entries(&self, account: AccountId) -> Vec<LedgerEntry> {
        self.store.ledger_entries(account)
    }

    /// Drains all pending events for the notification/UI layer.
    pub fn drain_events(&self) -> Vec<EconomyEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

#[cfg(test)]
mod tests {
    use crate::rates::RATE_SCALE_BP;

    use super::*;

    fn seeded_engine() -> EconomyEngine {
        let mut config = EconomyConfig::standard();
        for (i, rarity) in Rarity::ASCENDING.iter().enumerate() {
            config.templates.push(ItemTemplate {
                id: (i as u32) + 1,
                name: format!("{rarity:?} card"),
                rarity: *rarity,
                collection: "vol-1".to_string(),
            });
        }
        let engine = EconomyEngine::new(config, Store::ephemeral(), [9u8; 32]).unwrap();
        engine.register_account(1, 5000);
        engine.register_account(2, 5000);
        engine
    }

    #[test]
    fn test_open_pack_through_facade() {
        let engine = seeded_engine();
        let result = engine.open_pack(1, "standard").unwrap();

        assert_eq!(result.instances.len(), 5);
        assert_eq!(engine.balance(1), Some(4500));
        assert_eq!(engine.instances_of(1).len(), 5);
        assert_eq!(engine.ledger_entries(1).len(), 1);

        let events = engine.drain_events();
        assert!(matches!(
            events.as_slice(),
            [EconomyEvent::PackOpened { account: 1, .. }]
        ));
        assert!(engine.drain_events().is_empty());
    }

    #[test]
    fn test_unknown_pack_type_is_configuration_error() {
        let engine = seeded_engine();
        assert_eq!(
            engine.open_pack(1, "mythic-box").unwrap_err(),
            EconomyError::UnknownPackType("mythic-box".to_string())
        );
        assert_eq!(engine.balance(1), Some(5000));
    }

    #[test]
    fn test_rates_round_trip_and_fallback() {
        let engine = seeded_engine();

        // Configured table.
        let rates = engine.get_drop_rates("standard");
        let total: f64 = rates.values().sum();
        assert!((total - 100.0).abs() < 0.001);

        // Admin replace.
        let new_rates: HashMap<Rarity, f64> =
            [(Rarity::Common, 90.0), (Rarity::Ur, 10.0)].into_iter().collect();
        engine.set_drop_rates("standard", &new_rates).unwrap();
        assert_eq!(engine.get_drop_rates("standard")[&Rarity::Ur], 10.0);

        // Rejected replace leaves the table.
        let bad: HashMap<Rarity, f64> = [(Rarity::Common, 50.0)].into_iter().collect();
        assert!(engine.set_drop_rates("standard", &bad).is_err());
        assert_eq!(engine.get_drop_rates("standard")[&Rarity::Ur], 10.0);

        // Unknown pack types serve the standard table.
        let fallback = engine.get_drop_rates("never-configured");
        assert_eq!(fallback[&Rarity::Common], 60.0);
    }

    #[test]
    fn test_full_marketplace_flow_through_facade() {
        let engine = seeded_engine();
        let pack = engine.open_pack(1, "standard").unwrap();
        let instance_id = pack.instances[0].id;

        let listing = engine.create_listing(1, instance_id, 700).unwrap();
        let result = engine.purchase_listing(2, listing.id).unwrap();

        assert_eq!(result.instance.owner, 2);
        assert_eq!(engine.balance(2), Some(4300));
        assert_eq!(engine.balance(1), Some(5200)); // 5000 - 500 pack + 700 sale

        let events = engine.drain_events();
        assert_eq!(events.len(), 3); // PackOpened, ListingCreated, ListingSold
        assert!(matches!(events[2], EconomyEvent::ListingSold { buyer: 2, .. }));
    }

    #[test]
    fn test_deterministic_with_same_seed() {
        let run = |seed: [u8; 32]| {
            let mut config = EconomyConfig::standard();
            for (i, rarity) in Rarity::ASCENDING.iter().enumerate() {
                config.templates.push(ItemTemplate {
                    id: (i as u32) + 1,
                    name: format!("{rarity:?}"),
                    rarity: *rarity,
                    collection: "vol-1".to_string(),
                });
            }
            let engine = EconomyEngine::new(config, Store::ephemeral(), seed).unwrap();
            engine.register_account(1, 100_000);
            (0..10)
                .flat_map(|_| engine.open_pack(1, "standard").unwrap().rarities)
                .collect::<Vec<_>>()
        };

        assert_eq!(run([3u8; 32]), run([3u8; 32]));
        assert_ne!(run([3u8; 32]), run([4u8; 32]));
    }

    #[test]
    fn test_notable_threshold_from_config() {
        let mut config = EconomyConfig::standard();
        config.notable_threshold = Rarity::Rare;
        config.rates.insert(
            "standard".to_string(),
            crate::rates::RateTable::from_bp(0, [0, RATE_SCALE_BP, 0, 0, 0]).to_percent_map(),
        );
        config.templates.push(ItemTemplate {
            id: 1,
            name: "Rare card".to_string(),
            rarity: Rarity::Rare,
            collection: "vol-1".to_string(),
        });

        let engine = EconomyEngine::new(config, Store::ephemeral(), [0u8; 32]).unwrap();
        engine.register_account(1, 1000);
        let result = engine.open_pack(1, "standard").unwrap();
        assert!(result.contains_rare_or_better);
    }
}
