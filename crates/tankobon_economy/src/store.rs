//! # System of Record
//!
//! **Balances, Owned Instances, Listings - One Atomic Unit at a Time**
//!
//! The store owns all mutable engine state behind a single `RwLock`. Every
//! public operation of the engine runs as one unit of work while holding
//! the exclusive guard, which gives the isolation the marketplace needs:
//! two units on the same listing cannot both observe ACTIVE and both commit
//! SOLD, and a balance check and its debit can never be split by a
//! concurrent writer.
//!
//! ## Unit-of-Work Discipline
//!
//! Units follow validate → ledger append → apply:
//!
//! 1. All validation is read-only; any error aborts with no side effect.
//! 2. The ledger batch is the only fallible write. If it fails, the
//!    in-memory state was never touched.
//! 3. The apply helpers (`apply_debit`, `close_listing`, ...) are
//!    infallible under the invariants the unit just validated.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::catalog::TemplateId;
use crate::error::{EconomyError, EconomyResult};
use crate::ledger::{EntryDraft, Ledger, LedgerEntry};

/// Unique identifier for a platform account.
pub type AccountId = u64;

/// Unique identifier for an owned card instance.
pub type InstanceId = u64;

/// Unique identifier for a marketplace listing.
pub type ListingId = u64;

/// A concrete card bound to exactly one account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnedInstance {
    /// Unique identifier.
    pub id: InstanceId,
    /// The template this instance was minted from.
    pub template_id: TemplateId,
    /// The owning account. Reassigned (never duplicated) on purchase.
    pub owner: AccountId,
    /// Locked instances cannot be listed or transferred.
    pub locked: bool,
    /// Unix timestamp in milliseconds when the instance was created.
    pub acquired_at_ms: u64,
}

/// Lifecycle of a marketplace listing. SOLD and CANCELLED are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListingStatus {
    /// Open for purchase.
    Active,
    /// Bought; ownership and rubies have moved.
    Sold,
    /// Withdrawn by the seller.
    Cancelled,
}

/// An offer to sell one owned instance at a fixed price.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Listing {
    /// Unique identifier.
    pub id: ListingId,
    /// The instance on offer.
    pub instance_id: InstanceId,
    /// The selling account.
    pub seller: AccountId,
    /// Asking price in rubies.
    pub price: u64,
    /// Current lifecycle state.
    pub status: ListingStatus,
    /// Unix timestamp in milliseconds when the listing was created.
    pub created_at_ms: u64,
}

/// All mutable engine state; accessed only through [`Store`] units.
pub struct StoreInner {
    accounts: HashMap<AccountId, u64>,
    instances: HashMap<InstanceId, OwnedInstance>,
    listings: HashMap<ListingId, Listing>,
    /// Uniqueness index: at most one ACTIVE listing per instance.
    active_by_instance: HashMap<InstanceId, ListingId>,
    ledger: Ledger,
    next_instance_id: InstanceId,
    next_listing_id: ListingId,
}

impl StoreInner {
    fn new(ledger: Ledger) -> Self {
        Self {
            accounts: HashMap::new(),
            instances: HashMap::new(),
            listings: HashMap::new(),
            active_by_instance: HashMap::new(),
            ledger,
            next_instance_id: 1,
            next_listing_id: 1,
        }
    }

    // ------------------------------------------------------------------
    // Validation-phase reads
    // ------------------------------------------------------------------

    /// Balance of an account.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` for accounts the platform never seeded.
    pub(crate) fn balance_of(&self, account: AccountId) -> EconomyResult<u64> {
        self.accounts
            .get(&account)
            .copied()
            .ok_or(EconomyError::AccountNotFound(account))
    }

    /// Looks up an instance.
    pub(crate) fn instance_ref(&self, id: InstanceId) -> Option<&OwnedInstance> {
        self.instances.get(&id)
    }

    /// Looks up a listing.
    pub(crate) fn listing_ref(&self, id: ListingId) -> Option<&Listing> {
        self.listings.get(&id)
    }

    /// The ACTIVE listing for an instance, if one exists.
    pub(crate) fn active_listing_for(&self, instance: InstanceId) -> Option<ListingId> {
        self.active_by_instance.get(&instance).copied()
    }

    // ------------------------------------------------------------------
    // Commit-phase writes
    // ------------------------------------------------------------------

    /// Appends ledger entries; the only fallible write in a unit, so it
    /// runs before any in-memory mutation.
    pub(crate) fn append_ledger(&mut self, drafts: Vec<EntryDraft>) -> EconomyResult<()> {
        self.ledger.append_batch(drafts)
    }

    /// Debits an account. The unit validated funds under this same guard.
    pub(crate) fn apply_debit(&mut self, account: AccountId, amount: u64) -> u64 {
        let balance = self.accounts.entry(account).or_insert(0);
        debug_assert!(*balance >= amount, "debit validated before apply");
        *balance = balance.saturating_sub(amount);
        *balance
    }

    /// Credits an account.
    pub(crate) fn apply_credit(&mut self, account: AccountId, amount: u64) -> u64 {
        let balance = self.accounts.entry(account).or_insert(0);
        *balance = balance.saturating_add(amount);
        *balance
    }

    /// Mints a new owned instance bound to `owner`.
    pub(crate) fn create_instance(
        &mut self,
        template_id: TemplateId,
        owner: AccountId,
        now_ms: u64,
    ) -> OwnedInstance {
        let id = self.next_instance_id;
        self.next_instance_id += 1;
        let instance = OwnedInstance {
            id,
            template_id,
            owner,
            locked: false,
            acquired_at_ms: now_ms,
        };
        self.instances.insert(id, instance.clone());
        instance
    }

    /// Reassigns an instance to a new owner.
    pub(crate) fn reassign_instance(&mut self, instance: InstanceId, new_owner: AccountId) {
        if let Some(inst) = self.instances.get_mut(&instance) {
            inst.owner = new_owner;
        }
    }

    /// Inserts an ACTIVE listing and its uniqueness-index entry.
    ///
    /// The unit validated that no ACTIVE listing exists for the instance;
    /// the index insert happens in the same critical section, so no second
    /// caller can slip between check and insert.
    pub(crate) fn insert_active_listing(
        &mut self,
        instance_id: InstanceId,
        seller: AccountId,
        price: u64,
        now_ms: u64,
    ) -> Listing {
        debug_assert!(
            !self.active_by_instance.contains_key(&instance_id),
            "active-listing uniqueness validated before apply"
        );
        let id = self.next_listing_id;
        self.next_listing_id += 1;
        let listing = Listing {
            id,
            instance_id,
            seller,
            price,
            status: ListingStatus::Active,
            created_at_ms: now_ms,
        };
        self.active_by_instance.insert(instance_id, id);
        self.listings.insert(id, listing.clone());
        listing
    }

    /// Moves an ACTIVE listing to a terminal state and drops it from the
    /// uniqueness index. Returns the updated listing.
    pub(crate) fn close_listing(&mut self, id: ListingId, status: ListingStatus) -> Listing {
        debug_assert!(status != ListingStatus::Active);
        let listing = self
            .listings
            .get_mut(&id)
            .expect("close_listing on a listing validated in this unit");
        debug_assert_eq!(listing.status, ListingStatus::Active);
        listing.status = status;
        self.active_by_instance.remove(&listing.instance_id);
        listing.clone()
    }
}

/// The persistent store: the system of record for balances, instances,
/// listings, and the transaction ledger.
pub struct Store {
    inner: RwLock<StoreInner>,
}

impl Store {
    /// Opens a store whose ledger is persisted at `path`.
    ///
    /// # Errors
    ///
    /// Propagates ledger recovery failures.
    pub fn open(ledger_path: impl AsRef<std::path::Path>) -> EconomyResult<Self> {
        Ok(Self {
            inner: RwLock::new(StoreInner::new(Ledger::open(ledger_path)?)),
        })
    }

    /// Opens a store with a memory-only ledger.
    #[must_use]
    pub fn ephemeral() -> Self {
        Self {
            inner: RwLock::new(StoreInner::new(Ledger::ephemeral())),
        }
    }

    /// Runs one atomic unit of work under the exclusive guard.
    pub(crate) fn unit<T>(
        &self,
        f: impl FnOnce(&mut StoreInner) -> EconomyResult<T>,
    ) -> EconomyResult<T> {
        f(&mut self.inner.write())
    }

    // ------------------------------------------------------------------
    // Platform seams - accounts and locks are managed outside the engine
    // ------------------------------------------------------------------

    /// Seeds (or resets) an account balance. The engine itself never
    /// creates or destroys accounts; the surrounding platform does.
    pub fn register_account(&self, account: AccountId, balance: u64) {
        self.inner.write().accounts.insert(account, balance);
    }

    /// Sets the lock flag on an instance (quest rewards, showcase pins...).
    ///
    /// # Errors
    ///
    /// Returns `InstanceNotFound` for unknown instances.
    pub fn set_instance_locked(&self, instance: InstanceId, locked: bool) -> EconomyResult<()> {
        let mut inner = self.inner.write();
        let inst = inner
            .instances
            .get_mut(&instance)
            .ok_or(EconomyError::InstanceNotFound(instance))?;
        inst.locked = locked;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read API
    // ------------------------------------------------------------------

    /// Balance of an account, if it exists.
    #[must_use]
    pub fn balance(&self, account: AccountId) -> Option<u64> {
        self.inner.read().accounts.get(&account).copied()
    }

    /// Looks up an instance.
    #[must_use]
    pub fn instance(&self, id: InstanceId) -> Option<OwnedInstance> {
        self.inner.read().instances.get(&id).cloned()
    }

    /// All instances owned by an account.
    #[must_use]
    pub fn instances_of(&self, account: AccountId) -> Vec<OwnedInstance> {
        self.inner
            .read()
            .instances
            .values()
            .filter(|i| i.owner == account)
            .cloned()
            .collect()
    }

    /// Looks up a listing.
    #[must_use]
    pub fn listing(&self, id: ListingId) -> Option<Listing> {
        self.inner.read().listings.get(&id).cloned()
    }

    /// All ACTIVE listings, the marketplace browse view.
    #[must_use]
    pub fn active_listings(&self) -> Vec<Listing> {
        let inner = self.inner.read();
        inner
            .active_by_instance
            .values()
            .filter_map(|id| inner.listings.get(id))
            .cloned()
            .collect()
    }

    /// All ledger entries touching an account, oldest first.
    #[must_use]
    pub fn ledger_entries(&self, account: AccountId) -> Vec<LedgerEntry> {
        self.inner.read().ledger.entries_for(account)
    }

    /// Total number of ledger entries.
    #[must_use]
    pub fn ledger_len(&self) -> usize {
        self.inner.read().ledger.len()
    }
}
