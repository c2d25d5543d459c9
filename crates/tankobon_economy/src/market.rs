//! # Marketplace
//!
//! **Listings and Single-Winner Purchases**
//!
//! Listing creation, cancellation, and the purchase state machine over
//! `ACTIVE → {SOLD, CANCELLED}`. Every operation here runs inside the
//! store's exclusive guard, so:
//!
//! - the at-most-one-ACTIVE-listing-per-instance rule is enforced by the
//!   store's uniqueness index in the same critical section as the insert,
//!   not by a separate read-then-write;
//! - of two concurrent purchases of the same listing, exactly one observes
//!   ACTIVE and commits SOLD; the loser sees a terminal state and aborts
//!   with no balance or ownership change.

use crate::error::{EconomyError, EconomyResult};
use crate::ledger::{unix_now_ms, EntryDraft, EntryKind};
use crate::store::{
    AccountId, InstanceId, Listing, ListingId, ListingStatus, OwnedInstance, StoreInner,
};

/// Result of a successful purchase.
#[derive(Clone, Debug)]
pub struct PurchaseResult {
    /// The instance, now owned by the buyer.
    pub instance: OwnedInstance,
    /// The account that sold it.
    pub seller: AccountId,
    /// Price paid in rubies.
    pub price: u64,
    /// Buyer balance after the debit.
    pub buyer_balance: u64,
    /// Seller balance after the credit.
    pub seller_balance: u64,
}

/// Creates an ACTIVE listing for an owned, unlocked instance.
///
/// An instance owned by a different account is reported as not found.
pub(crate) fn create_listing(
    inner: &mut StoreInner,
    seller: AccountId,
    instance_id: InstanceId,
    price: u64,
) -> EconomyResult<Listing> {
    let instance = inner
        .instance_ref(instance_id)
        .ok_or(EconomyError::InstanceNotFound(instance_id))?;
    if instance.owner != seller {
        return Err(EconomyError::InstanceNotFound(instance_id));
    }
    if instance.locked {
        return Err(EconomyError::InstanceLocked(instance_id));
    }
    if i64::try_from(price).is_err() {
        return Err(EconomyError::InvalidConfig(format!(
            "listing price {price} exceeds ledger range"
        )));
    }
    if inner.active_listing_for(instance_id).is_some() {
        return Err(EconomyError::AlreadyListed(instance_id));
    }

    Ok(inner.insert_active_listing(instance_id, seller, price, unix_now_ms()))
}

/// Cancels an ACTIVE listing. Only the seller may cancel.
pub(crate) fn cancel_listing(
    inner: &mut StoreInner,
    seller: AccountId,
    listing_id: ListingId,
) -> EconomyResult<Listing> {
    let listing = inner
        .listing_ref(listing_id)
        .ok_or(EconomyError::ListingNotFound(listing_id))?;
    if listing.seller != seller {
        return Err(EconomyError::NotOwner {
            account: seller,
            listing: listing_id,
        });
    }
    if listing.status != ListingStatus::Active {
        return Err(EconomyError::ListingNotActive(listing_id));
    }

    Ok(inner.close_listing(listing_id, ListingStatus::Cancelled))
}

/// Executes the atomic marketplace trade.
///
/// A listing that was sold, cancelled, or never existed is reported
/// uniformly as not active; the cases are distinguished internally for
/// logging only.
pub(crate) fn purchase_listing(
    inner: &mut StoreInner,
    buyer: AccountId,
    listing_id: ListingId,
) -> EconomyResult<PurchaseResult> {
    // 1. Fetch; must exist and be ACTIVE.
    let listing = match inner.listing_ref(listing_id) {
        Some(listing) => listing.clone(),
        None => {
            tracing::debug!(listing_id, "purchase attempt on unknown listing");
            return Err(EconomyError::ListingNotActive(listing_id));
        }
    };
    if listing.status != ListingStatus::Active {
        tracing::debug!(listing_id, status = ?listing.status, "purchase attempt on closed listing");
        return Err(EconomyError::ListingNotActive(listing_id));
    }

    // 2. No buying your own listing.
    if listing.seller == buyer {
        return Err(EconomyError::SelfPurchase);
    }

    // 3. Funds; both parties must be seeded accounts, and the listed
    //    instance must still exist.
    let buyer_balance = inner.balance_of(buyer)?;
    if buyer_balance < listing.price {
        return Err(EconomyError::InsufficientFunds {
            account: buyer,
            required: listing.price,
            available: buyer_balance,
        });
    }
    inner.balance_of(listing.seller)?;
    let mut instance = inner
        .instance_ref(listing.instance_id)
        .cloned()
        .ok_or(EconomyError::InstanceNotFound(listing.instance_id))?;
    let price_signed = i64::try_from(listing.price).map_err(|_| {
        EconomyError::InvalidConfig(format!(
            "listing {listing_id} price exceeds ledger range"
        ))
    })?;

    // 7 (committed first). Two entries, one batch: buyer debit + seller
    // credit land together or not at all.
    inner.append_ledger(vec![
        EntryDraft {
            account: buyer,
            amount: -price_signed,
            kind: EntryKind::MarketPurchase,
            description: format!(
                "market purchase of instance #{} (listing #{listing_id})",
                listing.instance_id
            ),
        },
        EntryDraft {
            account: listing.seller,
            amount: price_signed,
            kind: EntryKind::MarketSale,
            description: format!(
                "market sale of instance #{} (listing #{listing_id})",
                listing.instance_id
            ),
        },
    ])?;

    // 4-6. Reassign ownership, close the listing, move the rubies. The
    // SOLD transition happens under the same guard that observed ACTIVE,
    // which is what guarantees a single winner under concurrent attempts.
    inner.reassign_instance(listing.instance_id, buyer);
    inner.close_listing(listing_id, ListingStatus::Sold);
    let buyer_balance = inner.apply_debit(buyer, listing.price);
    let seller_balance = inner.apply_credit(listing.seller, listing.price);
    instance.owner = buyer;

    Ok(PurchaseResult {
        instance,
        seller: listing.seller,
        price: listing.price,
        buyer_balance,
        seller_balance,
    })
}
