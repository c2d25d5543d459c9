//! # Economy Error Types
//!
//! All errors that can cross the engine boundary.
//!
//! Every public operation returns a discriminated error kind so page code can
//! render a user-facing message without a generic handler. The enum stays
//! `Clone + Eq`; ledger I/O failures are carried as a reason string.

use thiserror::Error;

use crate::rarity::Rarity;
use crate::store::{AccountId, InstanceId, ListingId};

/// Errors that can occur in the economy engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EconomyError {
    /// Drop-rate weights for a pack type do not sum to 100%.
    #[error("invalid drop rates for pack '{pack_type}': weights sum to {sum_bp} basis points, expected 10000 (±1)")]
    InvalidRates {
        /// Pack type the update targeted.
        pack_type: String,
        /// Rounded sum of the rejected weights, in basis points.
        sum_bp: i64,
    },

    /// Account balance is too low for the requested cost or price.
    #[error("insufficient rubies: account {account} needs {required}, has {available}")]
    InsufficientFunds {
        /// The account that was debited.
        account: AccountId,
        /// Rubies required by the operation.
        required: u64,
        /// Rubies actually available.
        available: u64,
    },

    /// A rolled rarity has no backing item templates.
    ///
    /// Operator/data error, not a user error. The whole pack-opening unit
    /// aborts; the engine never substitutes a different rarity.
    #[error("no item templates exist for rarity {rarity:?}")]
    NoTemplatesForRarity {
        /// The rarity that was rolled.
        rarity: Rarity,
    },

    /// Pack type has no configured cost and card count.
    #[error("pack type '{0}' is not configured")]
    UnknownPackType(String),

    /// Account not known to the store.
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    /// Owned instance not known to the store, or not visible to the caller.
    #[error("item instance not found: {0}")]
    InstanceNotFound(InstanceId),

    /// Listing not known to the store.
    #[error("listing not found: {0}")]
    ListingNotFound(ListingId),

    /// Instance is locked and cannot be listed or transferred.
    #[error("instance {0} is locked")]
    InstanceLocked(InstanceId),

    /// An active listing already exists for the instance.
    #[error("instance {0} already has an active listing")]
    AlreadyListed(InstanceId),

    /// Caller is not the seller of the listing.
    #[error("account {account} is not the seller of listing {listing}")]
    NotOwner {
        /// The caller.
        account: AccountId,
        /// The listing it tried to act on.
        listing: ListingId,
    },

    /// Listing is not in the ACTIVE state (sold, cancelled, or never existed).
    #[error("listing {0} is not active")]
    ListingNotActive(ListingId),

    /// Buyer and seller are the same account.
    #[error("cannot purchase a listing you created yourself")]
    SelfPurchase,

    /// Malformed configuration (packs, templates, or rate documents).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Ledger file could not be written or recovered.
    #[error("ledger failure: {reason}")]
    Ledger {
        /// Underlying I/O failure, rendered.
        reason: String,
    },
}

/// Result type for economy operations.
pub type EconomyResult<T> = Result<T, EconomyError>;

impl EconomyError {
    /// Wraps an I/O error from the ledger file.
    pub(crate) fn ledger(err: &std::io::Error) -> Self {
        Self::Ledger {
            reason: err.to_string(),
        }
    }
}
