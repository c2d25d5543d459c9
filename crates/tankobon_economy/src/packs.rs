//! # Pack Opening
//!
//! The gacha unit of work: validate funds, roll rarities, bind templates,
//! mint instances, debit rubies, append the ledger entry. All of it commits
//! together or not at all - a partial pack is a correctness violation.

use rand::Rng;
use serde::Deserialize;

use crate::catalog::{TemplateCatalog, TemplateId};
use crate::error::{EconomyError, EconomyResult};
use crate::ledger::{unix_now_ms, EntryDraft, EntryKind};
use crate::rarity::Rarity;
use crate::rates::RateTable;
use crate::roller::roll_many;
use crate::store::{AccountId, OwnedInstance, StoreInner};

/// Product configuration of one pack type.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackDefinition {
    /// Price in rubies.
    pub cost: u64,
    /// Number of cards per pack.
    pub card_count: u32,
}

/// Result of a successful pack opening.
#[derive(Clone, Debug)]
pub struct PackResult {
    /// The freshly minted instances, in draw order.
    pub instances: Vec<OwnedInstance>,
    /// The rarities drawn, in draw order.
    pub rarities: Vec<Rarity>,
    /// Whether any draw reached the notable threshold (UI celebration).
    /// Derived from the roll results, not re-queried from storage.
    pub contains_rare_or_better: bool,
    /// Account balance after the debit.
    pub new_balance: u64,
}

/// Everything a pack-opening unit needs besides the store itself.
pub(crate) struct PackContext<'a> {
    /// The template catalog to bind rolled rarities against.
    pub catalog: &'a TemplateCatalog,
    /// The drop-rate table for this pack type.
    pub table: &'a RateTable,
    /// Cost and card count.
    pub def: &'a PackDefinition,
    /// Rarity at or above which the result counts as notable.
    pub notable_threshold: Rarity,
    /// Pack type name, for ledger descriptions and errors.
    pub pack_type: &'a str,
}

/// Opens one pack for `account` as a single atomic unit.
///
/// Runs inside the store's exclusive guard: the balance check and the debit
/// cannot be split by a concurrent unit, so balances never go negative.
pub(crate) fn open_pack<R: Rng + ?Sized>(
    inner: &mut StoreInner,
    ctx: &PackContext<'_>,
    account: AccountId,
    rng: &mut R,
) -> EconomyResult<PackResult> {
    let def = ctx.def;

    // 1. Funds. Abort before any draw mutates the generator stream.
    let balance = inner.balance_of(account)?;
    if balance < def.cost {
        return Err(EconomyError::InsufficientFunds {
            account,
            required: def.cost,
            available: balance,
        });
    }
    let cost_signed = i64::try_from(def.cost).map_err(|_| {
        EconomyError::InvalidConfig(format!(
            "pack '{}' cost exceeds ledger range",
            ctx.pack_type
        ))
    })?;

    // 2. Roll rarities.
    let rarities = roll_many(ctx.table, def.card_count, rng);

    // 3. Bind each rarity to a template. Zero templates for a rolled
    //    rarity aborts the whole unit; substitution is forbidden.
    let mut template_ids: Vec<TemplateId> = Vec::with_capacity(rarities.len());
    for &rarity in &rarities {
        template_ids.push(ctx.catalog.pick_uniform(rarity, rng)?.id);
    }

    // 4. Ledger entry for the debit - the one fallible write.
    inner.append_ledger(vec![EntryDraft {
        account,
        amount: -cost_signed,
        kind: EntryKind::PackPurchase,
        description: format!("pack '{}' ({} cards)", ctx.pack_type, def.card_count),
    }])?;

    // 5-6. Mint instances and debit. Infallible under the validation above.
    let now = unix_now_ms();
    let instances: Vec<OwnedInstance> = template_ids
        .into_iter()
        .map(|template_id| inner.create_instance(template_id, account, now))
        .collect();
    let new_balance = inner.apply_debit(account, def.cost);

    let contains_rare_or_better = rarities.iter().any(|&r| r >= ctx.notable_threshold);

    Ok(PackResult {
        instances,
        rarities,
        contains_rare_or_better,
        new_balance,
    })
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    use crate::catalog::ItemTemplate;
    use crate::rates::RATE_SCALE_BP;
    use crate::store::Store;

    use super::*;

    fn test_def() -> PackDefinition {
        PackDefinition {
            cost: 500,
            card_count: 5,
        }
    }

    fn full_catalog() -> TemplateCatalog {
        let mut catalog = TemplateCatalog::new();
        for (i, rarity) in Rarity::ASCENDING.iter().enumerate() {
            catalog
                .register(ItemTemplate {
                    id: (i as u32) * 10 + 1,
                    name: format!("{rarity:?} card"),
                    rarity: *rarity,
                    collection: "vol-1".to_string(),
                })
                .unwrap();
        }
        catalog
    }

    fn ctx<'a>(
        catalog: &'a TemplateCatalog,
        table: &'a RateTable,
        def: &'a PackDefinition,
    ) -> PackContext<'a> {
        PackContext {
            catalog,
            table,
            def,
            notable_threshold: Rarity::Ssr,
            pack_type: "standard",
        }
    }

    #[test]
    fn test_successful_open_mints_five_and_debits_once() {
        let store = Store::ephemeral();
        store.register_account(1, 2000);
        let catalog = full_catalog();
        let table = RateTable::standard();
        let def = test_def();
        let mut rng = ChaCha12Rng::from_seed([5u8; 32]);

        let result = store
            .unit(|inner| open_pack(inner, &ctx(&catalog, &table, &def), 1, &mut rng))
            .unwrap();

        assert_eq!(result.instances.len(), 5);
        assert_eq!(result.rarities.len(), 5);
        assert_eq!(result.new_balance, 1500);
        assert_eq!(store.balance(1), Some(1500));
        assert_eq!(store.instances_of(1).len(), 5);

        let entries = store.ledger_entries(1);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount, -500);
        assert_eq!(entries[0].kind, EntryKind::PackPurchase);
    }

    #[test]
    fn test_insufficient_funds_mutates_nothing() {
        let store = Store::ephemeral();
        store.register_account(1, 499);
        let catalog = full_catalog();
        let table = RateTable::standard();
        let def = test_def();
        let mut rng = ChaCha12Rng::from_seed([5u8; 32]);

        let err = store
            .unit(|inner| open_pack(inner, &ctx(&catalog, &table, &def), 1, &mut rng))
            .unwrap_err();

        assert_eq!(
            err,
            EconomyError::InsufficientFunds {
                account: 1,
                required: 500,
                available: 499,
            }
        );
        assert_eq!(store.balance(1), Some(499));
        assert!(store.instances_of(1).is_empty());
        assert_eq!(store.ledger_len(), 0);
    }

    #[test]
    fn test_missing_templates_abort_whole_pack() {
        let store = Store::ephemeral();
        store.register_account(1, 2000);
        // Catalog with commons only; any non-common roll must abort.
        let mut catalog = TemplateCatalog::new();
        catalog
            .register(ItemTemplate {
                id: 1,
                name: "only card".to_string(),
                rarity: Rarity::Common,
                collection: "vol-1".to_string(),
            })
            .unwrap();
        // Force every roll to UR.
        let table = RateTable::from_bp(1, [0, 0, 0, 0, RATE_SCALE_BP]);
        let def = test_def();
        let mut rng = ChaCha12Rng::from_seed([5u8; 32]);

        let err = store
            .unit(|inner| open_pack(inner, &ctx(&catalog, &table, &def), 1, &mut rng))
            .unwrap_err();

        assert_eq!(
            err,
            EconomyError::NoTemplatesForRarity { rarity: Rarity::Ur }
        );
        assert_eq!(store.balance(1), Some(2000));
        assert!(store.instances_of(1).is_empty());
        assert_eq!(store.ledger_len(), 0);
    }

    #[test]
    fn test_notable_flag_tracks_threshold() {
        let store = Store::ephemeral();
        store.register_account(1, 10_000);
        let catalog = full_catalog();
        let def = test_def();
        let mut rng = ChaCha12Rng::from_seed([5u8; 32]);

        // All-UR table: flag must be set against an SSR threshold.
        let all_ur = RateTable::from_bp(1, [0, 0, 0, 0, RATE_SCALE_BP]);
        let result = store
            .unit(|inner| open_pack(inner, &ctx(&catalog, &all_ur, &def), 1, &mut rng))
            .unwrap();
        assert!(result.contains_rare_or_better);
        assert!(result.rarities.iter().all(|&r| r == Rarity::Ur));

        // All-common table: flag must stay clear.
        let all_common = RateTable::from_bp(1, [RATE_SCALE_BP, 0, 0, 0, 0]);
        let result = store
            .unit(|inner| open_pack(inner, &ctx(&catalog, &all_common, &def), 1, &mut rng))
            .unwrap();
        assert!(!result.contains_rare_or_better);
    }

    #[test]
    fn test_unknown_account_rejected() {
        let store = Store::ephemeral();
        let catalog = full_catalog();
        let table = RateTable::standard();
        let def = test_def();
        let mut rng = ChaCha12Rng::from_seed([5u8; 32]);

        let err = store
            .unit(|inner| open_pack(inner, &ctx(&catalog, &table, &def), 42, &mut rng))
            .unwrap_err();
        assert_eq!(err, EconomyError::AccountNotFound(42));
    }
}
