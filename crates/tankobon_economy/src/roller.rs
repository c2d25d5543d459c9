//! # Rarity Roller
//!
//! **Deterministic Weighted Draws**
//!
//! A pure function over a [`RateTable`] and an injected random source.
//! Nothing here reaches for ambient randomness: the caller supplies the
//! generator, so tests can seed a `ChaCha` stream (or drive the walk
//! directly through [`pick`]) and assert exact outcomes.
//!
//! ## Algorithm
//!
//! Draw `r` uniform in `[0, 10000)` basis points, then walk the tiers in
//! the fixed ascending order `COMMON → RARE → SR → SSR → UR`, accumulating
//! weights, and return the first tier whose cumulative weight exceeds `r`.
//! If rounding leaves the cumulative total short of the draw, the walk
//! falls through to COMMON: a statistically negligible case that is
//! absorbed silently rather than surfaced as an error.

use rand::Rng;

use crate::rarity::Rarity;
use crate::rates::{RateTable, RATE_SCALE_BP};

/// Draws one rarity tier from the table.
pub fn roll_rarity<R: Rng + ?Sized>(table: &RateTable, rng: &mut R) -> Rarity {
    pick(table, rng.gen_range(0..RATE_SCALE_BP))
}

/// Draws `count` rarity tiers from the table.
pub fn roll_many<R: Rng + ?Sized>(table: &RateTable, count: u32, rng: &mut R) -> Vec<Rarity> {
    (0..count).map(|_| roll_rarity(table, rng)).collect()
}

/// Resolves a raw draw in `[0, 10000)` against the table.
///
/// Split out from [`roll_rarity`] so the walk itself can be tested without
/// reverse-engineering a generator stream.
pub(crate) fn pick(table: &RateTable, roll_bp: u32) -> Rarity {
    let mut cumulative = 0u32;
    for rarity in Rarity::ASCENDING {
        cumulative = cumulative.saturating_add(table.weight_bp(rarity));
        if roll_bp < cumulative {
            return rarity;
        }
    }
    // Rounding shortfall: the table summed below the draw. Absorb to the
    // lowest tier.
    Rarity::Common
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    use super::*;

    #[test]
    fn test_pick_walks_ascending_boundaries() {
        let table = RateTable::standard(); // 6000/2500/1000/400/100

        assert_eq!(pick(&table, 0), Rarity::Common);
        assert_eq!(pick(&table, 5999), Rarity::Common);
        assert_eq!(pick(&table, 6000), Rarity::Rare);
        assert_eq!(pick(&table, 8499), Rarity::Rare);
        assert_eq!(pick(&table, 8500), Rarity::Sr);
        assert_eq!(pick(&table, 9499), Rarity::Sr);
        assert_eq!(pick(&table, 9500), Rarity::Ssr);
        assert_eq!(pick(&table, 9899), Rarity::Ssr);
        assert_eq!(pick(&table, 9900), Rarity::Ur);
        assert_eq!(pick(&table, 9999), Rarity::Ur);
    }

    #[test]
    fn test_pick_falls_back_to_common_on_shortfall() {
        // A table that sums below 10000 bp can leave the walk short.
        let short = RateTable::from_bp(1, [4000, 3000, 1000, 500, 100]);
        assert_eq!(pick(&short, 9999), Rarity::Common);
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let table = RateTable::standard();
        let mut a = ChaCha12Rng::from_seed([7u8; 32]);
        let mut b = ChaCha12Rng::from_seed([7u8; 32]);

        assert_eq!(roll_many(&table, 1000, &mut a), roll_many(&table, 1000, &mut b));
    }

    #[test]
    fn test_empirical_frequencies_match_weights() {
        // 100k seeded rolls against the 60/25/10/4/1 table must land within
        // ±1.5 percentage points of every configured weight.
        let table = RateTable::standard();
        let mut rng = ChaCha12Rng::from_seed([42u8; 32]);

        let iterations = 100_000u32;
        let mut counts: HashMap<Rarity, u32> = HashMap::new();
        for _ in 0..iterations {
            *counts.entry(roll_rarity(&table, &mut rng)).or_insert(0) += 1;
        }

        for rarity in Rarity::ASCENDING {
            let observed =
                f64::from(*counts.get(&rarity).unwrap_or(&0)) / f64::from(iterations) * 100.0;
            let expected = table.percent(rarity);
            assert!(
                (observed - expected).abs() <= 1.5,
                "{rarity:?}: observed {observed:.2}%, expected {expected:.2}%"
            );
        }
    }

    #[test]
    fn test_zero_weight_tier_never_drawn() {
        let table = RateTable::from_bp(1, [RATE_SCALE_BP, 0, 0, 0, 0]);
        let mut rng = ChaCha12Rng::from_seed([1u8; 32]);
        for _ in 0..10_000 {
            assert_eq!(roll_rarity(&table, &mut rng), Rarity::Common);
        }
    }
}
