//! # Rarity Tiers
//!
//! The ordered classification that drives both roll probability and
//! perceived card value. The ordering is part of the engine contract: the
//! roller walks tiers in ascending order, and "rare or better" comparisons
//! use `Ord` directly.

use serde::{Deserialize, Serialize};

/// Rarity tier for card templates and drops.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Rarity {
    /// Common cards - the bulk of every pack.
    Common = 0,
    /// Rare cards.
    Rare = 1,
    /// Super Rare cards.
    Sr = 2,
    /// Super Special Rare cards - the default "notable" threshold.
    Ssr = 3,
    /// Ultra Rare cards - the top of the table.
    Ur = 4,
}

impl Rarity {
    /// Number of tiers.
    pub const COUNT: usize = 5;

    /// All tiers in ascending order. This is the fixed walk order of the
    /// rarity roller.
    pub const ASCENDING: [Self; Self::COUNT] =
        [Self::Common, Self::Rare, Self::Sr, Self::Ssr, Self::Ur];

    /// Converts from u8, clamping unknown values to the top tier.
    #[inline]
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Common,
            1 => Self::Rare,
            2 => Self::Sr,
            3 => Self::Ssr,
            _ => Self::Ur,
        }
    }

    /// Index into per-tier arrays.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_is_ascending() {
        assert!(Rarity::Common < Rarity::Rare);
        assert!(Rarity::Rare < Rarity::Sr);
        assert!(Rarity::Sr < Rarity::Ssr);
        assert!(Rarity::Ssr < Rarity::Ur);
    }

    #[test]
    fn test_ascending_matches_discriminants() {
        for (i, rarity) in Rarity::ASCENDING.iter().enumerate() {
            assert_eq!(rarity.index(), i);
            assert_eq!(Rarity::from_u8(i as u8), *rarity);
        }
    }

    #[test]
    fn test_from_u8_clamps_to_top() {
        assert_eq!(Rarity::from_u8(200), Rarity::Ur);
    }
}
