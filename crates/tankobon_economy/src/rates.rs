//! # Drop-Rate Tables
//!
//! **Validated, Versioned, Atomically Replaced**
//!
//! Each pack type maps every rarity tier to a probability weight. Weights
//! are accepted as percentages but held internally in integer basis points
//! (1 bp = 0.01%), so the roll itself never touches floating point.
//!
//! ## Invariants
//!
//! - Weights for a pack type always sum to 100% (ε = 0.01). An update that
//!   fails validation leaves the previous table completely unchanged.
//! - Tables are immutable values behind an `Arc`; an update swaps the whole
//!   record and bumps its version. No reader can observe a partial sum.
//! - Unknown pack types fall back to the documented standard table. The
//!   fallback is deterministic and logged, never silently masked.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{EconomyError, EconomyResult};
use crate::rarity::Rarity;

/// 100% expressed in basis points.
pub const RATE_SCALE_BP: u32 = 10_000;

/// Tolerance on the percentage sum, in basis points (0.01% = 1 bp).
const SUM_EPSILON_BP: i64 = 1;

/// The standard table served for pack types with no configured rates:
/// COMMON 60%, RARE 25%, SR 10%, SSR 4%, UR 1%.
const STANDARD_WEIGHTS_BP: [u32; Rarity::COUNT] = [6000, 2500, 1000, 400, 100];

/// An immutable drop-rate table for one pack type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateTable {
    /// Version of this record; bumped on every successful replace.
    pub version: u32,
    /// Weight per tier in basis points, indexed by `Rarity::index`.
    weights_bp: [u32; Rarity::COUNT],
}

impl RateTable {
    /// Builds a table from raw basis points. Callers are responsible for
    /// the sum invariant; the public path is [`RateTable::from_percent`].
    pub(crate) const fn from_bp(version: u32, weights_bp: [u32; Rarity::COUNT]) -> Self {
        Self {
            version,
            weights_bp,
        }
    }

    /// The documented standard table (version 0).
    #[must_use]
    pub const fn standard() -> Self {
        Self::from_bp(0, STANDARD_WEIGHTS_BP)
    }

    /// Validates percentage weights and builds a table.
    ///
    /// Missing tiers default to weight 0.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` for negative or non-finite weights.
    /// - `InvalidRates` when the weights do not sum to 100% within ε.
    pub fn from_percent(
        pack_type: &str,
        version: u32,
        weights: &HashMap<Rarity, f64>,
    ) -> EconomyResult<Self> {
        let mut weights_bp = [0u32; Rarity::COUNT];
        for (&rarity, &weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(EconomyError::InvalidConfig(format!(
                    "drop weight for {rarity:?} in pack '{pack_type}' must be a non-negative number, got {weight}"
                )));
            }
            weights_bp[rarity.index()] = (weight * 100.0).round() as u32;
        }

        let sum_bp: i64 = weights_bp.iter().map(|&w| i64::from(w)).sum();
        if (sum_bp - i64::from(RATE_SCALE_BP)).abs() > SUM_EPSILON_BP {
            return Err(EconomyError::InvalidRates {
                pack_type: pack_type.to_string(),
                sum_bp,
            });
        }

        Ok(Self {
            version,
            weights_bp,
        })
    }

    /// Weight of one tier in basis points.
    #[inline]
    #[must_use]
    pub const fn weight_bp(&self, rarity: Rarity) -> u32 {
        self.weights_bp[rarity.index()]
    }

    /// Weight of one tier as a percentage.
    #[inline]
    #[must_use]
    pub fn percent(&self, rarity: Rarity) -> f64 {
        f64::from(self.weight_bp(rarity)) / 100.0
    }

    /// The table as a rarity → percentage mapping.
    #[must_use]
    pub fn to_percent_map(&self) -> HashMap<Rarity, f64> {
        Rarity::ASCENDING
            .iter()
            .map(|&r| (r, self.percent(r)))
            .collect()
    }

    /// Sum of all weights in basis points.
    #[must_use]
    pub fn total_bp(&self) -> u32 {
        self.weights_bp.iter().sum()
    }
}

impl Default for RateTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// The live drop-rate configuration, one table per pack type.
///
/// Reads take a shared guard and clone an `Arc`; updates build and validate
/// the replacement table first, then swap it in under the write guard, so a
/// rejected update is invisible to readers.
pub struct RateStore {
    tables: RwLock<HashMap<String, Arc<RateTable>>>,
    standard: Arc<RateTable>,
}

impl RateStore {
    /// Creates a rate store with no per-pack tables configured.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            standard: Arc::new(RateTable::standard()),
        }
    }

    /// Returns the table for a pack type.
    ///
    /// Unknown pack types are served the standard table; the fallback is a
    /// notable event and is logged at warn level.
    #[must_use]
    pub fn get(&self, pack_type: &str) -> Arc<RateTable> {
        if let Some(table) = self.tables.read().get(pack_type) {
            return Arc::clone(table);
        }
        tracing::warn!(
            pack_type,
            "no drop-rate table configured, serving the standard default"
        );
        Arc::clone(&self.standard)
    }

    /// Replaces the table for a pack type.
    ///
    /// Returns the new version on success. On rejection the previous table
    /// (or the standard fallback) remains authoritative - this is a single
    /// atomic replace, never an in-place mutation of individual weights.
    ///
    /// # Errors
    ///
    /// See [`RateTable::from_percent`].
    pub fn set(&self, pack_type: &str, weights: &HashMap<Rarity, f64>) -> EconomyResult<u32> {
        let mut tables = self.tables.write();
        let next_version = tables.get(pack_type).map_or(0, |t| t.version) + 1;
        let table = RateTable::from_percent(pack_type, next_version, weights)?;
        tables.insert(pack_type.to_string(), Arc::new(table));
        Ok(next_version)
    }
}

impl Default for RateStore {
    fn default() -> Self {
        Self::new()
    }
}
