//! # Economy Configuration
//!
//! All balance data lives in one external TOML document: pack definitions,
//! per-pack drop-rate tables, the notable-rarity threshold, and the item
//! template catalog. The whole document is validated before any of it is
//! installed - a config with one bad table installs nothing.
//!
//! ```toml
//! notable_threshold = "ssr"
//!
//! [packs.standard]
//! cost = 500
//! card_count = 5
//!
//! [rates.standard]
//! common = 60.0
//! rare = 25.0
//! sr = 10.0
//! ssr = 4.0
//! ur = 1.0
//!
//! [[templates]]
//! id = 1
//! name = "Moonlit Courier"
//! rarity = "common"
//! collection = "vol-1"
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::catalog::ItemTemplate;
use crate::error::{EconomyError, EconomyResult};
use crate::packs::PackDefinition;
use crate::rarity::Rarity;
use crate::rates::RateTable;

fn default_notable_threshold() -> Rarity {
    Rarity::Ssr
}

/// The full economy configuration document.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EconomyConfig {
    /// Rarity at or above which a pack counts as "rare or better".
    #[serde(default = "default_notable_threshold")]
    pub notable_threshold: Rarity,
    /// Pack definitions keyed by pack type.
    pub packs: HashMap<String, PackDefinition>,
    /// Drop-rate tables keyed by pack type, weights in percent.
    #[serde(default)]
    pub rates: HashMap<String, HashMap<Rarity, f64>>,
    /// The item template catalog.
    #[serde(default)]
    pub templates: Vec<ItemTemplate>,
}

impl EconomyConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for parse failures and `InvalidConfig` /
    /// `InvalidRates` for documents that parse but fail validation.
    pub fn from_toml_str(document: &str) -> EconomyResult<Self> {
        let config: Self = toml::from_str(document)
            .map_err(|e| EconomyError::InvalidConfig(format!("economy config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML file.
    ///
    /// # Errors
    ///
    /// See [`EconomyConfig::from_toml_str`]; file I/O failures are reported
    /// as `InvalidConfig`.
    pub fn from_path(path: impl AsRef<Path>) -> EconomyResult<Self> {
        let document = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            EconomyError::InvalidConfig(format!(
                "cannot read {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml_str(&document)
    }

    /// The built-in product defaults: one "standard" pack of 5 cards at
    /// 500 rubies, rolled against the standard table. No templates; the
    /// platform registers those at startup.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            notable_threshold: Rarity::Ssr,
            packs: [(
                "standard".to_string(),
                PackDefinition {
                    cost: 500,
                    card_count: 5,
                },
            )]
            .into_iter()
            .collect(),
            rates: [(
                "standard".to_string(),
                RateTable::standard().to_percent_map(),
            )]
            .into_iter()
            .collect(),
            templates: Vec::new(),
        }
    }

    /// Validates the whole document.
    pub(crate) fn validate(&self) -> EconomyResult<()> {
        for (pack_type, def) in &self.packs {
            if def.card_count == 0 {
                return Err(EconomyError::InvalidConfig(format!(
                    "pack '{pack_type}' has a zero card count"
                )));
            }
            if i64::try_from(def.cost).is_err() {
                return Err(EconomyError::InvalidConfig(format!(
                    "pack '{pack_type}' cost exceeds ledger range"
                )));
            }
        }

        for (pack_type, weights) in &self.rates {
            // Validation only; the table is rebuilt when installed.
            RateTable::from_percent(pack_type, 0, weights)?;
        }

        let mut seen = std::collections::HashSet::new();
        for template in &self.templates {
            if !seen.insert(template.id) {
                return Err(EconomyError::InvalidConfig(format!(
                    "template ID {} appears twice",
                    template.id
                )));
            }
        }

        Ok(())
    }
}
