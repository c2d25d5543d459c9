//! # Item Template Catalog
//!
//! Immutable card definitions, indexed by rarity for uniform selection.
//! Templates are authored by admin tooling; the engine only reads them.

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{EconomyError, EconomyResult};
use crate::rarity::Rarity;

/// Unique identifier for an item template.
pub type TemplateId = u32;

/// Immutable definition of a collectible card.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemTemplate {
    /// Unique identifier.
    pub id: TemplateId,
    /// Display name.
    pub name: String,
    /// Rarity tier.
    pub rarity: Rarity,
    /// Collection the card belongs to (a series, an event, ...).
    pub collection: String,
}

/// Registry of all item templates with a by-rarity index.
#[derive(Debug, Default)]
pub struct TemplateCatalog {
    templates: HashMap<TemplateId, ItemTemplate>,
    by_rarity: [Vec<TemplateId>; Rarity::COUNT],
}

impl TemplateCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a template.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the template ID already exists.
    pub fn register(&mut self, template: ItemTemplate) -> EconomyResult<()> {
        if self.templates.contains_key(&template.id) {
            return Err(EconomyError::InvalidConfig(format!(
                "template ID {} already exists",
                template.id
            )));
        }
        self.by_rarity[template.rarity.index()].push(template.id);
        self.templates.insert(template.id, template);
        Ok(())
    }

    /// Looks up a template by ID.
    #[must_use]
    pub fn get(&self, id: TemplateId) -> Option<&ItemTemplate> {
        self.templates.get(&id)
    }

    /// Number of registered templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// All template IDs of one rarity.
    #[must_use]
    pub fn templates_of(&self, rarity: Rarity) -> &[TemplateId] {
        &self.by_rarity[rarity.index()]
    }

    /// Selects one template of the given rarity, uniformly at random.
    ///
    /// # Errors
    ///
    /// Returns `NoTemplatesForRarity` if no template of that rarity exists.
    /// The caller must treat this as a configuration fault and abort its
    /// whole unit of work; substituting a different rarity is forbidden.
    pub fn pick_uniform<R: Rng + ?Sized>(
        &self,
        rarity: Rarity,
        rng: &mut R,
    ) -> EconomyResult<&ItemTemplate> {
        let pool = self.templates_of(rarity);
        if pool.is_empty() {
            return Err(EconomyError::NoTemplatesForRarity { rarity });
        }
        let id = pool[rng.gen_range(0..pool.len())];
        Ok(&self.templates[&id])
    }
}
