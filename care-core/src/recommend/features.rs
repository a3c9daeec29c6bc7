//! Category → feature table

use std::collections::BTreeMap;

use crate::model::{Category, FeatureId};

/// Config key that replaces the fallback feature
pub const DEFAULT_KEY: &str = "default";

/// Fixed mapping from a category to the one feature recommended for it.
///
/// Read-only after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureTable {
    entries: BTreeMap<Category, FeatureId>,
    fallback: FeatureId,
}

impl Default for FeatureTable {
    fn default() -> Self {
        let entries = BTreeMap::from([
            (Category::Diet, FeatureId::from(FeatureId::DIET_LOGISTICS)),
            (Category::Exercise, FeatureId::from(FeatureId::WEARABLES)),
            (Category::Medication, FeatureId::from(FeatureId::HEALTH_SNAPSHOTS)),
            (Category::MentalHealth, FeatureId::from(FeatureId::JOURNALING)),
            (Category::Hydration, FeatureId::from(FeatureId::FOOD_DATABASE)),
        ]);
        Self {
            entries,
            fallback: FeatureId::from(FeatureId::HEALTH_SNAPSHOTS),
        }
    }
}

impl FeatureTable {
    /// Defaults with `overrides` applied; a `default` key replaces the fallback
    pub fn with_overrides(overrides: impl IntoIterator<Item = (Category, FeatureId)>) -> Self {
        let mut table = Self::default();
        for (category, feature) in overrides {
            match category {
                Category::Other(name) if name == DEFAULT_KEY => table.fallback = feature,
                category => {
                    table.entries.insert(category, feature);
                }
            }
        }
        table
    }

    pub fn feature_for(&self, category: &Category) -> &FeatureId {
        self.entries.get(category).unwrap_or(&self.fallback)
    }

    pub fn fallback(&self) -> &FeatureId {
        &self.fallback
    }
}
