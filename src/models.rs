use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One recipe row scraped from an intermediate product's page table.
///
/// Quantities stay as the raw strings found on the page; numeric parsing
/// happens during preprocessing so that a bad cell only costs a warning.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TableRecipe {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building: Option<String>,
    pub inputs: Vec<(String, String)>,
    pub outputs: Vec<(String, String)>,
}

/// An infobox page as fetched, keyed by its title in [`FetchDocument::items`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ItemRecord {
    pub page_id: u64,
    pub title: String,
    pub archived: bool,
    pub fields: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<TableRecipe>,
}

impl ItemRecord {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn category(&self) -> Option<&str> {
        self.field("category")
    }

    /// Items without an infobox recipe, a research cost or a page table carry nothing for the matrix.
    pub fn has_recipe_data(&self, recipe_field: &str) -> bool {
        self.fields.contains_key(recipe_field)
            || self.fields.contains_key("cost")
            || !self.tables.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FetchError {
    pub title: String,
    pub reason: String,
}

/// Output of the fetch stage and input of the preprocess stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FetchDocument {
    pub items: BTreeMap<String, ItemRecord>,
    pub archived: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FetchError>,
}

impl FetchDocument {
    pub fn is_archived(&self, name: &str) -> bool {
        self.archived.contains(name)
    }
}
