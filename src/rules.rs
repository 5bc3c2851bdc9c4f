//! Configurable heuristics for turning infobox text into numbers.
//!
//! The wiki data is hand-edited and inconsistent, so nothing here is assumed
//! complete: every rule can be overridden from a JSON file passed to
//! `factorio-lp preprocess --rules`.

use crate::config::ALIAS_MAX_DEPTH;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ParseRules {
    /// Infobox field holding the recipe (`recipe` or `expensive-recipe`)
    pub recipe_field: String,
    /// Ingredient names that denote the crafting time instead of an item
    pub time_names: Vec<String>,
    /// Separators between the input and output side of a recipe
    pub output_separators: Vec<String>,
    /// Separator between ingredients and between producers
    pub list_separator: String,
    /// Templates replaced by their last argument instead of being dropped
    pub passthrough_templates: Vec<String>,
    /// Power unit -> multiplier to kW
    pub power_units: BTreeMap<String, f64>,
    /// Crafting speeds used when a machine has no parseable infobox
    pub machine_speeds: BTreeMap<String, f64>,
    pub default_machine_speed: f64,
    /// Producer assumed for recipes whose infobox lists none
    pub default_producer: String,
    pub manual_producer: String,
    pub research_producer: String,
    pub include_research: bool,
    pub research_suffix: String,
    /// Pollution figures on the wiki are per minute
    pub pollution_per_minute: bool,
    /// Alternative spellings -> canonical item name
    pub aliases: BTreeMap<String, String>,
    pub electric_row: String,
    pub burner_row: String,
    pub pollution_row: String,
    pub manual_row: String,
}

impl Default for ParseRules {
    fn default() -> Self {
        let power_units = [("W", 0.001), ("kW", 1.0), ("MW", 1_000.0), ("GW", 1_000_000.0)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let machine_speeds = [
            ("Manual", 1.0),
            ("Assembling machine 1", 0.5),
            ("Assembling machine 2", 0.75),
            ("Assembling machine 3", 1.25),
            ("Stone furnace", 1.0),
            ("Steel furnace", 2.0),
            ("Electric furnace", 2.0),
            ("Chemical plant", 1.0),
            ("Oil refinery", 1.0),
            ("Centrifuge", 1.0),
            ("Rocket silo", 1.0),
            ("Lab", 1.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let aliases = [("Raw wood", "Wood")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Self {
            recipe_field: "recipe".to_string(),
            time_names: vec!["Time".to_string()],
            output_separators: vec!["=".to_string(), "→".to_string()],
            list_separator: "+".to_string(),
            passthrough_templates: vec!["Translation".to_string()],
            power_units,
            machine_speeds,
            default_machine_speed: 1.0,
            default_producer: "Manual".to_string(),
            manual_producer: "Manual".to_string(),
            research_producer: "Lab".to_string(),
            include_research: true,
            research_suffix: " (research)".to_string(),
            pollution_per_minute: true,
            aliases,
            electric_row: "Electric power".to_string(),
            burner_row: "Burner fuel".to_string(),
            pollution_row: "Pollution".to_string(),
            manual_row: "Manual labour".to_string(),
        }
    }
}

impl ParseRules {
    /// Loads rules from a JSON file; keys left out keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read parse rules: {:?}", path))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse rules file: {:?}", path))
    }

    pub fn is_time(&self, name: &str) -> bool {
        self.time_names.iter().any(|t| t.eq_ignore_ascii_case(name))
    }

    pub fn is_manual(&self, producer: &str) -> bool {
        producer.eq_ignore_ascii_case(&self.manual_producer)
    }

    /// Multiplier from `unit` to kW, matched case-sensitively first (`MW` vs `mW`), then loosely.
    pub fn power_multiplier(&self, unit: &str) -> Option<f64> {
        self.power_units.get(unit).copied().or_else(|| {
            self.power_units
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(unit))
                .map(|(_, v)| *v)
        })
    }

    /// Follows the alias chain to a canonical name. Cycles and chains deeper
    /// than [`ALIAS_MAX_DEPTH`] leave the name as written.
    pub fn canonical_name<'a>(&'a self, name: &'a str) -> &'a str {
        let mut current = name;
        let mut depth: u32 = 0;

        loop {
            match self.aliases.get(current) {
                None => return current,
                Some(target) if depth < ALIAS_MAX_DEPTH => {
                    debug!(from = current, to = target, "Following alias");
                    current = target.as_str();
                    depth += 1;
                }
                Some(_) => {
                    debug!(name = name, "Alias chain too deep");
                    return name;
                }
            }
        }
    }
}
