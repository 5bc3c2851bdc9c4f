use crate::fields::{
    parse_energy, parse_ingredients, parse_number, parse_producers, Energy, Ingredients, Parsed,
    ParseWarning,
};
use crate::models::{FetchDocument, ItemRecord, TableRecipe};
use crate::rules::ParseRules;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeSource {
    Infobox,
    Research,
    Table,
}

/// A conversion of inputs to outputs over one crafting cycle of `time` seconds
/// at crafting speed 1. Quantities are per cycle; rates come later, per machine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recipe {
    pub name: String,
    pub producers: Vec<String>,
    pub time: f64,
    pub inputs: Vec<(String, f64)>,
    pub outputs: Vec<(String, f64)>,
    pub source: RecipeSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachineSpec {
    pub name: String,
    pub speed: f64,
    pub energy: Option<Energy>,
    pub pollution_per_sec: f64,
}

impl MachineSpec {
    pub fn with_speed(name: &str, speed: f64) -> Self {
        Self {
            name: name.to_string(),
            speed,
            energy: None,
            pollution_per_sec: 0.0,
        }
    }
}

/// Optional numeric properties of an item infobox, parsed on demand.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ItemProperties {
    pub crafting_speed: Option<f64>,
    /// Power draw in kW
    pub energy: Option<Energy>,
    pub pollution_per_sec: Option<f64>,
    pub stack_size: Option<f64>,
}

/// Parses the numeric infobox fields an item carries. Missing fields stay
/// `None`; present but unparseable ones become zero with a warning.
pub fn item_properties(item: &ItemRecord, rules: &ParseRules) -> Parsed<ItemProperties> {
    let mut warnings = Vec::new();
    let mut number = |key: &str| {
        item.field(key)
            .map(|raw| parse_number(&field_label(item, key), raw, rules).take(&mut warnings))
    };

    let crafting_speed = number("crafting-speed");
    let stack_size = number("stack-size");
    let pollution_per_sec = number("pollution").map(|p| {
        if rules.pollution_per_minute {
            p / 60.0
        } else {
            p
        }
    });
    let energy = item
        .field("energy")
        .map(|raw| parse_energy(&field_label(item, "energy"), raw, rules).take(&mut warnings));

    Parsed {
        value: ItemProperties {
            crafting_speed,
            energy,
            pollution_per_sec,
            stack_size,
        },
        warnings,
    }
}

/// Crafting machines described on the wiki, keyed by name.
///
/// An infobox counts as a machine when it has a `crafting-speed` field; its
/// `energy` and `pollution` fields are optional.
pub fn machine_specs(doc: &FetchDocument, rules: &ParseRules) -> Parsed<BTreeMap<String, MachineSpec>> {
    let mut warnings = Vec::new();
    let mut specs = BTreeMap::new();

    for item in doc.items.values() {
        if item.archived || doc.is_archived(&item.title) || item.field("crafting-speed").is_none() {
            continue;
        }
        let props = item_properties(item, rules).take(&mut warnings);

        let name = rules.canonical_name(&item.title).to_string();
        specs.insert(
            name.clone(),
            MachineSpec {
                name,
                speed: props.crafting_speed.unwrap_or_default(),
                energy: props.energy,
                pollution_per_sec: props.pollution_per_sec.unwrap_or_default(),
            },
        );
    }

    Parsed {
        value: specs,
        warnings,
    }
}

/// Every recipe the fetch document describes, skipping archived items.
///
/// Each item can contribute an infobox recipe, a research recipe from its
/// `cost` field and any number of page-table recipes.
pub fn extract_recipes(doc: &FetchDocument, rules: &ParseRules) -> Parsed<Vec<Recipe>> {
    let mut warnings = Vec::new();
    let mut recipes = Vec::new();

    for item in doc.items.values() {
        if item.archived || doc.is_archived(&item.title) {
            continue;
        }
        if !item.has_recipe_data(&rules.recipe_field) {
            debug!(item = %item.title, "Not interesting: no recipe, cost or table");
            continue;
        }

        let producers = item_producers(item, rules, &mut warnings);

        if let Some(raw) = item.field(&rules.recipe_field) {
            let label = field_label(item, &rules.recipe_field);
            let mut ingredients = parse_ingredients(&label, raw, rules).take(&mut warnings);
            if ingredients.outputs.is_empty() {
                ingredients
                    .outputs
                    .push((rules.canonical_name(&item.title).to_string(), 1.0));
            }
            recipes.push(recipe_from(
                &item.title,
                producers.clone(),
                ingredients,
                RecipeSource::Infobox,
            ));
        }

        if rules.include_research {
            if let Some(raw) = item.field("cost") {
                let mut ingredients =
                    parse_ingredients(&field_label(item, "cost"), raw, rules).take(&mut warnings);
                ingredients.outputs = vec![(format!("{}{}", item.title, rules.research_suffix), 1.0)];
                recipes.push(recipe_from(
                    &format!("{}{}", item.title, rules.research_suffix),
                    vec![rules.research_producer.clone()],
                    ingredients,
                    RecipeSource::Research,
                ));
            }
        }

        for (i, table) in item.tables.iter().enumerate() {
            let label = format!("{}/table[{}]", item.title, i);
            let ingredients = table_ingredients(&label, table, rules).take(&mut warnings);
            let name = table.process.clone().unwrap_or_else(|| item.title.clone());
            let table_producers = match &table.building {
                Some(building) => vec![rules.canonical_name(building).to_string()],
                None => producers.clone(),
            };
            recipes.push(recipe_from(&name, table_producers, ingredients, RecipeSource::Table));
        }
    }

    Parsed {
        value: recipes,
        warnings,
    }
}

/// Looks up the machine a column runs on: wiki infobox first, then the
/// configured fallback speeds, then the default speed with a warning.
pub fn resolve_machine(
    producer: &str,
    specs: &BTreeMap<String, MachineSpec>,
    rules: &ParseRules,
) -> Parsed<MachineSpec> {
    if let Some(spec) = specs.get(producer) {
        return Parsed::ok(spec.clone());
    }
    if let Some(speed) = rules.machine_speeds.get(producer) {
        return Parsed::ok(MachineSpec::with_speed(producer, *speed));
    }
    Parsed::warn(
        MachineSpec::with_speed(producer, rules.default_machine_speed),
        ParseWarning::new(producer, producer, "unknown machine, using default crafting speed"),
    )
}

fn item_producers(item: &ItemRecord, rules: &ParseRules, warnings: &mut Vec<ParseWarning>) -> Vec<String> {
    match item.field("producers") {
        Some(raw) => {
            let producers =
                parse_producers(&field_label(item, "producers"), raw, rules).take(warnings);
            if producers.is_empty() {
                vec![rules.default_producer.clone()]
            } else {
                producers
            }
        }
        None => {
            if item.fields.contains_key(&rules.recipe_field) {
                warnings.push(ParseWarning::new(
                    &field_label(item, "producers"),
                    "",
                    format!("no producers listed, assuming {}", rules.default_producer),
                ));
            }
            vec![rules.default_producer.clone()]
        }
    }
}

fn table_ingredients(label: &str, table: &TableRecipe, rules: &ParseRules) -> Parsed<Ingredients> {
    let mut warnings = Vec::new();
    let mut ingredients = Ingredients::default();
    let mut saw_time = false;

    for (name, raw) in &table.inputs {
        let qty = parse_number(label, raw, rules).take(&mut warnings);
        if rules.is_time(name) {
            ingredients.time += qty;
            saw_time = true;
        } else {
            ingredients
                .inputs
                .push((rules.canonical_name(name).to_string(), qty));
        }
    }
    for (name, raw) in &table.outputs {
        let qty = parse_number(label, raw, rules).take(&mut warnings);
        if rules.is_time(name) {
            ingredients.time += qty;
            saw_time = true;
        } else {
            ingredients
                .outputs
                .push((rules.canonical_name(name).to_string(), qty));
        }
    }
    if !saw_time {
        warnings.push(ParseWarning::new(label, "", "missing crafting time"));
    }

    Parsed {
        value: ingredients,
        warnings,
    }
}

fn recipe_from(name: &str, producers: Vec<String>, ingredients: Ingredients, source: RecipeSource) -> Recipe {
    Recipe {
        name: name.to_string(),
        producers,
        time: ingredients.time,
        inputs: ingredients.inputs,
        outputs: ingredients.outputs,
        source,
    }
}

fn field_label(item: &ItemRecord, key: &str) -> String {
    format!("{}/{}", item.title, key)
}
