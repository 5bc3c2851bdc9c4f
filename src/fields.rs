//! Infobox field parsers.
//!
//! Every parser is a pure function from raw wikitext to [`Parsed`]: a value plus
//! the warnings raised while producing it. Bad or missing input degrades to zero
//! (or an empty list) and a warning, never an error, because the wiki is known
//! to be incomplete.

use crate::rules::ParseRules;
use crate::wikitext::clean_value;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static NUMBER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]*\.?[0-9]+(?:[eE][-+]?[0-9]+)?)(?:\s*/\s*([0-9]*\.?[0-9]+))?").unwrap()
});

static POWER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]*\.?[0-9]+)\s*([A-Za-z]+)?").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseWarning {
    pub field: String,
    pub raw: String,
    pub reason: String,
}

impl ParseWarning {
    pub fn new(field: &str, raw: &str, reason: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub value: T,
    pub warnings: Vec<ParseWarning>,
}

impl<T> Parsed<T> {
    pub fn ok(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn warn(value: T, warning: ParseWarning) -> Self {
        Self {
            value,
            warnings: vec![warning],
        }
    }

    /// Moves the warnings into `sink` and returns the value.
    pub fn take(self, sink: &mut Vec<ParseWarning>) -> T {
        sink.extend(self.warnings);
        self.value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergySource {
    Electric,
    Burner,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Energy {
    pub kw: f64,
    pub source: EnergySource,
}

/// Both sides of a recipe field, with crafting time split out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ingredients {
    pub time: f64,
    pub inputs: Vec<(String, f64)>,
    pub outputs: Vec<(String, f64)>,
}

/// Parses a non-negative quantity: `2`, `0.5`, `1/3`, `10 {{Translation|kW}}`.
/// Trailing text after the number is ignored.
pub fn parse_number(field: &str, raw: &str, rules: &ParseRules) -> Parsed<f64> {
    let cleaned = clean_value(raw, &rules.passthrough_templates);
    if cleaned.is_empty() {
        return Parsed::warn(0.0, ParseWarning::new(field, raw, "missing value"));
    }

    let Some(caps) = NUMBER_REGEX.captures(&cleaned) else {
        return Parsed::warn(0.0, ParseWarning::new(field, raw, "not a number"));
    };

    let numerator: f64 = caps[1].parse().unwrap_or(f64::NAN);
    let value = match caps.get(2) {
        Some(denominator) => numerator / denominator.as_str().parse::<f64>().unwrap_or(f64::NAN),
        None => numerator,
    };

    if value.is_finite() {
        Parsed::ok(value)
    } else {
        Parsed::warn(0.0, ParseWarning::new(field, raw, "not a finite number"))
    }
}

/// Parses `Time, 2 + Iron gear wheel, 3 + Iron plate, 3` with an optional
/// output side after one of the configured separators (`= Copper cable, 2`).
pub fn parse_ingredients(field: &str, raw: &str, rules: &ParseRules) -> Parsed<Ingredients> {
    let mut warnings = Vec::new();
    let cleaned = clean_value(raw, &rules.passthrough_templates);
    if cleaned.is_empty() {
        return Parsed::warn(
            Ingredients::default(),
            ParseWarning::new(field, raw, "empty recipe"),
        );
    }

    let (lhs, rhs) = split_sides(&cleaned, &rules.output_separators);
    let mut ingredients = Ingredients::default();
    let mut saw_time = false;

    for (name, qty) in parse_side(field, lhs, rules, &mut warnings) {
        if rules.is_time(&name) {
            ingredients.time += qty;
            saw_time = true;
        } else {
            add_entry(&mut ingredients.inputs, name, qty);
        }
    }

    if let Some(rhs) = rhs {
        for (name, qty) in parse_side(field, rhs, rules, &mut warnings) {
            if rules.is_time(&name) {
                warnings.push(ParseWarning::new(field, raw, "time listed as an output"));
            } else {
                add_entry(&mut ingredients.outputs, name, qty);
            }
        }
    }

    if !saw_time {
        warnings.push(ParseWarning::new(field, raw, "missing crafting time"));
    }

    Parsed {
        value: ingredients,
        warnings,
    }
}

/// Parses a producer list such as `Manual + Assembling machine 2 + Assembling machine 3`.
pub fn parse_producers(field: &str, raw: &str, rules: &ParseRules) -> Parsed<Vec<String>> {
    let cleaned = clean_value(raw, &rules.passthrough_templates);
    let mut producers: Vec<String> = Vec::new();
    for part in cleaned.split(rules.list_separator.as_str()) {
        let name = rules.canonical_name(part.trim());
        if !name.is_empty() && !producers.iter().any(|p| p == name) {
            producers.push(name.to_string());
        }
    }

    if producers.is_empty() {
        Parsed::warn(producers, ParseWarning::new(field, raw, "no producers listed"))
    } else {
        Parsed::ok(producers)
    }
}

/// Parses machine energy usage such as `300 {{Translation|kW}} burner` into kW.
///
/// The source defaults to electric unless the text mentions burner or fuel.
pub fn parse_energy(field: &str, raw: &str, rules: &ParseRules) -> Parsed<Energy> {
    let cleaned = clean_value(raw, &rules.passthrough_templates);
    let lower = cleaned.to_lowercase();
    let source = if lower.contains("burner") || lower.contains("fuel") {
        EnergySource::Burner
    } else {
        EnergySource::Electric
    };
    let zero = Energy { kw: 0.0, source };

    let Some(caps) = POWER_REGEX.captures(&cleaned) else {
        return Parsed::warn(zero, ParseWarning::new(field, raw, "no power figure"));
    };
    let Some(unit) = caps.get(2) else {
        return Parsed::warn(zero, ParseWarning::new(field, raw, "missing power unit"));
    };
    let Some(multiplier) = rules.power_multiplier(unit.as_str()) else {
        return Parsed::warn(
            zero,
            ParseWarning::new(field, raw, format!("unknown power unit {}", unit.as_str())),
        );
    };

    match caps[1].parse::<f64>() {
        Ok(value) if value.is_finite() => Parsed::ok(Energy {
            kw: value * multiplier,
            source,
        }),
        _ => Parsed::warn(zero, ParseWarning::new(field, raw, "not a number")),
    }
}

fn split_sides<'a>(text: &'a str, separators: &[String]) -> (&'a str, Option<&'a str>) {
    let split = separators
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()).map(|pos| (pos, s.len())))
        .min_by_key(|(pos, _)| *pos);

    match split {
        Some((pos, len)) => (&text[..pos], Some(&text[pos + len..])),
        None => (text, None),
    }
}

fn parse_side(
    field: &str,
    side: &str,
    rules: &ParseRules,
    warnings: &mut Vec<ParseWarning>,
) -> Vec<(String, f64)> {
    let mut entries = Vec::new();
    for part in side.split(rules.list_separator.as_str()) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, qty) = match part.rsplit_once(',') {
            Some((name, qty)) => {
                let parsed = parse_number(field, qty, rules);
                (name.trim(), parsed.take(warnings))
            }
            None => {
                warnings.push(ParseWarning::new(field, part, "missing quantity"));
                (part, 0.0)
            }
        };
        if name.is_empty() {
            warnings.push(ParseWarning::new(field, part, "missing ingredient name"));
            continue;
        }
        entries.push((rules.canonical_name(name).to_string(), qty));
    }
    entries
}

fn add_entry(entries: &mut Vec<(String, f64)>, name: String, qty: f64) {
    match entries.iter_mut().find(|(n, _)| *n == name) {
        Some((_, existing)) => *existing += qty,
        None => entries.push((name, qty)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> ParseRules {
        ParseRules::default()
    }

    fn entry(name: &str, qty: f64) -> (String, f64) {
        (name.to_string(), qty)
    }

    #[test]
    fn number_plain_and_decimal() {
        assert_eq!(parse_number("f", "50", &rules()).value, 50.0);
        assert_eq!(parse_number("f", " 2.5 ", &rules()).value, 2.5);
        assert_eq!(parse_number("f", ".5", &rules()).value, 0.5);
    }

    #[test]
    fn number_fraction() {
        let parsed = parse_number("f", "1/4", &rules());
        assert_eq!(parsed.value, 0.25);
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn number_ignores_trailing_text() {
        let parsed = parse_number("pollution", "10 {{Translation|/m}}", &rules());
        assert_eq!(parsed.value, 10.0);
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn number_missing_defaults_to_zero() {
        let parsed = parse_number("stack-size", "", &rules());
        assert_eq!(parsed.value, 0.0);
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].reason, "missing value");
        assert_eq!(parsed.warnings[0].field, "stack-size");
    }

    #[test]
    fn number_garbage_defaults_to_zero() {
        for raw in ["?", "unknown", "-", "{{Icon|Coal|1}}"] {
            let parsed = parse_number("f", raw, &rules());
            assert_eq!(parsed.value, 0.0, "raw {:?}", raw);
            assert_eq!(parsed.warnings.len(), 1, "raw {:?}", raw);
        }
    }

    #[test]
    fn number_division_by_zero_is_a_warning() {
        let parsed = parse_number("f", "1/0", &rules());
        assert_eq!(parsed.value, 0.0);
        assert_eq!(parsed.warnings[0].reason, "not a finite number");
    }

    #[test]
    fn ingredients_basic_recipe() {
        let parsed = parse_ingredients(
            "recipe",
            "Time, 2 + Iron gear wheel, 3 + Iron plate, 3 + Stone furnace, 1",
            &rules(),
        );
        assert!(parsed.warnings.is_empty());
        assert_eq!(parsed.value.time, 2.0);
        assert_eq!(
            parsed.value.inputs,
            vec![
                entry("Iron gear wheel", 3.0),
                entry("Iron plate", 3.0),
                entry("Stone furnace", 1.0)
            ]
        );
        assert!(parsed.value.outputs.is_empty());
    }

    #[test]
    fn ingredients_with_output_side() {
        let parsed = parse_ingredients(
            "recipe",
            "Time, 12 + Uranium ore, 10 = Uranium-235, 0.007 + Uranium-238, 0.993",
            &rules(),
        );
        assert!(parsed.warnings.is_empty());
        assert_eq!(parsed.value.inputs, vec![entry("Uranium ore", 10.0)]);
        assert_eq!(
            parsed.value.outputs,
            vec![entry("Uranium-235", 0.007), entry("Uranium-238", 0.993)]
        );
    }

    #[test]
    fn ingredients_arrow_separator() {
        let parsed = parse_ingredients("recipe", "Time, 0.5 + Copper plate, 1 → Copper cable, 2", &rules());
        assert_eq!(parsed.value.outputs, vec![entry("Copper cable", 2.0)]);
    }

    #[test]
    fn ingredients_duplicate_names_are_summed() {
        let parsed = parse_ingredients("recipe", "Time, 1 + Coal, 1 + Coal, 2", &rules());
        assert_eq!(parsed.value.inputs, vec![entry("Coal", 3.0)]);
    }

    #[test]
    fn ingredients_aliases_are_resolved() {
        let parsed = parse_ingredients("recipe", "Time, 0.5 + Raw wood, 1", &rules());
        assert_eq!(parsed.value.inputs, vec![entry("Wood", 1.0)]);
    }

    #[test]
    fn ingredients_missing_time_warns() {
        let parsed = parse_ingredients("recipe", "Iron plate, 2", &rules());
        assert_eq!(parsed.value.time, 0.0);
        assert_eq!(parsed.value.inputs, vec![entry("Iron plate", 2.0)]);
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].reason, "missing crafting time");
    }

    #[test]
    fn ingredients_missing_quantity_defaults_to_zero() {
        let parsed = parse_ingredients("recipe", "Time, 1 + Iron plate", &rules());
        assert_eq!(parsed.value.inputs, vec![entry("Iron plate", 0.0)]);
        assert_eq!(parsed.warnings[0].reason, "missing quantity");
    }

    #[test]
    fn ingredients_bad_quantity_defaults_to_zero() {
        let parsed = parse_ingredients("recipe", "Time, 1 + Iron plate, lots", &rules());
        assert_eq!(parsed.value.inputs, vec![entry("Iron plate", 0.0)]);
        assert_eq!(parsed.warnings[0].reason, "not a number");
    }

    #[test]
    fn ingredients_empty_recipe() {
        let parsed = parse_ingredients("recipe", "  ", &rules());
        assert_eq!(parsed.value, Ingredients::default());
        assert_eq!(parsed.warnings[0].reason, "empty recipe");
    }

    #[test]
    fn ingredients_tolerate_stray_separators() {
        let parsed = parse_ingredients("recipe", "Time, 1 + + Iron plate, 1 +", &rules());
        assert!(parsed.warnings.is_empty());
        assert_eq!(parsed.value.inputs, vec![entry("Iron plate", 1.0)]);
    }

    #[test]
    fn ingredients_with_markup() {
        let parsed = parse_ingredients(
            "recipe",
            "Time, 1 + [[Iron plate]], 2<!-- was 3 --> + {{Icon|x}}Copper cable, 3",
            &rules(),
        );
        assert_eq!(
            parsed.value.inputs,
            vec![entry("Iron plate", 2.0), entry("Copper cable", 3.0)]
        );
    }

    #[test]
    fn producers_basic() {
        let parsed = parse_producers(
            "producers",
            "Manual + Assembling machine 2 + Assembling machine 3",
            &rules(),
        );
        assert!(parsed.warnings.is_empty());
        assert_eq!(
            parsed.value,
            vec!["Manual", "Assembling machine 2", "Assembling machine 3"]
        );
    }

    #[test]
    fn producers_deduplicated() {
        let parsed = parse_producers("producers", "Manual + Manual", &rules());
        assert_eq!(parsed.value, vec!["Manual"]);
    }

    #[test]
    fn producers_empty_warns() {
        let parsed = parse_producers("producers", "", &rules());
        assert!(parsed.value.is_empty());
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn energy_burner_kw() {
        let parsed = parse_energy("energy", "300 {{Translation|kW}} burner", &rules());
        assert!(parsed.warnings.is_empty());
        assert_eq!(
            parsed.value,
            Energy {
                kw: 300.0,
                source: EnergySource::Burner
            }
        );
    }

    #[test]
    fn energy_electric_mw() {
        let parsed = parse_energy("energy", "5.4 MW electric", &rules());
        assert_eq!(parsed.value.kw, 5400.0);
        assert_eq!(parsed.value.source, EnergySource::Electric);
    }

    #[test]
    fn energy_defaults_to_electric() {
        let parsed = parse_energy("energy", "150 kW", &rules());
        assert_eq!(parsed.value.source, EnergySource::Electric);
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn energy_missing_unit_is_zero() {
        let parsed = parse_energy("energy", "150", &rules());
        assert_eq!(parsed.value.kw, 0.0);
        assert_eq!(parsed.warnings[0].reason, "missing power unit");
    }

    #[test]
    fn energy_unknown_unit_is_zero() {
        let parsed = parse_energy("energy", "3 hp", &rules());
        assert_eq!(parsed.value.kw, 0.0);
        assert_eq!(parsed.warnings[0].reason, "unknown power unit hp");
    }

    #[test]
    fn energy_garbage_is_zero() {
        let parsed = parse_energy("energy", "varies", &rules());
        assert_eq!(parsed.value.kw, 0.0);
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn parsed_take_moves_warnings() {
        let mut sink = Vec::new();
        let value = parse_number("f", "x", &rules()).take(&mut sink);
        assert_eq!(value, 0.0);
        assert_eq!(sink.len(), 1);
    }
}
