//! Recipe tables on intermediate product pages.
//!
//! Pages such as *Heavy oil* list their recipes in a wikitable rather than the
//! infobox:
//!
//! ```text
//! {| class="wikitable"
//! ! Building !! Process !! Results
//! |-
//! | {{Imagelink|Oil refinery}} || {{Imagelink|Basic oil processing}} || {{Icon|Crude oil|100}} + {{icon|Time|5}} → {{Icon|Heavy oil|30}} + ({{Icon|Light oil|30}} {{Icon|Petroleum gas|40}})
//! |}
//! ```
//!
//! Cells are separated by `||`. Within a `Results` cell everything after the
//! `→` is an output.

use crate::models::TableRecipe;
use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static ICON_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        \{\{\s*
        (?P<kind>\w+?)                          # Icon, Imagelink, ...
        \s*\|\s*
        (?P<name>[^|{}]*?)
        (?:\s*\|\s*(?P<qty>[^|{}]*?))?          # quantity, optional
        (?:\s*\|[^{}]*)?                        # further arguments are ignored
        \}\}\s*
        (?P<sep>\|\||\+|→)?                     # cell break, ingredient join or side switch
        ",
    )
    .unwrap()
});

#[derive(Debug, Clone, PartialEq)]
struct Icon {
    kind: String,
    name: String,
    quantity: Option<String>,
    sep: String,
}

/// Parses every recipe row of the first table on the page.
///
/// A page without a table yields no recipes. A header row with an empty
/// heading is a layout this parser does not understand and also yields none.
/// Unknown headings and non-icon ingredients are errors.
pub fn parse_table(content: &str) -> Result<Vec<TableRecipe>> {
    if !content.contains("{|") {
        return Ok(Vec::new());
    }

    let flat = content.replace('\n', "");
    let after_open = match flat.split_once("{|") {
        Some((_, rest)) => rest,
        None => return Ok(Vec::new()),
    };
    let body = after_open
        .rsplit_once("|}")
        .map(|(body, _)| body)
        .unwrap_or(after_open);

    let mut rows = body.split("|-");
    let header = rows.next().unwrap_or_default();
    let heads: Vec<String> = match header.split_once('!') {
        Some((_, heads)) => heads
            .split("!!")
            .map(|h| h.trim().to_lowercase())
            .collect(),
        None => bail!("Table has no header row"),
    };

    let mut recipes = Vec::new();
    for row in rows {
        let mut recipe = TableRecipe::default();
        for (head, cell) in heads.iter().zip(cells(row)) {
            match head.as_str() {
                "process" | "building" => {
                    let name = cell.first().map(|icon| icon.name.clone());
                    if head == "process" {
                        recipe.process = name;
                    } else {
                        recipe.building = name;
                    }
                }
                "input" | "output" | "results" => {
                    let mut to_outputs = head == "output";
                    for icon in cell {
                        if !icon.kind.eq_ignore_ascii_case("icon") {
                            bail!("Unexpected resource type {}", icon.kind.to_lowercase());
                        }
                        let entry = (icon.name, icon.quantity.unwrap_or_default());
                        if to_outputs {
                            recipe.outputs.push(entry);
                        } else {
                            recipe.inputs.push(entry);
                        }
                        if head == "results" && icon.sep == "→" {
                            to_outputs = true;
                        }
                    }
                }
                "" => return Ok(Vec::new()),
                other => bail!("Unrecognized table heading {other}"),
            }
        }

        if !recipe.inputs.is_empty() || !recipe.outputs.is_empty() {
            recipes.push(recipe);
        }
    }

    Ok(recipes)
}

/// Groups the icons of one row into cells, splitting at `||`.
fn cells(row: &str) -> Vec<Vec<Icon>> {
    let mut cells = Vec::new();
    let mut cell = Vec::new();
    for caps in ICON_REGEX.captures_iter(row) {
        let icon = Icon {
            kind: caps["kind"].to_string(),
            name: caps["name"].trim().to_string(),
            quantity: caps
                .name("qty")
                .map(|q| q.as_str().trim().to_string())
                .filter(|q| !q.is_empty()),
            sep: caps
                .name("sep")
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
        };
        let end_of_cell = icon.sep == "||";
        cell.push(icon);
        if end_of_cell {
            cells.push(std::mem::take(&mut cell));
        }
    }
    if !cell.is_empty() {
        cells.push(cell);
    }
    cells
}
