//! factorio-lp: Factorio wiki recipes to a dense recipe matrix, and production
//! planning as a linear program over it.
//!
//! The pipeline has three stages, each a standalone command whose output is
//! the next one's input:
//!
//! 1. **Fetch**: Query the wiki's MediaWiki API for every infobox page, the
//!    archived-page category and the recipe tables of intermediate products.
//!    Saved as one compressed JSON document keyed by item name.
//! 2. **Preprocess**: Parse the free-text infobox fields into recipes, resolve
//!    the machine each recipe runs on, and build a dense resources x recipes
//!    matrix of net rates per second. Saved as a CSV table plus a binary matrix
//!    with a metadata sidecar, both from the same in-memory matrix.
//! 3. **Analyse**: Formulate `minimize c·x` with `c = expense·M`, sustainability
//!    rows for every intermediate resource and user constraints, and solve it.
//!
//! # Key Modules
//!
//! - [`wiki`] -- MediaWiki client with continuation paging and retries
//! - [`fetch`] -- Fetch stage with per-page failure isolation
//! - [`infobox`] -- Brace-aware `{{Infobox ...}}` extraction
//! - [`table`] -- Intermediate product recipe tables
//! - [`fields`] -- Pure field parsers returning a value plus warnings
//! - [`rules`] -- Configurable parsing heuristics
//! - [`recipe`] -- Recipes and machine specs from the fetch document
//! - [`matrix`] -- The dense recipe matrix and its labels
//! - [`artifact`] -- Compressed artifacts with atomic writes
//! - [`lp`] / [`solve`] -- LP formulation and solver
//!
//! # Example Usage
//!
//! ```bash
//! factorio-lp fetch -o data/
//! factorio-lp preprocess -o data/
//! factorio-lp analyse -o data/ --config plan.json
//! ```

pub mod analyse;
pub mod artifact;
pub mod config;
pub mod error;
pub mod fetch;
pub mod fields;
pub mod infobox;
pub mod lp;
pub mod matrix;
pub mod models;
pub mod preprocess;
pub mod recipe;
pub mod rules;
pub mod solve;
pub mod stats;
pub mod table;
pub mod wiki;
pub mod wikitext;
