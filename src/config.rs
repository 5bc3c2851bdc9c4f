/// MediaWiki API endpoint for the Factorio wiki
pub const DEFAULT_API_URL: &str = "https://wiki.factorio.com/api.php";

/// Category listing every infobox page (one per item, machine and technology)
pub const INFOBOX_CATEGORY: &str = "Infobox_page";

/// Category listing pages for content removed from the game
pub const ARCHIVED_CATEGORY: &str = "Archived";

/// Category of items whose recipes live in page tables instead of the infobox
pub const INTERMEDIATE_CATEGORY: &str = "Intermediate products";

/// Members requested per `categorymembers` page
pub const CATEGORY_PAGE_LIMIT: u32 = 500;

/// MediaWiki caps `titles=` at 50 entries for anonymous clients
pub const TITLES_PER_QUERY: usize = 50;

/// Upper bound on followed continuation tokens for a single query
pub const MAX_CONTINUATIONS: u32 = 1000;

/// Attempts per wiki request, the first one included
pub const FETCH_MAX_ATTEMPTS: u32 = 5;

/// Base delay before the first retry; doubled on every further attempt
pub const FETCH_RETRY_DELAY_MS: u64 = 1000;

pub const FETCH_TIMEOUT_SECS: u64 = 30;

pub const USER_AGENT: &str = concat!("factorio-lp/", env!("CARGO_PKG_VERSION"));

/// Raw fetch document (bzip2-compressed JSON)
pub const FETCH_FILE: &str = "items.json.bz2";

/// Dense resources x recipes table (bzip2-compressed CSV)
pub const TABLE_FILE: &str = "recipes.csv.bz2";

/// Numeric matrix for the solver (bzip2-compressed bincode)
pub const MATRIX_FILE: &str = "recipes.bin.bz2";

/// Row/column labels and units for [`MATRIX_FILE`] (bzip2-compressed JSON)
pub const META_FILE: &str = "recipes-meta.json.bz2";

/// Bumped whenever the matrix or metadata layout changes
pub const FORMAT_VERSION: u32 = 1;

/// Maximum depth for following name alias chains
pub const ALIAS_MAX_DEPTH: u32 = 5;

/// Solution entries below this are reported as unused
pub const SOLUTION_EPSILON: f64 = 1e-9;
