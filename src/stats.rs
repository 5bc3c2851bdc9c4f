use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// HTTP counters shared by every query a [`crate::wiki::WikiClient`] issues.
#[derive(Default, Debug)]
pub struct RequestCounters {
    requests: AtomicU64,
    retries: AtomicU64,
    failures: AtomicU64,
}

impl RequestCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_requests(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failures(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct FetchStats {
    pub archived_titles: usize,
    pub infobox_pages: usize,
    pub items: usize,
    pub table_pages: usize,
    pub table_recipes: usize,
    pub errors: usize,
}

impl FetchStats {
    pub fn print_summary(&self, counters: &RequestCounters, elapsed: Duration) {
        println!();
        println!("=== Summary ===");
        println!("Fetch time:         {:.2}s", elapsed.as_secs_f64());
        println!("Requests:           {}", counters.requests());
        println!("Retries:            {}", counters.retries());
        println!();
        println!("Archived titles:    {}", self.archived_titles);
        println!("Infobox pages:      {}", self.infobox_pages);
        println!("Items parsed:       {}", self.items);
        println!("Table pages:        {}", self.table_pages);
        println!("Table recipes:      {}", self.table_recipes);
        println!("Page errors:        {}", self.errors);
    }
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct PreprocessStats {
    pub items: usize,
    pub not_interesting: usize,
    pub machines: usize,
    pub recipes: usize,
    pub columns: usize,
    pub resources: usize,
    pub dropped: usize,
    pub duplicates: usize,
    pub conflicts: usize,
    pub warnings: usize,
    pub nnz: usize,
    pub density: f64,
}

impl PreprocessStats {
    pub fn print_summary(&self, elapsed: Duration) {
        println!();
        println!("=== Summary ===");
        println!("Preprocess time:    {:.2}s", elapsed.as_secs_f64());
        println!();
        println!("Items:              {}", self.items);
        println!("Not interesting:    {}", self.not_interesting);
        println!("Machines:           {}", self.machines);
        println!("Recipes parsed:     {}", self.recipes);
        println!("Parse warnings:     {}", self.warnings);
        println!("Columns dropped:    {}", self.dropped);
        println!("Duplicate columns:  {}", self.duplicates);
        println!("Conflicting:        {}", self.conflicts);
        println!();
        println!(
            "Matrix:             {} resources x {} recipes",
            self.resources, self.columns
        );
        println!("Non-zero entries:   {}", self.nnz);
        println!("Density:            {:.4}", self.density);
    }
}
