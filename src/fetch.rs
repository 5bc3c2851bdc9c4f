use crate::artifact::save_fetch;
use crate::config::{ARCHIVED_CATEGORY, INFOBOX_CATEGORY, INTERMEDIATE_CATEGORY, TITLES_PER_QUERY};
use crate::infobox::first_infobox;
use crate::models::{FetchDocument, FetchError, ItemRecord};
use crate::rules::ParseRules;
use crate::stats::FetchStats;
use crate::table::parse_table;
use crate::wiki::{
    category_params, page_content, page_id, page_title, query_pages, titles_params, QueryApi,
    WikiClient,
};
use crate::wikitext::strip_namespace;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct FetchConfig {
    pub output_dir: PathBuf,
    pub api_url: String,
    pub rules: ParseRules,
}

/// Fetches archived titles, infobox pages and intermediate-product tables.
///
/// Category listings must succeed. Individual pages that cannot be fetched or
/// parsed become [`FetchError`]s in the document and the run carries on.
pub async fn fetch_document<A: QueryApi>(api: &A, rules: &ParseRules) -> Result<(FetchDocument, FetchStats)> {
    let mut doc = FetchDocument::default();
    let mut stats = FetchStats::default();

    let spinner = make_spinner("Getting archived items");
    let archived = query_pages(api, &category_params(ARCHIVED_CATEGORY, false), &spinner)
        .await
        .context("Failed to list archived pages")?;
    doc.archived = archived.iter().filter_map(page_title).map(str::to_string).collect();
    spinner.finish_and_clear();
    stats.archived_titles = doc.archived.len();
    info!(count = doc.archived.len(), "Archived titles");

    let spinner = make_spinner("Listing infobox pages");
    let listed = query_pages(api, &category_params(INFOBOX_CATEGORY, false), &spinner)
        .await
        .context("Failed to list infobox pages")?;
    spinner.finish_and_clear();
    let titles: Vec<String> = listed.iter().filter_map(page_title).map(str::to_string).collect();
    stats.infobox_pages = titles.len();
    info!(count = titles.len(), "Infobox pages");

    let pages = fetch_titles(api, &titles, "content", &mut doc.errors).await;

    for page in &pages {
        match item_record(page, &doc.archived) {
            Ok(item) => {
                if doc.items.contains_key(&item.title) {
                    warn!(title = %item.title, "Duplicate infobox page, keeping the last one");
                }
                doc.items.insert(item.title.clone(), item);
            }
            Err(reason) => record_error(&mut doc.errors, page_title(page).unwrap_or("?"), reason),
        }
    }
    stats.items = doc.items.len();

    let needed: Vec<String> = doc
        .items
        .values()
        .filter(|item| needs_table(item, rules))
        .map(|item| item.title.clone())
        .collect();
    info!(count = needed.len(), "Filling in intermediate products");

    for page in fetch_titles(api, &needed, "tables", &mut doc.errors).await {
        let Some(title) = page_title(&page) else {
            continue;
        };
        let Some(content) = page_content(&page) else {
            record_error(&mut doc.errors, title, "no revision content".to_string());
            continue;
        };
        match parse_table(content) {
            Ok(tables) if tables.is_empty() => debug!(title, "No recipe table"),
            Ok(tables) => match doc.items.get_mut(title) {
                Some(item) => {
                    stats.table_pages += 1;
                    stats.table_recipes += tables.len();
                    item.tables = tables;
                }
                None => debug!(title, "Table page has no matching item"),
            },
            Err(e) => record_error(&mut doc.errors, title, format!("failed to parse: {}", e)),
        }
    }

    stats.errors = doc.errors.len();
    Ok((doc, stats))
}

/// Fetches `titles` in API-sized batches. A failed batch is retried one title
/// at a time, so only the pages that keep failing become errors.
async fn fetch_titles<A: QueryApi>(
    api: &A,
    titles: &[String],
    label: &str,
    errors: &mut Vec<FetchError>,
) -> Vec<Value> {
    let chunks: Vec<&[String]> = titles.chunks(TITLES_PER_QUERY).collect();
    let pb = make_progress_bar(chunks.len() as u64, label);
    let mut pages = Vec::new();

    for chunk in chunks {
        match query_pages(api, &titles_params(chunk), &ProgressBar::hidden()).await {
            Ok(batch) => pages.extend(batch),
            Err(e) if chunk.len() == 1 => record_error(errors, &chunk[0], format!("{:#}", e)),
            Err(e) => {
                warn!(titles = chunk.len(), "Batch failed, fetching its pages one by one: {e:#}");
                for title in chunk {
                    let params = titles_params(std::slice::from_ref(title));
                    match query_pages(api, &params, &ProgressBar::hidden()).await {
                        Ok(batch) => pages.extend(batch),
                        Err(e) => record_error(errors, title, format!("{:#}", e)),
                    }
                }
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    pages
}

fn item_record(page: &Value, archived: &BTreeSet<String>) -> std::result::Result<ItemRecord, String> {
    let raw_title = page_title(page).ok_or("page without title")?;
    let content = page_content(page).ok_or("no revision content")?;
    let infobox = first_infobox(content).ok_or("no infobox")?;

    let title = strip_namespace(raw_title).to_string();
    Ok(ItemRecord {
        page_id: page_id(page).unwrap_or_default(),
        archived: archived.contains(&title),
        title,
        fields: infobox.into_field_map(),
        tables: Vec::new(),
    })
}

/// Live intermediate products whose infobox carries no recipe of its own.
fn needs_table(item: &ItemRecord, rules: &ParseRules) -> bool {
    !item.archived
        && item.category() == Some(INTERMEDIATE_CATEGORY)
        && item.field(&rules.recipe_field).is_none()
        && item.field("cost").is_none()
}

fn record_error(errors: &mut Vec<FetchError>, title: &str, reason: String) {
    warn!(title, reason = %reason, "Page skipped");
    errors.push(FetchError {
        title: title.to_string(),
        reason,
    });
}

/// Fetch stage entry point: query the wiki and save the fetch document.
pub async fn run_fetch(config: FetchConfig) -> Result<()> {
    let start = Instant::now();
    let client = WikiClient::new(&config.api_url)?;
    info!(api = %config.api_url, "Fetching from wiki");

    let (doc, stats) = fetch_document(&client, &config.rules).await?;
    save_fetch(&doc, &config.output_dir)?;

    stats.print_summary(client.counters(), start.elapsed());
    Ok(())
}

fn make_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg} ({pos} pages)")
            .unwrap(),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb.set_message(msg.to_string());
    pb
}

fn make_progress_bar(total: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "    {{spinner:.cyan}} {label:<10} [{{bar:30.cyan/blue}}] {{pos}}/{{len}} batches"
            ))
            .unwrap()
            .progress_chars("=> "),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
