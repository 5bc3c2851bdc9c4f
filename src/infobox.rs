//! `{{Infobox ...}}` extraction from page wikitext.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

static INFOBOX_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\{\{\s*infobox[\s_|}]").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Infobox {
    pub name: String,
    /// Fields in page order, values untouched
    pub fields: Vec<(String, String)>,
}

impl Infobox {
    /// Parses the text between the opening `{{` and the closing `}}`.
    fn parse(inner: &str) -> Option<Self> {
        let mut segments = split_at_depth_zero(inner).into_iter();
        let name = segments.next()?.trim();
        if name.is_empty() {
            return None;
        }

        let fields = segments
            .filter_map(|segment| segment.split_once('='))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .filter(|(key, _)| !key.is_empty())
            .collect();

        Some(Self {
            name: name.to_string(),
            fields,
        })
    }

    /// Field map; a repeated key keeps its last value, as MediaWiki does.
    pub fn into_field_map(self) -> BTreeMap<String, String> {
        self.fields.into_iter().collect()
    }
}

/// Every infobox on the page, in order. Scanning stops at the first one
/// whose braces never close.
pub fn extract_infoboxes(text: &str) -> Vec<Infobox> {
    let mut found = Vec::new();
    let mut from = 0;

    while let Some(m) = INFOBOX_START.find_at(text, from) {
        let Some(end) = closing_braces(text, m.start()) else {
            break;
        };
        found.extend(Infobox::parse(&text[m.start() + 2..end]));
        from = end + 2;
    }

    found
}

/// Infobox pages on the wiki hold exactly one `{{Infobox ...}}`; anything after it is ignored.
pub fn first_infobox(text: &str) -> Option<Infobox> {
    extract_infoboxes(text).into_iter().next()
}

/// Byte offset of the `}}` closing the template that opens at `start`.
pub(crate) fn closing_braces(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth: usize = 0;
    let mut i = start;

    while i + 1 < bytes.len() {
        match &bytes[i..i + 2] {
            b"{{" => {
                depth += 1;
                i += 2;
            }
            b"}}" => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
                i += 2;
            }
            _ => i += 1,
        }
    }
    None
}

/// Splits on `|` outside nested `{{ }}` templates and `[[ ]]` links.
pub(crate) fn split_at_depth_zero(content: &str) -> Vec<&str> {
    let bytes = content.as_bytes();
    let mut segments = Vec::new();
    let mut depth: i32 = 0;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes.get(i..i + 2) {
            Some(b"{{") | Some(b"[[") => {
                depth += 1;
                i += 2;
                continue;
            }
            Some(b"}}") | Some(b"]]") => {
                depth -= 1;
                i += 2;
                continue;
            }
            _ => {}
        }
        if bytes[i] == b'|' && depth <= 0 {
            segments.push(&content[start..i]);
            start = i + 1;
        }
        i += 1;
    }

    segments.push(&content[start..]);
    segments
}
