use crate::infobox::{closing_braces, split_at_depth_zero};
use once_cell::sync::Lazy;
use regex::Regex;

static LINK_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[(?:[^|\]]+\|)?([^\]]+?)\]\]").unwrap());

static COMMENT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

static TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").unwrap());

/// Reduces a raw infobox value to plain text.
///
/// Templates named in `passthrough` (case-insensitive) are replaced by their last
/// argument, so `300 {{Translation|kW}}` becomes `300 kW`. Every other template is
/// dropped, links collapse to their display text and HTML is removed.
pub fn clean_value(text: &str, passthrough: &[String]) -> String {
    let expanded = expand_templates(text, passthrough);
    let no_comments = COMMENT_REGEX.replace_all(&expanded, "");
    let no_tags = TAG_REGEX.replace_all(&no_comments, " ");
    let no_links = LINK_REGEX.replace_all(&no_tags, "$1");
    collapse_whitespace(&no_links)
}

/// Collapses newlines into spaces so values stay on a single line.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Title with any namespace prefix removed (`Infobox:Iron plate` -> `Iron plate`).
pub fn strip_namespace(title: &str) -> &str {
    match title.split_once(':') {
        Some((_, rest)) => rest.trim(),
        None => title.trim(),
    }
}

fn expand_templates(text: &str, passthrough: &[String]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        // Unclosed template: drop the remainder
        let Some(close) = closing_braces(rest, open) else {
            return out;
        };
        if let Some(arg) = passthrough_argument(&rest[open + 2..close], passthrough) {
            out.push_str(&expand_templates(arg, passthrough));
        }
        rest = &rest[close + 2..];
    }

    out.push_str(rest);
    out
}

fn passthrough_argument<'a>(inner: &'a str, passthrough: &[String]) -> Option<&'a str> {
    let segments = split_at_depth_zero(inner);
    if segments.len() < 2 {
        return None;
    }
    let name = segments[0].trim();
    if !passthrough.iter().any(|p| p.eq_ignore_ascii_case(name)) {
        return None;
    }
    segments.last().map(|s| s.trim())
}
