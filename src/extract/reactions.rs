use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};

use crate::extract::{element_text, in_nested_reply, Extraction, ExtractionOutcome};

static LABELLED: LazyLock<Selector> = LazyLock::new(|| Selector::parse("[aria-label]").unwrap());
static REACTION_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)reaction|\blike").unwrap());

static COUNTERS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        "[data-reaction-count]",
        "[data-testid=\"UFI2ReactionsCount/sentenceWithSocialContext\"]",
        ".reaction-count",
        "._81hb",
    ]
    .iter()
    .map(|css| Selector::parse(css).unwrap())
    .collect()
});

static COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3}(?:,\d{3})+|\d+(?:[.,]\d+)?)\s*([KkMm])?\b").unwrap()
});

/// Reaction total from the first accessible label or counter carrying a number.
pub(crate) fn extract_reactions(root: &ElementRef<'_>) -> Extraction<u64> {
    for node in root.select(&LABELLED) {
        if in_nested_reply(&node, root) {
            continue;
        }
        let Some(label) = node.value().attr("aria-label") else {
            continue;
        };
        if REACTION_LABEL.is_match(label) {
            if let Some(count) = parse_count(label) {
                return Ok(count);
            }
        }
    }

    for selector in COUNTERS.iter() {
        for node in root.select(selector) {
            if in_nested_reply(&node, root) {
                continue;
            }
            let text = node
                .value()
                .attr("data-reaction-count")
                .map(str::to_string)
                .unwrap_or_else(|| element_text(&node));
            if let Some(count) = parse_count(&text) {
                return Ok(count);
            }
        }
    }

    Err(ExtractionOutcome::NotFound)
}

/// Parse counters like `12`, `1,204`, `1.2K` or `3M`.
pub fn parse_count(text: &str) -> Option<u64> {
    let caps = COUNT.captures(text)?;
    let number = &caps[1];
    let multiplier = match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(ref s) if s == "k" => 1_000.0,
        Some(ref s) if s == "m" => 1_000_000.0,
        _ => 1.0,
    };

    if multiplier == 1.0 {
        return number.replace(',', "").parse::<u64>().ok().or_else(|| {
            number
                .replace(',', ".")
                .parse::<f64>()
                .ok()
                .map(|v| v.round() as u64)
        });
    }

    let value: f64 = number.replace(',', ".").parse().ok()?;
    Some((value * multiplier).round() as u64)
}
