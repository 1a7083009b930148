use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};

use crate::extract::{
    element_text, in_nested_reply, in_script, normalize_whitespace, ExtractConfig, Extraction,
    ExtractionOutcome,
};

static CONTENT_NODES: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        "[data-ad-preview=\"message\"]",
        "[data-ad-comet-preview=\"message\"]",
        "[data-testid=\"post_message\"]",
        ".userContent",
        "[data-sigil=\"comment-body\"]",
        ".comment-body",
        "div[dir=\"auto\"]",
        "span[dir=\"auto\"]",
        "p",
    ]
    .iter()
    .map(|css| Selector::parse(css).unwrap())
    .collect()
});

static RELATIVE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(\d+\s*(s|m|h|d|w|y|mins?|hrs?|hours?|days?|weeks?|yrs?|years?)(\s+ago)?|just now|yesterday(\s+at\s+.*)?|\d{1,2}:\d{2}\s*(am|pm)?)$",
    )
    .unwrap()
});

static COUNTER_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[\d\s.,·kKmM]+$").unwrap());

/// Body text of `root`: every content-bearing fragment that survives the
/// filters, with near-duplicates folded into their longer relatives.
pub(crate) fn extract_body_text(
    root: &ElementRef<'_>,
    config: &ExtractConfig,
    author_name: Option<&str>,
    supplementary: Vec<String>,
) -> Extraction<String> {
    let mut fragments: Vec<String> = Vec::new();

    for selector in CONTENT_NODES.iter() {
        for node in root.select(selector) {
            if in_nested_reply(&node, root) {
                continue;
            }
            fragments.push(element_text(&node));
        }
    }

    if fragments.is_empty() {
        // No structured content node: fall back to loose text runs.
        fragments.extend(
            root.descendants()
                .filter(|node| node.value().is_text() && !in_script(node))
                .filter(|node| {
                    node.parent()
                        .and_then(ElementRef::wrap)
                        .is_some_and(|parent| !in_nested_reply(&parent, root))
                })
                .filter_map(|node| node.value().as_text().map(|t| normalize_whitespace(t))),
        );
    }

    fragments.extend(supplementary.into_iter().map(|t| normalize_whitespace(&t)));

    let kept: Vec<String> = fragments
        .into_iter()
        .filter(|text| keep_fragment(text, config, author_name))
        .collect();

    let folded = suppress_near_duplicates(kept, config.similarity_threshold);
    if folded.is_empty() {
        return Err(ExtractionOutcome::NotFound);
    }
    Ok(folded.join("\n"))
}

fn keep_fragment(text: &str, config: &ExtractConfig, author_name: Option<&str>) -> bool {
    if text.chars().count() < config.min_text_len {
        return false;
    }
    if author_name.is_some_and(|name| name.eq_ignore_ascii_case(text)) {
        return false;
    }
    if config
        .exclusion_phrases
        .iter()
        .any(|phrase| phrase.eq_ignore_ascii_case(text))
    {
        return false;
    }
    !RELATIVE_TIME.is_match(text) && !COUNTER_ONLY.is_match(text)
}

/// Drop fragments contained in, or too similar to, an already kept longer
/// fragment. Survivors keep their original order.
pub(crate) fn suppress_near_duplicates(fragments: Vec<String>, threshold: f64) -> Vec<String> {
    let mut by_length: Vec<usize> = (0..fragments.len()).collect();
    by_length.sort_by_key(|&i| std::cmp::Reverse(fragments[i].chars().count()));

    let mut kept: Vec<usize> = Vec::new();
    for idx in by_length {
        let candidate = &fragments[idx];
        let duplicate = kept.iter().any(|&k| {
            let longer = &fragments[k];
            longer.contains(candidate.as_str()) || similarity(longer, candidate) >= threshold
        });
        if !duplicate {
            kept.push(idx);
        }
    }

    kept.sort_unstable();
    kept.into_iter().map(|i| fragments[i].clone()).collect()
}

/// Sørensen–Dice coefficient over lowercase character bigrams.
pub(crate) fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    if a.len() < 2 || b.len() < 2 {
        return if a == b { 1.0 } else { 0.0 };
    }

    let mut counts: HashMap<(char, char), usize> = HashMap::new();
    for pair in a.windows(2) {
        *counts.entry((pair[0], pair[1])).or_default() += 1;
    }

    let mut shared = 0usize;
    for pair in b.windows(2) {
        if let Some(count) = counts.get_mut(&(pair[0], pair[1])) {
            if *count > 0 {
                *count -= 1;
                shared += 1;
            }
        }
    }

    (2 * shared) as f64 / ((a.len() - 1) + (b.len() - 1)) as f64
}
