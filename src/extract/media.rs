use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};
use url::Url;

use crate::extract::{in_nested_reply, resolve_url, Extraction, ExtractionOutcome};

/// Images at or below this size in either dimension are treated as icons.
const ICON_MAX_PX: u32 = 40;

static MEDIA_CONTAINER_IMAGES: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "[data-visualcompletion=\"media-vc-image\"], [data-visualcompletion=\"media-vc-image\"] img",
    )
    .unwrap()
});
static IMAGES: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());
static BACKGROUNDS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[style*=\"background-image\"]").unwrap());
static VIDEOS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("video, video source").unwrap());

static CSS_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"url\(\s*['"]?([^'")]+)['"]?\s*\)"#).unwrap());

/// Media locators of `root` in discovery order, deduplicated by exact match.
pub(crate) fn extract_media(
    root: &ElementRef<'_>,
    base: Option<&Url>,
    icon_substrings: &[String],
) -> Extraction<Vec<String>> {
    let mut raw: Vec<String> = Vec::new();

    for selector in [&*MEDIA_CONTAINER_IMAGES, &*IMAGES] {
        for node in root.select(selector) {
            if in_nested_reply(&node, root) || is_icon_sized(&node) {
                continue;
            }
            let el = node.value();
            if let Some(src) = el.attr("src").or_else(|| el.attr("data-src")) {
                raw.push(src.to_string());
            }
        }
    }

    for node in root.select(&BACKGROUNDS) {
        if in_nested_reply(&node, root) {
            continue;
        }
        if let Some(style) = node.value().attr("style") {
            raw.extend(CSS_URL.captures_iter(style).map(|c| c[1].to_string()));
        }
    }

    for node in root.select(&VIDEOS) {
        if in_nested_reply(&node, root) {
            continue;
        }
        raw.extend(node.value().attr("src").map(str::to_string));
    }

    let mut media: Vec<String> = Vec::new();
    for locator in raw {
        let locator = locator.trim();
        if locator.is_empty() || is_decorative(locator, icon_substrings) {
            continue;
        }
        let Some(resolved) = resolve_url(locator, base) else {
            continue;
        };
        let resolved = resolved.to_string();
        if !media.contains(&resolved) {
            media.push(resolved);
        }
    }

    if media.is_empty() {
        Err(ExtractionOutcome::NotFound)
    } else {
        Ok(media)
    }
}

fn is_decorative(locator: &str, icon_substrings: &[String]) -> bool {
    let lower = locator.to_ascii_lowercase();
    icon_substrings
        .iter()
        .any(|needle| lower.contains(&needle.to_ascii_lowercase()))
}

fn is_icon_sized(node: &ElementRef<'_>) -> bool {
    ["width", "height"].iter().any(|attr| {
        node.value()
            .attr(attr)
            .and_then(|v| v.trim().trim_end_matches("px").parse::<u32>().ok())
            .is_some_and(|px| px <= ICON_MAX_PX)
    })
}
