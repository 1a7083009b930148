use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};
use url::Url;

use crate::domain::Author;
use crate::extract::{element_text, in_nested_reply, resolve_url, Extraction, ExtractionOutcome};

const MAX_NAME_CHARS: usize = 80;

static AUTHOR_NODES: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        "[data-author-name]",
        "h2 a",
        "h3 a",
        "h4 a",
        "strong a",
        "a strong",
        "[itemprop=\"author\"]",
        ".author",
        "a[href*=\"/user/\"]",
        "a[href*=\"profile.php\"]",
    ]
    .iter()
    .map(|css| Selector::parse(css).unwrap())
    .collect()
});

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

static PROFILE_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"/user/(\d+)",
        r"profile\.php\?(?:[^#]*&)?id=(\d+)",
        r"/people/[^/]+/(\d+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static VANITY_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/([A-Za-z0-9.]{3,})/?$").unwrap());

const RESERVED_PATHS: &[&str] = &[
    "groups", "events", "photo", "photo.php", "photos", "watch", "hashtag", "permalink.php",
    "story.php", "pages", "marketplace", "reel", "stories", "help", "login", "sharer",
];

pub(crate) fn extract_author(root: &ElementRef<'_>, base: Option<&Url>) -> Extraction<Author> {
    for selector in AUTHOR_NODES.iter() {
        for node in root.select(selector) {
            if in_nested_reply(&node, root) {
                continue;
            }

            let name = node
                .value()
                .attr("data-author-name")
                .map(|n| n.trim().to_string())
                .unwrap_or_else(|| element_text(&node));
            if name.is_empty() || name.chars().count() > MAX_NAME_CHARS {
                continue;
            }

            let href = profile_href(&node, root);
            let profile = href.and_then(|h| resolve_url(h, base));
            let id = profile.as_ref().and_then(parse_profile_id);

            return Ok(Author {
                name,
                id,
                profile_url: profile.map(|url| clean_profile_url(&url)),
            });
        }
    }
    Err(ExtractionOutcome::NotFound)
}

/// The link owning the author node: itself, an enclosing anchor, or a child anchor.
fn profile_href<'a>(node: &ElementRef<'a>, root: &ElementRef<'a>) -> Option<&'a str> {
    if let Some(href) = node.value().attr("href") {
        return Some(href);
    }
    for ancestor in node.ancestors() {
        if ancestor.id() == root.id() {
            break;
        }
        if let Some(el) = ElementRef::wrap(ancestor) {
            if el.value().name() == "a" {
                if let Some(href) = el.value().attr("href") {
                    return Some(href);
                }
            }
        }
    }
    node.select(&ANCHOR).next().and_then(|a| a.value().attr("href"))
}

pub(crate) fn parse_profile_id(url: &Url) -> Option<String> {
    let full = url.as_str();
    for pattern in PROFILE_ID_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(full) {
            return Some(caps[1].to_string());
        }
    }

    let caps = VANITY_PATH.captures(url.path())?;
    let vanity = &caps[1];
    if RESERVED_PATHS.contains(&vanity.to_ascii_lowercase().as_str()) {
        return None;
    }
    Some(vanity.to_string())
}

/// Drop tracking parameters, keeping only what identifies the profile.
fn clean_profile_url(url: &Url) -> String {
    let mut cleaned = url.clone();
    cleaned.set_fragment(None);
    if url.path().ends_with("profile.php") {
        let id = url
            .query_pairs()
            .find(|(k, _)| k == "id")
            .map(|(_, v)| v.into_owned());
        match id {
            Some(id) => cleaned.set_query(Some(&format!("id={}", id))),
            None => cleaned.set_query(None),
        }
    } else {
        cleaned.set_query(None);
    }
    cleaned.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn author(html: &str) -> Extraction<Author> {
        let doc = Html::parse_fragment(html);
        let root = doc
            .root_element()
            .children()
            .find_map(ElementRef::wrap)
            .unwrap();
        let base = Url::parse("https://www.facebook.com/groups/1/").unwrap();
        extract_author(&root, Some(&base))
    }

    #[test]
    fn test_heading_link_author() {
        let author = author(
            r#"<div><h3><a href="/groups/1/user/12345/?__cft__=abc">Jane Doe</a></h3></div>"#,
        )
        .unwrap();
        assert_eq!(author.name, "Jane Doe");
        assert_eq!(author.id.as_deref(), Some("12345"));
        assert_eq!(
            author.profile_url.as_deref(),
            Some("https://www.facebook.com/groups/1/user/12345/")
        );
    }

    #[test]
    fn test_profile_php_keeps_id_only() {
        let author = author(
            r#"<div><strong><a href="https://www.facebook.com/profile.php?id=777&amp;ref=x">Sam</a></strong></div>"#,
        )
        .unwrap();
        assert_eq!(author.id.as_deref(), Some("777"));
        assert_eq!(
            author.profile_url.as_deref(),
            Some("https://www.facebook.com/profile.php?id=777")
        );
    }

    #[test]
    fn test_vanity_profile() {
        let author = author(r#"<div><h2><a href="https://www.facebook.com/jane.doe.5">Jane</a></h2></div>"#).unwrap();
        assert_eq!(author.id.as_deref(), Some("jane.doe.5"));
    }

    #[test]
    fn test_strong_inside_anchor() {
        let author = author(r#"<div><a href="/user/42/"><strong>Alex</strong></a></div>"#).unwrap();
        assert_eq!(author.name, "Alex");
        assert_eq!(author.id.as_deref(), Some("42"));
    }

    #[test]
    fn test_name_without_link() {
        let author = author(r#"<div><span data-author-name="Pat">ignored</span></div>"#).unwrap();
        assert_eq!(author.name, "Pat");
        assert!(author.id.is_none());
        assert!(author.profile_url.is_none());
    }

    #[test]
    fn test_reserved_paths_are_not_profiles() {
        let url = Url::parse("https://www.facebook.com/groups/").unwrap();
        assert!(parse_profile_id(&url).is_none());
    }

    #[test]
    fn test_missing_author() {
        assert_eq!(author("<div><p>no names here</p></div>"), Err(ExtractionOutcome::NotFound));
    }
}
