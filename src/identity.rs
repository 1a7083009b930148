//! Stable identities for candidate nodes.
//!
//! Resolution falls through four tiers: structured metadata attributes,
//! permalink anchors, a content fingerprint, and finally a random id that is
//! flagged low-confidence. Fingerprint collisions between near-identical
//! posts are accepted: merging a rare duplicate costs less than missing posts.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::Item;
use crate::extract::{in_nested_reply, FieldExtractors};

const METADATA_KEYS: &[&str] = &[
    "top_level_post_id",
    "mf_story_key",
    "story_fbid",
    "post_id",
    "tl_objid",
];
const MAX_METADATA_DEPTH: usize = 16;

static METADATA_NODES: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("[data-ft], [data-store], [data-post-id], [data-story-id]").unwrap()
});
static ANCHORS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

static PERMALINK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"/(?:posts|permalink)/(\d+|pfbid[0-9A-Za-z]+)",
        r"[?&]story_fbid=(\d+|pfbid[0-9A-Za-z]+)",
        r"[?&]multi_permalinks=(\d+)",
        r"[?&]fbid=(\d+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static ID_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+|pfbid[0-9A-Za-z]+)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityTier {
    Metadata,
    Permalink,
    Fingerprint,
    Random,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub key: String,
    pub tier: IdentityTier,
}

impl Identity {
    pub fn is_low_confidence(&self) -> bool {
        self.tier == IdentityTier::Random
    }
}

/// Identities accepted so far in a run. Low-confidence identities are
/// random, so they never collide with each other.
#[derive(Debug, Default)]
pub struct IdentitySet {
    seen: HashSet<String>,
}

impl IdentitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        !identity.is_low_confidence() && self.seen.contains(&identity.key)
    }

    /// Record an accepted identity; returns false if it was already present.
    pub fn insert(&mut self, identity: &Identity) -> bool {
        self.seen.insert(identity.key.clone())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Resolve a candidate's identity. Never fails.
pub fn resolve_identity(node: &ElementRef<'_>, extractors: &FieldExtractors) -> Identity {
    if let Some(key) = metadata_id(node) {
        return Identity {
            key,
            tier: IdentityTier::Metadata,
        };
    }

    if let Some(key) = permalink_id(node) {
        return Identity {
            key,
            tier: IdentityTier::Permalink,
        };
    }

    let author = extractors.author(node);
    let text = extractors.body_text(node, &author);
    if !text.is_empty() || !author.is_unknown() {
        return Identity {
            key: Item::fingerprint(&author.name, &text),
            tier: IdentityTier::Fingerprint,
        };
    }

    Identity {
        key: format!("rnd_{}", Uuid::new_v4().simple()),
        tier: IdentityTier::Random,
    }
}

fn metadata_id(node: &ElementRef<'_>) -> Option<String> {
    std::iter::once(*node)
        .chain(
            node.select(&METADATA_NODES)
                .filter(|n| !in_nested_reply(n, node)),
        )
        .find_map(|el| {
            let attrs = el.value();
            for attr in ["data-post-id", "data-story-id"] {
                if let Some(v) = attrs.attr(attr).map(str::trim) {
                    if ID_VALUE.is_match(v) {
                        return Some(v.to_string());
                    }
                }
            }
            ["data-ft", "data-store"]
                .iter()
                .filter_map(|attr| attrs.attr(attr))
                .filter_map(|raw| serde_json::from_str::<Value>(raw).ok())
                .find_map(|json| find_metadata_key(&json, 0))
        })
}

fn find_metadata_key(value: &Value, depth: usize) -> Option<String> {
    if depth > MAX_METADATA_DEPTH {
        return None;
    }
    match value {
        Value::Object(map) => {
            for key in METADATA_KEYS {
                let found = match map.get(*key) {
                    Some(Value::String(s)) if ID_VALUE.is_match(s.trim()) => {
                        Some(s.trim().to_string())
                    }
                    Some(Value::Number(n)) => Some(n.to_string()),
                    _ => None,
                };
                if found.is_some() {
                    return found;
                }
            }
            map.values().find_map(|v| find_metadata_key(v, depth + 1))
        }
        Value::Array(items) => items.iter().find_map(|v| find_metadata_key(v, depth + 1)),
        _ => None,
    }
}

fn permalink_id(node: &ElementRef<'_>) -> Option<String> {
    let hrefs: Vec<&str> = node
        .select(&ANCHORS)
        .filter(|a| !in_nested_reply(a, node))
        .filter_map(|a| a.value().attr("href"))
        .collect();

    PERMALINK_PATTERNS.iter().find_map(|pattern| {
        hrefs
            .iter()
            .find_map(|href| pattern.captures(href).map(|caps| caps[1].to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractConfig;
    use scraper::Html;

    fn resolve(html: &str) -> Identity {
        let doc = Html::parse_fragment(html);
        let root = doc
            .root_element()
            .children()
            .find_map(ElementRef::wrap)
            .unwrap();
        resolve_identity(&root, &FieldExtractors::new(ExtractConfig::default(), None))
    }

    #[test]
    fn test_metadata_tier() {
        let id = resolve(
            r#"<div data-ft='{"mf_story_key":"2233","page_insights":{"1":{"post_context":{}}}}'><a href="/groups/1/posts/999/">x</a></div>"#,
        );
        assert_eq!(id.key, "2233");
        assert_eq!(id.tier, IdentityTier::Metadata);
    }

    #[test]
    fn test_metadata_nested_numeric() {
        let id = resolve(
            r#"<article><div data-ft='{"page_insights":{"9":{"post_context":{"story_fbid":[1]}}},"top_level_post_id":445566}'>x</div></article>"#,
        );
        assert_eq!(id.key, "445566");
        assert_eq!(id.tier, IdentityTier::Metadata);
    }

    #[test]
    fn test_malformed_metadata_falls_through() {
        let id = resolve(r#"<div data-ft="{broken"><a href="/groups/1/permalink/31337/">2h</a></div>"#);
        assert_eq!(id.key, "31337");
        assert_eq!(id.tier, IdentityTier::Permalink);
    }

    #[test]
    fn test_permalink_patterns() {
        assert_eq!(
            resolve(r#"<div><a href="/story.php?story_fbid=4455&amp;id=1">x</a></div>"#).key,
            "4455"
        );
        assert_eq!(
            resolve(r#"<div><a href="https://www.facebook.com/groups/g/posts/pfbid02abcXYZ/">x</a></div>"#).key,
            "pfbid02abcXYZ"
        );
    }

    #[test]
    fn test_reply_links_ignored() {
        let id = resolve(
            r#"<div><p>Body text for fingerprinting</p><div data-comment-id="1"><a href="/groups/1/posts/777/">reply link</a></div></div>"#,
        );
        assert_eq!(id.tier, IdentityTier::Fingerprint);
    }

    #[test]
    fn test_fingerprint_stable_across_rescans() {
        let body = "a".repeat(120) + " " + &"b".repeat(79);
        assert_eq!(body.len(), 200);
        let html = format!(
            r#"<div><h3><a href="/not-a-permalink">Jane Doe</a></h3><div dir="auto">{}</div></div>"#,
            body
        );
        let first = resolve(&html);
        let second = resolve(&html);
        assert_eq!(first.tier, IdentityTier::Fingerprint);
        assert_eq!(first, second);
        assert_eq!(first.key, Item::fingerprint("Jane Doe", &body));
    }

    #[test]
    fn test_random_tier_is_low_confidence() {
        let a = resolve("<div><span></span></div>");
        let b = resolve("<div><span></span></div>");
        assert_eq!(a.tier, IdentityTier::Random);
        assert!(a.is_low_confidence());
        assert!(a.key.starts_with("rnd_"));
        assert_ne!(a.key, b.key);
    }

    #[test]
    fn test_identity_set() {
        let mut set = IdentitySet::new();
        let id = Identity {
            key: "1".into(),
            tier: IdentityTier::Permalink,
        };
        assert!(!set.contains(&id));
        assert!(set.insert(&id));
        assert!(set.contains(&id));
        assert!(!set.insert(&id));
        assert_eq!(set.len(), 1);

        let random = Identity {
            key: "rnd_x".into(),
            tier: IdentityTier::Random,
        };
        set.insert(&random);
        assert!(!set.contains(&random));
        assert_eq!(set.len(), 2);
    }
}
