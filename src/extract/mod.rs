//! Field extraction for a single candidate node.
//!
//! Each extractor returns `Result<T, ExtractionOutcome>`; [`FieldExtractors`]
//! turns misses into the documented defaults so a post is always produced.
//!
//! - author → "Unknown", no id, no profile URL
//! - body text → empty (and `extraction_success = false`)
//! - timestamp → extraction time
//! - media → empty list
//! - reactions → 0
//! - replies → empty list

mod author;
mod config;
mod group;
mod media;
mod payload;
mod reactions;
mod replies;
mod text;
mod timestamp;

pub use config::ExtractConfig;
pub use group::{group_id_from_url, group_info};
pub use reactions::parse_count;

use std::sync::LazyLock;

use scraper::{ElementRef, Selector};
use tracing::trace;
use url::Url;

use crate::domain::{Author, Item, Reply};
use crate::identity::Identity;

/// Why an extractor produced nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    NotFound,
    Malformed(String),
}

pub type Extraction<T> = std::result::Result<T, ExtractionOutcome>;

/// Nodes that hold a reply rather than post content.
pub(crate) static REPLY_NODES: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "[aria-label^=\"Comment by\"], [aria-label^=\"Reply by\"], [data-commentid], \
         [data-comment-id], [data-sigil=\"comment\"], .comment",
    )
    .unwrap()
});

/// True when `node` is, or sits inside, a reply nested below `root`.
pub(crate) fn in_nested_reply(node: &ElementRef<'_>, root: &ElementRef<'_>) -> bool {
    if node.id() == root.id() {
        return false;
    }
    if REPLY_NODES.matches(node) {
        return true;
    }
    for ancestor in node.ancestors() {
        if ancestor.id() == root.id() {
            return false;
        }
        if ElementRef::wrap(ancestor).is_some_and(|el| REPLY_NODES.matches(&el)) {
            return true;
        }
    }
    false
}

pub(crate) fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible text of `node`; script and style bodies are skipped.
pub(crate) fn element_text(node: &ElementRef<'_>) -> String {
    let parts: Vec<&str> = node
        .descendants()
        .filter(|n| !in_script(n))
        .filter_map(|n| n.value().as_text().map(|t| &**t))
        .collect();
    normalize_whitespace(&parts.join(" "))
}

pub(crate) fn in_script(node: &ego_tree::NodeRef<'_, scraper::Node>) -> bool {
    node.parent()
        .and_then(ElementRef::wrap)
        .is_some_and(|parent| matches!(parent.value().name(), "script" | "style" | "noscript"))
}

pub(crate) fn resolve_url(href: &str, base: Option<&Url>) -> Option<Url> {
    match Url::parse(href) {
        Ok(url) => Some(url),
        Err(_) => base.and_then(|b| b.join(href).ok()),
    }
}

fn or_default<T>(field: &str, result: Extraction<T>, default: impl FnOnce() -> T) -> T {
    match result {
        Ok(value) => value,
        Err(outcome) => {
            trace!("{} extractor fell back to default: {:?}", field, outcome);
            default()
        }
    }
}

/// Composes the individual extractors into posts and replies.
pub struct FieldExtractors {
    config: ExtractConfig,
    base_url: Option<Url>,
}

impl FieldExtractors {
    pub fn new(config: ExtractConfig, base_url: Option<Url>) -> Self {
        Self { config, base_url }
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    pub fn author(&self, node: &ElementRef<'_>) -> Author {
        or_default(
            "author",
            author::extract_author(node, self.base_url.as_ref()),
            Author::unknown,
        )
    }

    pub fn body_text(&self, node: &ElementRef<'_>, author: &Author) -> String {
        let supplementary = if self.config.mine_script_payloads {
            or_default("payload", payload::mine_payload_text(node), Vec::new)
        } else {
            Vec::new()
        };
        let author_name = (!author.is_unknown()).then_some(author.name.as_str());
        or_default(
            "text",
            text::extract_body_text(node, &self.config, author_name, supplementary),
            String::new,
        )
    }

    pub fn timestamp(&self, node: &ElementRef<'_>) -> String {
        or_default(
            "timestamp",
            timestamp::extract_timestamp(node),
            timestamp::now_iso,
        )
    }

    pub fn media(&self, node: &ElementRef<'_>) -> Vec<String> {
        or_default(
            "media",
            media::extract_media(node, self.base_url.as_ref(), &self.config.icon_substrings),
            Vec::new,
        )
    }

    pub fn reactions(&self, node: &ElementRef<'_>) -> u64 {
        or_default("reactions", reactions::extract_reactions(node), || 0)
    }

    pub fn replies(&self, node: &ElementRef<'_>) -> Vec<Reply> {
        if !self.config.include_replies {
            return Vec::new();
        }
        or_default("replies", replies::extract_replies(node, self), Vec::new)
    }

    /// One reply, or `None` when it carries neither text nor media.
    pub fn reply(&self, node: &ElementRef<'_>) -> Option<Reply> {
        let author = self.author(node);
        let text = self.body_text(node, &author);
        let images = self.media(node);
        if text.is_empty() && images.is_empty() {
            return None;
        }
        Some(Reply {
            timestamp: self.timestamp(node),
            author,
            text,
            images,
        })
    }

    /// Full post record for a candidate whose identity is already resolved.
    pub fn item(&self, identity: &Identity, node: &ElementRef<'_>) -> Item {
        let author = self.author(node);
        let text = self.body_text(node, &author);
        Item {
            id: identity.key.clone(),
            low_confidence: identity.is_low_confidence(),
            extraction_success: !text.is_empty(),
            timestamp: self.timestamp(node),
            images: self.media(node),
            reactions: self.reactions(node),
            comments: self.replies(node),
            author,
            text,
        }
    }
}
