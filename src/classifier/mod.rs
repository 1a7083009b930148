//! Element classification: which nodes of a feed snapshot are posts.
//!
//! Matching is layered. A layout profile is chosen once per run from the
//! document's signature; its structural matchers collect candidates, a size
//! heuristic drops collapsed nodes, nested matches collapse to the outermost,
//! and policy filters (comments, sponsored units) prune what is left.

mod profile;

pub use profile::{ClassifierConfig, LayoutProfile, Matcher, GENERIC_PROFILE};

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};
use tracing::debug;

use crate::page::HEIGHT_ATTR;
use profile::CompiledProfile;

static REPLY_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(comment|reply)\b|\b(comment|reply) (by|from)\b").unwrap()
});

static SPONSORED_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(sponsored|suggested for you|suggested post|people you may know|promoted)$")
        .unwrap()
});

pub struct Classifier {
    profiles: Vec<CompiledProfile>,
    generic: CompiledProfile,
    active: Option<usize>,
    detected: bool,
    min_height_px: f64,
}

impl Classifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            profiles: config.profiles.iter().map(CompiledProfile::compile).collect(),
            generic: CompiledProfile::generic(config),
            active: None,
            detected: false,
            min_height_px: config.min_height_px,
        }
    }

    /// Pick the layout profile for this run. Only the first call inspects the
    /// document; later calls return the cached choice.
    pub fn detect_layout(&mut self, doc: &Html) -> &str {
        if !self.detected {
            self.active = self.profiles.iter().position(|profile| {
                profile
                    .signature
                    .as_ref()
                    .is_some_and(|sig| doc.select(sig).next().is_some())
            });
            self.detected = true;
            debug!("Detected feed layout: {}", self.active_profile().name);
        }
        &self.active_profile().name
    }

    /// Name of the active layout, if detection has run.
    pub fn active_layout(&self) -> Option<&str> {
        self.detected.then(|| self.active_profile().name.as_str())
    }

    fn active_profile(&self) -> &CompiledProfile {
        self.active
            .and_then(|idx| self.profiles.get(idx))
            .unwrap_or(&self.generic)
    }

    /// Locate the feed container, degrading to the whole document.
    pub fn container<'a>(&self, doc: &'a Html) -> ElementRef<'a> {
        self.active_profile()
            .containers
            .iter()
            .find_map(|sel| doc.select(sel).next())
            .unwrap_or_else(|| doc.root_element())
    }

    /// Container selectors of the active profile, or of every profile before
    /// detection has run.
    pub fn container_selectors(&self) -> &[String] {
        &self.active_profile().container_css
    }

    /// Top-level item candidates in document order.
    pub fn candidates<'a>(&self, doc: &'a Html) -> Vec<ElementRef<'a>> {
        let profile = self.active_profile();
        let container = self.container(doc);

        let structural: Vec<ElementRef<'a>> = container
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|el| profile.matchers.iter().any(|m| m.matches(el)))
            .filter(|el| self.tall_enough(el))
            .collect();

        let ids: HashSet<_> = structural.iter().map(|el| el.id()).collect();
        let candidates: Vec<ElementRef<'a>> = structural
            .into_iter()
            .filter(|el| !el.ancestors().any(|ancestor| ids.contains(&ancestor.id())))
            .filter(|el| !excluded_by_policy(el))
            .collect();
        debug!(
            "Classifier ({}) found {} candidates",
            profile.name,
            candidates.len()
        );
        candidates
    }

    fn tall_enough(&self, element: &ElementRef<'_>) -> bool {
        match element
            .value()
            .attr(HEIGHT_ATTR)
            .and_then(|h| h.trim().parse::<f64>().ok())
        {
            Some(height) => height >= self.min_height_px,
            // Static markup carries no layout information.
            None => true,
        }
    }
}

/// Comments, replies and sponsored units are not posts.
fn excluded_by_policy(element: &ElementRef<'_>) -> bool {
    if let Some(label) = element.value().attr("aria-label") {
        if REPLY_LABEL.is_match(label) || SPONSORED_TEXT.is_match(label.trim()) {
            return true;
        }
    }

    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty() && t.len() <= 40)
        .any(|t| SPONSORED_TEXT.is_match(t))
}
