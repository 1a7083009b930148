use regex::Regex;
use scraper::{ElementRef, Selector};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One structural rule for recognising an item element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Matcher {
    /// Any CSS selector, usually attribute based.
    Attribute(String),
    /// Matches `[role="<value>"]`.
    Role(String),
    /// Regex tested against the element's `class` attribute.
    ClassPattern(String),
}

/// Matchers for one known markup generation of the target site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutProfile {
    pub name: String,
    /// Selector whose presence in the document identifies this layout.
    pub signature: String,
    pub containers: Vec<String>,
    pub matchers: Vec<Matcher>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Candidates rendered shorter than this are treated as collapsed or decorative.
    pub min_height_px: f64,
    pub profiles: Vec<LayoutProfile>,
    /// Extra matchers only used when no profile signature matches.
    pub fallback_matchers: Vec<Matcher>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_height_px: 50.0,
            profiles: vec![
                LayoutProfile {
                    name: "comet-feed".into(),
                    signature: "[role=\"feed\"]".into(),
                    containers: vec!["[role=\"feed\"]".into()],
                    matchers: vec![
                        Matcher::Attribute("[data-pagelet^=\"FeedUnit\"]".into()),
                        Matcher::Attribute("div[aria-posinset]".into()),
                        Matcher::Role("article".into()),
                    ],
                },
                LayoutProfile {
                    name: "classic-group".into(),
                    signature: "#pagelet_group_mall, [data-pagelet=\"GroupFeed\"]".into(),
                    containers: vec![
                        "#pagelet_group_mall".into(),
                        "[data-pagelet=\"GroupFeed\"]".into(),
                    ],
                    matchers: vec![
                        Matcher::Attribute("div[data-ft]".into()),
                        Matcher::ClassPattern(r"\buserContentWrapper\b".into()),
                        Matcher::ClassPattern(r"\b_5pcr\b".into()),
                    ],
                },
                LayoutProfile {
                    name: "mobile-basic".into(),
                    signature: "#m_group_stories_container".into(),
                    containers: vec!["#m_group_stories_container".into()],
                    matchers: vec![
                        Matcher::Attribute("article[data-ft]".into()),
                        Matcher::ClassPattern(r"\bstory_body_container\b".into()),
                    ],
                },
            ],
            fallback_matchers: vec![
                Matcher::Attribute("article".into()),
                Matcher::Attribute("[data-post-id]".into()),
            ],
        }
    }
}

#[derive(Debug)]
pub(crate) enum CompiledMatcher {
    Css(Selector),
    ClassPattern(Regex),
}

impl CompiledMatcher {
    fn compile(matcher: &Matcher) -> Option<Self> {
        match matcher {
            Matcher::Attribute(css) => parse_selector(css).map(CompiledMatcher::Css),
            Matcher::Role(role) => {
                parse_selector(&format!("[role=\"{}\"]", role)).map(CompiledMatcher::Css)
            }
            Matcher::ClassPattern(pattern) => match Regex::new(pattern) {
                Ok(re) => Some(CompiledMatcher::ClassPattern(re)),
                Err(e) => {
                    warn!("Ignoring invalid class pattern {:?}: {}", pattern, e);
                    None
                }
            },
        }
    }

    pub(crate) fn matches(&self, element: &ElementRef<'_>) -> bool {
        match self {
            CompiledMatcher::Css(selector) => selector.matches(element),
            CompiledMatcher::ClassPattern(re) => element
                .value()
                .attr("class")
                .is_some_and(|class| re.is_match(class)),
        }
    }
}

#[derive(Debug)]
pub(crate) struct CompiledProfile {
    pub name: String,
    pub signature: Option<Selector>,
    pub containers: Vec<Selector>,
    /// Source text of `containers`, handed to the page for scoping.
    pub container_css: Vec<String>,
    pub matchers: Vec<CompiledMatcher>,
}

impl CompiledProfile {
    pub(crate) fn compile(profile: &LayoutProfile) -> Self {
        let (containers, container_css): (Vec<Selector>, Vec<String>) = profile
            .containers
            .iter()
            .filter_map(|css| parse_selector(css).map(|sel| (sel, css.clone())))
            .unzip();
        Self {
            name: profile.name.clone(),
            signature: parse_selector(&profile.signature),
            containers,
            container_css,
            matchers: profile
                .matchers
                .iter()
                .filter_map(CompiledMatcher::compile)
                .collect(),
        }
    }

    /// Union of every profile plus the fallback matchers.
    pub(crate) fn generic(config: &ClassifierConfig) -> Self {
        let mut containers = Vec::new();
        let mut matchers = Vec::new();
        for profile in &config.profiles {
            containers.extend(profile.containers.iter().cloned());
            matchers.extend(profile.matchers.iter().cloned());
        }
        matchers.extend(config.fallback_matchers.iter().cloned());

        Self::compile(&LayoutProfile {
            name: GENERIC_PROFILE.to_string(),
            signature: String::new(),
            containers,
            matchers,
        })
    }
}

pub const GENERIC_PROFILE: &str = "generic";

fn parse_selector(css: &str) -> Option<Selector> {
    if css.trim().is_empty() {
        return None;
    }
    match Selector::parse(css) {
        Ok(selector) => Some(selector),
        Err(e) => {
            warn!("Ignoring invalid selector {:?}: {:?}", css, e);
            None
        }
    }
}
